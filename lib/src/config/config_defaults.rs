// lib/src/config/config_defaults.rs

use models::{DEFAULT_CLOSING_HOUR, DEFAULT_OPENING_HOUR};

pub use crate::config::config_constants::*;
use crate::config::config_structs::StorageEngineType;
use crate::storage_engine::WGS84_SRID;

pub fn default_jwt_secret() -> String { DEFAULT_JWT_SECRET.to_string() }
pub fn default_jwt_expiry_secs() -> u64 { DEFAULT_JWT_EXPIRY_SECS }
pub fn default_hasura_namespace() -> String { DEFAULT_HASURA_NAMESPACE.to_string() }

pub fn default_db_host() -> String { DEFAULT_DB_HOST.to_string() }
pub fn default_db_port() -> u16 { DEFAULT_DB_PORT }
pub fn default_db_username() -> String { DEFAULT_DB_USERNAME.to_string() }
pub fn default_db_name() -> String { DEFAULT_DB_NAME.to_string() }
pub fn default_max_connections() -> u32 { DEFAULT_DB_MAX_CONNECTIONS }
pub fn default_srid() -> i32 { WGS84_SRID }

pub fn default_storage_engine_type() -> StorageEngineType { StorageEngineType::InMemory }

pub fn default_log_level() -> String { DEFAULT_LOG_LEVEL.to_string() }
pub fn default_request_timeout_ms() -> u64 { DEFAULT_REQUEST_TIMEOUT_MS }

pub fn default_utc_offset_minutes() -> i32 { DEFAULT_UTC_OFFSET_MINUTES }
pub fn default_reminder_window_hours() -> i64 { DEFAULT_REMINDER_WINDOW_HOURS }
pub fn default_reminder_batch_size() -> usize { DEFAULT_REMINDER_BATCH_SIZE }
pub fn default_max_send_attempts() -> u32 { DEFAULT_MAX_SEND_ATTEMPTS }
pub fn default_chw_capacity() -> u32 { DEFAULT_CHW_CAPACITY }
pub fn default_no_show_window_minutes() -> i64 { DEFAULT_NO_SHOW_WINDOW_MINUTES }
pub fn default_slot_minutes() -> u32 { DEFAULT_SLOT_MINUTES }
pub fn default_opening_hour() -> u32 { DEFAULT_OPENING_HOUR }
pub fn default_closing_hour() -> u32 { DEFAULT_CLOSING_HOUR }
pub fn default_daily_route_start_hour() -> u32 { DEFAULT_DAILY_ROUTE_START_HOUR }
pub fn default_visit_dwell_minutes() -> i64 { DEFAULT_VISIT_DWELL_MINUTES }
