// lib/src/config/config_constants.rs

pub const DEFAULT_CONFIG_PATH: &str = "planner_config.yaml";

pub const DEFAULT_JWT_SECRET: &str = "mamacare-development-secret";
pub const DEFAULT_JWT_EXPIRY_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_HASURA_NAMESPACE: &str = "https://hasura.io/jwt/claims";

pub const DEFAULT_DB_HOST: &str = "127.0.0.1";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_USERNAME: &str = "mamacare";
pub const DEFAULT_DB_NAME: &str = "mamacare";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 3 * 60;
pub const DEFAULT_REMINDER_WINDOW_HOURS: i64 = 72;
pub const DEFAULT_REMINDER_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_SEND_ATTEMPTS: u32 = 2;
pub const DEFAULT_CHW_CAPACITY: u32 = 5;
pub const DEFAULT_NO_SHOW_WINDOW_MINUTES: i64 = 60;
pub const DEFAULT_SLOT_MINUTES: u32 = 30;
pub const DEFAULT_DAILY_ROUTE_START_HOUR: u32 = 8;
pub const DEFAULT_VISIT_DWELL_MINUTES: i64 = 30;

/// Largest UTC offset any civil time zone uses.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;
