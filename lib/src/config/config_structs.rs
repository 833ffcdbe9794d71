// lib/src/config/config_structs.rs

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::config_defaults::*;

/// Top-level YAML layout: the planner settings live under a `planner:` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfigWrapper {
    pub planner: PlannerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            auth: AuthConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            scheduling: SchedulingConfig::default(),
            log_level: default_log_level(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry_secs")]
    pub jwt_expiry_secs: u64,
    /// Claim namespace the GraphQL gateway reads roles from.
    #[serde(default = "default_hasura_namespace")]
    pub hasura_namespace: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            jwt_secret: default_jwt_secret(),
            jwt_expiry_secs: default_jwt_expiry_secs(),
            hasura_namespace: default_hasura_namespace(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("jwt_expiry_secs", &self.jwt_expiry_secs)
            .field("hasura_namespace", &self.hasura_namespace)
            .finish()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_username")]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_db_name")]
    pub database: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_srid")]
    pub srid: i32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            host: default_db_host(),
            port: default_db_port(),
            username: default_db_username(),
            password: None,
            database: default_db_name(),
            max_connections: default_max_connections(),
            srid: default_srid(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("srid", &self.srid)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageEngineType {
    InMemory,
    Postgis,
}

impl fmt::Display for StorageEngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageEngineType::InMemory => write!(f, "in_memory"),
            StorageEngineType::Postgis => write!(f, "postgis"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_engine_type")]
    pub engine_type: StorageEngineType,
    /// JSON snapshot used to seed the in-memory engine.
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            engine_type: default_storage_engine_type(),
            fixture_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Offset of the deployment's civil time from UTC; visit days, slot
    /// hours and the 10:00 template time are local to it.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_reminder_window_hours")]
    pub reminder_window_hours: i64,
    #[serde(default = "default_reminder_batch_size")]
    pub reminder_batch_size: usize,
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,
    #[serde(default = "default_chw_capacity")]
    pub default_chw_capacity: u32,
    #[serde(default = "default_no_show_window_minutes")]
    pub no_show_window_minutes: i64,
    #[serde(default = "default_slot_minutes")]
    pub default_slot_minutes: u32,
    #[serde(default = "default_opening_hour")]
    pub default_opening_hour: u32,
    #[serde(default = "default_closing_hour")]
    pub default_closing_hour: u32,
    #[serde(default = "default_daily_route_start_hour")]
    pub daily_route_start_hour: u32,
    #[serde(default = "default_visit_dwell_minutes")]
    pub visit_dwell_minutes: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        SchedulingConfig {
            utc_offset_minutes: default_utc_offset_minutes(),
            reminder_window_hours: default_reminder_window_hours(),
            reminder_batch_size: default_reminder_batch_size(),
            max_send_attempts: default_max_send_attempts(),
            default_chw_capacity: default_chw_capacity(),
            no_show_window_minutes: default_no_show_window_minutes(),
            default_slot_minutes: default_slot_minutes(),
            default_opening_hour: default_opening_hour(),
            default_closing_hour: default_closing_hour(),
            daily_route_start_hour: default_daily_route_start_hour(),
            visit_dwell_minutes: default_visit_dwell_minutes(),
        }
    }
}
