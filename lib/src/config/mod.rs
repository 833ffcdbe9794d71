// lib/src/config/mod.rs

pub mod config_constants;
pub mod config_defaults;
pub mod config_structs;
pub mod config_impl;

pub use config_constants::*;
pub use config_structs::{
    AuthConfig, DatabaseConfig, PlannerConfig, PlannerConfigWrapper, SchedulingConfig, StorageConfig,
    StorageEngineType,
};
