// lib/src/config/config_impl.rs

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::FixedOffset;
use tracing::{error, info};

use crate::config::config_constants::MAX_UTC_OFFSET_MINUTES;
use crate::config::config_structs::{PlannerConfig, PlannerConfigWrapper, SchedulingConfig};
use crate::storage_engine::WGS84_SRID;
use models::errors::{PlannerError, PlannerResult};

impl PlannerConfig {
    /// Reads `path` once at startup. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<PlannerConfig> {
        if !path.exists() {
            info!("Config file not found at {:?}, using defaults", path);
            return Ok(PlannerConfig::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .context(format!("Failed to read planner config file: {}", path.display()))?;
        let config = PlannerConfig::from_yaml_str(&content)
            .context(format!("Failed to load planner config from {:?}", path.display()))?;
        info!("Successfully loaded and validated planner configuration from {:?}", path);
        Ok(config)
    }

    /// Parses and validates a `planner:`-wrapped YAML document.
    pub fn from_yaml_str(content: &str) -> PlannerResult<PlannerConfig> {
        let wrapper: PlannerConfigWrapper = serde_yaml::from_str(content).map_err(|e| {
            error!("Deserialization error: {:?}", e);
            PlannerError::from(e)
        })?;
        wrapper.planner.validate()?;
        Ok(wrapper.planner)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create parent directories for {}", path.display()))?;
        }
        let wrapper = PlannerConfigWrapper { planner: self.clone() };
        let yaml = serde_yaml::to_string(&wrapper).context("Failed to serialize PlannerConfig")?;
        tokio::fs::write(path, yaml)
            .await
            .context(format!("Failed to write PlannerConfig to file: {}", path.display()))?;
        info!("Saved planner configuration to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> PlannerResult<()> {
        if self.database.srid != WGS84_SRID {
            return Err(PlannerError::ConfigurationError(format!(
                "database.srid must be {}, got {}",
                WGS84_SRID, self.database.srid
            )));
        }
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(PlannerError::ConfigurationError("auth.jwt_secret must not be empty".to_string()));
        }
        if self.auth.hasura_namespace.trim().is_empty() {
            return Err(PlannerError::ConfigurationError(
                "auth.hasura_namespace must not be empty".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(PlannerError::ConfigurationError("request_timeout_ms must be positive".to_string()));
        }
        self.scheduling.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SchedulingConfig {
    pub fn validate(&self) -> PlannerResult<()> {
        if self.default_opening_hour >= self.default_closing_hour || self.default_closing_hour > 24 {
            return Err(PlannerError::ConfigurationError(format!(
                "scheduling hours must satisfy opening < closing <= 24, got {}..{}",
                self.default_opening_hour, self.default_closing_hour
            )));
        }
        if self.reminder_window_hours < 0 {
            return Err(PlannerError::ConfigurationError(format!(
                "scheduling.reminder_window_hours must not be negative, got {}",
                self.reminder_window_hours
            )));
        }
        if self.reminder_batch_size == 0 {
            return Err(PlannerError::ConfigurationError(
                "scheduling.reminder_batch_size must be positive".to_string(),
            ));
        }
        if self.max_send_attempts == 0 {
            return Err(PlannerError::ConfigurationError(
                "scheduling.max_send_attempts must be positive".to_string(),
            ));
        }
        if self.default_slot_minutes == 0 {
            return Err(PlannerError::ConfigurationError(
                "scheduling.default_slot_minutes must be positive".to_string(),
            ));
        }
        if self.daily_route_start_hour > 23 {
            return Err(PlannerError::ConfigurationError(format!(
                "scheduling.daily_route_start_hour must be below 24, got {}",
                self.daily_route_start_hour
            )));
        }
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(PlannerError::ConfigurationError(format!(
                "scheduling.utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            )));
        }
        Ok(())
    }

    /// The deployment's local zone as a fixed offset.
    pub fn local_offset(&self) -> PlannerResult<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            PlannerError::ConfigurationError(format!("invalid utc offset {} minutes", self.utc_offset_minutes))
        })
    }

    pub fn default_hours(&self) -> (u32, u32) {
        (self.default_opening_hour, self.default_closing_hour)
    }
}
