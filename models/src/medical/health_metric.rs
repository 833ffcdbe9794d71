// models/src/medical/health_metric.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ValidationError, ValidationResult};
use crate::identifiers::{MetricId, MotherId, UserId, VisitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: u32,
    pub diastolic: u32,
}

/// Vital signs captured at one reading. Every field is optional but a
/// stored reading carries at least one of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub blood_pressure: Option<BloodPressure>,
    /// Beats per minute.
    pub fetal_heart_rate: Option<f64>,
    /// Kicks counted over the standard two-hour window.
    pub fetal_movement: Option<u32>,
    /// Fasting blood glucose, mg/dL.
    pub blood_sugar: Option<f64>,
    /// g/dL.
    pub hemoglobin: Option<f64>,
    /// kg.
    pub weight: Option<f64>,
    /// Contractions per ten minutes.
    pub contractions: Option<u32>,
}

impl VitalSigns {
    pub fn has_any(&self) -> bool {
        self.blood_pressure.is_some()
            || self.fetal_heart_rate.is_some()
            || self.fetal_movement.is_some()
            || self.blood_sugar.is_some()
            || self.hemoglobin.is_some()
            || self.weight.is_some()
            || self.contractions.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetric {
    pub id: MetricId,
    pub mother_id: MotherId,
    pub visit_id: Option<VisitId>,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
    pub vitals: VitalSigns,
    pub notes: Option<String>,
}

impl HealthMetric {
    pub fn new(mother_id: MotherId, recorded_by: UserId, recorded_at: DateTime<Utc>, vitals: VitalSigns) -> Self {
        HealthMetric {
            id: MetricId::new(),
            mother_id,
            visit_id: None,
            recorded_by,
            recorded_at,
            vitals,
            notes: None,
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        if !self.vitals.has_any() {
            return Err(ValidationError::NoVitalSigns);
        }
        Ok(())
    }
}
