// models/src/medical/mother.rs

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ValidationError, ValidationResult};
use crate::identifiers::{MotherId, UserId};
use crate::location::Coordinates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
    #[serde(rename = "unknown")]
    Unknown,
}

impl BloodType {
    pub fn is_rh_negative(&self) -> bool {
        matches!(
            self,
            BloodType::ANegative | BloodType::BNegative | BloodType::AbNegative | BloodType::ONegative
        )
    }
}

impl Default for BloodType {
    fn default() -> Self {
        BloodType::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObstetricHistory {
    pub previous_pregnancies: u32,
    pub previous_deliveries: u32,
    pub previous_caesareans: u32,
    /// Free-text complications such as "preeclampsia" or "stillbirth".
    #[serde(default)]
    pub previous_complications: Vec<String>,
}

impl ObstetricHistory {
    pub fn validate(&self) -> ValidationResult<()> {
        if self.previous_deliveries > self.previous_pregnancies {
            return Err(ValidationError::DeliveriesExceedPregnancies {
                deliveries: self.previous_deliveries,
                pregnancies: self.previous_pregnancies,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mother {
    pub id: MotherId,
    pub user_id: UserId,
    pub date_of_birth: Option<NaiveDate>,
    /// Last menstrual period, the anchor of every gestational calculation.
    pub lmp: Option<NaiveDate>,
    #[serde(default)]
    pub blood_type: BloodType,
    #[serde(default)]
    pub health_conditions: Vec<String>,
    #[serde(default)]
    pub obstetric_history: ObstetricHistory,
    pub location: Option<Coordinates>,
    pub catchment_area: Option<String>,
    /// Last computed risk level, refreshed by the risk scorer.
    pub risk_level: Option<RiskLevel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mother {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Mother {
            id: MotherId::new(),
            user_id,
            date_of_birth: None,
            lmp: None,
            blood_type: BloodType::Unknown,
            health_conditions: Vec::new(),
            obstetric_history: ObstetricHistory::default(),
            location: None,
            catchment_area: None,
            risk_level: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Age in whole years on `on`, if the date of birth is known.
    pub fn age_on(&self, on: NaiveDate) -> Option<u32> {
        let dob = self.date_of_birth?;
        if on < dob {
            return None;
        }
        let mut years = on.year() - dob.year();
        if (on.month(), on.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        self.obstetric_history.validate()
    }
}
