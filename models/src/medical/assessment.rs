// models/src/medical/assessment.rs
// Derived results; produced on demand and never persisted by the planner.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::{MetricId, MotherId};
use crate::medical::mother::RiskLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendType {
    Increasing,
    Decreasing,
    Stable,
    Fluctuating,
    Insufficient,
}

/// Ordered `None < Monitor < Concern < Urgent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    None,
    Monitor,
    Concern,
    Urgent,
}

impl Default for AlertLevel {
    fn default() -> Self {
        AlertLevel::None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub metric: String,
    pub trend: TrendType,
    pub alert_level: AlertLevel,
    pub first_value: f64,
    pub last_value: f64,
    pub percent_change: f64,
    pub change_per_day: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub description: String,
    pub recommended_action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub mother_id: MotherId,
    pub metric_count: usize,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub trends: Vec<TrendResult>,
    pub highest_alert: AlertLevel,
}

impl TrendAnalysis {
    pub fn trend(&self, metric: &str) -> Option<&TrendResult> {
        self.trends.iter().find(|t| t.metric == metric)
    }
}

/// Ordered `Normal < Monitor < Concerning < Urgent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Monitor,
    Concerning,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finding {
    SevereHypertension,
    Hypertension,
    Hypotension,
    Bradycardia,
    Tachycardia,
    SeverelyReducedMovement,
    ReducedMovement,
    SeverelyElevatedBloodSugar,
    ElevatedBloodSugar,
    SevereAnemia,
    Anemia,
    Underweight,
}

impl Finding {
    pub fn severity(&self) -> Severity {
        match self {
            Finding::SevereHypertension
            | Finding::SeverelyReducedMovement
            | Finding::SevereAnemia
            | Finding::Bradycardia => Severity::Urgent,
            Finding::Hypertension
            | Finding::ReducedMovement
            | Finding::Anemia
            | Finding::Tachycardia
            | Finding::SeverelyElevatedBloodSugar => Severity::Concerning,
            Finding::Hypotension | Finding::ElevatedBloodSugar | Finding::Underweight => Severity::Monitor,
        }
    }

    pub fn recommended_action(&self) -> &'static str {
        match self {
            Finding::SevereHypertension => "Refer immediately to a hospital for severe hypertension management",
            Finding::Hypertension => "Recheck blood pressure within 24 hours and screen for preeclampsia",
            Finding::Hypotension => "Encourage fluids and rest; recheck blood pressure",
            Finding::Bradycardia => "Urgent fetal assessment; refer to a facility with obstetric care",
            Finding::Tachycardia => "Check maternal temperature and hydration; repeat fetal heart rate",
            Finding::SeverelyReducedMovement => "Urgent fetal wellbeing assessment today",
            Finding::ReducedMovement => "Perform a kick count and review within 24 hours",
            Finding::SeverelyElevatedBloodSugar => "Refer for gestational diabetes management",
            Finding::ElevatedBloodSugar => "Schedule glucose tolerance test and dietary counselling",
            Finding::SevereAnemia => "Refer for urgent anemia treatment and possible transfusion",
            Finding::Anemia => "Start or review iron and folic acid supplementation",
            Finding::Underweight => "Provide nutritional counselling and supplementation",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Finding::SevereHypertension => "severe hypertension",
            Finding::Hypertension => "hypertension",
            Finding::Hypotension => "hypotension",
            Finding::Bradycardia => "bradycardia",
            Finding::Tachycardia => "tachycardia",
            Finding::SeverelyReducedMovement => "severely reduced fetal movement",
            Finding::ReducedMovement => "reduced fetal movement",
            Finding::SeverelyElevatedBloodSugar => "severely elevated blood sugar",
            Finding::ElevatedBloodSugar => "elevated blood sugar",
            Finding::SevereAnemia => "severe anemia",
            Finding::Anemia => "anemia",
            Finding::Underweight => "underweight",
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Abnormality {
    pub finding: Finding,
    pub severity: Severity,
    pub value: String,
    pub recommended_action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAnalysis {
    pub metric_id: MetricId,
    pub mother_id: MotherId,
    pub gestational_age_weeks: Option<u32>,
    /// Keyed by vital name, e.g. "blood_pressure".
    pub abnormalities: BTreeMap<String, Abnormality>,
    pub severity: Severity,
    pub recommended_actions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub age_related: Vec<String>,
    pub medical_history: Vec<String>,
    pub obstetric_history: Vec<String>,
    pub current_vitals: Vec<String>,
    pub lifestyle: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub mother_id: MotherId,
    pub score: u32,
    pub level: RiskLevel,
    pub risk_factors: RiskFactors,
    pub assessed_at: DateTime<Utc>,
}
