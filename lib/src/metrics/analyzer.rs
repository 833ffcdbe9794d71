// lib/src/metrics/analyzer.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::trends::{analyze_trends, MIN_TREND_POINTS};
use crate::context::{Clock, RequestContext};
use crate::scheduling::pregnancy::PregnancyDates;
use crate::storage_engine::ClinicalStore;
use models::errors::{PlannerError, PlannerResult};
use models::{
    Abnormality, AlertLevel, Finding, HealthMetric, MetricAnalysis, Mother, MotherId, Severity, TrendAnalysis,
    VitalSigns,
};

/// Fetal movement counts are only meaningful from this gestational week.
pub const FETAL_MOVEMENT_MIN_WEEK: u32 = 24;

fn record(map: &mut BTreeMap<String, Abnormality>, key: &str, finding: Finding, value: String) {
    map.insert(
        key.to_string(),
        Abnormality {
            finding,
            severity: finding.severity(),
            value,
            recommended_action: finding.recommended_action().to_string(),
        },
    );
}

/// Threshold checks over one reading, keyed by vital name.
pub fn find_abnormalities(vitals: &VitalSigns, gestational_age_weeks: Option<u32>) -> BTreeMap<String, Abnormality> {
    let mut found = BTreeMap::new();

    if let Some(bp) = vitals.blood_pressure {
        let finding = if bp.systolic >= 160 || bp.diastolic >= 110 {
            Some(Finding::SevereHypertension)
        } else if bp.systolic >= 140 || bp.diastolic >= 90 {
            Some(Finding::Hypertension)
        } else if bp.systolic < 90 || bp.diastolic < 60 {
            Some(Finding::Hypotension)
        } else {
            None
        };
        if let Some(finding) = finding {
            record(&mut found, "blood_pressure", finding, format!("{}/{} mmHg", bp.systolic, bp.diastolic));
        }
    }

    if let Some(fhr) = vitals.fetal_heart_rate {
        let finding = if fhr < 110.0 {
            Some(Finding::Bradycardia)
        } else if fhr > 160.0 {
            Some(Finding::Tachycardia)
        } else {
            None
        };
        if let Some(finding) = finding {
            record(&mut found, "fetal_heart_rate", finding, format!("{} bpm", fhr));
        }
    }

    if let (Some(movement), Some(week)) = (vitals.fetal_movement, gestational_age_weeks) {
        if week >= FETAL_MOVEMENT_MIN_WEEK {
            let finding = if movement < 3 {
                Some(Finding::SeverelyReducedMovement)
            } else if movement < 10 {
                Some(Finding::ReducedMovement)
            } else {
                None
            };
            if let Some(finding) = finding {
                record(&mut found, "fetal_movement", finding, format!("{} movements", movement));
            }
        }
    }

    if let Some(sugar) = vitals.blood_sugar {
        let finding = if sugar > 180.0 {
            Some(Finding::SeverelyElevatedBloodSugar)
        } else if sugar > 95.0 {
            Some(Finding::ElevatedBloodSugar)
        } else {
            None
        };
        if let Some(finding) = finding {
            record(&mut found, "blood_sugar", finding, format!("{} mg/dL", sugar));
        }
    }

    if let Some(hb) = vitals.hemoglobin {
        let finding = if hb < 7.0 {
            Some(Finding::SevereAnemia)
        } else if hb < 11.0 {
            Some(Finding::Anemia)
        } else {
            None
        };
        if let Some(finding) = finding {
            record(&mut found, "hemoglobin", finding, format!("{} g/dL", hb));
        }
    }

    if let Some(weight) = vitals.weight {
        if weight < 45.0 {
            record(&mut found, "weight", Finding::Underweight, format!("{} kg", weight));
        }
    }

    found
}

/// Single-reading analysis. A reading without findings is still flagged
/// `Monitor` when the mother's trend analysis shows a concern.
pub fn analyze(
    metric: &HealthMetric,
    gestational_age_weeks: Option<u32>,
    trends: Option<&TrendAnalysis>,
) -> MetricAnalysis {
    let abnormalities = find_abnormalities(&metric.vitals, gestational_age_weeks);
    let mut severity = abnormalities
        .values()
        .map(|a| a.severity)
        .max()
        .unwrap_or(Severity::Normal);
    if severity == Severity::Normal && trends.is_some_and(|t| t.highest_alert >= AlertLevel::Concern) {
        severity = Severity::Monitor;
    }

    let mut ranked: Vec<&Abnormality> = abnormalities.values().collect();
    ranked.sort_by(|a, b| b.severity.cmp(&a.severity));
    let mut recommended_actions: Vec<String> = Vec::new();
    for a in ranked {
        if !recommended_actions.contains(&a.recommended_action) {
            recommended_actions.push(a.recommended_action.clone());
        }
    }
    if let Some(trends) = trends {
        for action in trends.trends.iter().filter_map(|t| t.recommended_action.as_ref()) {
            if !recommended_actions.contains(action) {
                recommended_actions.push(action.clone());
            }
        }
    }

    MetricAnalysis {
        metric_id: metric.id,
        mother_id: metric.mother_id,
        gestational_age_weeks,
        abnormalities,
        severity,
        recommended_actions,
    }
}

/// Persists readings and analyses them against the mother's history.
pub struct MetricAnalyzer {
    store: Arc<dyn ClinicalStore>,
    clock: Arc<dyn Clock>,
}

impl MetricAnalyzer {
    pub fn new(store: Arc<dyn ClinicalStore>, clock: Arc<dyn Clock>) -> Self {
        MetricAnalyzer { store, clock }
    }

    async fn load_mother(&self, ctx: &RequestContext, mother_id: MotherId) -> PlannerResult<Mother> {
        ctx.run(self.store.get_mother(&mother_id))
            .await?
            .ok_or_else(|| PlannerError::not_found("mother", mother_id))
    }

    fn gestational_weeks(mother: &Mother, metric: &HealthMetric) -> Option<u32> {
        let lmp = mother.lmp?;
        PregnancyDates::from_lmp(lmp, metric.recorded_at.date_naive()).completed_weeks()
    }

    /// Analysis over the mother's stored history, if it is long enough.
    async fn history_trends(&self, ctx: &RequestContext, mother_id: MotherId) -> PlannerResult<Option<TrendAnalysis>> {
        let history = ctx.run(self.store.list_metrics(&mother_id)).await?;
        if history.len() < MIN_TREND_POINTS {
            return Ok(None);
        }
        analyze_trends(mother_id, &history).map(Some)
    }

    /// Validates, stores and analyses a new reading.
    #[instrument(skip(self, ctx, metric), fields(mother_id = %metric.mother_id))]
    pub async fn record_metric(&self, ctx: &RequestContext, metric: HealthMetric) -> PlannerResult<MetricAnalysis> {
        metric.validate()?;
        if metric.recorded_at > self.clock.now() {
            return Err(PlannerError::BadRequest("metric recorded in the future".to_string()));
        }
        let mother = self.load_mother(ctx, metric.mother_id).await?;

        ctx.ensure_active()?;
        ctx.run(self.store.create_metric(&metric)).await?;

        let trends = self.history_trends(ctx, mother.id).await?;
        let analysis = analyze(&metric, Self::gestational_weeks(&mother, &metric), trends.as_ref());
        if analysis.severity >= Severity::Concerning {
            warn!(
                "Metric {} for mother {} is {:?}: {:?}",
                metric.id,
                mother.id,
                analysis.severity,
                analysis.abnormalities.keys().collect::<Vec<_>>()
            );
        } else {
            info!("Recorded metric {} for mother {}", metric.id, mother.id);
        }
        Ok(analysis)
    }

    /// Analysis of the newest stored reading.
    pub async fn latest_analysis(&self, ctx: &RequestContext, mother_id: MotherId) -> PlannerResult<MetricAnalysis> {
        let mother = self.load_mother(ctx, mother_id).await?;
        let metric = ctx
            .run(self.store.latest_metric(&mother_id))
            .await?
            .ok_or_else(|| PlannerError::not_found("health metric", mother_id))?;
        let trends = self.history_trends(ctx, mother_id).await?;
        Ok(analyze(&metric, Self::gestational_weeks(&mother, &metric), trends.as_ref()))
    }

    #[instrument(skip(self, ctx))]
    pub async fn analyze_trends(&self, ctx: &RequestContext, mother_id: MotherId) -> PlannerResult<TrendAnalysis> {
        self.load_mother(ctx, mother_id).await?;
        let history = ctx.run(self.store.list_metrics(&mother_id)).await?;
        analyze_trends(mother_id, &history)
    }
}
