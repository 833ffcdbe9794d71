// lib/src/risk.rs
// Composite maternal risk score. Weights are heuristic, not diagnostic.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::context::{Clock, RequestContext};
use crate::storage_engine::ClinicalStore;
use models::errors::{PlannerError, PlannerResult};
use models::{HealthMetric, Mother, MotherId, RiskAssessment, RiskFactors, RiskLevel};

pub const HIGH_RISK_SCORE: u32 = 10;
pub const MEDIUM_RISK_SCORE: u32 = 5;

/// Matched as case-insensitive substrings of each recorded condition.
const MEDICAL_CONDITIONS: &[(&str, u32)] = &[
    ("diabetes", 3),
    ("hypertension", 3),
    ("heart disease", 4),
    ("kidney disease", 3),
    ("thyroid", 2),
    ("autoimmune", 2),
    ("hiv", 3),
    ("hepatitis", 2),
    ("malaria", 2),
    ("anemia", 2),
    ("sickle cell", 3),
];

/// (needle without spaces or hyphens, label, weight). First match wins, so
/// preeclampsia is tested before eclampsia.
const COMPLICATIONS: &[(&str, &str, u32)] = &[
    ("preeclampsia", "preeclampsia", 3),
    ("eclampsia", "eclampsia", 4),
    ("gestationaldiabetes", "gestational diabetes", 3),
    ("preterm", "preterm birth", 3),
    ("placentaprevia", "placenta previa", 3),
    ("abruption", "placental abruption", 4),
    ("postpartumhemorrhage", "postpartum hemorrhage", 3),
    ("postpartumhaemorrhage", "postpartum hemorrhage", 3),
    ("stillbirth", "stillbirth", 4),
    ("miscarriage", "miscarriage", 2),
];

const LIFESTYLE: &[&str] = &["smoking", "alcohol", "substance"];

pub fn risk_level(score: u32) -> RiskLevel {
    if score >= HIGH_RISK_SCORE {
        RiskLevel::High
    } else if score >= MEDIUM_RISK_SCORE {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

struct Tally {
    score: u32,
    factors: RiskFactors,
}

impl Tally {
    fn add(&mut self, weight: u32, group: fn(&mut RiskFactors) -> &mut Vec<String>, label: impl Into<String>) {
        let label = label.into();
        let list = group(&mut self.factors);
        if !list.contains(&label) {
            self.score += weight;
            list.push(label);
        }
    }
}

fn age_related(f: &mut RiskFactors) -> &mut Vec<String> {
    &mut f.age_related
}
fn medical_history(f: &mut RiskFactors) -> &mut Vec<String> {
    &mut f.medical_history
}
fn obstetric_history(f: &mut RiskFactors) -> &mut Vec<String> {
    &mut f.obstetric_history
}
fn current_vitals(f: &mut RiskFactors) -> &mut Vec<String> {
    &mut f.current_vitals
}

fn normalize_complication(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Scores `mother` as of `on`, using `latest` as the current vitals.
pub fn score_mother(mother: &Mother, latest: Option<&HealthMetric>, on: NaiveDate) -> (u32, RiskFactors) {
    let mut tally = Tally {
        score: 0,
        factors: RiskFactors::default(),
    };

    match mother.age_on(on) {
        Some(age) if age < 18 => tally.add(2, age_related, "adolescent pregnancy"),
        Some(age) if age >= 40 => tally.add(3, age_related, "advanced maternal age (40+)"),
        Some(age) if age >= 35 => tally.add(2, age_related, "advanced maternal age"),
        _ => {}
    }

    for condition in &mother.health_conditions {
        let lowered = condition.to_lowercase();
        if let Some((name, weight)) = MEDICAL_CONDITIONS.iter().find(|(name, _)| lowered.contains(name)) {
            tally.add(*weight, medical_history, *name);
        }
        if LIFESTYLE.iter().any(|l| lowered.contains(l)) && !tally.factors.lifestyle.contains(&lowered) {
            tally.factors.lifestyle.push(lowered);
        }
    }
    if mother.blood_type.is_rh_negative() {
        tally.add(2, medical_history, "rh negative blood type");
    }

    let history = &mother.obstetric_history;
    if history.previous_caesareans > 0 {
        tally.add(history.previous_caesareans, obstetric_history, "previous cesarean delivery");
    }
    if history.previous_deliveries >= 5 {
        tally.add(2, obstetric_history, "grand multiparity");
    }
    if history.previous_pregnancies == 0 {
        tally.add(1, obstetric_history, "first pregnancy");
    }
    for complication in &history.previous_complications {
        let normalized = normalize_complication(complication);
        if let Some((_, label, weight)) = COMPLICATIONS.iter().find(|(needle, _, _)| normalized.contains(needle)) {
            tally.add(*weight, obstetric_history, format!("previous {}", label));
        }
    }

    if let Some(metric) = latest {
        let vitals = &metric.vitals;
        if let Some(bp) = vitals.blood_pressure {
            if bp.systolic >= 140 || bp.diastolic >= 90 {
                tally.add(3, current_vitals, "elevated blood pressure");
            } else if bp.systolic < 90 || bp.diastolic < 60 {
                tally.add(2, current_vitals, "low blood pressure");
            }
        }
        if vitals
            .fetal_heart_rate
            .is_some_and(|fhr| !(110.0..=160.0).contains(&fhr))
        {
            tally.add(3, current_vitals, "abnormal fetal heart rate");
        }
        if let Some(hb) = vitals.hemoglobin {
            if hb < 11.0 {
                tally.add(2, current_vitals, "anemia");
            }
            if hb < 7.0 {
                tally.add(3, current_vitals, "severe anemia");
            }
        }
        if vitals.blood_sugar.is_some_and(|s| s > 95.0) {
            tally.add(2, current_vitals, "elevated blood sugar");
        }
    }

    (tally.score, tally.factors)
}

pub struct RiskScorer {
    store: Arc<dyn ClinicalStore>,
    clock: Arc<dyn Clock>,
}

impl RiskScorer {
    pub fn new(store: Arc<dyn ClinicalStore>, clock: Arc<dyn Clock>) -> Self {
        RiskScorer { store, clock }
    }

    /// Scores a mother without touching the store.
    pub fn assess(&self, mother: &Mother, latest: Option<&HealthMetric>) -> RiskAssessment {
        let assessed_at = self.clock.now();
        let (score, risk_factors) = score_mother(mother, latest, assessed_at.date_naive());
        RiskAssessment {
            mother_id: mother.id,
            score,
            level: risk_level(score),
            risk_factors,
            assessed_at,
        }
    }

    /// Loads the mother and her newest reading, scores her and caches the
    /// resulting level on the mother record.
    #[instrument(skip(self, ctx))]
    pub async fn assess_mother(&self, ctx: &RequestContext, mother_id: MotherId) -> PlannerResult<RiskAssessment> {
        let mut mother = ctx
            .run(self.store.get_mother(&mother_id))
            .await?
            .ok_or_else(|| PlannerError::not_found("mother", mother_id))?;
        mother.validate()?;
        let latest = ctx.run(self.store.latest_metric(&mother_id)).await?;
        let assessment = self.assess(&mother, latest.as_ref());

        if mother.risk_level != Some(assessment.level) {
            info!(
                "Risk level of mother {} changed from {:?} to {}",
                mother_id, mother.risk_level, assessment.level
            );
            mother.risk_level = Some(assessment.level);
            mother.updated_at = assessment.assessed_at;
            ctx.ensure_active()?;
            ctx.run(self.store.update_mother(&mother)).await?;
        }
        Ok(assessment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedClock;
    use crate::storage_engine::InMemoryStore;
    use chrono::{TimeZone, Utc};
    use models::{BloodPressure, BloodType, ErrorCategory, UserId, VitalSigns};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn mother() -> Mother {
        let mut m = Mother::new(UserId::new(), Utc::now());
        m.obstetric_history.previous_pregnancies = 1;
        m.obstetric_history.previous_deliveries = 1;
        m
    }

    fn metric(m: &Mother, vitals: VitalSigns) -> HealthMetric {
        HealthMetric::new(m.id, UserId::new(), Utc::now(), vitals)
    }

    #[test]
    fn high_risk_composite_score() {
        let mut m = mother();
        m.health_conditions = vec!["Diabetes".to_string(), "hypertension".to_string()];
        m.obstetric_history.previous_caesareans = 1;
        let latest = metric(
            &m,
            VitalSigns {
                blood_pressure: Some(BloodPressure { systolic: 150, diastolic: 95 }),
                hemoglobin: Some(6.5),
                ..Default::default()
            },
        );

        let (score, factors) = score_mother(&m, Some(&latest), today());
        assert_eq!(score, 15);
        assert_eq!(risk_level(score), RiskLevel::High);
        assert!(factors.medical_history.contains(&"diabetes".to_string()));
        assert!(factors.medical_history.contains(&"hypertension".to_string()));
        assert!(factors.obstetric_history.contains(&"previous cesarean delivery".to_string()));
        assert!(factors.current_vitals.contains(&"elevated blood pressure".to_string()));
        assert!(factors.current_vitals.contains(&"anemia".to_string()));
    }

    #[test]
    fn obstetric_and_blood_type_weights() {
        let mut m = mother();
        m.obstetric_history.previous_pregnancies = 6;
        m.obstetric_history.previous_deliveries = 5;
        m.obstetric_history.previous_complications = vec!["Pre-eclampsia".to_string(), "still birth".to_string()];
        m.blood_type = BloodType::ONegative;
        let (score, factors) = score_mother(&m, None, today());
        assert_eq!(score, 2 + 3 + 4 + 2);
        assert_eq!(
            factors.obstetric_history,
            vec!["grand multiparity", "previous preeclampsia", "previous stillbirth"]
        );
        assert_eq!(factors.medical_history, vec!["rh negative blood type"]);
        assert_eq!(risk_level(score), RiskLevel::High);
    }

    #[test]
    fn first_pregnancy_and_age_bands() {
        let mut m = Mother::new(UserId::new(), Utc::now());
        m.date_of_birth = NaiveDate::from_ymd_opt(2008, 1, 1);
        let (score, factors) = score_mother(&m, None, today());
        assert_eq!(score, 3);
        assert_eq!(factors.age_related, vec!["adolescent pregnancy"]);
        assert_eq!(factors.obstetric_history, vec!["first pregnancy"]);

        m.date_of_birth = NaiveDate::from_ymd_opt(1984, 1, 1);
        assert_eq!(score_mother(&m, None, today()).1.age_related, vec!["advanced maternal age (40+)"]);
        m.date_of_birth = NaiveDate::from_ymd_opt(1988, 1, 1);
        assert_eq!(score_mother(&m, None, today()).0, 3);
    }

    #[test]
    fn lifestyle_is_recorded_without_weight() {
        let mut m = mother();
        m.health_conditions = vec!["Smoking".to_string()];
        let (score, factors) = score_mother(&m, None, today());
        assert_eq!(score, 0);
        assert_eq!(factors.lifestyle, vec!["smoking"]);
    }

    #[test]
    fn adding_a_condition_never_lowers_the_score() {
        let base = mother();
        let (base_score, _) = score_mother(&base, None, today());
        for (name, _) in MEDICAL_CONDITIONS {
            let mut m = base.clone();
            m.health_conditions.push(name.to_string());
            assert!(score_mother(&m, None, today()).0 >= base_score);
        }
        let mut m = base.clone();
        m.health_conditions = vec!["diabetes".to_string(), "Type 2 diabetes".to_string()];
        assert_eq!(score_mother(&m, None, today()).0, 3);
    }

    #[test]
    fn vitals_in_range_add_nothing() {
        let m = mother();
        let latest = metric(
            &m,
            VitalSigns {
                blood_pressure: Some(BloodPressure { systolic: 115, diastolic: 75 }),
                fetal_heart_rate: Some(140.0),
                hemoglobin: Some(12.5),
                blood_sugar: Some(85.0),
                ..Default::default()
            },
        );
        assert_eq!(score_mother(&m, Some(&latest), today()).0, 0);
    }

    #[tokio::test]
    async fn assess_mother_caches_level() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let store = Arc::new(InMemoryStore::new());
        let mut m = mother();
        m.health_conditions = vec!["heart disease".to_string(), "HIV".to_string()];
        store.insert_mother(m.clone()).await;
        let scorer = RiskScorer::new(store.clone(), Arc::new(FixedClock::new(now)));
        let ctx = RequestContext::background();

        let assessment = scorer.assess_mother(&ctx, m.id).await.unwrap();
        assert_eq!(assessment.score, 7);
        assert_eq!(assessment.level, RiskLevel::Medium);
        assert_eq!(assessment.assessed_at, now);
        let stored = store.get_mother(&m.id).await.unwrap().unwrap();
        assert_eq!(stored.risk_level, Some(RiskLevel::Medium));

        let err = scorer.assess_mother(&ctx, MotherId::new()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn assess_mother_rejects_inconsistent_history() {
        let store = Arc::new(InMemoryStore::new());
        let mut m = mother();
        m.obstetric_history.previous_deliveries = 3;
        store.insert_mother(m.clone()).await;
        let scorer = RiskScorer::new(store.clone(), Arc::new(FixedClock::new(Utc::now())));

        let err = scorer
            .assess_mother(&RequestContext::background(), m.id)
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadRequest);
        assert_eq!(store.get_mother(&m.id).await.unwrap().unwrap().risk_level, None);
    }
}
