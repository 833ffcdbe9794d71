// lib/src/metrics/trends.rs
// Time-series classification of vital-sign channels.

use chrono::{DateTime, Utc};

use models::errors::{PlannerError, PlannerResult};
use models::{AlertLevel, HealthMetric, MotherId, TrendAnalysis, TrendResult, TrendType, VitalSigns};

pub const MIN_TREND_POINTS: usize = 3;

pub const SYSTOLIC_BP: &str = "systolic_bp";
pub const DIASTOLIC_BP: &str = "diastolic_bp";
pub const WEIGHT: &str = "weight";
pub const FETAL_HEART_RATE: &str = "fetal_heart_rate";

const STABLE_PERCENT: f64 = 10.0;
const STABLE_CV: f64 = 0.10;
const FLUCTUATING_CV: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Systolic,
    Diastolic,
    Weight,
    FetalHeartRate,
}

impl Channel {
    const ALL: [Channel; 4] = [Channel::Systolic, Channel::Diastolic, Channel::Weight, Channel::FetalHeartRate];

    fn name(&self) -> &'static str {
        match self {
            Channel::Systolic => SYSTOLIC_BP,
            Channel::Diastolic => DIASTOLIC_BP,
            Channel::Weight => WEIGHT,
            Channel::FetalHeartRate => FETAL_HEART_RATE,
        }
    }

    fn value(&self, vitals: &VitalSigns) -> Option<f64> {
        match self {
            Channel::Systolic => vitals.blood_pressure.map(|bp| f64::from(bp.systolic)),
            Channel::Diastolic => vitals.blood_pressure.map(|bp| f64::from(bp.diastolic)),
            Channel::Weight => vitals.weight,
            Channel::FetalHeartRate => vitals.fetal_heart_rate,
        }
    }

    fn alert(&self, s: &ChannelStats, trend: TrendType) -> AlertLevel {
        use TrendType::*;
        match (self, trend) {
            (_, Stable) | (_, Insufficient) => AlertLevel::None,
            (_, Fluctuating) => AlertLevel::Monitor,
            (Channel::Systolic, Increasing) if s.last >= 140.0 => AlertLevel::Urgent,
            (Channel::Diastolic, Increasing) if s.last >= 90.0 => AlertLevel::Urgent,
            (Channel::Systolic | Channel::Diastolic, Increasing) if s.percent_change >= 10.0 => AlertLevel::Concern,
            (Channel::Weight, Increasing) if s.change_per_day > 0.3 => AlertLevel::Concern,
            (Channel::Weight, Decreasing) if s.percent_change < -5.0 => AlertLevel::Concern,
            (Channel::FetalHeartRate, Decreasing) if s.last < 110.0 => AlertLevel::Urgent,
            (Channel::FetalHeartRate, Increasing) if s.last > 160.0 => AlertLevel::Urgent,
            _ => AlertLevel::None,
        }
    }

    fn recommended_action(&self, alert: AlertLevel) -> Option<String> {
        let action = match (self, alert) {
            (_, AlertLevel::None) => return None,
            (_, AlertLevel::Monitor) => "Repeat the measurement at the next visit and watch for a pattern",
            (Channel::Systolic | Channel::Diastolic, AlertLevel::Urgent) => {
                "Assess for preeclampsia today and refer if blood pressure stays high"
            }
            (Channel::Systolic | Channel::Diastolic, _) => "Recheck blood pressure within 48 hours",
            (Channel::Weight, _) => "Review nutrition and check for oedema",
            (Channel::FetalHeartRate, _) => "Arrange urgent fetal monitoring",
        };
        Some(action.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelStats {
    first: f64,
    last: f64,
    percent_change: f64,
    change_per_day: f64,
    mean: f64,
    std_dev: f64,
    cv: f64,
}

fn stats(points: &[(DateTime<Utc>, f64)]) -> ChannelStats {
    let n = points.len() as f64;
    let (t0, first) = points[0];
    let (tn, last) = points[points.len() - 1];
    let days = ((tn - t0).num_seconds() as f64 / 86_400.0).max(1.0);
    let percent_change = if first == 0.0 { 0.0 } else { (last - first) / first * 100.0 };
    let mean = points.iter().map(|(_, v)| v).sum::<f64>() / n;
    let variance = points.iter().map(|(_, v)| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let cv = if mean == 0.0 { 0.0 } else { std_dev / mean.abs() };
    ChannelStats {
        first,
        last,
        percent_change,
        change_per_day: (last - first) / days,
        mean,
        std_dev,
        cv,
    }
}

/// Stable wins over fluctuating, which wins over any direction.
fn classify(s: &ChannelStats) -> TrendType {
    if s.percent_change.abs() < STABLE_PERCENT && s.cv < STABLE_CV {
        TrendType::Stable
    } else if s.cv > FLUCTUATING_CV {
        TrendType::Fluctuating
    } else if s.percent_change > 0.0 {
        TrendType::Increasing
    } else {
        TrendType::Decreasing
    }
}

fn trend_word(trend: TrendType) -> &'static str {
    match trend {
        TrendType::Increasing => "increasing",
        TrendType::Decreasing => "decreasing",
        TrendType::Stable => "stable",
        TrendType::Fluctuating => "fluctuating",
        TrendType::Insufficient => "insufficient data",
    }
}

fn channel_trend(channel: Channel, points: &[(DateTime<Utc>, f64)]) -> TrendResult {
    let s = stats(points);
    let trend = classify(&s);
    let alert_level = channel.alert(&s, trend);
    TrendResult {
        metric: channel.name().to_string(),
        trend,
        alert_level,
        first_value: s.first,
        last_value: s.last,
        percent_change: s.percent_change,
        change_per_day: s.change_per_day,
        mean: s.mean,
        std_dev: s.std_dev,
        description: format!(
            "{} {} from {:.1} to {:.1} ({:+.1}%) over {} readings",
            channel.name(),
            trend_word(trend),
            s.first,
            s.last,
            s.percent_change,
            points.len()
        ),
        recommended_action: channel.recommended_action(alert_level),
    }
}

/// Trend of every channel with at least three readings. Fails with
/// `BadRequest` when fewer than three metrics are supplied.
pub fn analyze_trends(mother_id: MotherId, metrics: &[HealthMetric]) -> PlannerResult<TrendAnalysis> {
    if metrics.len() < MIN_TREND_POINTS {
        return Err(PlannerError::BadRequest(format!(
            "trend analysis needs at least {} metrics, got {}",
            MIN_TREND_POINTS,
            metrics.len()
        )));
    }
    let mut sorted: Vec<&HealthMetric> = metrics.iter().collect();
    sorted.sort_by_key(|m| m.recorded_at);

    let trends: Vec<TrendResult> = Channel::ALL
        .iter()
        .filter_map(|channel| {
            let points: Vec<(DateTime<Utc>, f64)> = sorted
                .iter()
                .filter_map(|m| channel.value(&m.vitals).map(|v| (m.recorded_at, v)))
                .collect();
            (points.len() >= MIN_TREND_POINTS).then(|| channel_trend(*channel, &points))
        })
        .collect();

    let highest_alert = trends
        .iter()
        .map(|t| t.alert_level)
        .max()
        .unwrap_or_default();

    Ok(TrendAnalysis {
        mother_id,
        metric_count: sorted.len(),
        period_start: sorted[0].recorded_at,
        period_end: sorted[sorted.len() - 1].recorded_at,
        trends,
        highest_alert,
    })
}
