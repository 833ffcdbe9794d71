// server/src/cli/handlers.rs

// One handler per subcommand. Results are printed as pretty JSON on stdout.

use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use super::app::PlannerApp;
use super::commands::DEFAULT_REMINDER_INTERVAL_SECS;
use models::errors::{BatchOutcome, PlannerError, PlannerResult};
use models::{FacilityId, MotherId, UserId};
use planner::config::PlannerConfig;
use planner::routing::TransportMode;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Logs a batch result. Partial failures are reported and tolerated.
fn report_batch(label: &str, result: PlannerResult<BatchOutcome>) -> Result<BatchOutcome> {
    match result {
        Ok(outcome) => {
            info!("{}: {}", label, outcome);
            Ok(outcome)
        }
        Err(PlannerError::PartialFailure(outcome)) => {
            for failure in &outcome.failed {
                warn!("{}: {} failed: {}", label, failure.id, failure.reason);
            }
            warn!("{}: {}", label, outcome);
            Ok(outcome)
        }
        Err(e) => Err(e.into()),
    }
}

async fn reminder_pass(app: &PlannerApp) -> Result<()> {
    let ctx = app.request_context();
    report_batch("reminders", app.reminders.process_reminders(&ctx).await)?;
    let ctx = app.request_context();
    report_batch("no-show sweep", app.scheduler.mark_overdue_no_shows(&ctx).await)?;
    Ok(())
}

pub async fn handle_reminders(app: &PlannerApp, once: bool, interval_secs: Option<u64>) -> Result<()> {
    if once {
        return reminder_pass(app).await;
    }
    let period = Duration::from_secs(interval_secs.unwrap_or(DEFAULT_REMINDER_INTERVAL_SECS).max(1));
    info!("Running reminder loop every {:?}", period);
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = reminder_pass(app).await {
                    error!("Reminder pass failed: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping reminder loop");
                return Ok(());
            }
        }
    }
}

pub async fn handle_risk(app: &PlannerApp, mother: MotherId) -> Result<()> {
    let assessment = app.risk.assess_mother(&app.request_context(), mother).await?;
    print_json(&assessment)
}

pub async fn handle_route(app: &PlannerApp, chw: UserId, date: NaiveDate, mode: TransportMode) -> Result<()> {
    let plan = app
        .assigner
        .optimize_daily_route(&app.request_context(), chw, date, mode)
        .await?;
    print_json(&plan)
}

pub async fn handle_slots(app: &PlannerApp, facility: FacilityId, date: NaiveDate, duration: Option<u32>) -> Result<()> {
    let slots = app
        .scheduler
        .find_available_slots(&app.request_context(), facility, date, duration)
        .await?;
    let local: Vec<String> = slots
        .iter()
        .map(|s| s.with_timezone(&app.local_offset).format("%Y-%m-%dT%H:%M%:z").to_string())
        .collect();
    print_json(&local)
}

pub async fn handle_balance(app: &PlannerApp, facility: FacilityId, date: NaiveDate) -> Result<()> {
    match app.assigner.balance(&app.request_context(), facility, date).await {
        Ok(report) => print_json(&report),
        Err(PlannerError::PartialFailure(outcome)) => {
            print_json(&outcome)?;
            Err(anyhow!("balancing left {} visits over capacity", outcome.failed.len()))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn handle_check_config(config: &PlannerConfig) -> Result<()> {
    config.validate()?;
    println!("{:#?}", config);
    println!("Configuration is valid.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failures_are_tolerated() {
        let mut outcome = BatchOutcome::new();
        outcome.record_success();
        outcome.record_failure("v-1", "unknown device");
        let reported = report_batch("reminders", Err(PlannerError::PartialFailure(outcome.clone()))).unwrap();
        assert_eq!(reported, outcome);

        let err = report_batch("reminders", Err(PlannerError::StorageError("down".into())));
        assert!(err.is_err());
    }
}
