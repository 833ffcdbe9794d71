// lib/src/scheduling/reminders.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use crate::config::SchedulingConfig;
use crate::context::{Clock, RequestContext};
use crate::notifications::{NotificationError, Notifier};
use crate::storage_engine::{ClinicalStore, VisitQuery};
use models::errors::{BatchOutcome, PlannerResult};
use models::{Visit, VisitStatus};

/// Sends reminders for scheduled visits inside the look-ahead window.
pub struct ReminderProcessor {
    store: Arc<dyn ClinicalStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    window: Duration,
    batch_size: usize,
    max_attempts: u32,
}

/// Whole days between `now` and `scheduled`, rounded down.
pub fn days_until(now: DateTime<Utc>, scheduled: DateTime<Utc>) -> i64 {
    (scheduled - now).num_hours().div_euclid(24)
}

impl ReminderProcessor {
    pub fn new(
        store: Arc<dyn ClinicalStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: &SchedulingConfig,
    ) -> Self {
        ReminderProcessor {
            store,
            notifier,
            clock,
            window: Duration::hours(config.reminder_window_hours),
            batch_size: config.reminder_batch_size.max(1),
            max_attempts: config.max_send_attempts.max(1),
        }
    }

    /// Sends one reminder, retrying transient failures. The outer result is
    /// `Cancelled` when the request ends mid-send; the inner one is the
    /// delivery outcome.
    async fn send_with_retry(
        &self,
        ctx: &RequestContext,
        visit: &Visit,
        days: i64,
    ) -> PlannerResult<Result<(), NotificationError>> {
        let mut attempt = 1;
        loop {
            let sent = ctx
                .run(async { Ok(self.notifier.send_visit_reminder(visit, &visit.mother_id, days).await) })
                .await?;
            match sent {
                Ok(()) => return Ok(Ok(())),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    debug!("Retrying reminder for visit {} after attempt {}: {}", visit.id, attempt, e);
                    attempt += 1;
                }
                Err(e) => return Ok(Err(e)),
            }
        }
    }

    /// One pass over `[now, now + window]`. Every visit is attempted; any
    /// failed send turns the result into `PartialFailure`.
    #[instrument(skip(self, ctx))]
    pub async fn process_reminders(&self, ctx: &RequestContext) -> PlannerResult<BatchOutcome> {
        let now = self.clock.now();
        // `between` is half-open; nudge the end so the window edge is included.
        let end = now + self.window + Duration::nanoseconds(1);
        let mut outcome = BatchOutcome::new();
        let mut offset = 0;

        loop {
            ctx.ensure_active()?;
            let query = VisitQuery::new()
                .status(VisitStatus::Scheduled)
                .between(Some(now), Some(end))
                .page(Some(self.batch_size), offset);
            let batch = ctx.run(self.store.list_visits(&query)).await?;
            debug!("Reminder batch at offset {} has {} visits", offset, batch.len());

            for visit in &batch {
                ctx.ensure_active()?;
                let days = days_until(now, visit.scheduled_time);
                match self.send_with_retry(ctx, visit, days).await? {
                    Ok(()) => outcome.record_success(),
                    Err(e) => {
                        warn!("Reminder for visit {} failed: {}", visit.id, e);
                        outcome.record_failure(visit.id, e.to_string());
                    }
                }
            }

            if batch.len() < self.batch_size {
                break;
            }
            offset += batch.len();
        }

        ctx.ensure_active()?;
        info!("Reminder pass finished: {}", outcome);
        outcome.into_result()
    }
}
