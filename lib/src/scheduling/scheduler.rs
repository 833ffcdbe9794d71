// lib/src/scheduling/scheduler.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::{debug, info, instrument, warn};

use super::pregnancy::PregnancyDates;
use crate::config::SchedulingConfig;
use crate::context::{Clock, RequestContext};
use crate::storage_engine::{ClinicalStore, SortOrder, VisitQuery};
use models::errors::{BatchOutcome, PlannerError, PlannerResult};
use models::{FacilityId, HealthcareFacility, Mother, MotherId, Visit, VisitId, VisitStatus, VisitTransition, VisitType};

/// Earliest gestational week the automatic plan is generated for.
pub const MIN_PLANNING_WEEK: i64 = 8;
/// Local hour of day every generated visit is booked at.
pub const TEMPLATE_VISIT_HOUR: u32 = 10;
/// Lead time before the first bookable slot on the current day.
pub const SAME_DAY_LEAD_MINUTES: i64 = 60;

/// Antenatal contact weeks and the focus of each visit.
pub const ANTENATAL_TEMPLATE: &[(i64, &str)] = &[
    (12, "Week 12: booking visit, dating scan and first trimester screening"),
    (20, "Week 20: anatomy scan and fundal height"),
    (26, "Week 26: glucose screening and anemia check"),
    (30, "Week 30: growth, blood pressure and fetal movement review"),
    (34, "Week 34: birth preparedness plan"),
    (36, "Week 36: presentation check"),
    (38, "Week 38: pre-delivery assessment"),
    (40, "Week 40: due date review"),
];

pub struct VisitScheduler {
    store: Arc<dyn ClinicalStore>,
    clock: Arc<dyn Clock>,
    config: SchedulingConfig,
    offset: FixedOffset,
}

/// Local `date` at `hour:00` as a UTC instant. Hour 24 is the next midnight.
pub fn local_instant(offset: FixedOffset, date: NaiveDate, hour: u32) -> PlannerResult<DateTime<Utc>> {
    let midnight = offset
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()
        .ok_or_else(|| PlannerError::InternalError(format!("ambiguous local midnight on {}", date)))?;
    Ok(midnight.with_timezone(&Utc) + Duration::hours(i64::from(hour)))
}

/// `[start, end)` of the local calendar day `date`.
pub fn local_day_bounds(offset: FixedOffset, date: NaiveDate) -> PlannerResult<(DateTime<Utc>, DateTime<Utc>)> {
    let start = local_instant(offset, date, 0)?;
    Ok((start, start + Duration::days(1)))
}

/// Applies `transition` to `visit` or explains why the move is not allowed.
fn apply(visit: &mut Visit, transition: VisitTransition, now: DateTime<Utc>) -> PlannerResult<()> {
    let target = transition.target(visit.status).ok_or_else(|| {
        PlannerError::BadRequest(format!(
            "cannot {} visit {} in status {}",
            transition, visit.id, visit.status
        ))
    })?;
    visit.status = target;
    visit.updated_at = now;
    Ok(())
}

impl VisitScheduler {
    pub fn new(store: Arc<dyn ClinicalStore>, clock: Arc<dyn Clock>, config: SchedulingConfig) -> PlannerResult<Self> {
        config.validate()?;
        let offset = config.local_offset()?;
        Ok(VisitScheduler {
            store,
            clock,
            config,
            offset,
        })
    }

    fn local_instant(&self, date: NaiveDate, hour: u32) -> PlannerResult<DateTime<Utc>> {
        local_instant(self.offset, date, hour)
    }

    fn day_bounds(&self, date: NaiveDate) -> PlannerResult<(DateTime<Utc>, DateTime<Utc>)> {
        local_day_bounds(self.offset, date)
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    async fn load_mother(&self, ctx: &RequestContext, id: MotherId) -> PlannerResult<Mother> {
        ctx.run(self.store.get_mother(&id))
            .await?
            .ok_or_else(|| PlannerError::not_found("mother", id))
    }

    async fn load_facility(&self, ctx: &RequestContext, id: FacilityId) -> PlannerResult<HealthcareFacility> {
        ctx.run(self.store.get_facility(&id))
            .await?
            .ok_or_else(|| PlannerError::not_found("facility", id))
    }

    pub async fn get_visit(&self, ctx: &RequestContext, id: VisitId) -> PlannerResult<Visit> {
        ctx.run(self.store.get_visit(&id))
            .await?
            .ok_or_else(|| PlannerError::not_found("visit", id))
    }

    #[instrument(skip(self, ctx, notes))]
    pub async fn schedule(
        &self,
        ctx: &RequestContext,
        mother_id: MotherId,
        facility_id: FacilityId,
        time: DateTime<Utc>,
        visit_type: VisitType,
        notes: Option<String>,
    ) -> PlannerResult<Visit> {
        let now = self.clock.now();
        if time <= now {
            return Err(PlannerError::BadRequest(format!("visit time {} is not in the future", time)));
        }
        self.load_mother(ctx, mother_id).await?;
        self.load_facility(ctx, facility_id).await?;

        let visit = Visit::new(mother_id, facility_id, time, visit_type, notes, now);
        ctx.ensure_active()?;
        ctx.run(self.store.create_visit(&visit)).await?;
        info!("Scheduled visit {} for mother {} at {}", visit.id, mother_id, time);
        Ok(visit)
    }

    /// Loads, mutates and stores one visit inside a store transaction.
    async fn update_in_transaction<F>(&self, ctx: &RequestContext, visit_id: VisitId, mutate: F) -> PlannerResult<Visit>
    where
        F: FnOnce(&mut Visit, DateTime<Utc>) -> PlannerResult<()> + Send,
    {
        let tx = ctx.run(self.store.begin_transaction()).await?;
        let result = async {
            let mut visit = self.get_visit(ctx, visit_id).await?;
            mutate(&mut visit, self.clock.now())?;
            ctx.ensure_active()?;
            ctx.run(self.store.update_visit(&visit)).await?;
            Ok(visit)
        }
        .await;
        match result {
            Ok(visit) => {
                tx.commit().await?;
                Ok(visit)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Moves a scheduled or cancelled visit to `new_time`, keeping its identity.
    #[instrument(skip(self, ctx))]
    pub async fn reschedule(&self, ctx: &RequestContext, visit_id: VisitId, new_time: DateTime<Utc>) -> PlannerResult<Visit> {
        let visit = self
            .update_in_transaction(ctx, visit_id, |visit, now| {
                if new_time <= now {
                    return Err(PlannerError::BadRequest(format!(
                        "new visit time {} is not in the future",
                        new_time
                    )));
                }
                apply(visit, VisitTransition::Reschedule, now)?;
                visit.scheduled_time = new_time;
                Ok(())
            })
            .await?;
        info!("Rescheduled visit {} to {}", visit_id, new_time);
        Ok(visit)
    }

    #[instrument(skip(self, ctx, reason))]
    pub async fn cancel(&self, ctx: &RequestContext, visit_id: VisitId, reason: Option<String>) -> PlannerResult<Visit> {
        self.update_in_transaction(ctx, visit_id, |visit, now| {
            apply(visit, VisitTransition::Cancel, now)?;
            if let Some(reason) = reason {
                visit.notes = Some(match visit.notes.take() {
                    Some(existing) => format!("{}\nCancelled: {}", existing, reason),
                    None => format!("Cancelled: {}", reason),
                });
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    pub async fn check_in(&self, ctx: &RequestContext, visit_id: VisitId) -> PlannerResult<Visit> {
        self.update_in_transaction(ctx, visit_id, |visit, now| {
            apply(visit, VisitTransition::CheckIn, now)?;
            visit.check_in_time = Some(now);
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx, notes))]
    pub async fn check_out(&self, ctx: &RequestContext, visit_id: VisitId, notes: Option<String>) -> PlannerResult<Visit> {
        self.update_in_transaction(ctx, visit_id, |visit, now| {
            apply(visit, VisitTransition::CheckOut, now)?;
            visit.check_out_time = Some(now);
            if notes.is_some() {
                visit.notes = notes;
            }
            Ok(())
        })
        .await
    }

    /// Marks a scheduled visit as missed once its no-show window has passed.
    #[instrument(skip(self, ctx))]
    pub async fn mark_no_show(&self, ctx: &RequestContext, visit_id: VisitId) -> PlannerResult<Visit> {
        let window = Duration::minutes(self.config.no_show_window_minutes);
        self.update_in_transaction(ctx, visit_id, |visit, now| {
            if now < visit.scheduled_time + window {
                return Err(PlannerError::BadRequest(format!(
                    "visit {} is still within its no-show window",
                    visit.id
                )));
            }
            apply(visit, VisitTransition::MarkNoShow, now)
        })
        .await
    }

    /// Marks every scheduled visit whose no-show window has passed.
    #[instrument(skip(self, ctx))]
    pub async fn mark_overdue_no_shows(&self, ctx: &RequestContext) -> PlannerResult<BatchOutcome> {
        let cutoff = self.clock.now() - Duration::minutes(self.config.no_show_window_minutes);
        let batch_size = self.config.reminder_batch_size;
        let mut outcome = BatchOutcome::new();
        loop {
            ctx.ensure_active()?;
            // Marked visits drop out of the query; failed ones sort first and are skipped.
            let query = VisitQuery::new()
                .status(VisitStatus::Scheduled)
                .between(None, Some(cutoff))
                .page(Some(batch_size), outcome.failed.len());
            let batch = ctx.run(self.store.list_visits(&query)).await?;
            for visit in &batch {
                match self.mark_no_show(ctx, visit.id).await {
                    Ok(_) => outcome.record_success(),
                    Err(e @ PlannerError::Cancelled(_)) => return Err(e),
                    Err(e) => outcome.record_failure(visit.id, e.to_string()),
                }
            }
            if batch.len() < batch_size {
                break;
            }
        }
        if outcome.succeeded > 0 {
            info!("Marked {} visits as no-show", outcome.succeeded);
        }
        outcome.into_result()
    }

    /// Scheduled visits from now on, soonest first.
    pub async fn upcoming(&self, ctx: &RequestContext, mother_id: MotherId, limit: usize) -> PlannerResult<Vec<Visit>> {
        let query = VisitQuery::new()
            .mother(mother_id)
            .status(VisitStatus::Scheduled)
            .between(Some(self.clock.now()), None)
            .page(Some(limit), 0);
        ctx.run(self.store.list_visits(&query)).await
    }

    /// Visits scheduled before now, most recent first.
    pub async fn history(
        &self,
        ctx: &RequestContext,
        mother_id: MotherId,
        limit: usize,
        offset: usize,
    ) -> PlannerResult<Vec<Visit>> {
        let query = VisitQuery::new()
            .mother(mother_id)
            .between(None, Some(self.clock.now()))
            .order(SortOrder::Descending)
            .page(Some(limit), offset);
        ctx.run(self.store.list_visits(&query)).await
    }

    /// Visits on the local calendar day `date`.
    pub async fn visits_by_date(
        &self,
        ctx: &RequestContext,
        date: NaiveDate,
        facility_id: Option<FacilityId>,
        status: Option<VisitStatus>,
    ) -> PlannerResult<Vec<Visit>> {
        let (start, end) = self.day_bounds(date)?;
        let mut query = VisitQuery::new().between(Some(start), Some(end));
        if let Some(facility_id) = facility_id {
            query = query.facility(facility_id);
        }
        if let Some(status) = status {
            query = query.status(status);
        }
        ctx.run(self.store.list_visits(&query)).await
    }

    /// Free slot start times on `date` within the facility's hours. Today's
    /// slots begin an hour from now, aligned to the slot grid.
    #[instrument(skip(self, ctx))]
    pub async fn find_available_slots(
        &self,
        ctx: &RequestContext,
        facility_id: FacilityId,
        date: NaiveDate,
        duration_minutes: Option<u32>,
    ) -> PlannerResult<Vec<DateTime<Utc>>> {
        let duration = i64::from(duration_minutes.unwrap_or(self.config.default_slot_minutes));
        if duration <= 0 {
            return Err(PlannerError::BadRequest("slot duration must be positive".to_string()));
        }
        let now = self.clock.now();
        let today = self.local_date(now);
        if date < today {
            return Err(PlannerError::BadRequest(format!("date {} is in the past", date)));
        }

        let facility = self.load_facility(ctx, facility_id).await?;
        let Some((open_hour, close_hour)) = facility.hours_on_or(date.weekday(), self.config.default_hours()) else {
            debug!("Facility {} is closed on {}", facility_id, date);
            return Ok(Vec::new());
        };
        let opening = self.local_instant(date, open_hour)?;
        let closing = self.local_instant(date, close_hour)?;
        let step = Duration::minutes(duration);

        let mut start = opening;
        if date == today {
            let earliest = now + Duration::minutes(SAME_DAY_LEAD_MINUTES);
            while start < earliest {
                start += step;
            }
        }

        let occupied: BTreeSet<DateTime<Utc>> = self
            .visits_by_date(ctx, date, Some(facility_id), None)
            .await?
            .into_iter()
            .filter(|v| !matches!(v.status, VisitStatus::Cancelled | VisitStatus::NoShow))
            .map(|v| v.scheduled_time)
            .collect();

        let mut slots = Vec::new();
        let mut slot = start;
        while slot + step <= closing {
            if !occupied.contains(&slot) {
                slots.push(slot);
            }
            slot += step;
        }
        Ok(slots)
    }

    /// Books the antenatal template weeks still ahead of the mother that
    /// have no visit yet. Returns only the visits created.
    #[instrument(skip(self, ctx))]
    pub async fn generate_automatic(
        &self,
        ctx: &RequestContext,
        mother_id: MotherId,
        facility_id: FacilityId,
    ) -> PlannerResult<Vec<Visit>> {
        let mother = self.load_mother(ctx, mother_id).await?;
        self.load_facility(ctx, facility_id).await?;
        let lmp = mother
            .lmp
            .ok_or_else(|| PlannerError::BadRequest(format!("mother {} has no LMP recorded", mother_id)))?;

        let now = self.clock.now();
        let today = self.local_date(now);
        let dates = PregnancyDates::from_lmp(lmp, today);
        if dates.is_past_due(today) {
            return Err(PlannerError::BadRequest(format!(
                "expected delivery date {} has passed",
                dates.due_date
            )));
        }
        if dates.weeks < MIN_PLANNING_WEEK {
            return Err(PlannerError::BadRequest(format!(
                "pregnancy is at week {}, plans start at week {}",
                dates.weeks, MIN_PLANNING_WEEK
            )));
        }

        let existing = ctx
            .run(self.store.list_visits(&VisitQuery::new().mother(mother_id)))
            .await?;
        let booked_weeks: BTreeSet<i64> = existing
            .iter()
            .filter(|v| v.status != VisitStatus::Cancelled)
            .map(|v| (self.local_date(v.scheduled_time) - lmp).num_days().div_euclid(7))
            .collect();

        let mut planned = Vec::new();
        for &(week, note) in ANTENATAL_TEMPLATE {
            if week < dates.weeks || booked_weeks.contains(&week) {
                continue;
            }
            let target = self.local_instant(lmp + Duration::days(week * 7), TEMPLATE_VISIT_HOUR)?;
            if target <= now {
                continue;
            }
            planned.push(Visit::new(
                mother_id,
                facility_id,
                target,
                VisitType::Routine,
                Some(note.to_string()),
                now,
            ));
        }

        if planned.is_empty() {
            warn!("No visits left to generate for mother {}", mother_id);
            return Ok(planned);
        }
        ctx.ensure_active()?;
        ctx.run(self.store.create_visits(&planned)).await?;
        info!(
            "Generated {} visits for mother {} (week {}, due {})",
            planned.len(),
            mother_id,
            dates.weeks,
            dates.due_date
        );
        Ok(planned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedClock;
    use crate::storage_engine::InMemoryStore;
    use chrono::Timelike;
    use models::{Coordinates, ErrorCategory, FacilityType, OperatingHours, UserId};

    struct Fixture {
        scheduler: VisitScheduler,
        store: Arc<InMemoryStore>,
        clock: FixedClock,
        mother: Mother,
        facility: HealthcareFacility,
    }

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    // Wednesday 2024-05-15 09:00 local (06:00 UTC)
    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 6, 0, 0).unwrap()
    }

    async fn fixture() -> Fixture {
        let now = start();
        let store = Arc::new(InMemoryStore::new());
        let mother = Mother::new(UserId::new(), now);
        let facility = HealthcareFacility {
            id: FacilityId::new(),
            name: "Migori Health Centre".to_string(),
            district: "Migori".to_string(),
            address: String::new(),
            location: Coordinates::new(-1.06, 34.47),
            facility_type: FacilityType::HealthCenter,
            capacity: 20,
            opening_hour: None,
            closing_hour: None,
            services: Default::default(),
            operating_hours: OperatingHours::default(),
            created_at: now,
            updated_at: now,
        };
        store.insert_mother(mother.clone()).await;
        store.insert_facility(facility.clone()).await;
        let clock = FixedClock::new(now);
        let config = SchedulingConfig {
            utc_offset_minutes: 180,
            ..Default::default()
        };
        let scheduler = VisitScheduler::new(store.clone(), Arc::new(clock.clone()), config).unwrap();
        Fixture {
            scheduler,
            store,
            clock,
            mother,
            facility,
        }
    }

    #[tokio::test]
    async fn schedule_requires_future_time_and_known_entities() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let past = start() - Duration::hours(1);
        let err = f
            .scheduler
            .schedule(&ctx, f.mother.id, f.facility.id, past, VisitType::Routine, None)
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadRequest);

        let later = start() + Duration::days(1);
        let err = f
            .scheduler
            .schedule(&ctx, MotherId::new(), f.facility.id, later, VisitType::Routine, None)
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);

        let visit = f
            .scheduler
            .schedule(&ctx, f.mother.id, f.facility.id, later, VisitType::FollowUp, Some("bp".into()))
            .await
            .unwrap();
        assert_eq!(visit.status, VisitStatus::Scheduled);
        assert_eq!(f.scheduler.get_visit(&ctx, visit.id).await.unwrap(), visit);
    }

    #[tokio::test]
    async fn cancel_then_reschedule_round_trip() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let visit = f
            .scheduler
            .schedule(&ctx, f.mother.id, f.facility.id, start() + Duration::days(2), VisitType::Routine, None)
            .await
            .unwrap();

        let cancelled = f.scheduler.cancel(&ctx, visit.id, Some("travelling".into())).await.unwrap();
        assert_eq!(cancelled.status, VisitStatus::Cancelled);
        assert_eq!(cancelled.notes.as_deref(), Some("Cancelled: travelling"));

        let new_time = start() + Duration::days(5);
        let rescheduled = f.scheduler.reschedule(&ctx, visit.id, new_time).await.unwrap();
        assert_eq!(rescheduled.status, VisitStatus::Scheduled);
        assert_eq!(rescheduled.scheduled_time, new_time);
        assert_eq!(rescheduled.id, visit.id);
        assert_eq!(rescheduled.mother_id, visit.mother_id);
        assert_eq!(rescheduled.facility_id, visit.facility_id);

        let err = f.scheduler.reschedule(&ctx, visit.id, start()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadRequest);
    }

    #[tokio::test]
    async fn completed_visits_cannot_move() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let visit = f
            .scheduler
            .schedule(&ctx, f.mother.id, f.facility.id, start() + Duration::hours(2), VisitType::Routine, None)
            .await
            .unwrap();
        f.clock.advance(Duration::hours(2));
        let in_progress = f.scheduler.check_in(&ctx, visit.id).await.unwrap();
        assert_eq!(in_progress.check_in_time, Some(f.clock.now()));
        assert!(f.scheduler.cancel(&ctx, visit.id, None).await.is_err());

        f.clock.advance(Duration::minutes(40));
        let done = f.scheduler.check_out(&ctx, visit.id, Some("all well".into())).await.unwrap();
        assert_eq!(done.status, VisitStatus::Completed);

        for result in [
            f.scheduler.reschedule(&ctx, visit.id, start() + Duration::days(3)).await,
            f.scheduler.cancel(&ctx, visit.id, None).await,
            f.scheduler.check_in(&ctx, visit.id).await,
        ] {
            assert_eq!(result.unwrap_err().category(), ErrorCategory::BadRequest);
        }
        let stored = f.store.get_visit(&visit.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VisitStatus::Completed);
    }

    #[tokio::test]
    async fn no_show_only_after_window() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let visit = f
            .scheduler
            .schedule(&ctx, f.mother.id, f.facility.id, start() + Duration::hours(1), VisitType::Routine, None)
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(90));
        assert!(f.scheduler.mark_no_show(&ctx, visit.id).await.is_err());

        f.clock.advance(Duration::minutes(31));
        let outcome = f.scheduler.mark_overdue_no_shows(&ctx).await.unwrap();
        assert_eq!(outcome.succeeded, 1);
        let stored = f.scheduler.get_visit(&ctx, visit.id).await.unwrap();
        assert_eq!(stored.status, VisitStatus::NoShow);
    }

    #[tokio::test]
    async fn upcoming_and_history_ordering() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let mut times = Vec::new();
        for days in [3, 1, 2] {
            let t = start() + Duration::days(days);
            f.scheduler
                .schedule(&ctx, f.mother.id, f.facility.id, t, VisitType::Routine, None)
                .await
                .unwrap();
            times.push(t);
        }
        let upcoming = f.scheduler.upcoming(&ctx, f.mother.id, 2).await.unwrap();
        let got: Vec<_> = upcoming.iter().map(|v| v.scheduled_time).collect();
        assert_eq!(got, vec![start() + Duration::days(1), start() + Duration::days(2)]);

        f.clock.set(start() + Duration::days(10));
        let history = f.scheduler.history(&ctx, f.mother.id, 10, 0).await.unwrap();
        let got: Vec<_> = history.iter().map(|v| v.scheduled_time).collect();
        assert_eq!(got, vec![times[0], times[2], times[1]]);
    }

    #[tokio::test]
    async fn slots_respect_hours_bookings_and_lead_time() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 5, 16).unwrap();
        let booked = offset().with_ymd_and_hms(2024, 5, 16, 9, 0, 0).unwrap().with_timezone(&Utc);
        f.scheduler
            .schedule(&ctx, f.mother.id, f.facility.id, booked, VisitType::Routine, None)
            .await
            .unwrap();

        let slots = f
            .scheduler
            .find_available_slots(&ctx, f.facility.id, tomorrow, None)
            .await
            .unwrap();
        // 08:00..17:00 in 30 minute steps, minus the 09:00 booking
        assert_eq!(slots.len(), 17);
        assert!(!slots.contains(&booked));
        assert_eq!(slots[0].with_timezone(&offset()).hour(), 8);
        let last = slots.last().unwrap().with_timezone(&offset());
        assert_eq!((last.hour(), last.minute()), (16, 30));

        // Today at 09:00 local: first slot is 10:00
        let today = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        let slots = f.scheduler.find_available_slots(&ctx, f.facility.id, today, Some(60)).await.unwrap();
        assert_eq!(slots[0].with_timezone(&offset()).hour(), 10);
        assert_eq!(slots.len(), 7);

        let yesterday = NaiveDate::from_ymd_opt(2024, 5, 14).unwrap();
        let err = f
            .scheduler
            .find_available_slots(&ctx, f.facility.id, yesterday, None)
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadRequest);
    }

    #[tokio::test]
    async fn cancelled_bookings_free_their_slot() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 5, 16).unwrap();
        let booked = offset().with_ymd_and_hms(2024, 5, 16, 8, 0, 0).unwrap().with_timezone(&Utc);
        let visit = f
            .scheduler
            .schedule(&ctx, f.mother.id, f.facility.id, booked, VisitType::Routine, None)
            .await
            .unwrap();
        f.scheduler.cancel(&ctx, visit.id, None).await.unwrap();
        let slots = f.scheduler.find_available_slots(&ctx, f.facility.id, tomorrow, None).await.unwrap();
        assert_eq!(slots[0], booked);
    }

    #[tokio::test]
    async fn automatic_schedule_skips_booked_and_past_weeks() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let today = f.scheduler.local_date(start());
        let lmp = today - Duration::days(70);
        let mut mother = f.mother.clone();
        mother.lmp = Some(lmp);
        f.store.update_mother(&mother).await.unwrap();

        let week12 = offset()
            .from_local_datetime(&(lmp + Duration::days(12 * 7)).and_hms_opt(14, 0, 0).unwrap())
            .unwrap()
            .with_timezone(&Utc);
        f.scheduler
            .schedule(&ctx, mother.id, f.facility.id, week12, VisitType::Routine, None)
            .await
            .unwrap();

        let generated = f.scheduler.generate_automatic(&ctx, mother.id, f.facility.id).await.unwrap();
        let weeks: Vec<i64> = generated
            .iter()
            .map(|v| (f.scheduler.local_date(v.scheduled_time) - lmp).num_days() / 7)
            .collect();
        assert_eq!(weeks, vec![20, 26, 30, 34, 36, 38, 40]);
        for visit in &generated {
            let local = visit.scheduled_time.with_timezone(&offset());
            assert_eq!((local.hour(), local.minute()), (10, 0));
            assert_eq!(visit.visit_type, VisitType::Routine);
            assert!(visit.notes.is_some());
        }

        let again = f.scheduler.generate_automatic(&ctx, mother.id, f.facility.id).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn automatic_schedule_rejects_early_or_overdue_pregnancies() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let today = f.scheduler.local_date(start());
        let mut mother = f.mother.clone();

        let err = f.scheduler.generate_automatic(&ctx, mother.id, f.facility.id).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadRequest);

        mother.lmp = Some(today - Duration::days(30));
        f.store.update_mother(&mother).await.unwrap();
        let err = f.scheduler.generate_automatic(&ctx, mother.id, f.facility.id).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadRequest);

        mother.lmp = Some(today - Duration::days(290));
        f.store.update_mother(&mother).await.unwrap();
        let err = f.scheduler.generate_automatic(&ctx, mother.id, f.facility.id).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadRequest);
    }

    #[tokio::test]
    async fn automatic_schedule_writes_nothing_once_cancelled() {
        let f = fixture().await;
        let mut mother = f.mother.clone();
        mother.lmp = Some(f.scheduler.local_date(start()) - Duration::days(70));
        f.store.update_mother(&mother).await.unwrap();

        let expired = RequestContext::with_timeout(std::time::Duration::ZERO);
        let err = f
            .scheduler
            .generate_automatic(&expired, mother.id, f.facility.id)
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Cancelled);

        let (ctx, handle) = RequestContext::cancellable();
        handle.cancel();
        let err = f.scheduler.generate_automatic(&ctx, mother.id, f.facility.id).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Cancelled);

        let stored = f
            .store
            .list_visits(&VisitQuery::new().mother(mother.id))
            .await
            .unwrap();
        assert!(stored.is_empty());
    }
}
