// lib/src/assignment/assigner.rs

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use crate::config::SchedulingConfig;
use crate::context::{Clock, RequestContext};
use crate::identity::{require_chw, IdentityProvider};
use crate::scheduling::local_day_bounds;
use crate::storage_engine::{ChwFilter, ClinicalStore, VisitQuery};
use models::errors::{PlannerError, PlannerResult};
use models::{FacilityId, Role, User, UserId, Visit, VisitId, VisitStatus};

/// Connects CHWs to visits: direct assignment, catchment matching,
/// load balancing and daily route planning.
pub struct VisitAssigner {
    pub(super) store: Arc<dyn ClinicalStore>,
    pub(super) identity: Arc<dyn IdentityProvider>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: SchedulingConfig,
    pub(super) offset: FixedOffset,
}

/// A planned CHW change for one visit. `from` is the CHW the visit had
/// when it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ChwMove {
    pub visit_id: VisitId,
    pub from: Option<UserId>,
    pub to: UserId,
}

fn same_area(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

impl VisitAssigner {
    pub fn new(
        store: Arc<dyn ClinicalStore>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        config: SchedulingConfig,
    ) -> PlannerResult<Self> {
        config.validate()?;
        let offset = config.local_offset()?;
        Ok(VisitAssigner {
            store,
            identity,
            clock,
            config,
            offset,
        })
    }

    pub(super) fn day_bounds(&self, date: NaiveDate) -> PlannerResult<(DateTime<Utc>, DateTime<Utc>)> {
        local_day_bounds(self.offset, date)
    }

    pub(super) async fn load_visit(&self, ctx: &RequestContext, id: VisitId) -> PlannerResult<Visit> {
        ctx.run(self.store.get_visit(&id))
            .await?
            .ok_or_else(|| PlannerError::not_found("visit", id))
    }

    /// Runs `work` between `begin_transaction` and commit, rolling back on error.
    pub(super) async fn in_transaction<T, Fut>(&self, ctx: &RequestContext, work: Fut) -> PlannerResult<T>
    where
        Fut: std::future::Future<Output = PlannerResult<T>>,
    {
        let tx = ctx.run(self.store.begin_transaction()).await?;
        match work.await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Applies `moves` in one transaction against freshly read visits. A
    /// visit is left alone unless it is still scheduled inside
    /// `[start, end)` and still held by its `from` CHW; only `chw_id` and
    /// `updated_at` are written. Returns the ids that moved.
    pub(super) async fn apply_chw_moves(
        &self,
        ctx: &RequestContext,
        moves: &[ChwMove],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PlannerResult<Vec<VisitId>> {
        if moves.is_empty() {
            return Ok(Vec::new());
        }
        ctx.ensure_active()?;
        self.in_transaction(ctx, async {
            let now = self.clock.now();
            let mut fresh = Vec::with_capacity(moves.len());
            for planned in moves {
                let Some(mut visit) = ctx.run(self.store.get_visit(&planned.visit_id)).await? else {
                    debug!("Visit {} disappeared before reassignment", planned.visit_id);
                    continue;
                };
                let in_range = visit.scheduled_time >= start && visit.scheduled_time < end;
                if visit.status != VisitStatus::Scheduled || visit.chw_id != planned.from || !in_range {
                    debug!("Visit {} changed since it was read, leaving it as is", visit.id);
                    continue;
                }
                visit.chw_id = Some(planned.to);
                visit.updated_at = now;
                fresh.push(visit);
            }
            if !fresh.is_empty() {
                ctx.ensure_active()?;
                ctx.run(self.store.update_visits(&fresh)).await?;
            }
            Ok(fresh.iter().map(|v| v.id).collect())
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    pub async fn assign_chw(&self, ctx: &RequestContext, visit_id: VisitId, chw_id: UserId) -> PlannerResult<Visit> {
        let chw = ctx.run(require_chw(self.identity.as_ref(), &chw_id)).await?;
        let visit = self
            .in_transaction(ctx, async {
                let mut visit = self.load_visit(ctx, visit_id).await?;
                if visit.status.is_terminal() || visit.status == VisitStatus::Cancelled {
                    return Err(PlannerError::BadRequest(format!(
                        "cannot assign a CHW to {} visit {}",
                        visit.status, visit.id
                    )));
                }
                visit.chw_id = Some(chw.id);
                visit.updated_at = self.clock.now();
                ctx.ensure_active()?;
                ctx.run(self.store.update_visit(&visit)).await?;
                Ok(visit)
            })
            .await?;
        info!("Assigned CHW {} ({}) to visit {}", chw.display_name, chw.id, visit_id);
        Ok(visit)
    }

    #[instrument(skip(self, ctx))]
    pub async fn unassign_chw(&self, ctx: &RequestContext, visit_id: VisitId) -> PlannerResult<Visit> {
        self.in_transaction(ctx, async {
            let mut visit = self.load_visit(ctx, visit_id).await?;
            if visit.status.is_terminal() {
                return Err(PlannerError::BadRequest(format!(
                    "cannot unassign {} visit {}",
                    visit.status, visit.id
                )));
            }
            let Some(previous) = visit.chw_id.take() else {
                return Err(PlannerError::BadRequest(format!("visit {} has no CHW assigned", visit.id)));
            };
            visit.updated_at = self.clock.now();
            ctx.ensure_active()?;
            ctx.run(self.store.update_visit(&visit)).await?;
            debug!("Unassigned CHW {} from visit {}", previous, visit.id);
            Ok(visit)
        })
        .await
    }

    /// The CHW's visits in `[start, end)`, earliest first.
    pub async fn workload(
        &self,
        ctx: &RequestContext,
        chw_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PlannerResult<Vec<Visit>> {
        if end <= start {
            return Err(PlannerError::BadRequest("workload range is empty".to_string()));
        }
        let query = VisitQuery::new()
            .chw(ChwFilter::Assigned(chw_id))
            .between(Some(start), Some(end));
        ctx.run(self.store.list_visits(&query)).await
    }

    /// Assigns every unassigned scheduled visit of the facility in
    /// `[start, end)` to the first CHW serving the mother's catchment area.
    /// Returns how many visits were assigned.
    #[instrument(skip(self, ctx))]
    pub async fn assign_by_catchment(
        &self,
        ctx: &RequestContext,
        facility_id: FacilityId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PlannerResult<usize> {
        let query = VisitQuery::new()
            .facility(facility_id)
            .status(VisitStatus::Scheduled)
            .chw(ChwFilter::Unassigned)
            .between(Some(start), Some(end));
        let visits = ctx.run(self.store.list_visits(&query)).await?;
        if visits.is_empty() {
            return Ok(0);
        }
        let chws: Vec<User> = ctx.run(self.identity.list_users_by_role(Role::Chw)).await?;

        let mut planned = Vec::new();
        for visit in visits {
            let Some(mother) = ctx.run(self.store.get_mother(&visit.mother_id)).await? else {
                warn!("Visit {} references unknown mother {}", visit.id, visit.mother_id);
                continue;
            };
            let Some(area) = mother.catchment_area.as_deref() else {
                debug!("Mother {} has no catchment area", mother.id);
                continue;
            };
            let Some(chw) = chws
                .iter()
                .find(|c| c.catchment_area.as_deref().is_some_and(|a| same_area(a, area)))
            else {
                debug!("No CHW serves catchment area {}", area);
                continue;
            };
            planned.push(ChwMove {
                visit_id: visit.id,
                from: None,
                to: chw.id,
            });
        }

        let assigned = self.apply_chw_moves(ctx, &planned, start, end).await?;
        info!("Assigned {} visits at facility {} by catchment", assigned.len(), facility_id);
        Ok(assigned.len())
    }
}
