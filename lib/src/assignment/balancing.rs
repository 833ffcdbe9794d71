// lib/src/assignment/balancing.rs
// Daily load balancing across the CHWs attached to a facility.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::assigner::{ChwMove, VisitAssigner};
use crate::context::RequestContext;
use crate::storage_engine::VisitQuery;
use models::errors::{BatchOutcome, PlannerError, PlannerResult};
use models::{FacilityId, Role, UserId, Visit, VisitId, VisitStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reassignment {
    pub visit_id: VisitId,
    pub from_chw: UserId,
    pub to_chw: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChwLoad {
    pub chw_id: UserId,
    pub assigned: usize,
    pub capacity: u32,
}

impl ChwLoad {
    pub fn is_over_capacity(&self) -> bool {
        self.assigned > self.capacity as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub facility_id: FacilityId,
    pub date: NaiveDate,
    pub reassignments: Vec<Reassignment>,
    /// Loads after balancing, in roster order.
    pub loads: Vec<ChwLoad>,
}

struct Slot {
    chw_id: UserId,
    capacity: usize,
    visits: Vec<Visit>,
}

/// Moves late visits off overloaded CHWs onto the least loaded CHW with
/// room, one at a time. Returns the moves made and the visits that could
/// not be placed. Ties go to the earlier CHW in `slots`.
fn plan_moves(slots: &mut [Slot]) -> (Vec<Reassignment>, Vec<VisitId>) {
    let mut moves = Vec::new();
    let mut stranded = Vec::new();

    for i in 0..slots.len() {
        if slots[i].visits.len() <= slots[i].capacity {
            continue;
        }
        // Ascending, so pop() yields the latest visit.
        slots[i].visits.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time).then_with(|| a.id.cmp(&b.id)));
        while slots[i].visits.len() > slots[i].capacity {
            let target = slots
                .iter()
                .enumerate()
                .filter(|(j, s)| *j != i && s.visits.len() < s.capacity)
                .min_by_key(|(j, s)| (s.visits.len(), *j))
                .map(|(j, _)| j);
            let Some(j) = target else {
                let excess = slots[i].visits.len() - slots[i].capacity;
                let start = slots[i].visits.len() - excess;
                stranded.extend(slots[i].visits[start..].iter().rev().map(|v| v.id));
                break;
            };
            let Some(visit) = slots[i].visits.pop() else {
                break;
            };
            let reassignment = Reassignment {
                visit_id: visit.id,
                from_chw: slots[i].chw_id,
                to_chw: slots[j].chw_id,
            };
            debug!("Moving visit {} from CHW {} to CHW {}", visit.id, reassignment.from_chw, reassignment.to_chw);
            slots[j].visits.push(visit);
            moves.push(reassignment);
        }
    }
    (moves, stranded)
}

impl VisitAssigner {
    async fn capacity_of(&self, ctx: &RequestContext, chw_id: &UserId) -> PlannerResult<u32> {
        Ok(ctx
            .run(self.store.chw_daily_capacity(chw_id))
            .await?
            .unwrap_or(self.config.default_chw_capacity))
    }

    /// Rebalances the facility's scheduled visits on the local day `date`.
    /// All moves are written in one transaction; if some overload cannot be
    /// absorbed the moves still land and the result is `PartialFailure`
    /// listing the visits left in place.
    #[instrument(skip(self, ctx))]
    pub async fn balance(&self, ctx: &RequestContext, facility_id: FacilityId, date: NaiveDate) -> PlannerResult<BalanceReport> {
        let (start, end) = self.day_bounds(date)?;
        let roster: Vec<UserId> = ctx
            .run(self.identity.list_users_by_role(Role::Chw))
            .await?
            .into_iter()
            .filter(|u| u.facility_id == Some(facility_id))
            .map(|u| u.id)
            .collect();
        if roster.is_empty() {
            return Err(PlannerError::BadRequest(format!("facility {} has no CHWs", facility_id)));
        }

        let query = VisitQuery::new()
            .facility(facility_id)
            .status(VisitStatus::Scheduled)
            .between(Some(start), Some(end));
        let visits = ctx.run(self.store.list_visits(&query)).await?;
        let mut by_chw: HashMap<UserId, Vec<Visit>> = HashMap::new();
        for visit in visits {
            if let Some(chw_id) = visit.chw_id {
                by_chw.entry(chw_id).or_default().push(visit);
            }
        }

        let mut slots = Vec::with_capacity(roster.len());
        for chw_id in &roster {
            let capacity = self.capacity_of(ctx, chw_id).await?;
            slots.push(Slot {
                chw_id: *chw_id,
                capacity: capacity as usize,
                visits: by_chw.remove(chw_id).unwrap_or_default(),
            });
        }

        let (moves, stranded) = plan_moves(&mut slots);
        let planned: Vec<ChwMove> = moves
            .iter()
            .map(|r| ChwMove {
                visit_id: r.visit_id,
                from: Some(r.from_chw),
                to: r.to_chw,
            })
            .collect();
        let applied: HashSet<VisitId> = self.apply_chw_moves(ctx, &planned, start, end).await?.into_iter().collect();

        let mut reassignments = Vec::with_capacity(applied.len());
        for reassignment in moves {
            if applied.contains(&reassignment.visit_id) {
                reassignments.push(reassignment);
                continue;
            }
            // Changed under us: it no longer counts towards the target CHW.
            if let Some(slot) = slots.iter_mut().find(|s| s.chw_id == reassignment.to_chw) {
                slot.visits.retain(|v| v.id != reassignment.visit_id);
            }
        }

        let loads: Vec<ChwLoad> = slots
            .iter()
            .map(|s| ChwLoad {
                chw_id: s.chw_id,
                assigned: s.visits.len(),
                capacity: s.capacity as u32,
            })
            .collect();
        info!(
            "Balanced facility {} on {}: {} reassignments, {} left over capacity",
            facility_id,
            date,
            reassignments.len(),
            stranded.len()
        );

        if stranded.is_empty() {
            return Ok(BalanceReport {
                facility_id,
                date,
                reassignments,
                loads,
            });
        }
        warn!("No CHW with spare capacity for {} visits", stranded.len());
        let mut outcome = BatchOutcome {
            succeeded: reassignments.len(),
            ..BatchOutcome::default()
        };
        for visit_id in stranded {
            outcome.record_failure(visit_id, "no CHW with spare capacity");
        }
        Err(PlannerError::PartialFailure(outcome))
    }
}
