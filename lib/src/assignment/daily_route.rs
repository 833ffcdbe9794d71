// lib/src/assignment/daily_route.rs

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::assigner::VisitAssigner;
use crate::context::RequestContext;
use crate::identity::require_chw;
use crate::routing::{build_visit_route, Route, TransportMode};
use crate::scheduling::local_instant;
use crate::storage_engine::{ChwFilter, TerritoryQuery, VisitQuery};
use models::errors::{PlannerError, PlannerResult};
use models::{Coordinates, MotherId, User, UserId, VisitId, VisitStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    pub visit_id: VisitId,
    pub mother_id: MotherId,
    pub location: Coordinates,
    pub scheduled_time: DateTime<Utc>,
    pub estimated_arrival: DateTime<Utc>,
    pub distance_from_previous_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedRoute {
    pub chw_id: UserId,
    pub date: NaiveDate,
    pub home: Coordinates,
    pub departure_time: DateTime<Utc>,
    /// Visits in travel order.
    pub stops: Vec<RouteStop>,
    /// Scheduled visits left out because the mother has no location.
    pub skipped: Vec<VisitId>,
    /// Back home, dwell time included. `None` when there is nothing to visit.
    pub return_time: Option<DateTime<Utc>>,
    pub route: Option<Route>,
}

impl OptimizedRoute {
    pub fn total_distance_km(&self) -> f64 {
        self.route.as_ref().map_or(0.0, |r| r.total_distance_km)
    }
}

impl VisitAssigner {
    /// Where the CHW's day starts: their home, else their territory center.
    async fn route_origin(&self, ctx: &RequestContext, chw: &User) -> PlannerResult<Coordinates> {
        if let Some(home) = chw.home_location {
            return Ok(home);
        }
        let query = TerritoryQuery {
            chw_id: Some(chw.id),
            ..TerritoryQuery::default()
        };
        let territories = ctx.run(self.store.list_territories(&query)).await?;
        territories
            .first()
            .map(|t| t.center)
            .ok_or_else(|| PlannerError::BadRequest(format!("CHW {} has no home location or territory", chw.id)))
    }

    /// Orders the CHW's scheduled visits on the local day `date` into a
    /// round trip from home, departing at the configured start hour. Each
    /// arrival adds the dwell time of every stop before it.
    #[instrument(skip(self, ctx))]
    pub async fn optimize_daily_route(
        &self,
        ctx: &RequestContext,
        chw_id: UserId,
        date: NaiveDate,
        mode: TransportMode,
    ) -> PlannerResult<OptimizedRoute> {
        let chw = ctx.run(require_chw(self.identity.as_ref(), &chw_id)).await?;
        let home = self.route_origin(ctx, &chw).await?;
        let departure_time = local_instant(self.offset, date, self.config.daily_route_start_hour)?;
        let dwell = Duration::minutes(self.config.visit_dwell_minutes);

        let (start, end) = self.day_bounds(date)?;
        let query = VisitQuery::new()
            .chw(ChwFilter::Assigned(chw_id))
            .status(VisitStatus::Scheduled)
            .between(Some(start), Some(end));
        let visits = ctx.run(self.store.list_visits(&query)).await?;

        let mut located = Vec::new();
        let mut skipped = Vec::new();
        for visit in visits {
            let mother = ctx
                .run(self.store.get_mother(&visit.mother_id))
                .await?
                .ok_or_else(|| PlannerError::not_found("mother", visit.mother_id))?;
            match mother.location {
                Some(location) => located.push((visit, location)),
                None => {
                    debug!("Skipping visit {}: mother {} has no location", visit.id, mother.id);
                    skipped.push(visit.id);
                }
            }
        }

        if located.is_empty() {
            return Ok(OptimizedRoute {
                chw_id,
                date,
                home,
                departure_time,
                stops: Vec::new(),
                skipped,
                return_time: None,
                route: None,
            });
        }

        let points: Vec<Coordinates> = located.iter().map(|(_, loc)| *loc).collect();
        let route = build_visit_route(home, &points, mode, departure_time)?;
        let mut stops = Vec::with_capacity(located.len());
        for (position, stop_index) in route.stop_order().into_iter().enumerate() {
            let (visit, location) = &located[stop_index];
            let leg = &route.legs[position];
            stops.push(RouteStop {
                visit_id: visit.id,
                mother_id: visit.mother_id,
                location: *location,
                scheduled_time: visit.scheduled_time,
                estimated_arrival: leg.arrival_time + dwell * position as i32,
                distance_from_previous_km: leg.distance_km,
            });
        }
        let return_time = Some(route.arrival_time + dwell * stops.len() as i32);

        info!(
            "Planned {} stops for CHW {} on {} ({:.1} km, {} skipped)",
            stops.len(),
            chw_id,
            date,
            route.total_distance_km,
            skipped.len()
        );
        Ok(OptimizedRoute {
            chw_id,
            date,
            home,
            departure_time,
            stops,
            skipped,
            return_time,
            route: Some(route),
        })
    }
}
