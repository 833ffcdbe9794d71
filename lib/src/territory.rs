// lib/src/territory.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::context::{Clock, RequestContext};
use crate::geo;
use crate::identity::{hasura_claims, require_chw, IdentityProvider};
use crate::storage_engine::{ClinicalStore, SpatialIndex, SpatialTable, TerritoryQuery};
use models::errors::{PlannerError, PlannerResult, ValidationError};
use models::{Coordinates, MotherId, Territory, TerritoryId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTerritory {
    pub name: String,
    pub district: String,
    pub description: Option<String>,
    pub boundary: Vec<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryAssignment {
    pub territory_id: TerritoryId,
    pub chw_id: UserId,
    pub mothers_count: usize,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestChw {
    pub chw_id: UserId,
    pub territory_id: TerritoryId,
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotherInTerritory {
    pub mother_id: MotherId,
    /// From the territory centre; `None` when the mother has no recorded location.
    pub distance_km: Option<f64>,
}

pub struct TerritoryService {
    store: Arc<dyn ClinicalStore>,
    index: Arc<dyn SpatialIndex>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    hasura_namespace: String,
}

/// Validates and normalizes every vertex; a polygon needs three.
fn validate_boundary(boundary: &[Coordinates]) -> PlannerResult<Vec<Coordinates>> {
    if boundary.len() < 3 {
        return Err(ValidationError::TooFewBoundaryPoints(boundary.len()).into());
    }
    boundary
        .iter()
        .map(|p| geo::validate(p.latitude, p.longitude).map_err(PlannerError::from))
        .collect()
}

impl TerritoryService {
    pub fn new(
        store: Arc<dyn ClinicalStore>,
        index: Arc<dyn SpatialIndex>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        hasura_namespace: impl Into<String>,
    ) -> Self {
        TerritoryService {
            store,
            index,
            identity,
            clock,
            hasura_namespace: hasura_namespace.into(),
        }
    }

    #[instrument(skip(self, ctx, territory), fields(name = %territory.name))]
    pub async fn create(&self, ctx: &RequestContext, chw_id: UserId, territory: NewTerritory) -> PlannerResult<Territory> {
        let boundary = validate_boundary(&territory.boundary)?;
        if territory.name.trim().is_empty() {
            return Err(PlannerError::BadRequest("territory name must not be empty".to_string()));
        }
        ctx.run(require_chw(self.identity.as_ref(), &chw_id)).await?;

        let center = geo::centroid(&boundary)
            .ok_or_else(|| PlannerError::InternalError("centroid of a non-empty boundary".to_string()))?;
        let now = self.clock.now();
        let created = Territory {
            id: TerritoryId::new(),
            chw_id: Some(chw_id),
            name: territory.name,
            district: territory.district,
            description: territory.description,
            boundary,
            center,
            assigned_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        ctx.ensure_active()?;
        ctx.run(self.store.create_territory(&created)).await?;
        info!("Created territory {} for CHW {}", created.id, chw_id);
        Ok(created)
    }

    pub async fn get(&self, ctx: &RequestContext, id: TerritoryId) -> PlannerResult<Territory> {
        ctx.run(self.store.get_territory(&id))
            .await?
            .ok_or_else(|| PlannerError::not_found("territory", id))
    }

    pub async fn list_for_chw(&self, ctx: &RequestContext, chw_id: UserId) -> PlannerResult<Vec<Territory>> {
        let query = TerritoryQuery {
            chw_id: Some(chw_id),
            ..Default::default()
        };
        ctx.run(self.store.list_territories(&query)).await
    }

    /// Hands the territory to `chw_id` and refreshes the CHW's gateway claims.
    #[instrument(skip(self, ctx))]
    pub async fn assign(
        &self,
        ctx: &RequestContext,
        chw_id: UserId,
        territory_id: TerritoryId,
    ) -> PlannerResult<TerritoryAssignment> {
        let chw = ctx.run(require_chw(self.identity.as_ref(), &chw_id)).await?;

        let tx = ctx.run(self.store.begin_transaction()).await?;
        let mut territory = match ctx.run(self.store.get_territory(&territory_id)).await {
            Ok(Some(t)) => t,
            Ok(None) => {
                tx.rollback().await?;
                return Err(PlannerError::not_found("territory", territory_id));
            }
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };
        let now = self.clock.now();
        let previous = territory.chw_id.replace(chw_id);
        territory.assigned_at = Some(now);
        territory.updated_at = now;
        if let Err(e) = ctx.run(self.store.update_territory(&territory)).await {
            tx.rollback().await?;
            return Err(e);
        }
        tx.commit().await?;
        info!("Territory {} reassigned from {:?} to {}", territory_id, previous, chw_id);

        let mothers_count = ctx.run(self.store.mothers_in_territory(&territory_id)).await?.len();

        let claims = hasura_claims(&self.hasura_namespace, &chw, Some(territory_id));
        if let Err(e) = ctx.run(self.identity.set_custom_claims(&chw_id, claims)).await {
            warn!("Failed to refresh claims for CHW {}: {}", chw_id, e);
        }

        Ok(TerritoryAssignment {
            territory_id,
            chw_id,
            mothers_count,
            assigned_at: now,
        })
    }

    /// Replaces the boundary and recomputes the centre.
    #[instrument(skip(self, ctx, boundary))]
    pub async fn update_boundary(
        &self,
        ctx: &RequestContext,
        territory_id: TerritoryId,
        boundary: Vec<Coordinates>,
    ) -> PlannerResult<Territory> {
        let boundary = validate_boundary(&boundary)?;
        let mut territory = self.get(ctx, territory_id).await?;
        territory.center = geo::centroid(&boundary)
            .ok_or_else(|| PlannerError::InternalError("centroid of a non-empty boundary".to_string()))?;
        territory.boundary = boundary;
        territory.updated_at = self.clock.now();
        ctx.ensure_active()?;
        ctx.run(self.store.update_territory(&territory)).await?;
        Ok(territory)
    }

    /// The territory whose boundary contains the point, if any.
    #[instrument(skip(self, ctx))]
    pub async fn find_for_location(
        &self,
        ctx: &RequestContext,
        latitude: f64,
        longitude: f64,
    ) -> PlannerResult<Option<Territory>> {
        let point = geo::validate(latitude, longitude)?;
        let table = SpatialTable::Territories;
        let Some(hit) = ctx
            .run(self.index.contains_point(table, table.geometry_column(), point))
            .await?
        else {
            return Ok(None);
        };
        ctx.run(self.store.get_territory(&TerritoryId(hit.id))).await
    }

    /// CHW of the assigned territory whose centre is closest to the point.
    /// Ties keep the first territory in listing order.
    #[instrument(skip(self, ctx))]
    pub async fn find_nearest_chw(
        &self,
        ctx: &RequestContext,
        latitude: f64,
        longitude: f64,
        max_km: f64,
    ) -> PlannerResult<NearestChw> {
        let point = geo::validate(latitude, longitude)?;
        let query = TerritoryQuery {
            assigned_only: true,
            ..Default::default()
        };
        let territories = ctx.run(self.store.list_territories(&query)).await?;

        let nearest = territories
            .iter()
            .filter_map(|t| t.chw_id.map(|chw| (t, chw, geo::distance_km(point, t.center))))
            .filter(|(_, _, d)| *d <= max_km)
            .min_by_key(|(_, _, d)| OrderedFloat(*d));

        match nearest {
            Some((territory, chw_id, distance_km)) => Ok(NearestChw {
                chw_id,
                territory_id: territory.id,
                distance_km,
            }),
            None => Err(PlannerError::not_found(
                "chw",
                format!("within {} km of {}", max_km, point),
            )),
        }
    }

    /// Polygon test against the stored boundary, without the spatial index.
    pub async fn is_point_in(
        &self,
        ctx: &RequestContext,
        point: Coordinates,
        territory_id: TerritoryId,
    ) -> PlannerResult<bool> {
        let point = geo::validate(point.latitude, point.longitude)?;
        let territory = self.get(ctx, territory_id).await?;
        Ok(geo::point_in_polygon(point, &territory.boundary))
    }

    #[instrument(skip(self, ctx))]
    pub async fn mothers_in_territory(
        &self,
        ctx: &RequestContext,
        territory_id: TerritoryId,
    ) -> PlannerResult<Vec<MotherInTerritory>> {
        let territory = self.get(ctx, territory_id).await?;
        let mothers = ctx.run(self.store.mothers_in_territory(&territory_id)).await?;
        Ok(mothers
            .into_iter()
            .map(|m| MotherInTerritory {
                mother_id: m.id,
                distance_km: m.location.map(|loc| geo::distance_km(territory.center, loc)),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedClock;
    use crate::identity::{InMemoryIdentityProvider, MockIdentityProvider};
    use crate::storage_engine::InMemoryStore;
    use chrono::TimeZone;
    use models::{ErrorCategory, Mother, Role, User};

    struct Fixture {
        service: TerritoryService,
        store: Arc<InMemoryStore>,
        identity: Arc<InMemoryIdentityProvider>,
        chw: User,
        now: DateTime<Utc>,
    }

    fn square(origin: f64, size: f64) -> Vec<Coordinates> {
        vec![
            Coordinates::new(origin, origin),
            Coordinates::new(origin, origin + size),
            Coordinates::new(origin + size, origin + size),
            Coordinates::new(origin + size, origin),
        ]
    }

    fn new_territory(name: &str, boundary: Vec<Coordinates>) -> NewTerritory {
        NewTerritory {
            name: name.to_string(),
            district: "Kisumu".to_string(),
            description: None,
            boundary,
        }
    }

    async fn fixture() -> Fixture {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let chw = User::new("Achieng", Role::Chw, now);
        let clinician = User::new("Dr Otieno", Role::Clinician, now);
        let store = Arc::new(InMemoryStore::new());
        let identity = Arc::new(InMemoryIdentityProvider::with_users([chw.clone(), clinician]).await);
        let service = TerritoryService::new(
            store.clone(),
            store.clone(),
            identity.clone(),
            Arc::new(FixedClock::new(now)),
            "https://hasura.io/jwt/claims",
        );
        Fixture {
            service,
            store,
            identity,
            chw,
            now,
        }
    }

    #[tokio::test]
    async fn create_computes_centroid() {
        let f = fixture().await;
        let t = f
            .service
            .create(&RequestContext::background(), f.chw.id, new_territory("North", square(0.0, 0.1)))
            .await
            .unwrap();
        assert_eq!(t.center, Coordinates::new(0.05, 0.05));
        assert_eq!(t.chw_id, Some(f.chw.id));
        assert_eq!(t.assigned_at, Some(f.now));
    }

    #[tokio::test]
    async fn create_rejects_short_boundary_and_wrong_role() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let short = new_territory("Bad", square(0.0, 1.0)[..2].to_vec());
        let err = f.service.create(&ctx, f.chw.id, short).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadRequest);

        let err = f
            .service
            .create(&ctx, UserId::new(), new_territory("Ghost", square(0.0, 1.0)))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);

        let clinician = f.identity.list_users_by_role(Role::Clinician).await.unwrap()[0].id;
        let err = f
            .service
            .create(&ctx, clinician, new_territory("Wrong", square(0.0, 1.0)))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadRequest);
    }

    #[tokio::test]
    async fn assign_counts_mothers_and_sets_claims() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let t = f
            .service
            .create(&ctx, f.chw.id, new_territory("North", square(0.0, 1.0)))
            .await
            .unwrap();

        let other = User::new("Baraka", Role::Chw, f.now);
        f.identity.insert_user(other.clone()).await;
        for loc in [Some(Coordinates::new(0.5, 0.5)), Some(Coordinates::new(5.0, 5.0)), None] {
            let mut m = Mother::new(UserId::new(), f.now);
            m.location = loc;
            f.store.insert_mother(m).await;
        }

        let report = f.service.assign(&ctx, other.id, t.id).await.unwrap();
        assert_eq!(report.mothers_count, 1);
        assert_eq!(report.chw_id, other.id);
        assert_eq!(f.service.get(&ctx, t.id).await.unwrap().chw_id, Some(other.id));
        let claims = f.identity.claims_for(&other.id).await.unwrap();
        assert_eq!(
            claims["https://hasura.io/jwt/claims"]["x-hasura-territory-id"],
            t.id.to_string()
        );

        let err = f.service.assign(&ctx, other.id, TerritoryId::new()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn location_lookup_and_nearest_chw() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let near = f
            .service
            .create(&ctx, f.chw.id, new_territory("Near", square(0.0, 0.1)))
            .await
            .unwrap();

        let found = f.service.find_for_location(&ctx, 0.05, 0.02).await.unwrap();
        assert_eq!(found.map(|t| t.id), Some(near.id));
        assert!(f.service.find_for_location(&ctx, 3.0, 3.0).await.unwrap().is_none());

        let nearest = f.service.find_nearest_chw(&ctx, 0.05, 0.2, 50.0).await.unwrap();
        assert_eq!(nearest.chw_id, f.chw.id);
        assert!((nearest.distance_km - 16.679).abs() < 0.1);

        let err = f.service.find_nearest_chw(&ctx, 0.05, 0.2, 5.0).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn mothers_without_location_have_no_distance() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let t = f
            .service
            .create(&ctx, f.chw.id, new_territory("North", square(0.0, 1.0)))
            .await
            .unwrap();
        let mut m = Mother::new(UserId::new(), f.now);
        m.location = Some(t.center);
        f.store.insert_mother(m.clone()).await;

        let members = f.service.mothers_in_territory(&ctx, t.id).await.unwrap();
        assert_eq!(members, vec![MotherInTerritory { mother_id: m.id, distance_km: Some(0.0) }]);
        assert!(f.service.is_point_in(&ctx, Coordinates::new(0.0, 0.5), t.id).await.unwrap());
        assert!(!f.service.is_point_in(&ctx, Coordinates::new(2.0, 0.5), t.id).await.unwrap());
    }

    #[tokio::test]
    async fn update_boundary_moves_centre() {
        let f = fixture().await;
        let ctx = RequestContext::background();
        let t = f
            .service
            .create(&ctx, f.chw.id, new_territory("North", square(0.0, 1.0)))
            .await
            .unwrap();
        let updated = f.service.update_boundary(&ctx, t.id, square(2.0, 2.0)).await.unwrap();
        assert_eq!(updated.center, Coordinates::new(3.0, 3.0));
        assert_eq!(f.service.get(&ctx, t.id).await.unwrap().boundary, square(2.0, 2.0));
    }

    #[tokio::test]
    async fn identity_outage_surfaces_as_error() {
        let store = Arc::new(InMemoryStore::new());
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_get_user()
            .returning(|_| Err(PlannerError::StorageError("identity provider unavailable".to_string())));
        let service = TerritoryService::new(
            store.clone(),
            store,
            Arc::new(identity),
            Arc::new(FixedClock::new(Utc::now())),
            "ns",
        );
        let err = service
            .create(&RequestContext::background(), UserId::new(), new_territory("T", square(0.0, 1.0)))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::StorageError);
    }
}
