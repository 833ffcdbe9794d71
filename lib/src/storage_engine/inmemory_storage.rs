// lib/src/storage_engine/inmemory_storage.rs
// Map-backed store used by tests and by the fixture-driven CLI.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use super::storage_engine::{
    ClinicalStore, SortOrder, SpatialHit, SpatialIndex, SpatialPredicate, SpatialQuery, SpatialTable,
    StoreTransaction, TerritoryQuery, VisitQuery,
};
use crate::geo;
use models::errors::{PlannerError, PlannerResult};
use models::{
    Coordinates, FacilityId, HealthMetric, HealthcareFacility, MetricId, Mother, MotherId, Territory, TerritoryId,
    User, UserId, Visit, VisitId,
};

/// Serialized form of a whole store, as loaded from a JSON fixture.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub mothers: Vec<Mother>,
    #[serde(default)]
    pub facilities: Vec<HealthcareFacility>,
    #[serde(default)]
    pub territories: Vec<Territory>,
    #[serde(default)]
    pub visits: Vec<Visit>,
    #[serde(default)]
    pub metrics: Vec<HealthMetric>,
    #[serde(default)]
    pub chw_capacity: HashMap<UserId, u32>,
}

impl StoreSnapshot {
    pub async fn load(path: &Path) -> PlannerResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)?;
        snapshot.validate()?;
        info!(
            "Loaded snapshot from {:?}: {} mothers, {} facilities, {} territories, {} visits",
            path,
            snapshot.mothers.len(),
            snapshot.facilities.len(),
            snapshot.territories.len(),
            snapshot.visits.len()
        );
        Ok(snapshot)
    }

    /// Rejects records that break entity invariants.
    pub fn validate(&self) -> PlannerResult<()> {
        for mother in &self.mothers {
            mother
                .validate()
                .map_err(|e| PlannerError::BadRequest(format!("mother {}: {}", mother.id, e)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    mothers: Arc<RwLock<HashMap<MotherId, Mother>>>,
    facilities: Arc<RwLock<HashMap<FacilityId, HealthcareFacility>>>,
    territories: Arc<RwLock<HashMap<TerritoryId, Territory>>>,
    visits: Arc<RwLock<HashMap<VisitId, Visit>>>,
    metrics: Arc<RwLock<HashMap<MetricId, HealthMetric>>>,
    chw_capacity: Arc<RwLock<HashMap<UserId, u32>>>,
    tx_lock: Arc<TokioMutex<()>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_snapshot(snapshot: &StoreSnapshot) -> Self {
        let store = Self::new();
        for mother in &snapshot.mothers {
            store.insert_mother(mother.clone()).await;
        }
        for facility in &snapshot.facilities {
            store.insert_facility(facility.clone()).await;
        }
        {
            let mut territories = store.territories.write().await;
            for territory in &snapshot.territories {
                territories.insert(territory.id, territory.clone());
            }
        }
        {
            let mut visits = store.visits.write().await;
            for visit in &snapshot.visits {
                visits.insert(visit.id, visit.clone());
            }
        }
        {
            let mut metrics = store.metrics.write().await;
            for metric in &snapshot.metrics {
                metrics.insert(metric.id, metric.clone());
            }
        }
        for (chw, capacity) in &snapshot.chw_capacity {
            store.set_chw_capacity(*chw, *capacity).await;
        }
        store
    }

    pub async fn insert_mother(&self, mother: Mother) {
        self.mothers.write().await.insert(mother.id, mother);
    }

    pub async fn insert_facility(&self, facility: HealthcareFacility) {
        self.facilities.write().await.insert(facility.id, facility);
    }

    pub async fn set_chw_capacity(&self, chw_id: UserId, capacity: u32) {
        self.chw_capacity.write().await.insert(chw_id, capacity);
    }

    fn check_geometry_column(table: SpatialTable, column: &str) -> PlannerResult<()> {
        if table.geometry_column() != column {
            return Err(PlannerError::StorageError(format!(
                "column {} is not a geometry column of {}",
                column,
                table.table_name()
            )));
        }
        Ok(())
    }

    /// Candidate rows of `table` with their distance from `center`, unordered.
    async fn candidates(&self, query: &SpatialQuery) -> PlannerResult<Vec<SpatialHit>> {
        Self::check_geometry_column(query.table, query.geometry_column)?;
        let hits = match query.table {
            SpatialTable::Facilities => self
                .facilities
                .read()
                .await
                .values()
                .filter(|f| query.predicate.as_ref().is_none_or(|p| facility_matches(p, f)))
                .map(|f| SpatialHit {
                    id: f.id.0,
                    distance_m: geo::distance_m(query.center, f.location),
                })
                .collect(),
            SpatialTable::Territories => self
                .territories
                .read()
                .await
                .values()
                .filter(|t| query.predicate.as_ref().is_none_or(|p| territory_matches(p, t)))
                .map(|t| SpatialHit {
                    id: t.id.0,
                    distance_m: geo::distance_m(query.center, t.center),
                })
                .collect(),
        };
        Ok(hits)
    }
}

fn facility_matches(predicate: &SpatialPredicate, facility: &HealthcareFacility) -> bool {
    match predicate {
        SpatialPredicate::District(district) => facility.district.eq_ignore_ascii_case(district),
        SpatialPredicate::FacilityTypes(types) => types.contains(&facility.facility_type),
        SpatialPredicate::MinCapacity(min) => facility.capacity >= *min,
        SpatialPredicate::HasChw => false,
        SpatialPredicate::All(all) => all.iter().all(|p| facility_matches(p, facility)),
    }
}

fn territory_matches(predicate: &SpatialPredicate, territory: &Territory) -> bool {
    match predicate {
        SpatialPredicate::District(district) => territory.district.eq_ignore_ascii_case(district),
        SpatialPredicate::HasChw => territory.chw_id.is_some(),
        SpatialPredicate::FacilityTypes(_) | SpatialPredicate::MinCapacity(_) => false,
        SpatialPredicate::All(all) => all.iter().all(|p| territory_matches(p, territory)),
    }
}

fn by_distance(a: &SpatialHit, b: &SpatialHit) -> Ordering {
    OrderedFloat(a.distance_m)
        .cmp(&OrderedFloat(b.distance_m))
        .then_with(|| a.id.cmp(&b.id))
}

struct InMemoryTransaction {
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> PlannerResult<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> PlannerResult<()> {
        debug!("In-memory transaction rolled back; writes are applied eagerly");
        Ok(())
    }
}

#[async_trait]
impl ClinicalStore for InMemoryStore {
    async fn begin_transaction(&self) -> PlannerResult<Box<dyn StoreTransaction>> {
        let guard = self.tx_lock.clone().lock_owned().await;
        Ok(Box::new(InMemoryTransaction { _guard: guard }))
    }

    async fn get_mother(&self, id: &MotherId) -> PlannerResult<Option<Mother>> {
        Ok(self.mothers.read().await.get(id).cloned())
    }

    async fn update_mother(&self, mother: &Mother) -> PlannerResult<()> {
        let mut mothers = self.mothers.write().await;
        match mothers.get_mut(&mother.id) {
            Some(existing) => {
                *existing = mother.clone();
                Ok(())
            }
            None => Err(PlannerError::not_found("mother", mother.id)),
        }
    }

    async fn mothers_in_territory(&self, territory_id: &TerritoryId) -> PlannerResult<Vec<Mother>> {
        let territory = self
            .territories
            .read()
            .await
            .get(territory_id)
            .cloned()
            .ok_or_else(|| PlannerError::not_found("territory", territory_id))?;
        let mut inside: Vec<Mother> = self
            .mothers
            .read()
            .await
            .values()
            .filter(|m| {
                m.location
                    .is_some_and(|loc| geo::point_in_polygon(loc, &territory.boundary))
            })
            .cloned()
            .collect();
        inside.sort_by_key(|m| m.id);
        Ok(inside)
    }

    async fn get_facility(&self, id: &FacilityId) -> PlannerResult<Option<HealthcareFacility>> {
        Ok(self.facilities.read().await.get(id).cloned())
    }

    async fn search_facilities(&self, text: &str, limit: usize) -> PlannerResult<Vec<HealthcareFacility>> {
        let needle = text.trim().to_lowercase();
        let mut found: Vec<HealthcareFacility> = self
            .facilities
            .read()
            .await
            .values()
            .filter(|f| {
                needle.is_empty()
                    || f.name.to_lowercase().contains(&needle)
                    || f.district.to_lowercase().contains(&needle)
                    || f.address.to_lowercase().contains(&needle)
                    || f.services.iter().any(|s| s.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        found.truncate(limit);
        Ok(found)
    }

    async fn create_territory(&self, territory: &Territory) -> PlannerResult<()> {
        let mut territories = self.territories.write().await;
        if territories.contains_key(&territory.id) {
            return Err(PlannerError::StorageError(format!("territory {} already exists", territory.id)));
        }
        territories.insert(territory.id, territory.clone());
        Ok(())
    }

    async fn update_territory(&self, territory: &Territory) -> PlannerResult<()> {
        let mut territories = self.territories.write().await;
        match territories.get_mut(&territory.id) {
            Some(existing) => {
                *existing = territory.clone();
                Ok(())
            }
            None => Err(PlannerError::not_found("territory", territory.id)),
        }
    }

    async fn get_territory(&self, id: &TerritoryId) -> PlannerResult<Option<Territory>> {
        Ok(self.territories.read().await.get(id).cloned())
    }

    async fn list_territories(&self, query: &TerritoryQuery) -> PlannerResult<Vec<Territory>> {
        let mut territories: Vec<Territory> = self
            .territories
            .read()
            .await
            .values()
            .filter(|t| query.chw_id.is_none_or(|chw| t.chw_id == Some(chw)))
            .filter(|t| !query.assigned_only || t.chw_id.is_some())
            .filter(|t| {
                query
                    .district
                    .as_ref()
                    .is_none_or(|d| t.district.eq_ignore_ascii_case(d))
            })
            .cloned()
            .collect();
        territories.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(territories)
    }

    async fn create_visit(&self, visit: &Visit) -> PlannerResult<()> {
        self.create_visits(std::slice::from_ref(visit)).await
    }

    async fn create_visits(&self, visits: &[Visit]) -> PlannerResult<()> {
        let mut stored = self.visits.write().await;
        if let Some(dup) = visits.iter().find(|v| stored.contains_key(&v.id)) {
            return Err(PlannerError::StorageError(format!("visit {} already exists", dup.id)));
        }
        for visit in visits {
            stored.insert(visit.id, visit.clone());
        }
        Ok(())
    }

    async fn update_visit(&self, visit: &Visit) -> PlannerResult<()> {
        self.update_visits(std::slice::from_ref(visit)).await
    }

    async fn update_visits(&self, visits: &[Visit]) -> PlannerResult<()> {
        let mut stored = self.visits.write().await;
        if let Some(missing) = visits.iter().find(|v| !stored.contains_key(&v.id)) {
            return Err(PlannerError::not_found("visit", missing.id));
        }
        for visit in visits {
            stored.insert(visit.id, visit.clone());
        }
        Ok(())
    }

    async fn get_visit(&self, id: &VisitId) -> PlannerResult<Option<Visit>> {
        Ok(self.visits.read().await.get(id).cloned())
    }

    async fn list_visits(&self, query: &VisitQuery) -> PlannerResult<Vec<Visit>> {
        let mut visits: Vec<Visit> = self
            .visits
            .read()
            .await
            .values()
            .filter(|v| query.matches(v))
            .cloned()
            .collect();
        visits.sort_by(|a, b| {
            let ord = a
                .scheduled_time
                .cmp(&b.scheduled_time)
                .then_with(|| a.id.cmp(&b.id));
            match query.order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });
        let page = visits
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(page)
    }

    async fn create_metric(&self, metric: &HealthMetric) -> PlannerResult<()> {
        self.metrics.write().await.insert(metric.id, metric.clone());
        Ok(())
    }

    async fn list_metrics(&self, mother_id: &MotherId) -> PlannerResult<Vec<HealthMetric>> {
        let mut metrics: Vec<HealthMetric> = self
            .metrics
            .read()
            .await
            .values()
            .filter(|m| m.mother_id == *mother_id)
            .cloned()
            .collect();
        metrics.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at).then_with(|| a.id.cmp(&b.id)));
        Ok(metrics)
    }

    async fn latest_metric(&self, mother_id: &MotherId) -> PlannerResult<Option<HealthMetric>> {
        Ok(self.list_metrics(mother_id).await?.pop())
    }

    async fn chw_daily_capacity(&self, chw_id: &UserId) -> PlannerResult<Option<u32>> {
        Ok(self.chw_capacity.read().await.get(chw_id).copied())
    }
}

#[async_trait]
impl SpatialIndex for InMemoryStore {
    async fn within_radius(&self, query: &SpatialQuery, radius_m: f64) -> PlannerResult<Vec<SpatialHit>> {
        let mut hits: Vec<SpatialHit> = self
            .candidates(query)
            .await?
            .into_iter()
            .filter(|h| h.distance_m <= radius_m)
            .collect();
        hits.sort_by(by_distance);
        Ok(hits)
    }

    async fn nearest_k(&self, query: &SpatialQuery, k: usize) -> PlannerResult<Vec<SpatialHit>> {
        let mut hits = self.candidates(query).await?;
        hits.sort_by(by_distance);
        hits.truncate(k);
        Ok(hits)
    }

    async fn contains_point(
        &self,
        table: SpatialTable,
        geometry_column: &str,
        point: Coordinates,
    ) -> PlannerResult<Option<SpatialHit>> {
        Self::check_geometry_column(table, geometry_column)?;
        match table {
            // Point geometries have no interior.
            SpatialTable::Facilities => Ok(None),
            SpatialTable::Territories => {
                let territories = self.territories.read().await;
                let mut containing: Vec<&Territory> = territories
                    .values()
                    .filter(|t| geo::point_in_polygon(point, &t.boundary))
                    .collect();
                containing.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
                Ok(containing.first().map(|t| SpatialHit {
                    id: t.id.0,
                    distance_m: geo::distance_m(point, t.center),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use models::{FacilityType, OperatingHours, VisitStatus, VisitType};

    fn facility(name: &str, location: Coordinates, district: &str) -> HealthcareFacility {
        let now = Utc::now();
        HealthcareFacility {
            id: FacilityId::new(),
            name: name.to_string(),
            district: district.to_string(),
            address: String::new(),
            location,
            facility_type: FacilityType::Clinic,
            capacity: 10,
            opening_hour: None,
            closing_hour: None,
            services: Default::default(),
            operating_hours: OperatingHours::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn snapshot_with_impossible_history_is_rejected() {
        let mut mother = Mother::new(UserId::new(), Utc::now());
        mother.obstetric_history.previous_pregnancies = 1;
        mother.obstetric_history.previous_deliveries = 2;
        let snapshot = StoreSnapshot {
            mothers: vec![mother],
            ..StoreSnapshot::default()
        };
        let file = tempfile::NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), serde_json::to_string(&snapshot).unwrap())
            .await
            .unwrap();

        let err = StoreSnapshot::load(file.path()).await.unwrap_err();
        assert_eq!(err.category(), models::ErrorCategory::BadRequest);
    }

    #[tokio::test]
    async fn within_radius_sorts_by_distance_and_applies_predicate() {
        let store = InMemoryStore::new();
        let near = facility("Near", Coordinates::new(0.0, 0.01), "A");
        let far = facility("Far", Coordinates::new(0.0, 0.05), "A");
        let other = facility("Other", Coordinates::new(0.0, 0.02), "B");
        for f in [&far, &near, &other] {
            store.insert_facility(f.clone()).await;
        }

        let query = SpatialQuery::new(SpatialTable::Facilities, Coordinates::new(0.0, 0.0))
            .with_predicate(Some(SpatialPredicate::District("a".to_string())));
        let hits = store.within_radius(&query, 10_000.0).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![near.id.0, far.id.0]);
        assert!((hits[0].distance_m - geo::distance_m(Coordinates::new(0.0, 0.0), near.location)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn rejects_unknown_geometry_column() {
        let store = InMemoryStore::new();
        let mut query = SpatialQuery::new(SpatialTable::Facilities, Coordinates::new(0.0, 0.0));
        query.geometry_column = "boundary";
        assert!(store.nearest_k(&query, 3).await.is_err());
    }

    #[tokio::test]
    async fn list_visits_pages_in_requested_order() {
        let store = InMemoryStore::new();
        let mother = MotherId::new();
        let facility = FacilityId::new();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let visits: Vec<Visit> = (0..4)
            .map(|i| Visit::new(mother, facility, base + Duration::days(i), VisitType::Routine, None, base))
            .collect();
        store.create_visits(&visits).await.unwrap();

        let query = VisitQuery::new()
            .mother(mother)
            .status(VisitStatus::Scheduled)
            .order(SortOrder::Descending)
            .page(Some(2), 1);
        let page = store.list_visits(&query).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, visits[2].id);
        assert_eq!(page[1].id, visits[1].id);
    }

    #[tokio::test]
    async fn batch_update_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut known = Visit::new(MotherId::new(), FacilityId::new(), now, VisitType::Routine, None, now);
        store.create_visit(&known).await.unwrap();

        known.notes = Some("changed".to_string());
        let unknown = Visit::new(MotherId::new(), FacilityId::new(), now, VisitType::Routine, None, now);
        assert!(store.update_visits(&[known.clone(), unknown]).await.is_err());
        let stored = store.get_visit(&known.id).await.unwrap().unwrap();
        assert_eq!(stored.notes, None);
    }
}
