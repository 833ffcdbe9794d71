// lib/src/storage_engine/interleaving_store.rs
// Test store that lands a competing visit write right after the next visit
// listing, the way a concurrent request would.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as TokioMutex;

use super::inmemory_storage::InMemoryStore;
use super::storage_engine::{ClinicalStore, StoreTransaction, TerritoryQuery, VisitQuery};
use models::errors::PlannerResult;
use models::{
    FacilityId, HealthMetric, HealthcareFacility, Mother, MotherId, Territory, TerritoryId, UserId, Visit, VisitId,
};

pub struct InterleavingStore {
    inner: Arc<InMemoryStore>,
    pending: TokioMutex<Option<Visit>>,
}

impl InterleavingStore {
    /// Writes `visit` to `inner` once, after the next `list_visits` returns.
    pub fn after_next_listing(inner: Arc<InMemoryStore>, visit: Visit) -> Self {
        InterleavingStore {
            inner,
            pending: TokioMutex::new(Some(visit)),
        }
    }
}

#[async_trait]
impl ClinicalStore for InterleavingStore {
    async fn begin_transaction(&self) -> PlannerResult<Box<dyn StoreTransaction>> {
        self.inner.begin_transaction().await
    }

    async fn get_mother(&self, id: &MotherId) -> PlannerResult<Option<Mother>> {
        self.inner.get_mother(id).await
    }

    async fn update_mother(&self, mother: &Mother) -> PlannerResult<()> {
        self.inner.update_mother(mother).await
    }

    async fn mothers_in_territory(&self, territory_id: &TerritoryId) -> PlannerResult<Vec<Mother>> {
        self.inner.mothers_in_territory(territory_id).await
    }

    async fn get_facility(&self, id: &FacilityId) -> PlannerResult<Option<HealthcareFacility>> {
        self.inner.get_facility(id).await
    }

    async fn search_facilities(&self, text: &str, limit: usize) -> PlannerResult<Vec<HealthcareFacility>> {
        self.inner.search_facilities(text, limit).await
    }

    async fn create_territory(&self, territory: &Territory) -> PlannerResult<()> {
        self.inner.create_territory(territory).await
    }

    async fn update_territory(&self, territory: &Territory) -> PlannerResult<()> {
        self.inner.update_territory(territory).await
    }

    async fn get_territory(&self, id: &TerritoryId) -> PlannerResult<Option<Territory>> {
        self.inner.get_territory(id).await
    }

    async fn list_territories(&self, query: &TerritoryQuery) -> PlannerResult<Vec<Territory>> {
        self.inner.list_territories(query).await
    }

    async fn create_visit(&self, visit: &Visit) -> PlannerResult<()> {
        self.inner.create_visit(visit).await
    }

    async fn create_visits(&self, visits: &[Visit]) -> PlannerResult<()> {
        self.inner.create_visits(visits).await
    }

    async fn update_visit(&self, visit: &Visit) -> PlannerResult<()> {
        self.inner.update_visit(visit).await
    }

    async fn update_visits(&self, visits: &[Visit]) -> PlannerResult<()> {
        self.inner.update_visits(visits).await
    }

    async fn get_visit(&self, id: &VisitId) -> PlannerResult<Option<Visit>> {
        self.inner.get_visit(id).await
    }

    async fn list_visits(&self, query: &VisitQuery) -> PlannerResult<Vec<Visit>> {
        let listed = self.inner.list_visits(query).await?;
        if let Some(visit) = self.pending.lock().await.take() {
            self.inner.update_visit(&visit).await?;
        }
        Ok(listed)
    }

    async fn create_metric(&self, metric: &HealthMetric) -> PlannerResult<()> {
        self.inner.create_metric(metric).await
    }

    async fn list_metrics(&self, mother_id: &MotherId) -> PlannerResult<Vec<HealthMetric>> {
        self.inner.list_metrics(mother_id).await
    }

    async fn latest_metric(&self, mother_id: &MotherId) -> PlannerResult<Option<HealthMetric>> {
        self.inner.latest_metric(mother_id).await
    }

    async fn chw_daily_capacity(&self, chw_id: &UserId) -> PlannerResult<Option<u32>> {
        self.inner.chw_daily_capacity(chw_id).await
    }
}
