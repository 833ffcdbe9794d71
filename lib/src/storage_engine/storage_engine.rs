// lib/src/storage_engine/storage_engine.rs
// Contracts the planner consumes from the persistence collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use models::errors::PlannerResult;
use models::{
    Coordinates, FacilityId, FacilityType, HealthMetric, HealthcareFacility, Mother, MotherId, Territory,
    TerritoryId, UserId, Visit, VisitId, VisitStatus,
};

/// SRID of every stored geometry.
pub const WGS84_SRID: i32 = 4326;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// CHW assignment filter for visit listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChwFilter {
    #[default]
    Any,
    Unassigned,
    Assigned(UserId),
}

/// Bounded visit listing. Time range is `[from, to)` on `scheduled_time`.
#[derive(Debug, Clone, Default)]
pub struct VisitQuery {
    pub mother_id: Option<MotherId>,
    pub facility_id: Option<FacilityId>,
    pub chw: ChwFilter,
    pub statuses: Vec<VisitStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl VisitQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mother(mut self, mother_id: MotherId) -> Self {
        self.mother_id = Some(mother_id);
        self
    }

    pub fn facility(mut self, facility_id: FacilityId) -> Self {
        self.facility_id = Some(facility_id);
        self
    }

    pub fn chw(mut self, chw: ChwFilter) -> Self {
        self.chw = chw;
        self
    }

    pub fn status(mut self, status: VisitStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn page(mut self, limit: Option<usize>, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Whether `visit` passes every filter (ordering and paging aside).
    pub fn matches(&self, visit: &Visit) -> bool {
        if self.mother_id.is_some_and(|id| id != visit.mother_id) {
            return false;
        }
        if self.facility_id.is_some_and(|id| id != visit.facility_id) {
            return false;
        }
        let chw_ok = match self.chw {
            ChwFilter::Any => true,
            ChwFilter::Unassigned => visit.chw_id.is_none(),
            ChwFilter::Assigned(chw) => visit.chw_id == Some(chw),
        };
        if !chw_ok {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&visit.status) {
            return false;
        }
        if self.from.is_some_and(|from| visit.scheduled_time < from) {
            return false;
        }
        if self.to.is_some_and(|to| visit.scheduled_time >= to) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct TerritoryQuery {
    pub chw_id: Option<UserId>,
    pub assigned_only: bool,
    pub district: Option<String>,
}

/// A unit of atomic read-modify-write acquired from the store.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn commit(self: Box<Self>) -> PlannerResult<()>;
    async fn rollback(self: Box<Self>) -> PlannerResult<()>;
}

/// Per-entity persistence. Lookups return `Ok(None)` for unknown ids;
/// updates of unknown ids fail with `NotFound`; everything else that goes
/// wrong is a `StorageError`.
#[async_trait]
pub trait ClinicalStore: Send + Sync + 'static {
    async fn begin_transaction(&self) -> PlannerResult<Box<dyn StoreTransaction>>;

    async fn get_mother(&self, id: &MotherId) -> PlannerResult<Option<Mother>>;
    async fn update_mother(&self, mother: &Mother) -> PlannerResult<()>;
    /// Mothers whose recorded location falls inside the territory boundary.
    async fn mothers_in_territory(&self, territory_id: &TerritoryId) -> PlannerResult<Vec<Mother>>;

    async fn get_facility(&self, id: &FacilityId) -> PlannerResult<Option<HealthcareFacility>>;
    /// Free-text match over name, district, address and services.
    async fn search_facilities(&self, text: &str, limit: usize) -> PlannerResult<Vec<HealthcareFacility>>;

    async fn create_territory(&self, territory: &Territory) -> PlannerResult<()>;
    async fn update_territory(&self, territory: &Territory) -> PlannerResult<()>;
    async fn get_territory(&self, id: &TerritoryId) -> PlannerResult<Option<Territory>>;
    async fn list_territories(&self, query: &TerritoryQuery) -> PlannerResult<Vec<Territory>>;

    async fn create_visit(&self, visit: &Visit) -> PlannerResult<()>;
    /// All-or-nothing insert.
    async fn create_visits(&self, visits: &[Visit]) -> PlannerResult<()>;
    async fn update_visit(&self, visit: &Visit) -> PlannerResult<()>;
    /// All-or-nothing update; fails without writing if any id is unknown.
    async fn update_visits(&self, visits: &[Visit]) -> PlannerResult<()>;
    async fn get_visit(&self, id: &VisitId) -> PlannerResult<Option<Visit>>;
    async fn list_visits(&self, query: &VisitQuery) -> PlannerResult<Vec<Visit>>;

    async fn create_metric(&self, metric: &HealthMetric) -> PlannerResult<()>;
    /// A mother's readings, ascending by `recorded_at`.
    async fn list_metrics(&self, mother_id: &MotherId) -> PlannerResult<Vec<HealthMetric>>;
    async fn latest_metric(&self, mother_id: &MotherId) -> PlannerResult<Option<HealthMetric>>;

    /// Visits a CHW may take per day, if the store knows a per-CHW figure.
    async fn chw_daily_capacity(&self, chw_id: &UserId) -> PlannerResult<Option<u32>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialTable {
    Facilities,
    Territories,
}

impl SpatialTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            SpatialTable::Facilities => "facilities",
            SpatialTable::Territories => "territories",
        }
    }

    /// Point column for facilities, polygon column for territories.
    pub fn geometry_column(&self) -> &'static str {
        match self {
            SpatialTable::Facilities => "location",
            SpatialTable::Territories => "boundary",
        }
    }
}

/// Extra row predicate evaluated by the index alongside the distance filter.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialPredicate {
    District(String),
    FacilityTypes(Vec<FacilityType>),
    MinCapacity(u32),
    HasChw,
    All(Vec<SpatialPredicate>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialQuery {
    pub table: SpatialTable,
    pub geometry_column: &'static str,
    pub center: Coordinates,
    pub predicate: Option<SpatialPredicate>,
}

impl SpatialQuery {
    pub fn new(table: SpatialTable, center: Coordinates) -> Self {
        Self {
            table,
            geometry_column: table.geometry_column(),
            center,
            predicate: None,
        }
    }

    pub fn with_predicate(mut self, predicate: Option<SpatialPredicate>) -> Self {
        self.predicate = predicate;
        self
    }
}

/// A row id plus its great-circle distance from the query centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialHit {
    pub id: Uuid,
    pub distance_m: f64,
}

/// Radius / nearest-K / containment queries over the geometry columns.
/// Result ordering is ascending by distance and must agree with haversine
/// within 1%.
#[async_trait]
pub trait SpatialIndex: Send + Sync + 'static {
    async fn within_radius(&self, query: &SpatialQuery, radius_m: f64) -> PlannerResult<Vec<SpatialHit>>;
    async fn nearest_k(&self, query: &SpatialQuery, k: usize) -> PlannerResult<Vec<SpatialHit>>;
    async fn contains_point(
        &self,
        table: SpatialTable,
        geometry_column: &str,
        point: Coordinates,
    ) -> PlannerResult<Option<SpatialHit>>;
}
