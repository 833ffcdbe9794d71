// lib/src/lib.rs
// Clinical planner engine: geometry, spatial search, territories, routing,
// vitals analysis, risk scoring, visit scheduling and CHW assignment.

pub mod assignment;
pub mod config;
pub mod context;
pub mod facility_search;
pub mod geo;
pub mod identity;
pub mod metrics;
pub mod notifications;
pub mod risk;
pub mod routing;
pub mod scheduling;
pub mod storage_engine;
pub mod territory;

pub use models::errors::{BatchOutcome, ErrorCategory, PlannerError, PlannerResult};

pub use crate::assignment::{BalanceReport, OptimizedRoute, VisitAssigner};
pub use crate::config::{PlannerConfig, SchedulingConfig};
pub use crate::context::{CancelHandle, Clock, FixedClock, RequestContext, SystemClock};
pub use crate::facility_search::{FacilityFilter, FacilitySearch, FacilityWithDistance};
pub use crate::identity::{IdentityProvider, InMemoryIdentityProvider, Principal};
pub use crate::metrics::MetricAnalyzer;
pub use crate::notifications::{LoggingNotifier, NotificationError, Notifier, PushMessage, PushProvider};
pub use crate::risk::RiskScorer;
pub use crate::routing::{build_route, Route, TransportMode};
pub use crate::scheduling::{PregnancyDates, ReminderProcessor, VisitScheduler};
pub use crate::storage_engine::{create_storage, ClinicalStore, InMemoryStore, SpatialIndex, StorageHandles};
pub use crate::territory::TerritoryService;
