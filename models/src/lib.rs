// models/src/lib.rs
// Shared entities, identifiers and the error taxonomy of the clinical planner.

pub mod errors;
pub mod identifiers;
pub mod location;
pub mod medical;

pub use errors::{
    BatchOutcome, ErrorCategory, ItemFailure, PlannerError, PlannerResult, ValidationError,
    ValidationResult,
};
pub use identifiers::{FacilityId, MetricId, MotherId, TerritoryId, UserId, VisitId};
pub use location::Coordinates;
pub use medical::*;
