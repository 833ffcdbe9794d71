// models/src/medical/user.rs
// Users are owned by the identity provider; the planner only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::{FacilityId, UserId};
use crate::location::Coordinates;
use crate::medical::role::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub role: Role,
    pub phone: Option<String>,
    /// Facility a CHW or clinician reports to.
    pub facility_id: Option<FacilityId>,
    /// Catchment area served by a CHW, matched against mothers' areas.
    pub catchment_area: Option<String>,
    /// Starting point of a CHW's daily round.
    pub home_location: Option<Coordinates>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(display_name: impl Into<String>, role: Role, now: DateTime<Utc>) -> Self {
        User {
            id: UserId::new(),
            display_name: display_name.into(),
            role,
            phone: None,
            facility_id: None,
            catchment_area: None,
            home_location: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_chw(&self) -> bool {
        self.role == Role::Chw
    }
}
