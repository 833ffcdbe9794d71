// models/src/medical/territory.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::{TerritoryId, UserId};
use crate::location::Coordinates;

/// A CHW catchment polygon. `center` is the normalized mean of `boundary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Territory {
    pub id: TerritoryId,
    /// Weak reference; a territory may be temporarily unassigned.
    pub chw_id: Option<UserId>,
    pub name: String,
    pub district: String,
    pub description: Option<String>,
    pub boundary: Vec<Coordinates>,
    pub center: Coordinates,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
