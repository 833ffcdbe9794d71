// models/src/medical/visit.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::{FacilityId, MotherId, UserId, VisitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    Routine,
    Emergency,
    FollowUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl VisitStatus {
    /// Completed and no-show visits never move again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VisitStatus::Completed | VisitStatus::NoShow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::Scheduled => "scheduled",
            VisitStatus::InProgress => "in_progress",
            VisitStatus::Completed => "completed",
            VisitStatus::Cancelled => "cancelled",
            VisitStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The events that move a visit through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitTransition {
    CheckIn,
    CheckOut,
    Cancel,
    Reschedule,
    MarkNoShow,
}

impl VisitTransition {
    /// Target status when `self` fires from `from`, or `None` if the pair is not allowed.
    pub fn target(&self, from: VisitStatus) -> Option<VisitStatus> {
        use VisitStatus::*;
        match (self, from) {
            (VisitTransition::CheckIn, Scheduled) => Some(InProgress),
            (VisitTransition::CheckOut, InProgress) => Some(Completed),
            (VisitTransition::Cancel, Scheduled) => Some(Cancelled),
            (VisitTransition::Reschedule, Scheduled | Cancelled) => Some(Scheduled),
            (VisitTransition::MarkNoShow, Scheduled) => Some(NoShow),
            _ => None,
        }
    }
}

impl fmt::Display for VisitTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VisitTransition::CheckIn => "check_in",
            VisitTransition::CheckOut => "check_out",
            VisitTransition::Cancel => "cancel",
            VisitTransition::Reschedule => "reschedule",
            VisitTransition::MarkNoShow => "mark_no_show",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: VisitId,
    pub mother_id: MotherId,
    pub facility_id: FacilityId,
    pub chw_id: Option<UserId>,
    pub clinician_id: Option<UserId>,
    pub scheduled_time: DateTime<Utc>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub visit_type: VisitType,
    pub notes: Option<String>,
    pub status: VisitStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Visit {
    pub fn new(
        mother_id: MotherId,
        facility_id: FacilityId,
        scheduled_time: DateTime<Utc>,
        visit_type: VisitType,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Visit {
            id: VisitId::new(),
            mother_id,
            facility_id,
            chw_id: None,
            clinician_id: None,
            scheduled_time,
            check_in_time: None,
            check_out_time: None,
            visit_type,
            notes,
            status: VisitStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [VisitStatus; 5] = [
        VisitStatus::Scheduled,
        VisitStatus::InProgress,
        VisitStatus::Completed,
        VisitStatus::Cancelled,
        VisitStatus::NoShow,
    ];

    const EVENTS: [VisitTransition; 5] = [
        VisitTransition::CheckIn,
        VisitTransition::CheckOut,
        VisitTransition::Cancel,
        VisitTransition::Reschedule,
        VisitTransition::MarkNoShow,
    ];

    #[test]
    fn terminal_states_accept_no_transition() {
        for event in EVENTS {
            assert_eq!(event.target(VisitStatus::Completed), None);
            assert_eq!(event.target(VisitStatus::NoShow), None);
        }
    }

    #[test]
    fn only_documented_pairs_are_reachable() {
        let mut pairs = Vec::new();
        for from in ALL {
            for event in EVENTS {
                if let Some(to) = event.target(from) {
                    pairs.push((from, to));
                }
            }
        }
        pairs.sort_by_key(|(a, b)| (a.as_str(), b.as_str()));
        assert_eq!(
            pairs,
            vec![
                (VisitStatus::Cancelled, VisitStatus::Scheduled),
                (VisitStatus::InProgress, VisitStatus::Completed),
                (VisitStatus::Scheduled, VisitStatus::Cancelled),
                (VisitStatus::Scheduled, VisitStatus::InProgress),
                (VisitStatus::Scheduled, VisitStatus::NoShow),
                (VisitStatus::Scheduled, VisitStatus::Scheduled),
            ]
        );
    }
}
