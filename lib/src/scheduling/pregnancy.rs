// lib/src/scheduling/pregnancy.rs

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Days from LMP to the expected delivery date.
pub const PREGNANCY_DAYS: i64 = 280;
/// Days from LMP to the estimated conception date.
pub const CONCEPTION_OFFSET_DAYS: i64 = 14;

/// Week `< 13` is the first trimester, `13..=26` the second, later the third.
pub fn trimester_for_week(week: i64) -> u8 {
    match week {
        w if w < 13 => 1,
        13..=26 => 2,
        _ => 3,
    }
}

/// Gestational dates of a pregnancy as seen on `reference`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PregnancyDates {
    pub lmp: NaiveDate,
    pub conception_date: NaiveDate,
    pub due_date: NaiveDate,
    pub gestational_age_days: i64,
    pub weeks: i64,
    pub days: i64,
    pub trimester: u8,
}

impl PregnancyDates {
    pub fn from_lmp(lmp: NaiveDate, reference: NaiveDate) -> Self {
        let gestational_age_days = (reference - lmp).num_days();
        let weeks = gestational_age_days.div_euclid(7);
        PregnancyDates {
            lmp,
            conception_date: lmp + Duration::days(CONCEPTION_OFFSET_DAYS),
            due_date: lmp + Duration::days(PREGNANCY_DAYS),
            gestational_age_days,
            weeks,
            days: gestational_age_days.rem_euclid(7),
            trimester: trimester_for_week(weeks),
        }
    }

    /// Completed weeks, or `None` when `reference` precedes the LMP.
    pub fn completed_weeks(&self) -> Option<u32> {
        u32::try_from(self.weeks).ok()
    }

    pub fn is_past_due(&self, reference: NaiveDate) -> bool {
        reference > self.due_date
    }

    pub fn days_until_due(&self, reference: NaiveDate) -> i64 {
        (self.due_date - reference).num_days()
    }
}
