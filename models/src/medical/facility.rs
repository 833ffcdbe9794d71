// models/src/medical/facility.rs

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::identifiers::FacilityId;
use crate::location::Coordinates;

pub const DEFAULT_OPENING_HOUR: u32 = 8;
pub const DEFAULT_CLOSING_HOUR: u32 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityType {
    Hospital,
    HealthCenter,
    Dispensary,
    Clinic,
    MaternityHome,
}

/// Opening window for one weekday, in local whole hours `[open_hour, close_hour)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyHours {
    pub weekday: Weekday,
    pub open_hour: u32,
    pub close_hour: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    #[serde(default)]
    pub open_24h: bool,
    #[serde(default)]
    pub closed_days: Vec<Weekday>,
    /// Per-weekday windows that replace the facility's default hours.
    #[serde(default)]
    pub overrides: Vec<DailyHours>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthcareFacility {
    pub id: FacilityId,
    pub name: String,
    pub district: String,
    pub address: String,
    pub location: Coordinates,
    pub facility_type: FacilityType,
    pub capacity: u32,
    pub opening_hour: Option<u32>,
    pub closing_hour: Option<u32>,
    #[serde(default)]
    pub services: BTreeSet<String>,
    #[serde(default)]
    pub operating_hours: OperatingHours,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HealthcareFacility {
    /// The local opening window on `weekday`, or `None` when closed all day.
    pub fn hours_on(&self, weekday: Weekday) -> Option<(u32, u32)> {
        self.hours_on_or(weekday, (DEFAULT_OPENING_HOUR, DEFAULT_CLOSING_HOUR))
    }

    /// Like `hours_on`, with `fallback` used when the facility records no hours.
    pub fn hours_on_or(&self, weekday: Weekday, fallback: (u32, u32)) -> Option<(u32, u32)> {
        if self.operating_hours.open_24h {
            return Some((0, 24));
        }
        if self.operating_hours.closed_days.contains(&weekday) {
            return None;
        }
        if let Some(day) = self
            .operating_hours
            .overrides
            .iter()
            .find(|d| d.weekday == weekday)
        {
            return Some((day.open_hour, day.close_hour));
        }
        Some((
            self.opening_hour.unwrap_or(fallback.0),
            self.closing_hour.unwrap_or(fallback.1),
        ))
    }

    /// Whether the facility is open at `at`, expressed in the facility's local zone.
    pub fn is_open<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        match self.hours_on(at.weekday()) {
            Some((open, close)) => at.hour() >= open && at.hour() < close,
            None => false,
        }
    }

    /// Case-insensitive check that every requested service is offered.
    pub fn offers_all(&self, services: &[String]) -> bool {
        services.iter().all(|wanted| {
            self.services
                .iter()
                .any(|offered| offered.eq_ignore_ascii_case(wanted))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn facility() -> HealthcareFacility {
        let now = Utc::now();
        HealthcareFacility {
            id: FacilityId::new(),
            name: "Kibera Health Centre".to_string(),
            district: "Nairobi".to_string(),
            address: "Olympic Rd".to_string(),
            location: Coordinates::new(-1.3133, 36.7878),
            facility_type: FacilityType::HealthCenter,
            capacity: 40,
            opening_hour: Some(8),
            closing_hour: Some(17),
            services: ["antenatal".to_string(), "delivery".to_string()].into_iter().collect(),
            operating_hours: OperatingHours {
                open_24h: false,
                closed_days: vec![Weekday::Sun],
                overrides: vec![DailyHours { weekday: Weekday::Sat, open_hour: 9, close_hour: 13 }],
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn open_within_default_hours() {
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        // Monday 2024-04-01
        let at = tz.with_ymd_and_hms(2024, 4, 1, 16, 59, 0).unwrap();
        assert!(facility().is_open(&at));
        let at = tz.with_ymd_and_hms(2024, 4, 1, 17, 0, 0).unwrap();
        assert!(!facility().is_open(&at));
    }

    #[test]
    fn weekday_overrides_and_closed_days() {
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        let saturday = tz.with_ymd_and_hms(2024, 4, 6, 14, 0, 0).unwrap();
        assert!(!facility().is_open(&saturday));
        let sunday = tz.with_ymd_and_hms(2024, 4, 7, 10, 0, 0).unwrap();
        assert!(!facility().is_open(&sunday));
    }

    #[test]
    fn service_matching_is_case_insensitive() {
        let f = facility();
        assert!(f.offers_all(&["Antenatal".to_string()]));
        assert!(!f.offers_all(&["antenatal".to_string(), "surgery".to_string()]));
    }
}
