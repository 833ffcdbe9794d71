// lib/src/scheduling/mod.rs

pub mod pregnancy;
pub mod reminders;
pub mod scheduler;

pub use pregnancy::{trimester_for_week, PregnancyDates};
pub use reminders::{days_until, ReminderProcessor};
pub use scheduler::{local_day_bounds, local_instant, VisitScheduler, ANTENATAL_TEMPLATE};
