// lib/src/assignment/mod.rs

pub mod assigner;
pub mod balancing;
pub mod daily_route;

pub use assigner::VisitAssigner;
pub use balancing::{BalanceReport, ChwLoad, Reassignment};
pub use daily_route::{OptimizedRoute, RouteStop};
