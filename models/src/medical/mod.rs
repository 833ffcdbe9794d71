// models/src/medical/mod.rs

pub mod assessment;
pub mod facility;
pub mod health_metric;
pub mod mother;
pub mod role;
pub mod territory;
pub mod user;
pub mod visit;

pub use assessment::*;
pub use facility::*;
pub use health_metric::*;
pub use mother::*;
pub use role::*;
pub use territory::*;
pub use user::*;
pub use visit::*;
