// lib/src/geo/mod.rs

pub mod geokit;

pub use geokit::*;
