// lib/src/metrics/mod.rs

pub mod analyzer;
pub mod trends;

pub use analyzer::{analyze, find_abnormalities, MetricAnalyzer};
pub use trends::analyze_trends;
