// Utils

pub mod common;
pub mod prometheus_metrics;
pub mod stream;
pub mod text_matcher;
