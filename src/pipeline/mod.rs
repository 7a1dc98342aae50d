// src/pipeline/mod.rs

pub mod committer;
pub mod fetch;
pub mod filters;
pub mod handlers;
pub mod importer;
pub mod stages;
