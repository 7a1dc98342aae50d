#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod data_model;
pub mod error;
pub mod events;
pub mod executor;
pub mod pipeline;
pub mod registry;
pub mod utils;
pub mod worker_logic;

pub use error::{PipelineError, Result};
