//! Core utilities and types shared across all Waypoint crates

pub mod audit;
pub mod concurrency;
pub mod error_builder;
pub mod openapi;
pub mod plugin;
pub mod problemdetails;
pub mod request_metadata;
pub mod types;

pub use problemdetails::ProblemDetails;

// Re-export commonly used types
pub use audit::*;
pub use concurrency::fan_out;
pub use error_builder::*;
pub use request_metadata::{RequestMetadata, ANALYST_HEADER};
pub use types::*;

// Re-export external dependencies
pub use anyhow;
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tokio;
pub use tracing;
