//! Funnels analytics module
//!
//! Per-step conversion counts and step-to-step timing over session hit
//! streams, in strict (direct entry) or loose mode.

pub mod handlers;
pub mod plugin;
pub mod services;
pub mod types;

// Re-export plugin
pub use plugin::FunnelsPlugin;
pub use services::{FunnelPlan, FunnelQuery, FunnelService};
pub use types::*;
