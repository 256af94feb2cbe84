//! Journeys analytics module
//!
//! Navigation flow graphs rooted at a start page, walked forward or
//! backward and pruned to the heaviest edges per relative step.

pub mod handlers;
pub mod plugin;
pub mod services;
pub mod types;

pub use plugin::JourneysPlugin;
pub use services::{JourneyQuery, JourneyService};
pub use types::*;
