pub mod audit;
pub mod handler;
pub mod types;

pub use handler::{configure_routes, JourneyApiDoc};
pub use types::AppState;
