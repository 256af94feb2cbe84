mod graph;
mod render;
mod service;

pub use graph::{EdgeWeights, JourneyWalker, Transition, WeightedEdge};
pub use render::JourneySqlRenderer;
pub use service::{JourneyOutput, JourneyQuery, JourneyService};
