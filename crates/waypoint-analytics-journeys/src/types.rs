use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use waypoint_query::DataError;

#[derive(Error, Debug)]
pub enum JourneyError {
    #[error("{0}")]
    Validation(String),

    #[error("Hit stream provider is not configured")]
    ProviderUnavailable,

    #[error("{0}")]
    Query(#[from] DataError),

    #[error("Analysis worker failed: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for JourneyError {
    fn from(err: tokio::task::JoinError) -> Self {
        JourneyError::Internal(err.to_string())
    }
}

/// Which neighbour of the start page a journey follows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JourneyDirection {
    /// Pages visited after the start page
    #[default]
    Forward,
    /// Pages visited before the start page
    Backward,
}

/// A page at a relative step from the start page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JourneyNode {
    pub id: usize,
    pub step_index: usize,
    pub page_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JourneyEdge {
    pub source_node_id: usize,
    pub target_node_id: usize,
    /// Sessions that made this transition
    pub weight: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JourneyGraph {
    pub nodes: Vec<JourneyNode>,
    #[serde(rename = "links")]
    pub edges: Vec<JourneyEdge>,
}
