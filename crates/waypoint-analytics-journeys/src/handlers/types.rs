use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use waypoint_core::error_builder::{
    bad_gateway, bad_request, internal_server_error, service_unavailable,
};
use waypoint_core::problemdetails::Problem;
use waypoint_core::{AuditLogger, DateTime};
use waypoint_query::{DataError, QueryStats};

use crate::services::{JourneyOutput, JourneyQuery, JourneyService};
use crate::types::{JourneyDirection, JourneyEdge, JourneyError, JourneyNode};

pub struct AppState {
    pub journey_service: Arc<JourneyService>,
    pub audit_service: Arc<dyn AuditLogger>,
}

fn default_steps() -> usize {
    3
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JourneyRequest {
    pub start_date: DateTime,
    /// A bare date covers that whole day
    #[serde(deserialize_with = "waypoint_core::deserialize_end_date")]
    pub end_date: DateTime,
    pub start_url: String,
    /// Relative steps to walk from the start page
    #[serde(default = "default_steps")]
    pub steps: usize,
    /// Edges kept per step
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub direction: JourneyDirection,
}

impl JourneyRequest {
    pub fn into_query(self, website_id: String) -> Result<JourneyQuery, JourneyError> {
        JourneyQuery::new(
            website_id,
            self.start_date.into(),
            self.end_date.into(),
            &self.start_url,
            self.steps,
            self.limit,
            self.direction,
        )
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JourneyResponse {
    pub nodes: Vec<JourneyNode>,
    pub links: Vec<JourneyEdge>,
    /// Null when the dry run failed
    pub query_stats: Option<QueryStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl From<JourneyOutput> for JourneyResponse {
    fn from(output: JourneyOutput) -> Self {
        Self {
            nodes: output.graph.nodes,
            links: output.graph.edges,
            query_stats: output.query_stats,
            sql: output.sql,
        }
    }
}

impl From<JourneyError> for Problem {
    fn from(error: JourneyError) -> Self {
        match error {
            JourneyError::Validation(message) => bad_request()
                .title("Invalid journey request")
                .detail(message)
                .value("error_code", "VALIDATION_ERROR")
                .build(),
            JourneyError::ProviderUnavailable => service_unavailable().build(),
            JourneyError::Query(DataError::InvalidQuery(message)) => bad_request()
                .title("Invalid query")
                .detail(message)
                .build(),
            JourneyError::Query(e) => bad_gateway().detail(e.to_string()).build(),
            JourneyError::Internal(message) => {
                error!("Journey analysis failed: {}", message);
                internal_server_error().build()
            }
        }
    }
}
