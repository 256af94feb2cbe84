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

use crate::services::{AnalysisOutput, FunnelQuery, FunnelService};
use crate::types::{FunnelError, FunnelStepResult, StepDefinition, TimingResult};

pub struct AppState {
    pub funnel_service: Arc<FunnelService>,
    pub audit_service: Arc<dyn AuditLogger>,
}

// HTTP Request/Response types - separate from service layer types

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunnelRequest {
    pub start_date: DateTime,
    /// A bare date covers that whole day
    #[serde(deserialize_with = "waypoint_core::deserialize_end_date")]
    pub end_date: DateTime,
    /// Strict mode: every step must immediately follow the previous one
    #[serde(default)]
    pub only_direct_entry: bool,
    pub steps: Vec<StepDefinition>,
}

impl FunnelRequest {
    pub fn into_query(self, website_id: String) -> Result<FunnelQuery, FunnelError> {
        FunnelQuery::new(
            website_id,
            self.start_date.into(),
            self.end_date.into(),
            self.only_direct_entry,
            self.steps,
        )
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunnelCountsResponse {
    pub data: Vec<FunnelStepResult>,
    /// Null when the dry run failed
    pub query_stats: Option<QueryStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunnelTimingResponse {
    pub data: Vec<TimingResult>,
    pub query_stats: Option<QueryStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl From<AnalysisOutput<Vec<FunnelStepResult>>> for FunnelCountsResponse {
    fn from(output: AnalysisOutput<Vec<FunnelStepResult>>) -> Self {
        Self {
            data: output.data,
            query_stats: output.query_stats,
            sql: output.sql,
        }
    }
}

impl From<AnalysisOutput<Vec<TimingResult>>> for FunnelTimingResponse {
    fn from(output: AnalysisOutput<Vec<TimingResult>>) -> Self {
        Self {
            data: output.data,
            query_stats: output.query_stats,
            sql: output.sql,
        }
    }
}

impl From<FunnelError> for Problem {
    fn from(error: FunnelError) -> Self {
        match error {
            FunnelError::Validation(message) => bad_request()
                .title("Invalid funnel definition")
                .detail(message)
                .value("error_code", "VALIDATION_ERROR")
                .build(),
            FunnelError::ProviderUnavailable => service_unavailable().build(),
            FunnelError::Query(DataError::InvalidQuery(message)) => bad_request()
                .title("Invalid query")
                .detail(message)
                .build(),
            FunnelError::Query(e) => bad_gateway().detail(e.to_string()).build(),
            FunnelError::Internal(message) => {
                error!("Funnel analysis failed: {}", message);
                internal_server_error().build()
            }
        }
    }
}
