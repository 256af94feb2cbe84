use axum::{
    extract::{Path, State},
    response::Json,
};
use std::sync::Arc;
use tracing::error;

use super::audit::{FunnelAnalysisAudit, FunnelAnalysisKind};
use super::types::{AppState, FunnelCountsResponse, FunnelRequest, FunnelTimingResponse};
use crate::services::FunnelQuery;
use crate::types::{
    EventScope, FunnelStepResult, ParamFilter, ParamOperator, StepDefinition, StepKind,
    TimingResult,
};
use waypoint_core::problemdetails::{Problem, ProblemDetails};
use waypoint_core::RequestMetadata;
use waypoint_query::QueryStats;

async fn record_audit(
    state: &AppState,
    metadata: &RequestMetadata,
    analysis: FunnelAnalysisKind,
    query: &FunnelQuery,
    sessions_scanned: usize,
) {
    let audit = FunnelAnalysisAudit {
        context: metadata.audit_context(),
        analysis,
        website_id: query.website_id.clone(),
        start_date: query.window.start.to_rfc3339(),
        end_date: query.window.end.to_rfc3339(),
        only_direct_entry: query.mode.is_strict(),
        steps: query
            .pattern
            .steps()
            .iter()
            .map(|step| step.value.clone())
            .collect(),
        sessions_scanned,
    };

    if let Err(e) = state.audit_service.create_audit_log(&audit).await {
        error!("Failed to create audit log: {}", e);
    }
}

/// Count the sessions reaching each funnel step
#[utoipa::path(
    post,
    path = "/websites/{website_id}/funnels/counts",
    params(
        ("website_id" = String, Path, description = "Website ID")
    ),
    request_body = FunnelRequest,
    responses(
        (status = 200, description = "Per-step session counts", body = FunnelCountsResponse),
        (status = 400, description = "Invalid funnel definition", body = ProblemDetails),
        (status = 502, description = "Warehouse query failed", body = ProblemDetails),
        (status = 503, description = "Warehouse not configured", body = ProblemDetails)
    ),
    tag = "Funnels"
)]
pub async fn funnel_counts(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    metadata: RequestMetadata,
    Json(request): Json<FunnelRequest>,
) -> Result<Json<FunnelCountsResponse>, Problem> {
    let query = request.into_query(website_id)?;
    let output = state.funnel_service.funnel_counts(&query).await?;

    record_audit(
        &state,
        &metadata,
        FunnelAnalysisKind::Counts,
        &query,
        output.sessions_scanned,
    )
    .await;

    Ok(Json(output.into()))
}

/// Average and median time between funnel steps
#[utoipa::path(
    post,
    path = "/websites/{website_id}/funnels/timing",
    params(
        ("website_id" = String, Path, description = "Website ID")
    ),
    request_body = FunnelRequest,
    responses(
        (status = 200, description = "Step-to-step and total timing", body = FunnelTimingResponse),
        (status = 400, description = "Invalid funnel definition or event steps", body = ProblemDetails),
        (status = 502, description = "Warehouse query failed", body = ProblemDetails),
        (status = 503, description = "Warehouse not configured", body = ProblemDetails)
    ),
    tag = "Funnels"
)]
pub async fn funnel_timing(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    metadata: RequestMetadata,
    Json(request): Json<FunnelRequest>,
) -> Result<Json<FunnelTimingResponse>, Problem> {
    let query = request.into_query(website_id)?;
    let output = state.funnel_service.funnel_timing(&query).await?;

    record_audit(
        &state,
        &metadata,
        FunnelAnalysisKind::Timing,
        &query,
        output.sessions_scanned,
    )
    .await;

    Ok(Json(output.into()))
}

#[derive(utoipa::OpenApi)]
#[openapi(
    paths(funnel_counts, funnel_timing),
    components(
        schemas(
            FunnelRequest,
            FunnelCountsResponse,
            FunnelTimingResponse,
            FunnelStepResult,
            TimingResult,
            StepDefinition,
            StepKind,
            EventScope,
            ParamFilter,
            ParamOperator,
            QueryStats,
            ProblemDetails
        )
    ),
    tags(
        (name = "Funnels", description = "Funnel conversion and timing analysis")
    )
)]
pub struct FunnelApiDoc;

pub fn configure_routes() -> axum::Router<Arc<AppState>> {
    use axum::routing::post;

    axum::Router::new()
        .route("/websites/{website_id}/funnels/counts", post(funnel_counts))
        .route("/websites/{website_id}/funnels/timing", post(funnel_timing))
}
