use axum::{
    extract::{Path, State},
    response::Json,
};
use std::sync::Arc;
use tracing::error;

use super::audit::JourneyAudit;
use super::types::{AppState, JourneyRequest, JourneyResponse};
use crate::types::{JourneyDirection, JourneyEdge, JourneyNode};
use waypoint_core::problemdetails::{Problem, ProblemDetails};
use waypoint_core::RequestMetadata;
use waypoint_query::QueryStats;

/// Navigation flow graph around a start page
#[utoipa::path(
    post,
    path = "/websites/{website_id}/journeys",
    params(
        ("website_id" = String, Path, description = "Website ID")
    ),
    request_body = JourneyRequest,
    responses(
        (status = 200, description = "Journey nodes and weighted links", body = JourneyResponse),
        (status = 400, description = "Invalid journey request", body = ProblemDetails),
        (status = 502, description = "Warehouse query failed", body = ProblemDetails),
        (status = 503, description = "Warehouse not configured", body = ProblemDetails)
    ),
    tag = "Journeys"
)]
pub async fn get_journey(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    metadata: RequestMetadata,
    Json(request): Json<JourneyRequest>,
) -> Result<Json<JourneyResponse>, Problem> {
    let query = request.into_query(website_id)?;
    let output = state.journey_service.journey(&query).await?;

    let audit = JourneyAudit {
        context: metadata.audit_context(),
        website_id: query.website_id.clone(),
        start_date: query.window.start.to_rfc3339(),
        end_date: query.window.end.to_rfc3339(),
        start_page: query.start_page.clone(),
        direction: query.direction,
        steps: query.horizon,
        limit: query.limit,
        sessions_scanned: output.sessions_scanned,
    };
    if let Err(e) = state.audit_service.create_audit_log(&audit).await {
        error!("Failed to create audit log: {}", e);
    }

    Ok(Json(output.into()))
}

#[derive(utoipa::OpenApi)]
#[openapi(
    paths(get_journey),
    components(
        schemas(
            JourneyRequest,
            JourneyResponse,
            JourneyNode,
            JourneyEdge,
            JourneyDirection,
            QueryStats,
            ProblemDetails
        )
    ),
    tags(
        (name = "Journeys", description = "Navigation flow from or to a start page")
    )
)]
pub struct JourneyApiDoc;

pub fn configure_routes() -> axum::Router<Arc<AppState>> {
    use axum::routing::post;

    axum::Router::new().route("/websites/{website_id}/journeys", post(get_journey))
}
