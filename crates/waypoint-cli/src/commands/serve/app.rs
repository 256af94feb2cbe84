use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;
use utoipa_swagger_ui::SwaggerUi;
use waypoint_analytics_funnels::FunnelsPlugin;
use waypoint_analytics_journeys::JourneysPlugin;
use waypoint_audit::AuditPlugin;
use waypoint_config::ServerConfig;
use waypoint_core::plugin::PluginManager;
use waypoint_query::HitStreamProvider;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    provider: Option<&'static str>,
}

/// Registers shared services and plugins, then assembles the API, health
/// check and Swagger UI.
pub async fn build_application(
    config: Arc<ServerConfig>,
    provider: Option<Arc<dyn HitStreamProvider>>,
    db: Option<Arc<sea_orm::DatabaseConnection>>,
) -> anyhow::Result<Router> {
    let mut plugin_manager = PluginManager::new();
    let context = plugin_manager.service_context();
    context.register_service(config);
    if let Some(db) = db {
        context.register_service(db);
    }
    let source_type = provider.as_ref().map(|p| p.source_type());
    if let Some(provider) = provider {
        context.register_service(provider);
    }

    // Audit first: the analysis plugins need the AuditLogger it registers
    plugin_manager.register_plugin(Box::new(AuditPlugin::new()));
    plugin_manager.register_plugin(Box::new(FunnelsPlugin::new()));
    plugin_manager.register_plugin(Box::new(JourneysPlugin::new()));

    plugin_manager
        .initialize_plugins()
        .await
        .map_err(|e| anyhow::anyhow!("Plugin initialization failed: {}", e))?;
    debug!("All plugins initialized successfully");

    let health = Router::new().route(
        "/api/health",
        get(move || async move {
            Json(HealthResponse {
                status: "ok",
                provider: source_type,
            })
        }),
    );

    let app = plugin_manager
        .build_application()
        .merge(health)
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", plugin_manager.unified_openapi()),
        )
        .layer(TraceLayer::new_for_http());

    Ok(app)
}
