use std::sync::Arc;
use tracing::debug;
use waypoint_config::ServerConfig;
use waypoint_core::plugin::{
    PluginContext, PluginFuture, ServiceRegistrationContext, WaypointPlugin,
};
use waypoint_core::AuditLogger;
use waypoint_query::HitStreamProvider;

use crate::handlers::{configure_routes, AppState, JourneyApiDoc};
use crate::services::JourneyService;

/// Journeys analytics plugin
#[derive(Default)]
pub struct JourneysPlugin;

impl JourneysPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl WaypointPlugin for JourneysPlugin {
    fn name(&self) -> &'static str {
        "journeys"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> PluginFuture<'a> {
        Box::pin(async move {
            debug!("Registering journeys services");

            let config = context.require_service::<ServerConfig>()?;
            let provider = context.get_service::<dyn HitStreamProvider>();
            context.register_service(Arc::new(JourneyService::new(provider, config)));

            debug!("Journeys services registered successfully");
            Ok(())
        })
    }

    fn configure_routes(&self, context: &PluginContext) -> Option<axum::Router> {
        let journey_service = context.get_service::<JourneyService>()?;
        let audit_service = context.get_service::<dyn AuditLogger>()?;

        Some(configure_routes().with_state(Arc::new(AppState {
            journey_service,
            audit_service,
        })))
    }

    fn openapi_schema(&self) -> Option<utoipa::openapi::OpenApi> {
        Some(<JourneyApiDoc as utoipa::OpenApi>::openapi())
    }
}
