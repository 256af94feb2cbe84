use std::sync::Arc;
use tracing::debug;
use waypoint_config::ServerConfig;
use waypoint_core::plugin::{
    PluginContext, PluginFuture, ServiceRegistrationContext, WaypointPlugin,
};
use waypoint_core::AuditLogger;
use waypoint_query::HitStreamProvider;

use crate::handlers::{configure_routes, AppState, FunnelApiDoc};
use crate::services::FunnelService;

/// Funnels analytics plugin
#[derive(Default)]
pub struct FunnelsPlugin;

impl FunnelsPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl WaypointPlugin for FunnelsPlugin {
    fn name(&self) -> &'static str {
        "funnels"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> PluginFuture<'a> {
        Box::pin(async move {
            debug!("Registering funnels services");

            let config = context.require_service::<ServerConfig>()?;
            // Without a provider every analysis answers 503
            let provider = context.get_service::<dyn HitStreamProvider>();

            let funnel_service = Arc::new(FunnelService::new(provider, config));
            context.register_service(funnel_service);

            debug!("Funnels services registered successfully");
            Ok(())
        })
    }

    fn configure_routes(&self, context: &PluginContext) -> Option<axum::Router> {
        let funnel_service = context.get_service::<FunnelService>()?;
        let audit_service = context.get_service::<dyn AuditLogger>()?;

        Some(configure_routes().with_state(Arc::new(AppState {
            funnel_service,
            audit_service,
        })))
    }

    fn openapi_schema(&self) -> Option<utoipa::openapi::OpenApi> {
        Some(<FunnelApiDoc as utoipa::OpenApi>::openapi())
    }
}
