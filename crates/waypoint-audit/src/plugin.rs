use std::sync::Arc;

use sea_orm::DatabaseConnection;
use waypoint_core::plugin::{PluginFuture, ServiceRegistrationContext, WaypointPlugin};
use waypoint_core::AuditLogger;

use crate::AuditService;

/// Registers `AuditService` as the `AuditLogger`. Persists when a
/// `DatabaseConnection` was registered before initialization.
#[derive(Default)]
pub struct AuditPlugin;

impl AuditPlugin {
    pub fn new() -> Self {
        Self
    }
}

impl WaypointPlugin for AuditPlugin {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn register_services<'a>(
        &'a self,
        context: &'a ServiceRegistrationContext,
    ) -> PluginFuture<'a> {
        Box::pin(async move {
            let db = context.get_service::<DatabaseConnection>();
            let audit_service = Arc::new(AuditService::new(db));
            context.register_service(audit_service.clone());
            let audit_trait: Arc<dyn AuditLogger> = audit_service.clone();
            context.register_service(audit_trait);

            tracing::debug!(
                "Audit plugin registered (persistent: {})",
                audit_service.is_persistent()
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use waypoint_core::plugin::PluginManager;

    #[tokio::test]
    async fn test_registers_tracing_only_logger_without_database() {
        let mut manager = PluginManager::new();
        manager.register_plugin(Box::new(AuditPlugin::new()));
        manager.initialize_plugins().await.unwrap();

        let context = manager.service_context();
        assert!(context.get_service::<dyn AuditLogger>().is_some());
        assert!(!context.require_service::<AuditService>().unwrap().is_persistent());
    }

    #[tokio::test]
    async fn test_uses_registered_database() {
        let mut manager = PluginManager::new();
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        manager.service_context().register_service(Arc::new(db));
        manager.register_plugin(Box::new(AuditPlugin::new()));
        manager.initialize_plugins().await.unwrap();

        let service = manager
            .service_context()
            .require_service::<AuditService>()
            .unwrap();
        assert!(service.is_persistent());
    }
}
