//! Plugin system for service registration and route composition
//!
//! Each analysis surface (funnels, journeys) ships as a plugin that registers
//! its services, contributes an axum router and an OpenAPI document. The
//! binary registers plugins in dependency order and asks the manager for the
//! final application.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use axum::Router;
use thiserror::Error;
use tracing::debug;
use utoipa::openapi::{InfoBuilder, OpenApi, OpenApiBuilder, ServerBuilder};

use crate::openapi::merge_openapi_schemas;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin '{plugin_name}' failed to register services: {error}")]
    PluginRegistrationFailed { plugin_name: String, error: String },

    #[error("Service '{service}' is required but not registered")]
    MissingService { service: &'static str },
}

pub type PluginFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + 'a>>;

pub trait WaypointPlugin: Send + Sync {
    /// Unique identifier for this plugin
    fn name(&self) -> &'static str;

    /// Register the services this plugin provides.
    ///
    /// Use `context.require_service::<T>()` for dependencies.
    fn register_services<'a>(&'a self, context: &'a ServiceRegistrationContext) -> PluginFuture<'a>;

    fn configure_routes(&self, _context: &PluginContext) -> Option<Router> {
        None
    }

    fn openapi_schema(&self) -> Option<OpenApi> {
        None
    }
}

/// Type-keyed service registry. Trait objects are registered as `Arc<dyn Trait>`.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Send + Sync + 'static + ?Sized>(&self, service: Arc<T>) {
        debug!("Registering service: {}", std::any::type_name::<T>());
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>(), Box::new(service));
    }

    pub fn get<T: Send + Sync + 'static + ?Sized>(&self) -> Option<Arc<T>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .and_then(|any| any.downcast_ref::<Arc<T>>())
            .cloned()
    }

    pub fn require<T: Send + Sync + 'static + ?Sized>(&self) -> Result<Arc<T>, PluginError> {
        self.get::<T>().ok_or(PluginError::MissingService {
            service: std::any::type_name::<T>(),
        })
    }
}

/// Read-only view handed to plugins when building routes
pub struct PluginContext {
    registry: Arc<ServiceRegistry>,
}

impl PluginContext {
    pub fn get_service<T: Send + Sync + 'static + ?Sized>(&self) -> Option<Arc<T>> {
        self.registry.get::<T>()
    }

    pub fn require_service<T: Send + Sync + 'static + ?Sized>(
        &self,
    ) -> Result<Arc<T>, PluginError> {
        self.registry.require::<T>()
    }
}

/// Context used during service registration
#[derive(Default)]
pub struct ServiceRegistrationContext {
    registry: Arc<ServiceRegistry>,
}

impl ServiceRegistrationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_service<T: Send + Sync + 'static + ?Sized>(&self, service: Arc<T>) {
        self.registry.register(service);
    }

    pub fn get_service<T: Send + Sync + 'static + ?Sized>(&self) -> Option<Arc<T>> {
        self.registry.get::<T>()
    }

    pub fn require_service<T: Send + Sync + 'static + ?Sized>(
        &self,
    ) -> Result<Arc<T>, PluginError> {
        self.registry.require::<T>()
    }

    pub fn create_plugin_context(&self) -> PluginContext {
        PluginContext {
            registry: self.registry.clone(),
        }
    }
}

/// Registers plugins, initializes them in order and assembles the application
#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<Box<dyn WaypointPlugin>>,
    context: ServiceRegistrationContext,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin (order matters for dependencies)
    pub fn register_plugin(&mut self, plugin: Box<dyn WaypointPlugin>) {
        debug!("Registering plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    /// Shared services (config, provider, audit) are registered here before initialization
    pub fn service_context(&self) -> &ServiceRegistrationContext {
        &self.context
    }

    pub async fn initialize_plugins(&mut self) -> Result<(), PluginError> {
        debug!("Initializing {} plugins", self.plugins.len());

        for plugin in &self.plugins {
            plugin
                .register_services(&self.context)
                .await
                .map_err(|e| PluginError::PluginRegistrationFailed {
                    plugin_name: plugin.name().to_string(),
                    error: e.to_string(),
                })?;
            debug!("Initialized plugin: {}", plugin.name());
        }

        Ok(())
    }

    /// All plugin routes merged and nested under `/api`
    pub fn build_application(&self) -> Router {
        let plugin_context = self.context.create_plugin_context();
        let mut api_router = Router::new();

        for plugin in &self.plugins {
            if let Some(router) = plugin.configure_routes(&plugin_context) {
                debug!("Adding routes for plugin: {}", plugin.name());
                api_router = api_router.merge(router);
            }
        }

        Router::new().nest("/api", api_router)
    }

    pub fn unified_openapi(&self) -> OpenApi {
        let base = OpenApiBuilder::new()
            .info(
                InfoBuilder::new()
                    .title("Waypoint")
                    .description(Some(
                        "Funnel, funnel timing and journey analysis over web-analytics hit streams",
                    ))
                    .version(env!("CARGO_PKG_VERSION"))
                    .build(),
            )
            .servers(Some(vec![ServerBuilder::new()
                .url("/api")
                .description(Some("Base path for all API endpoints"))
                .build()]))
            .build();

        let schemas = self
            .plugins
            .iter()
            .filter_map(|plugin| plugin.openapi_schema())
            .collect();

        merge_openapi_schemas(base, schemas)
    }
}
