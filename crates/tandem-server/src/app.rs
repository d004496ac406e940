//! TandemApp configuration and setup.

use std::any::Any;
use std::sync::Arc;

use tandem_core::TandemError;
use tandem_registry::{ModuleReference, ModuleRegistry, ServerFunction};
use tandem_render::{SsrComponent, SsrTable};
use tandem_router::{Layout, Middleware, Page, Route, RouteTable};
use tandem_store::{Migration, Migrator, Storage};

use crate::config::TandemConfig;
use crate::server::{ServerParts, TandemServer};

/// Tandem application builder.
///
/// Registration errors (a bad pattern, a duplicate module id) are kept
/// and reported by [`build`](TandemApp::build), so the chain reads as
/// plain configuration.
///
/// # Example
///
/// ```rust,ignore
/// let server = TandemApp::new("shop")
///     .with_title("My Shop")
///     .page("/items/:id", |cx: &RequestContext| item_page(cx))
///     .client_module(ModuleReference::new("btn#Counter", "Counter"))
///     .ssr_component("btn#Counter", |props: &Value| counter_markup(props))
///     .server_fn("actions#incrementCounter", increment)
///     .build()
///     .await?;
/// ```
pub struct TandemApp {
    config: TandemConfig,
    routes: RouteTable,
    registry: ModuleRegistry,
    ssr: SsrTable,
    storage: Option<Arc<dyn Storage>>,
    migrations: Vec<Migration>,
    state: Option<Arc<dyn Any + Send + Sync>>,
    errors: Vec<TandemError>,
}

impl TandemApp {
    /// Create a new TandemApp with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(TandemConfig::new(name))
    }

    /// Start from a loaded configuration.
    pub fn from_config(config: TandemConfig) -> Self {
        Self {
            config,
            routes: RouteTable::new(),
            registry: ModuleRegistry::new(),
            ssr: SsrTable::new("ssr"),
            storage: None,
            migrations: Vec::new(),
            state: None,
            errors: Vec::new(),
        }
    }

    /// Set the default page title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config = self.config.with_title(title);
        self
    }

    /// Set the stylesheet path.
    pub fn with_css(mut self, path: impl Into<String>) -> Self {
        self.config = self.config.with_css(path);
        self
    }

    /// Enable or disable streaming.
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.config = self.config.with_streaming(enabled);
        self
    }

    /// Edit the configuration in place.
    pub fn configure(mut self, f: impl FnOnce(TandemConfig) -> TandemConfig) -> Self {
        self.config = f(self.config);
        self
    }

    /// Application state shared by every request, readable through
    /// `RequestContext::app`.
    pub fn with_state<T: Any + Send + Sync>(mut self, state: T) -> Self {
        self.state = Some(Arc::new(state));
        self
    }

    /// Register a route. Registration order is match order.
    pub fn route(mut self, route: Route) -> Self {
        if let Err(err) = self.routes.route(route) {
            self.errors.push(err);
        }
        self
    }

    /// Register a GET page.
    pub fn page(self, pattern: &str, page: impl Page + 'static) -> Self {
        self.route(Route::new(pattern).page(page))
    }

    /// Register a layout for every path under `prefix`.
    pub fn layout(mut self, prefix: &str, layout: impl Layout + 'static) -> Self {
        if let Err(err) = self.routes.layout(prefix, layout) {
            self.errors.push(err);
        }
        self
    }

    /// Register middleware that runs before every route's own chain.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.routes.use_middleware(middleware);
        self
    }

    /// Replace the route table, e.g. one built from a `RouteManifest`.
    ///
    /// Routes, layouts and middleware registered before are dropped.
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// Register a client module for the primary pass.
    pub fn client_module(mut self, reference: ModuleReference) -> Self {
        if let Err(err) = self.registry.client_module(reference) {
            self.errors.push(err.into());
        }
        self
    }

    /// Register every client module of a build manifest (JSON).
    pub fn client_manifest(mut self, json: &str) -> Self {
        if let Err(err) = self.registry.load_client_manifest(json) {
            self.errors.push(err.into());
        }
        self
    }

    /// Register the first-paint implementation of a client module.
    pub fn ssr_component(mut self, id: &str, component: impl SsrComponent + 'static) -> Self {
        let component: Arc<dyn SsrComponent> = Arc::new(component);
        if let Err(err) = self.ssr.insert(id, component) {
            self.errors.push(err.into());
        }
        self
    }

    /// Register a server function under `id`.
    pub fn server_fn(mut self, id: &str, function: ServerFunction) -> Self {
        if let Err(err) = self.registry.server_fn(id, function) {
            self.errors.push(err.into());
        }
        self
    }

    /// Storage backing sessions and migrations.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Add a migration, applied by [`build`](TandemApp::build).
    pub fn migration(mut self, migration: Migration) -> Self {
        self.migrations.push(migration);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &TandemConfig {
        &self.config
    }

    /// Get the route table.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Get the module registry.
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Validate everything, apply pending migrations and freeze the tables.
    pub async fn build(self) -> Result<TandemServer, TandemError> {
        let Self {
            config,
            routes,
            registry,
            ssr,
            storage,
            migrations,
            state,
            errors,
        } = self;

        if let Some(err) = errors.into_iter().next() {
            return Err(err);
        }
        config.validate()?;

        let migrator = Migrator::new(migrations)?;
        match &storage {
            Some(storage) => {
                let report = migrator.run(Arc::clone(storage)).await?;
                tracing::info!(
                    applied = report.applied.len(),
                    schema_version = report.version,
                    "storage migrated"
                );
            }
            None if migrator.latest() > 0 => {
                return Err(TandemError::Config(
                    "migrations registered without storage".into(),
                ));
            }
            None => {}
        }

        tracing::info!(
            app = %config.name,
            routes = routes.len(),
            client_modules = registry.client_table().len(),
            server_fns = registry.server_table().len(),
            ssr_components = ssr.len(),
            "app built"
        );

        Ok(TandemServer::from_parts(ServerParts {
            config,
            routes,
            registry,
            ssr,
            storage,
            state,
        }))
    }
}

impl std::fmt::Debug for TandemApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TandemApp")
            .field("config", &self.config)
            .field("routes", &self.routes)
            .field("ssr", &self.ssr)
            .field("storage", &self.storage.is_some())
            .field("migrations", &self.migrations.len())
            .field("errors", &self.errors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tandem_core::{Node, RequestContext};
    use tandem_store::{MemoryStore, StorageExt};

    fn hello(_cx: &RequestContext) -> Node {
        Node::text("hello")
    }

    // === TandemApp Tests ===

    #[test]
    fn test_tandem_app_new() {
        let app = TandemApp::new("TestApp");

        assert_eq!(app.config().name, "TestApp");
        assert!(app.routes().is_empty());
    }

    #[test]
    fn test_tandem_app_builder_chain() {
        let app = TandemApp::new("Shop")
            .with_title("My Shop")
            .with_css("/pkg/style.css")
            .with_streaming(false)
            .page("/", hello)
            .page("/items/:id", hello);

        assert_eq!(app.config().title, "My Shop");
        assert_eq!(app.config().stylesheet, Some("/pkg/style.css".to_string()));
        assert!(!app.config().streaming);
        assert_eq!(app.routes().len(), 2);
    }

    #[tokio::test]
    async fn test_build_reports_registration_errors() {
        let result = TandemApp::new("App")
            .client_module(ModuleReference::new("btn#Counter", "Counter"))
            .client_module(ModuleReference::new("btn#Counter", "Counter"))
            .build()
            .await;
        assert!(result.is_err());

        let result = TandemApp::new("App").page("/items/:", hello).build().await;
        assert!(matches!(result, Err(TandemError::Config(_))));
    }

    #[tokio::test]
    async fn test_build_runs_migrations() {
        let store = MemoryStore::new();
        let storage: Arc<dyn Storage> = Arc::new(store.clone());

        TandemApp::new("App")
            .with_storage(storage)
            .migration(Migration::new(1, "seed", |storage: Arc<dyn Storage>| async move {
                storage.set("greeting", json!("hi")).await
            }))
            .build()
            .await
            .unwrap();

        assert_eq!(
            store.get_as::<Value>("greeting").await.unwrap(),
            Some(json!("hi"))
        );
    }

    #[tokio::test]
    async fn test_migrations_need_storage() {
        let result = TandemApp::new("App")
            .migration(Migration::new(1, "noop", |_storage: Arc<dyn Storage>| async {
                Ok::<(), String>(())
            }))
            .build()
            .await;

        assert!(matches!(result, Err(TandemError::Config(_))));
    }
}
