//! Client module implementations and the loader manifest.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tandem_registry::{ModuleId, ReferenceTable};

use crate::error::ClientError;

/// Interactive implementation of a client module.
///
/// Islands own a JSON state value created by `mount` and kept across
/// navigations that leave the island in place.
pub trait ClientComponent: Send + Sync {
    /// Initial state for an island with `props`.
    fn mount(&self, props: &Value) -> Value;

    /// New props arrived for a kept island.
    fn update(&self, state: &mut Value, props: &Value) {
        let _ = (state, props);
    }
}

impl<F> ClientComponent for F
where
    F: Fn(&Value) -> Value + Send + Sync,
{
    fn mount(&self, props: &Value) -> Value {
        self(props)
    }
}

/// Future returned by a loader.
pub type LoadFuture = BoxFuture<'static, anyhow::Result<Arc<dyn ClientComponent>>>;

/// Loads one client module's implementation.
pub type Loader = Arc<dyn Fn() -> LoadFuture + Send + Sync>;

/// Build-generated table of client module loaders.
pub struct ClientManifest {
    loaders: ReferenceTable<Loader>,
}

impl ClientManifest {
    pub fn new() -> Self {
        Self {
            loaders: ReferenceTable::new("client loader"),
        }
    }

    /// Register an async loader for `id`.
    pub fn register<F, Fut>(&mut self, id: impl Into<ModuleId>, load: F) -> Result<&mut Self, ClientError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Arc<dyn ClientComponent>>> + Send + 'static,
    {
        let loader: Loader = Arc::new(move || load().boxed());
        let id = id.into();
        self.loaders
            .insert(id.clone(), loader)
            .map_err(|e| ClientError::Load {
                id: id.to_string(),
                message: e.to_string(),
            })?;
        Ok(self)
    }

    /// Register an already available implementation.
    pub fn register_component(
        &mut self,
        id: impl Into<ModuleId>,
        component: Arc<dyn ClientComponent>,
    ) -> Result<&mut Self, ClientError> {
        self.register(id, move || {
            let component = Arc::clone(&component);
            async move { Ok(component) }
        })
    }

    /// Loader for `id`.
    pub fn loader(&self, id: &str) -> Result<Loader, ClientError> {
        self.loaders
            .resolve(id)
            .cloned()
            .map_err(|_| ClientError::UnknownModule(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.loaders.contains(id)
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl Default for ClientManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientManifest")
            .field("loaders", &self.loaders)
            .finish()
    }
}
