//! Deduplicated module loading.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;

use crate::component::{ClientComponent, ClientManifest};
use crate::error::ClientError;

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<dyn ClientComponent>, ClientError>>>;

/// Page-lifetime cache of loaded client modules.
///
/// Concurrent and repeated loads of one id share a single loader call and
/// its resolved value. A failed load is evicted so a later access retries.
pub struct ModuleCache {
    manifest: Arc<ClientManifest>,
    entries: Mutex<HashMap<String, SharedLoad>>,
    loads: AtomicUsize,
}

impl ModuleCache {
    pub fn new(manifest: Arc<ClientManifest>) -> Self {
        Self {
            manifest,
            entries: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Load the implementation of `id`, starting the load on first access.
    pub async fn load(&self, id: &str) -> Result<Arc<dyn ClientComponent>, ClientError> {
        let load = {
            let mut entries = self.entries.lock();
            match entries.get(id) {
                Some(load) => load.clone(),
                None => {
                    let loader = self.manifest.loader(id)?;
                    self.loads.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(module = id, "loading client module");

                    let module = id.to_string();
                    let load = loader()
                        .map(move |result| {
                            result.map_err(|err| ClientError::Load {
                                id: module,
                                message: format!("{:#}", err),
                            })
                        })
                        .boxed()
                        .shared();
                    entries.insert(id.to_string(), load.clone());
                    load
                }
            }
        };

        let result = load.await;
        if let Err(err) = &result {
            tracing::warn!(module = id, error = %err, "client module failed to load");
            self.entries.lock().remove(id);
        }
        result
    }

    /// Number of loader invocations so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Whether `id` has finished loading successfully.
    pub fn is_loaded(&self, id: &str) -> bool {
        self.entries
            .lock()
            .get(id)
            .and_then(|load| load.peek().map(Result::is_ok))
            .unwrap_or(false)
    }

    pub fn manifest(&self) -> &ClientManifest {
        &self.manifest
    }
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("entries", &self.entries.lock().len())
            .field("loads", &self.load_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn counting_manifest(calls: Arc<AtomicUsize>) -> Arc<ClientManifest> {
        let mut manifest = ClientManifest::new();
        manifest
            .register("btn#Counter", move || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    let component: Arc<dyn ClientComponent> =
                        Arc::new(|props: &Value| json!({"count": props["count"]}));
                    Ok(component)
                }
            })
            .unwrap();
        Arc::new(manifest)
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ModuleCache::new(counting_manifest(Arc::clone(&calls)));

        let (a, b) = tokio::join!(cache.load("btn#Counter"), cache.load("btn#Counter"));
        let a = a.unwrap();
        let b = b.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        cache.load("btn#Counter").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.load_count(), 1);
        assert!(cache.is_loaded("btn#Counter"));
    }

    #[tokio::test]
    async fn test_unknown_module() {
        let cache = ModuleCache::new(Arc::new(ClientManifest::new()));
        assert!(matches!(
            cache.load("nope#X").await,
            Err(ClientError::UnknownModule(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut manifest = ClientManifest::new();
        manifest
            .register("flaky#Widget", move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        anyhow::bail!("chunk 404");
                    }
                    let component: Arc<dyn ClientComponent> = Arc::new(|_: &Value| json!(null));
                    Ok(component)
                }
            })
            .unwrap();
        let cache = ModuleCache::new(Arc::new(manifest));

        assert!(matches!(
            cache.load("flaky#Widget").await,
            Err(ClientError::Load { .. })
        ));
        assert!(cache.load("flaky#Widget").await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
