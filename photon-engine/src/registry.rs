//! Keyed engine handles owned by the application.
//!
//! Applications that serve several schemas keep one connected engine per key.
//! The registry creates engines on first use through an [`EngineFactory`],
//! and tears them down on `reload`, `remove` or `disconnect_all`.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use photon_query::{Engine, QueryResult};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Creates an unconnected engine for a key.
#[async_trait]
pub trait EngineFactory<K>: Send + Sync {
    /// Build the engine for `key`. The registry connects it.
    async fn create(&self, key: &K) -> QueryResult<Arc<dyn Engine>>;
}

type Slot = Arc<OnceCell<Arc<dyn Engine>>>;

/// Map from caller-supplied key to a connected engine.
///
/// The map lock only guards slot lookup. Connects and disconnects run
/// outside it, so a slow engine never stalls other keys.
pub struct EngineRegistry<K> {
    factory: Arc<dyn EngineFactory<K>>,
    engines: Mutex<HashMap<K, Slot>>,
}

impl<K: fmt::Debug> fmt::Debug for EngineRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry").finish_non_exhaustive()
    }
}

impl<K> EngineRegistry<K>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync,
{
    /// Create an empty registry.
    pub fn new(factory: Arc<dyn EngineFactory<K>>) -> Self {
        Self {
            factory,
            engines: Mutex::new(HashMap::new()),
        }
    }

    async fn open(&self, key: &K) -> QueryResult<Arc<dyn Engine>> {
        let engine = self.factory.create(key).await?;
        engine.connect().await?;
        debug!(?key, engine = engine.name(), "engine connected");
        Ok(engine)
    }

    /// Connect `slot` unless another caller already did. A failed connect
    /// leaves no entry behind.
    async fn fill(&self, key: &K, slot: Slot) -> QueryResult<Arc<dyn Engine>> {
        match slot.get_or_try_init(|| self.open(key)).await {
            Ok(engine) => Ok(Arc::clone(engine)),
            Err(e) => {
                let mut engines = self.engines.lock();
                if engines
                    .get(key)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot) && !current.initialized())
                {
                    engines.remove(key);
                }
                Err(e)
            }
        }
    }

    /// The engine for `key`, creating and connecting it on first use.
    ///
    /// Concurrent callers for a missing key wait for the same connect.
    pub async fn get_or_connect(&self, key: &K) -> QueryResult<Arc<dyn Engine>> {
        let slot = Arc::clone(self.engines.lock().entry(key.clone()).or_default());
        self.fill(key, slot).await
    }

    /// Replace the engine for `key` with a freshly connected one.
    pub async fn reload(&self, key: &K) -> QueryResult<Arc<dyn Engine>> {
        let slot = Slot::default();
        let old = self.engines.lock().insert(key.clone(), Arc::clone(&slot));

        if let Some(old) = old.as_ref().and_then(|s| s.get()) {
            if let Err(e) = old.disconnect().await {
                warn!(?key, error = %e, "failed to disconnect replaced engine");
            }
        }
        self.fill(key, slot).await
    }

    /// Disconnect and forget the engine for `key`. Returns whether one existed.
    pub async fn remove(&self, key: &K) -> QueryResult<bool> {
        let removed = self.engines.lock().remove(key);
        match removed.as_ref().and_then(|s| s.get()) {
            Some(engine) => {
                engine.disconnect().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Disconnect every engine, returning the first failure.
    pub async fn disconnect_all(&self) -> QueryResult<()> {
        let drained: Vec<(K, Arc<dyn Engine>)> = self
            .engines
            .lock()
            .drain()
            .filter_map(|(key, slot)| slot.get().map(|engine| (key, Arc::clone(engine))))
            .collect();
        let results = join_all(drained.iter().map(|(_, engine)| engine.disconnect())).await;

        let mut first = None;
        for ((key, _), result) in drained.iter().zip(results) {
            if let Err(e) = result {
                warn!(?key, error = %e, "failed to disconnect engine");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Whether a connected engine is registered for `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.engines
            .lock()
            .get(key)
            .is_some_and(|slot| slot.initialized())
    }

    /// Number of connected engines.
    pub fn len(&self) -> usize {
        self.engines
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Whether no connected engine is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
