//! Client handle owning one engine.

use std::fmt;
use std::sync::Arc;

use photon_engine::{EngineConfig, LocalEngine, ProxyConfig, ProxyEngine};
use photon_query::{Engine, Operation, Query, QueryResult, QueryString, Raw, Transaction};
use tracing::info;

/// Entry point for generated data-access code.
///
/// Each client owns exactly one engine handle. Applications serving several
/// schemas keep several clients, or an
/// [`EngineRegistry`](photon_engine::EngineRegistry).
#[derive(Clone)]
pub struct PhotonClient {
    engine: Arc<dyn Engine>,
}

impl fmt::Debug for PhotonClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotonClient")
            .field("engine", &self.engine.name())
            .finish()
    }
}

impl PhotonClient {
    /// Client backed by a local engine process.
    pub fn local(config: EngineConfig) -> QueryResult<Self> {
        config.validate()?;
        let engine = LocalEngine::new(config)?;
        Ok(Self::with_engine(Arc::new(engine)))
    }

    /// Client backed by the remote proxy.
    pub fn proxy(config: ProxyConfig) -> QueryResult<Self> {
        let engine = ProxyEngine::new(config)?;
        Ok(Self::with_engine(Arc::new(engine)))
    }

    /// Client backed by any engine, e.g. a [`MockEngine`](photon_query::MockEngine).
    pub fn with_engine(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// The engine this client sends to.
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Connect the engine. Connecting twice is a no-op.
    pub async fn connect(&self) -> QueryResult<()> {
        self.engine.connect().await?;
        info!(engine = self.engine.name(), "client connected");
        Ok(())
    }

    /// Disconnect the engine.
    pub async fn disconnect(&self) -> QueryResult<()> {
        self.engine.disconnect().await?;
        info!(engine = self.engine.name(), "client disconnected");
        Ok(())
    }

    /// Start a read query, e.g. `query("findMany", "User")`.
    pub fn query(&self, method: impl Into<String>, model: impl Into<String>) -> Query {
        Query::new(Operation::Query, method, model).with_engine(Arc::clone(&self.engine))
    }

    /// Start a write query, e.g. `mutation("createOne", "User")`.
    pub fn mutation(&self, method: impl Into<String>, model: impl Into<String>) -> Query {
        Query::new(Operation::Mutation, method, model).with_engine(Arc::clone(&self.engine))
    }

    /// Raw SQL and command helpers.
    pub fn raw(&self) -> Raw {
        Raw::new(Arc::clone(&self.engine))
    }

    /// Send pre-built query text as is.
    pub fn query_string(&self, text: impl Into<String>) -> QueryString {
        QueryString::new(text).with_engine(Arc::clone(&self.engine))
    }

    /// Start a transaction on this client's engine.
    pub fn transaction(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.engine))
    }
}
