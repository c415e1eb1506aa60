//! # photon-engine
//!
//! Transports that carry rendered queries to a query engine.
//!
//! This crate provides:
//! - [`LocalEngine`]: starts the engine executable as a child process, or
//!   attaches to one already running, and talks to it over local HTTP
//! - [`ProxyEngine`]: talks to a remote proxy keyed by a schema hash, with one
//!   transparent schema re-upload when the proxy has forgotten the schema
//! - [`EngineRegistry`]: application-owned map from key to connected engine
//! - Binary lookup, platform naming and configuration helpers
//!
//! Both transports implement [`photon_query::Engine`] and refuse requests
//! before `connect` or after `disconnect` without doing any I/O.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use photon_engine::{EngineConfig, LocalEngine};
//! use photon_query::{Engine, Operation, Query, Selection};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(LocalEngine::new(EngineConfig::from_env("model User { id String @id }"))?);
//! engine.connect().await?;
//!
//! let users: Vec<serde_json::Value> = Query::new(Operation::Query, "findMany", "User")
//!     .with_engine(engine.clone())
//!     .select(Selection::scalars(["id"]))
//!     .exec()
//!     .await?;
//!
//! engine.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod binary;
pub mod config;
pub mod env;
pub mod error;
pub mod lifecycle;
pub mod local;
pub mod platform;
pub mod proxy;
pub mod registry;
pub mod stream;

pub use binary::{BinaryLocator, FsBinaryLocator, ResolvedBinary};
pub use config::{EngineConfig, EngineConfigBuilder, HealthCheck, ProxyConfig};
pub use env::{EnvSource, MapEnvSource, StdEnvSource};
pub use error::{EngineError, EngineResult};
pub use lifecycle::EngineState;
pub use local::LocalEngine;
pub use platform::Platform;
pub use proxy::ProxyEngine;
pub use registry::{EngineFactory, EngineRegistry};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{EngineConfig, ProxyConfig};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::local::LocalEngine;
    pub use crate::proxy::ProxyEngine;
    pub use crate::registry::{EngineFactory, EngineRegistry};
}
