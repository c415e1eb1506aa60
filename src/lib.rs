//! # Photon
//!
//! Runtime for generated, type-safe clients of Prisma-compatible query engines.
//!
//! Photon provides:
//! - A query builder that renders the engine's query language
//! - Typed decoding of engine responses, including raw SQL results
//! - Transports to a local engine process or a remote proxy
//! - Batched transactions across several queries
//! - Schema push and introspection through the migration engines
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use photon::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct User {
//!     id: String,
//!     email: String,
//! }
//!
//! # async fn run() -> Result<(), photon::QueryError> {
//! let schema = std::fs::read_to_string("schema.prisma").unwrap_or_default();
//! let client = PhotonClient::local(EngineConfig::from_env(schema))?;
//! client.connect().await?;
//!
//! let users: Vec<User> = client
//!     .query("findMany", "User")
//!     .arg(Field::object("where", vec![Field::value("email", "a@example.com")]))
//!     .select(Selection::scalars(["id", "email"]))
//!     .exec()
//!     .await?;
//!
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod client;

pub use client::PhotonClient;

/// Query building, decoding and transactions.
pub mod query {
    pub use photon_query::*;
}

/// Engine transports and lifecycle.
pub mod engine {
    pub use photon_engine::*;
}

/// Migration and introspection engines.
pub mod migrate {
    pub use photon_migrate::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::PhotonClient;
    pub use photon_engine::prelude::*;
    pub use photon_query::prelude::*;
}

// Re-export key types at the crate root
pub use photon_engine::{EngineConfig, ProxyConfig};
pub use photon_query::{ErrorCode, QueryError, QueryResult};
