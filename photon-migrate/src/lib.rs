//! # photon-migrate
//!
//! Schema push and introspection through the migration engines.
//!
//! Both engines are separate executables that read one JSON-RPC 2.0 request
//! line from stdin and answer with one response line on stdout:
//!
//! - [`MigrationEngine::push`] sends `schemaPush` and returns the applied steps
//! - [`IntrospectionEngine::pull`] sends `introspect` and returns the
//!   datamodel of the live database
//!
//! The executables are found through `PHOTON_MIGRATION_ENGINE_BINARY` /
//! `PHOTON_INTROSPECTION_ENGINE_BINARY`, or in the engine cache directory.
//!
//! ## Example
//!
//! ```rust,no_run
//! use photon_migrate::MigrationEngine;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let outcome = MigrationEngine::new()?.push("schema.prisma", false).await?;
//! println!("applied {} steps", outcome.executed_steps);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod introspect;
pub mod jsonrpc;
pub mod locate;
pub mod migrate;
pub mod stdio;

#[cfg(all(test, unix))]
mod test_support;

pub use error::{MigrateError, MigrateResult};
pub use introspect::IntrospectionEngine;
pub use migrate::{MigrationEngine, PushOutcome};
