//! # photon-query
//!
//! Query construction, wire protocol and response decoding for the Photon
//! client.
//!
//! This crate provides:
//! - [`Value`]: literal values and their query-language encoding
//! - [`Field`] / [`Selection`] / [`Query`]: field trees rendered into query text,
//!   with deterministic merging of repeated fields
//! - [`decode`]: envelope decoding, error mapping and result transforms
//! - [`Transaction`] / [`TxResult`]: atomic batches with per-statement results
//! - [`raw`]: raw SQL and command helpers plus the [`Sql`] builder
//! - [`Engine`]: the transport seam, with [`MockEngine`] for tests
//!
//! Transports live in `photon-engine`.
//!
//! ## Building a query
//!
//! ```rust
//! use photon_query::{Field, Operation, Query, Selection, Value};
//!
//! let query = Query::new(Operation::Query, "findMany", "Post")
//!     .arg(Field::object("where", vec![Field::value("published", true)]))
//!     .arg(Field::list("orderBy", vec![
//!         Field::element(vec![Field::value("createdAt", Value::raw("desc"))]),
//!     ]))
//!     .select(Selection::scalars(["id", "title"]));
//!
//! assert_eq!(
//!     query.build_inner().unwrap(),
//!     "findManyPost(where:{published:true},orderBy:[{createdAt:desc}]) {id title}"
//! );
//! ```
//!
//! ## Error handling
//!
//! ```rust
//! use photon_query::{Field, Operation, Query, ErrorCode};
//!
//! let query = Query::new(Operation::Query, "findFirst", "User")
//!     .arg(Field::object("where", vec![
//!         Field::value("email", "a@example.com"),
//!         Field::value("email", "b@example.com"),
//!     ]));
//!
//! let err = query.build().unwrap_err();
//! assert_eq!(err.code, ErrorCode::DuplicateField);
//! ```

pub mod builder;
pub mod decode;
pub mod error;
pub mod logging;
pub mod mock;
pub mod protocol;
pub mod query;
pub mod raw;
pub mod tagged;
pub mod traits;
pub mod transaction;
pub mod transform;
pub mod types;
pub mod value;

pub use builder::{COMBINATORS, Field, FieldContent, Selection};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult};
pub use mock::MockEngine;
pub use protocol::{
    ErrorMeta, ErrorTarget, GqlBatchRequest, GqlError, GqlRequest, GqlResponse, UserFacingError,
};
pub use query::{Operation, Query, QueryString, with_deadline};
pub use raw::{ExecuteRawExec, Placeholder, QueryRawExec, Raw, Sql};
pub use traits::{BoxFuture, Engine};
pub use transaction::{Transaction, TxParticipant, TxResult};
pub use transform::DecodeMode;
pub use types::{BatchResult, BigInt, Json};
pub use value::Value;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::builder::{Field, Selection};
    pub use crate::error::{ErrorCode, QueryError, QueryResult};
    pub use crate::query::{Operation, Query};
    pub use crate::raw::{Raw, Sql};
    pub use crate::traits::Engine;
    pub use crate::transaction::{Transaction, TxResult};
    pub use crate::types::{BatchResult, BigInt, Json};
    pub use crate::value::Value;
}
