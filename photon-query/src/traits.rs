//! The engine seam shared by every transport.

use std::future::Future;
use std::pin::Pin;

use crate::error::QueryResult;
use crate::protocol::{GqlBatchRequest, GqlRequest};

/// A boxed future returned by [`Engine`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that answers rendered queries with response envelopes.
///
/// Implementations return the raw response body; decoding happens in
/// [`crate::decode`] so every transport shares the same error mapping.
/// The trait is object safe and is usually held as `Arc<dyn Engine>`.
pub trait Engine: Send + Sync {
    /// Short transport name used in logs.
    fn name(&self) -> &'static str;

    /// Start or attach to the engine.
    fn connect(&self) -> BoxFuture<'_, QueryResult<()>>;

    /// Stop or detach from the engine.
    fn disconnect(&self) -> BoxFuture<'_, QueryResult<()>>;

    /// Send one query and return the response envelope body.
    fn request(&self, request: GqlRequest) -> BoxFuture<'_, QueryResult<Vec<u8>>>;

    /// Send a batch and return the batch envelope body.
    fn batch(&self, request: GqlBatchRequest) -> BoxFuture<'_, QueryResult<Vec<u8>>>;
}
