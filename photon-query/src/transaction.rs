//! Atomic multi-statement batches with per-statement results.
//!
//! Each participating query is turned into a [`TxResult`], which owns a
//! one-shot channel for its own result. [`Transaction::exec`] renders every
//! participant, sends them as one transactional batch and, only when every
//! statement succeeded, delivers each raw result to its channel in order.
//!
//! Channels are closed on every exit path because the senders live inside the
//! [`Transaction`] value, which `exec` consumes. Reading a result therefore
//! never blocks:
//! - before `exec`: [`TransactionNotExecuted`](crate::ErrorCode::TransactionNotExecuted)
//! - after a failed `exec`: [`TransactionResultUnavailable`](crate::ErrorCode::TransactionResultUnavailable)
//! - after a successful `exec`: the decoded value
//!
//! ```rust,ignore
//! let create = client.query(Operation::Mutation, "createOne", "User")
//!     .arg(data)
//!     .select(Selection::scalars(["id"]))
//!     .tx::<User>();
//! let count = client.raw().execute_raw("UPDATE stats SET n = n + 1", vec![]).tx();
//!
//! client.transaction().add(&create).add(&count).exec().await?;
//!
//! let user = create.result()?;
//! let affected = count.result()?.count;
//! ```

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::debug;

use crate::decode::{decode_result, parse_batch_envelope};
use crate::error::{ErrorCode, QueryError, QueryResult};
use crate::protocol::{GqlBatchRequest, GqlRequest};
use crate::query::{Query, with_deadline};
use crate::traits::Engine;
use crate::transform::DecodeMode;

struct Slot {
    sender: Mutex<Option<oneshot::Sender<String>>>,
    receiver: Mutex<Option<oneshot::Receiver<String>>>,
    cache: Mutex<Option<String>>,
    mode: DecodeMode,
}

/// A query participating in a transaction, and later its result.
pub struct TxResult<T> {
    query: Query,
    slot: Arc<Slot>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for TxResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxResult")
            .field("query", &self.query)
            .field("ready", &self.slot.cache.lock().is_some())
            .finish()
    }
}

impl<T> TxResult<T> {
    /// Wrap a query so it can join a transaction.
    pub fn new(query: Query) -> Self {
        let (sender, receiver) = oneshot::channel();
        let mode = query.decode_mode;
        Self {
            query,
            slot: Arc::new(Slot {
                sender: Mutex::new(Some(sender)),
                receiver: Mutex::new(Some(receiver)),
                cache: Mutex::new(None),
                mode,
            }),
            _marker: PhantomData,
        }
    }

    /// The participating query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    fn raw_result(&self) -> QueryResult<String> {
        if let Some(cached) = self.slot.cache.lock().as_ref() {
            return Ok(cached.clone());
        }

        let mut receiver = self.slot.receiver.lock();
        let outcome = match receiver.as_mut() {
            Some(rx) => rx.try_recv(),
            None => Err(TryRecvError::Closed),
        };
        match outcome {
            Ok(raw) => {
                *receiver = None;
                *self.slot.cache.lock() = Some(raw.clone());
                Ok(raw)
            }
            Err(TryRecvError::Empty) => Err(QueryError::new(
                ErrorCode::TransactionNotExecuted,
                "transaction has not been executed yet",
            )
            .with_suggestion("Await Transaction::exec before reading results")),
            Err(TryRecvError::Closed) => Err(QueryError::new(
                ErrorCode::TransactionResultUnavailable,
                "result not fetched: the transaction failed or was dropped",
            )),
        }
    }
}

impl<T: DeserializeOwned> TxResult<T> {
    /// Decode this statement's result.
    ///
    /// Never blocks; see the module docs for the error cases.
    pub fn result(&self) -> QueryResult<T> {
        let raw = self.raw_result()?;
        debug!(result = %raw, "tx result");
        decode_result(&raw, self.slot.mode)
    }
}

/// Something that can join a [`Transaction`].
pub trait TxParticipant {
    /// The query to run.
    fn participant_query(&self) -> &Query;

    /// Hand over the result sender; fails if already taken.
    fn take_sender(&self) -> QueryResult<oneshot::Sender<String>>;
}

impl<T> TxParticipant for TxResult<T> {
    fn participant_query(&self) -> &Query {
        &self.query
    }

    fn take_sender(&self) -> QueryResult<oneshot::Sender<String>> {
        self.slot.sender.lock().take().ok_or_else(|| {
            QueryError::new(
                ErrorCode::AlreadyInTransaction,
                "query already belongs to a transaction",
            )
        })
    }
}

impl Query {
    /// Turn this query into a transaction participant decoding into `T`.
    pub fn tx<T>(self) -> TxResult<T> {
        TxResult::new(self)
    }
}

/// A pending transactional batch.
pub struct Transaction {
    engine: Arc<dyn Engine>,
    requests: Vec<GqlRequest>,
    senders: Vec<oneshot::Sender<String>>,
    error: Option<QueryError>,
    created_at: Instant,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("engine", &self.engine.name())
            .field("statements", &self.requests.len())
            .field("error", &self.error)
            .finish()
    }
}

impl Transaction {
    /// Start an empty transaction on `engine`.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            requests: Vec::new(),
            senders: Vec::new(),
            error: None,
            created_at: Instant::now(),
        }
    }

    /// Add a participant, rendering its query now.
    ///
    /// A failure is kept and returned by [`exec`](Self::exec) before anything is sent.
    /// Participants of a failed transaction read `TransactionResultUnavailable`.
    pub fn add<P: TxParticipant + ?Sized>(mut self, participant: &P) -> Self {
        let sender = match participant.take_sender() {
            Ok(sender) => sender,
            Err(err) => {
                self.error.get_or_insert(err);
                return self;
            }
        };
        if self.error.is_some() {
            // dropping the sender closes the participant's channel
            return self;
        }
        match participant.participant_query().build() {
            Ok(text) => {
                self.requests.push(GqlRequest::new(text));
                self.senders.push(sender);
            }
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Number of statements.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Check for an empty transaction.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Send the batch and deliver per-statement results.
    ///
    /// Any failure (build, transport, batch-level or statement-level) is
    /// returned here and no participant receives data.
    pub async fn exec(self) -> QueryResult<()> {
        let Transaction {
            engine,
            requests,
            senders,
            error,
            created_at,
        } = self;

        if let Some(err) = error {
            return Err(err);
        }

        let count = requests.len();
        debug!(statements = count, "sending transaction");
        let payload = GqlBatchRequest {
            batch: requests,
            transaction: true,
        };
        let body = engine
            .batch(payload)
            .await
            .map_err(|e| e.with_context("executing transaction"))?;
        let results = parse_batch_envelope(&body)?;

        if results.len() != count {
            return Err(QueryError::malformed_response(format!(
                "expected {} batch results, got {}",
                count,
                results.len()
            )));
        }

        for (sender, raw) in senders.into_iter().zip(results) {
            // receiver may already be gone
            let _ = sender.send(raw);
        }
        debug!(elapsed = ?created_at.elapsed(), "[timing] transaction");
        Ok(())
    }

    /// Like [`exec`](Self::exec) with a caller deadline.
    pub async fn exec_timeout(self, deadline: Duration) -> QueryResult<()> {
        with_deadline(deadline, self.exec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Field, Selection};
    use crate::mock::MockEngine;
    use crate::protocol::GqlError;
    use crate::query::Operation;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: String,
    }

    fn create(engine: &Arc<MockEngine>, id: &str) -> Query {
        Query::new(Operation::Mutation, "createOne", "User")
            .with_engine(engine.clone())
            .arg(Field::object("data", vec![Field::value("id", id)]))
            .select(Selection::scalars(["id"]))
    }

    #[tokio::test]
    async fn test_results_delivered_in_order() {
        let engine = Arc::new(MockEngine::new());
        let a = create(&engine, "a");
        let b = create(&engine, "b");
        engine.expect(&a).returns(json!({"id": "a"}));
        engine.expect(&b).returns(json!({"id": "b"}));

        let a = a.tx::<User>();
        let b = b.tx::<User>();
        Transaction::new(engine.clone()).add(&a).add(&b).exec().await.unwrap();

        assert_eq!(a.result().unwrap(), User { id: "a".into() });
        assert_eq!(b.result().unwrap(), User { id: "b".into() });
        // cached
        assert_eq!(a.result().unwrap(), User { id: "a".into() });
        engine.ensure();
    }

    #[tokio::test]
    async fn test_statement_error_fails_all() {
        let engine = Arc::new(MockEngine::new());
        let a = create(&engine, "a");
        let b = create(&engine, "b");
        engine.expect(&a).returns(json!({"id": "a"}));
        engine.expect(&b).errors(GqlError::new("Unique constraint failed"));

        let a = a.tx::<User>();
        let b = b.tx::<User>();
        let err = Transaction::new(engine.clone()).add(&a).add(&b).exec().await.unwrap_err();
        assert_eq!(err.message, "pql error: Unique constraint failed");

        for result in [a.result(), b.result()] {
            assert_eq!(result.unwrap_err().code, ErrorCode::TransactionResultUnavailable);
        }
    }

    #[tokio::test]
    async fn test_result_before_exec() {
        let engine = Arc::new(MockEngine::new());
        let a = create(&engine, "a").tx::<User>();
        assert_eq!(a.result().unwrap_err().code, ErrorCode::TransactionNotExecuted);

        let tx = Transaction::new(engine.clone()).add(&a);
        assert_eq!(a.result().unwrap_err().code, ErrorCode::TransactionNotExecuted);
        drop(tx);
        assert_eq!(a.result().unwrap_err().code, ErrorCode::TransactionResultUnavailable);
    }

    #[tokio::test]
    async fn test_build_error_fails_before_dispatch() {
        let engine = Arc::new(MockEngine::new());
        let ok = create(&engine, "a").tx::<User>();
        let bad = create(&engine, "b")
            .arg(Field::value("take", 1))
            .arg(Field::value("take", 2))
            .tx::<User>();

        let err = Transaction::new(engine.clone()).add(&ok).add(&bad).exec().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateField);
        assert_eq!(engine.batch_count(), 0);
        assert_eq!(ok.result().unwrap_err().code, ErrorCode::TransactionResultUnavailable);
        assert_eq!(bad.result().unwrap_err().code, ErrorCode::TransactionResultUnavailable);
    }

    #[tokio::test]
    async fn test_participants_after_build_error_are_closed() {
        let engine = Arc::new(MockEngine::new());
        let bad = create(&engine, "a")
            .arg(Field::value("take", 1))
            .arg(Field::value("take", 2))
            .tx::<User>();
        let later = create(&engine, "b").tx::<User>();

        let tx = Transaction::new(engine.clone()).add(&bad).add(&later);
        assert!(tx.is_empty());
        assert_eq!(bad.result().unwrap_err().code, ErrorCode::TransactionResultUnavailable);
        assert_eq!(later.result().unwrap_err().code, ErrorCode::TransactionResultUnavailable);

        assert_eq!(tx.exec().await.unwrap_err().code, ErrorCode::DuplicateField);
        assert_eq!(engine.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_participant_joins_once() {
        let engine = Arc::new(MockEngine::new());
        let a = create(&engine, "a").tx::<User>();
        let _first = Transaction::new(engine.clone()).add(&a);
        let err = Transaction::new(engine.clone()).add(&a).exec().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyInTransaction);
    }
}
