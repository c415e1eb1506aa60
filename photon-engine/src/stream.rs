//! Engine stderr capture.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One JSON log line written by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineMessage {
    /// Whether the engine panicked.
    #[serde(default)]
    pub is_panic: bool,
    /// Error text; empty for ordinary log lines.
    #[serde(default)]
    pub message: String,
}

/// Parse a stderr line, returning the error message it carries, if any.
pub fn parse_error_line(line: &str) -> Option<EngineMessage> {
    serde_json::from_str::<EngineMessage>(line)
        .ok()
        .filter(|m| !m.message.is_empty())
}

/// Most recent error the engine reported on stderr.
#[derive(Debug, Clone, Default)]
pub struct LastError(Arc<Mutex<Option<String>>>);

impl LastError {
    /// Empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last reported message.
    pub fn get(&self) -> Option<String> {
        self.0.lock().clone()
    }

    /// Record a message.
    pub fn set(&self, message: impl Into<String>) {
        *self.0.lock() = Some(message.into());
    }

    /// Forget the last message.
    pub fn clear(&self) {
        *self.0.lock() = None;
    }
}

/// Read `stderr` line by line until it closes, recording reported errors.
pub fn spawn_reader<R>(stderr: R, last_error: LastError) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_error_line(&line) {
                    Some(msg) => {
                        warn!(is_panic = msg.is_panic, message = %msg.message, "query engine error");
                        last_error.set(msg.message);
                    }
                    None => debug!(line = %line, "query engine"),
                },
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "stderr read failed");
                    break;
                }
            }
        }
        debug!("query engine stderr closed");
    })
}
