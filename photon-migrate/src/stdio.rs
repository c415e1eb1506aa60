//! One request, one response over a child process's stdin and stdout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::{MigrateError, MigrateResult};
use crate::jsonrpc::{Request, Response};

/// How to launch one engine call.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Engine name used in logs and errors.
    pub engine: &'static str,
    /// Executable path.
    pub binary: PathBuf,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Time allowed for the whole exchange.
    pub deadline: Duration,
}

/// Spawn the engine, write `request` as one line, and read one response line.
///
/// The child is killed once the line has been read or the deadline passes.
pub async fn call<P, R>(invocation: &Invocation, request: &Request<P>) -> MigrateResult<R>
where
    P: Serialize,
    R: DeserializeOwned,
{
    let started = Instant::now();
    let line = request.to_line()?;

    let mut child = Command::new(&invocation.binary)
        .args(&invocation.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| MigrateError::Spawn {
            engine: invocation.engine,
            source,
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| MigrateError::protocol("engine stdin is not piped"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| MigrateError::protocol("engine stdout is not piped"))?;

    let exchange = async {
        stdin.write_all(&line).await?;
        stdin.flush().await?;
        let mut reader = BufReader::new(stdout);
        let mut response = String::new();
        reader.read_line(&mut response).await?;
        Ok::<_, MigrateError>(response)
    };

    let outcome = tokio::time::timeout(invocation.deadline, exchange).await;
    if let Err(e) = child.start_kill() {
        debug!(engine = invocation.engine, error = %e, "engine already exited");
    }
    // stdin stays open until here so the engine does not see EOF mid-request
    drop(stdin);
    if let Err(e) = child.wait().await {
        debug!(engine = invocation.engine, error = %e, "failed to reap engine");
    }

    let response = outcome.map_err(|_| MigrateError::Timeout {
        engine: invocation.engine,
        deadline: invocation.deadline,
    })??;

    debug!(
        engine = invocation.engine,
        method = %request.method,
        elapsed = ?started.elapsed(),
        "[timing] engine call"
    );
    Response::<R>::parse(&response)?.into_result(&request.method)
}
