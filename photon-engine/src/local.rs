//! Query engine running as a local child process.
//!
//! `connect` locates the executable, starts it on a free port with the schema
//! in its environment, and polls `/status` until the engine answers `ok`.
//! Requests are JSON `POST`s to `/`. `disconnect` interrupts the process and
//! waits for it to exit.

use std::net::TcpListener;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use parking_lot::RwLock;
use photon_query::{BoxFuture, Engine, GqlBatchRequest, GqlRequest, QueryResult, photon_debug};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::binary::{BinaryLocator, FsBinaryLocator, check_version};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::{EngineState, Lifecycle};
use crate::stream::{LastError, spawn_reader};

/// Datasource URL override passed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasourceOverride {
    /// Datasource block name.
    pub name: String,
    /// Connection URL.
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

/// Ask the OS for a free TCP port on the loopback interface.
pub fn free_port() -> EngineResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Environment passed to the engine process.
pub fn engine_env(config: &EngineConfig) -> EngineResult<Vec<(String, String)>> {
    let mut env = vec![
        ("PRISMA_DML".to_string(), config.schema.clone()),
        (
            "RUST_LOG".to_string(),
            if config.debug { "info" } else { "error" }.to_string(),
        ),
        ("RUST_LOG_FORMAT".to_string(), "json".to_string()),
        ("PRISMA_CLIENT_ENGINE_TYPE".to_string(), "binary".to_string()),
        ("PRISMA_ENGINE_PROTOCOL".to_string(), "graphql".to_string()),
    ];

    if config.debug {
        env.push(("PRISMA_LOG_QUERIES".to_string(), "y".to_string()));
    }

    if let Some((name, url)) = &config.datasource_override {
        let overrides = vec![DatasourceOverride {
            name: name.clone(),
            url: url.clone(),
        }];
        let raw = serde_json::to_vec(&overrides)?;
        env.push(("OVERWRITE_DATASOURCES".to_string(), URL_SAFE.encode(raw)));
    }

    Ok(env)
}

/// Whether an exit status counts as a clean shutdown after an interrupt.
pub fn is_clean_exit(status: &ExitStatus) -> bool {
    if status.success() {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        // the engine often dies from the interrupt itself
        if status.signal() == Some(nix::sys::signal::Signal::SIGINT as i32) {
            return true;
        }
    }
    false
}

/// Query engine child process, or an engine attached by URL.
pub struct LocalEngine {
    config: EngineConfig,
    locator: Arc<dyn BinaryLocator>,
    http: reqwest::Client,
    lifecycle: Lifecycle,
    base_url: RwLock<Option<String>>,
    process: Mutex<Option<Child>>,
    last_error: LastError,
}

impl std::fmt::Debug for LocalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEngine")
            .field("state", &self.lifecycle.state())
            .field("base_url", &*self.base_url.read())
            .field("locator", &self.locator)
            .finish()
    }
}

impl LocalEngine {
    /// Create an engine for `config`. Nothing is started until `connect`.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            locator: Arc::new(FsBinaryLocator::new()),
            http,
            lifecycle: Lifecycle::new(),
            base_url: RwLock::new(None),
            process: Mutex::new(None),
            last_error: LastError::new(),
        })
    }

    /// Use a different binary locator.
    pub fn with_locator(mut self, locator: Arc<dyn BinaryLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current connection state.
    pub fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    /// Base URL of the running engine, once connected.
    pub fn base_url(&self) -> Option<String> {
        self.base_url.read().clone()
    }

    /// Last error the engine printed on stderr.
    pub fn last_engine_error(&self) -> Option<String> {
        self.last_error.get()
    }

    /// Start or attach to the engine. Connecting a connected engine is a no-op.
    pub async fn start(&self) -> EngineResult<()> {
        let Some(previous) = self.lifecycle.begin_connect()? else {
            debug!("query engine already connected");
            return Ok(());
        };

        let started = Instant::now();
        let result = match self.config.engine_url.clone() {
            Some(url) => self.attach(url).await,
            None => self.spawn().await,
        };
        self.lifecycle.finish_connect(result.is_ok(), previous);

        match &result {
            Ok(()) => info!(elapsed = ?started.elapsed(), "connected to query engine"),
            Err(e) => warn!(error = %e, "query engine connect failed"),
        }
        result
    }

    async fn attach(&self, url: String) -> EngineResult<()> {
        let url = url.trim_end_matches('/').to_string();
        debug!(url = %url, "attaching to running query engine");
        self.wait_ready(&url, None).await?;
        *self.base_url.write() = Some(url);
        Ok(())
    }

    async fn spawn(&self) -> EngineResult<()> {
        let binary = self.locator.locate(&self.config)?;
        if !binary.explicit {
            check_version(&binary.path, &self.config.engine_version).await?;
        }

        let port = free_port()?;
        let url = format!("http://localhost:{}", port);
        debug!(path = %binary.path.display(), port, "starting query engine");

        let port_arg = port.to_string();
        let mut child = Command::new(&binary.path)
            .args(["-p", port_arg.as_str(), "--enable-raw-queries"])
            .envs(engine_env(&self.config)?)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        self.last_error.clear();
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, self.last_error.clone());
        }

        if let Err(e) = self.wait_ready(&url, Some(&mut child)).await {
            if let Err(kill) = child.kill().await {
                debug!(error = %kill, "failed to stop engine after failed start");
            }
            return Err(e);
        }

        *self.base_url.write() = Some(url);
        *self.process.lock().await = Some(child);
        Ok(())
    }

    async fn wait_ready(&self, url: &str, mut child: Option<&mut Child>) -> EngineResult<()> {
        let policy = self.config.health_check;
        let mut last = String::from("no attempt made");

        for attempt in 1..=policy.attempts {
            if let Some(message) = self.last_error.get() {
                return Err(EngineError::Startup(message));
            }
            if let Some(child) = child.as_deref_mut() {
                if let Some(status) = child.try_wait()? {
                    return Err(EngineError::Exit(format!("exited during startup with {}", status)));
                }
            }

            match self.probe(url).await {
                Ok(()) => {
                    debug!(attempt, "query engine ready");
                    return Ok(());
                }
                Err(e) => {
                    last = e.to_string();
                    trace!(attempt, error = %last, "query engine not ready, retrying");
                }
            }
            tokio::time::sleep(policy.interval).await;
        }

        Err(EngineError::HealthCheck {
            attempts: policy.attempts,
            last,
        })
    }

    async fn probe(&self, url: &str) -> EngineResult<()> {
        let body = self.send_to(url, Method::GET, "/status", None).await?;
        let response: StatusResponse = serde_json::from_slice(&body)?;
        if response.status != "ok" {
            return Err(EngineError::startup(format!("unexpected status: {}", response.status)));
        }
        Ok(())
    }

    /// Send a raw request to the engine.
    ///
    /// With `require_connected`, the request is refused unless the engine is
    /// connected; no I/O happens in that case.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        require_connected: bool,
    ) -> EngineResult<Vec<u8>> {
        if require_connected {
            self.lifecycle.ensure_connected()?;
        }
        let url = self.base_url().ok_or(EngineError::NotConnected)?;
        self.send_to(&url, method, path, body).await
    }

    async fn send_to(
        &self,
        base: &str,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> EngineResult<Vec<u8>> {
        let mut request = self.http.request(method, format!("{}{}", base, path));
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let started = Instant::now();
        let response = request.send().await?;
        let elapsed = started.elapsed();
        debug!(?elapsed, "[timing] query engine raw request");
        log_engine_elapsed(&response, elapsed);

        let status = response.status();
        let bytes = response.bytes().await?;
        if status != StatusCode::OK {
            return Err(EngineError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }

    async fn post(&self, body: Vec<u8>) -> EngineResult<Vec<u8>> {
        photon_debug!(payload = %String::from_utf8_lossy(&body), "query engine payload");
        self.send(Method::POST, "/", Some(body), true).await
    }

    /// Stop the engine. Calling it before `connect` or twice is an error.
    pub async fn stop(&self) -> EngineResult<()> {
        self.lifecycle.begin_disconnect()?;
        let result = self.shutdown().await;
        *self.base_url.write() = None;
        self.lifecycle.finish_disconnect();
        result
    }

    async fn shutdown(&self) -> EngineResult<()> {
        let Some(mut child) = self.process.lock().await.take() else {
            debug!("detached from query engine");
            return Ok(());
        };
        debug!("disconnecting query engine");

        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            let Some(pid) = child.id() else {
                return Ok(());
            };
            kill(Pid::from_raw(pid as i32), Signal::SIGINT)
                .map_err(|e| EngineError::Io(std::io::Error::from(e)))?;
            let status = child.wait().await?;
            if !is_clean_exit(&status) {
                return Err(EngineError::Exit(status.to_string()));
            }
        }

        #[cfg(not(unix))]
        child.kill().await?;

        debug!("query engine disconnected");
        Ok(())
    }
}

fn log_engine_elapsed(response: &reqwest::Response, total: std::time::Duration) {
    let Some(engine_us) = response
        .headers()
        .get("x-elapsed")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    else {
        return;
    };
    let engine = std::time::Duration::from_micros(engine_us);
    debug!(?engine, http = ?total.saturating_sub(engine), "[timing] engine elapsed");
}

impl Engine for LocalEngine {
    fn name(&self) -> &'static str {
        "query-engine"
    }

    fn connect(&self) -> BoxFuture<'_, QueryResult<()>> {
        Box::pin(async move { Ok(self.start().await?) })
    }

    fn disconnect(&self) -> BoxFuture<'_, QueryResult<()>> {
        Box::pin(async move { Ok(self.stop().await?) })
    }

    fn request(&self, request: GqlRequest) -> BoxFuture<'_, QueryResult<Vec<u8>>> {
        Box::pin(async move {
            let body = serde_json::to_vec(&request)?;
            Ok(self.post(body).await?)
        })
    }

    fn batch(&self, request: GqlBatchRequest) -> BoxFuture<'_, QueryResult<Vec<u8>>> {
        Box::pin(async move {
            let body = serde_json::to_vec(&request)?;
            Ok(self.post(body).await?)
        })
    }
}
