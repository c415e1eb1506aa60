//! Remote proxy transport.
//!
//! The proxy is addressed by `https://<host>/<version>/<schema hash>`. The
//! schema is uploaded on connect; a `404` on a query means the proxy lost it,
//! so the schema is uploaded again and the query resent once.

use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use parking_lot::RwLock;
use photon_query::{BoxFuture, Engine, GqlBatchRequest, GqlRequest, QueryResult, photon_debug};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::ProxyConfig;
use crate::env::{EnvSource, StdEnvSource, resolve_reference};
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::{EngineState, Lifecycle};

/// Base64 form of the schema, as uploaded.
pub fn encode_schema(schema: &str) -> String {
    STANDARD.encode(format!("{}\n", schema))
}

/// Hex SHA-256 of the encoded schema.
pub fn hash_schema(schema: &str) -> String {
    hex::encode(Sha256::digest(encode_schema(schema).as_bytes()))
}

/// Host and API key parsed from a proxy connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    /// Host, with port when one is given.
    pub host: String,
    /// Value of the `api_key` query parameter.
    pub api_key: String,
}

/// Parse `prisma://<host>/?api_key=<key>`.
pub fn parse_connection_string(connection: &str) -> EngineResult<ProxyTarget> {
    let url = url::Url::parse(connection)
        .map_err(|e| EngineError::InvalidConnectionString(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| EngineError::InvalidConnectionString("missing host".into()))?;
    let host = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let api_key = url
        .query_pairs()
        .find(|(k, _)| k == "api_key")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            EngineError::InvalidConnectionString(
                "could not parse api key from the proxy connection string".into(),
            )
        })?;
    Ok(ProxyTarget { host, api_key })
}

#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    #[serde(rename = "schemaHash", default)]
    schema_hash: String,
}

/// Query engine reached through the remote proxy.
pub struct ProxyEngine {
    config: ProxyConfig,
    env: Arc<dyn EnvSource>,
    http: reqwest::Client,
    lifecycle: Lifecycle,
    endpoint: RwLock<Option<Endpoint>>,
}

impl std::fmt::Debug for ProxyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyEngine")
            .field("state", &self.lifecycle.state())
            .field("url", &self.endpoint.read().as_ref().map(|e| e.url.clone()))
            .finish()
    }
}

impl ProxyEngine {
    /// Create a proxy engine. Nothing is sent until `connect`.
    pub fn new(config: ProxyConfig) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            config,
            env: Arc::new(StdEnvSource),
            http,
            lifecycle: Lifecycle::new(),
            endpoint: RwLock::new(None),
        })
    }

    /// Resolve `env("...")` connection strings from `env` instead of the process.
    pub fn with_env_source(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    /// Current connection state.
    pub fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    /// Proxy URL, once connected.
    pub fn url(&self) -> Option<String> {
        self.endpoint.read().as_ref().map(|e| e.url.clone())
    }

    /// Endpoint URL for `host` and the configured schema.
    pub fn endpoint_url(&self, host: &str) -> String {
        let hash = hash_schema(&self.config.schema);
        let base = match &self.config.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}", host),
        };
        format!("{}/{}/{}", base, self.config.protocol_version, hash)
    }

    /// Parse the connection string and upload the schema.
    pub async fn start(&self) -> EngineResult<()> {
        let Some(previous) = self.lifecycle.begin_connect()? else {
            return Ok(());
        };
        let result = self.open().await;
        if result.is_err() {
            *self.endpoint.write() = None;
        }
        self.lifecycle.finish_connect(result.is_ok(), previous);
        result
    }

    async fn open(&self) -> EngineResult<()> {
        let connection = resolve_reference(&self.config.connection_string, self.env.as_ref())
            .ok_or_else(|| EngineError::InvalidConnectionString("no connection string found".into()))?;
        let target = parse_connection_string(&connection)?;

        let endpoint = Endpoint {
            url: self.endpoint_url(&target.host),
            api_key: target.api_key,
        };
        debug!(url = %endpoint.url, "using remote proxy");
        self.upload_schema(&endpoint).await?;
        *self.endpoint.write() = Some(endpoint);
        Ok(())
    }

    async fn upload_schema(&self, endpoint: &Endpoint) -> EngineResult<()> {
        debug!("uploading schema");
        let body = encode_schema(&self.config.schema).into_bytes();
        let response = self.send(endpoint, Method::PUT, "/schema", body).await?;
        let parsed: SchemaResponse = serde_json::from_slice(&response)?;
        debug!(remote_hash = %parsed.schema_hash, "schema upload done");
        Ok(())
    }

    async fn send(
        &self,
        endpoint: &Endpoint,
        method: Method,
        path: &str,
        body: Vec<u8>,
    ) -> EngineResult<Vec<u8>> {
        photon_debug!(payload = %String::from_utf8_lossy(&body), "proxy payload");
        let started = Instant::now();
        let response = self
            .http
            .request(method, format!("{}{}", endpoint.url, path))
            .bearer_auth(&endpoint.api_key)
            .body(body)
            .send()
            .await?;
        debug!(elapsed = ?started.elapsed(), "[timing] proxy raw request");

        let status = response.status();
        let bytes = response.bytes().await?;
        match status {
            StatusCode::OK | StatusCode::CREATED => Ok(bytes.to_vec()),
            StatusCode::NOT_FOUND => Err(EngineError::SchemaNotRegistered),
            other => Err(EngineError::Status {
                status: other.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }),
        }
    }

    /// Post a query, re-uploading the schema and retrying once on `404`.
    pub async fn post(&self, body: Vec<u8>) -> EngineResult<Vec<u8>> {
        self.lifecycle.ensure_connected()?;
        let endpoint = self.endpoint.read().clone().ok_or(EngineError::NotConnected)?;

        match self.send(&endpoint, Method::POST, "/graphql", body.clone()).await {
            Err(EngineError::SchemaNotRegistered) => {
                info!("schema not registered with the proxy, uploading again");
                self.upload_schema(&endpoint).await?;
                self.send(&endpoint, Method::POST, "/graphql", body).await
            }
            other => other,
        }
    }

    /// Mark the engine disconnected. No request is sent.
    pub async fn stop(&self) -> EngineResult<()> {
        self.lifecycle.begin_disconnect()?;
        *self.endpoint.write() = None;
        self.lifecycle.finish_disconnect();
        Ok(())
    }
}

impl Engine for ProxyEngine {
    fn name(&self) -> &'static str {
        "data-proxy"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnvSource;
    use photon_query::ErrorCode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_schema_hash() {
        assert_eq!(encode_schema("model A {}"), "bW9kZWwgQSB7fQo=");
        let hash = hash_schema("model A {}");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hex::encode(Sha256::digest(b"bW9kZWwgQSB7fQo=")));
    }

    #[test]
    fn test_parse_connection_string() {
        let target = parse_connection_string("prisma://aws-eu-west-1.example.com/?api_key=secret").unwrap();
        assert_eq!(
            target,
            ProxyTarget { host: "aws-eu-west-1.example.com".into(), api_key: "secret".into() }
        );

        let with_port = parse_connection_string("prisma://localhost:9000/?api_key=k").unwrap();
        assert_eq!(with_port.host, "localhost:9000");

        assert!(matches!(
            parse_connection_string("prisma://host/"),
            Err(EngineError::InvalidConnectionString(_))
        ));
        assert!(parse_connection_string("not a url").is_err());
    }

    #[test]
    fn test_endpoint_url() {
        let engine = ProxyEngine::new(ProxyConfig::new("model A {}", "")).unwrap();
        assert_eq!(
            engine.endpoint_url("proxy.example.com"),
            format!("https://proxy.example.com/3.0.1/{}", hash_schema("model A {}"))
        );

        let local = ProxyEngine::new(
            ProxyConfig::new("model A {}", "").with_base_url("http://127.0.0.1:4000/"),
        )
        .unwrap();
        assert!(local.endpoint_url("ignored").starts_with("http://127.0.0.1:4000/3.0.1/"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_connect() {
        let env = MapEnvSource::new().set("DATABASE_URL", "prisma://host.example.com/");
        let engine = ProxyEngine::new(ProxyConfig::new("schema", r#"env("DATABASE_URL")"#))
            .unwrap()
            .with_env_source(Arc::new(env));

        let err: photon_query::QueryError = engine.connect().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConnectionString);
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn test_request_before_connect() {
        let engine = ProxyEngine::new(ProxyConfig::new("schema", "prisma://h/?api_key=k")).unwrap();
        let err = engine.request(GqlRequest::new("query {}")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotConnected);
    }
}
