//! Backend discovery over the backend inspector's HTTP `/json` endpoints.
//!
//! Requests go through the shared [`Transports`] table rather than a private
//! HTTP client, so when a front-end has `Network` enabled the bridge's own
//! discovery traffic shows up in its Network panel like any other request.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use devtools_plus_core::network::transport::{
    split_url, OutboundRequest, TransportError, TransportKind, TransportResponse, Transports,
};

use crate::domain::descriptor::TargetDescriptor;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("backend request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("backend answered {url} with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("backend sent malformed JSON for {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("backend at {0} lists no debuggable targets")]
    NoTargets(String),

    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] TransportError),
}

/// A raw backend reply, for endpoints the bridge passes through untouched.
#[derive(Debug, Clone)]
pub struct BackendReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Fetches discovery documents from one backend.
pub struct DiscoveryClient {
    kind: TransportKind,
    host: String,
    /// Path prefix of the backend URL, without a trailing `/`.
    base_path: String,
    transports: Arc<Transports>,
}

impl DiscoveryClient {
    /// # Errors
    ///
    /// [`DiscoveryError::InvalidUrl`] unless `backend_url` is an `http://` or
    /// `https://` URL.
    pub fn new(backend_url: &str, transports: Arc<Transports>) -> Result<Self, DiscoveryError> {
        let (kind, host, path) = split_url(backend_url)?;
        Ok(Self {
            kind,
            host,
            base_path: path.trim_end_matches('/').to_string(),
            transports,
        })
    }

    /// `host:port` of the backend.
    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}://{}{}{path}", self.kind.scheme(), self.host, self.base_path)
    }

    async fn send(&self, path: &str) -> Result<TransportResponse, DiscoveryError> {
        let request = OutboundRequest::get(self.host.clone(), format!("{}{path}", self.base_path))
            .with_header("accept", "application/json");
        debug!("discovery GET {}", self.url(path));
        self.transports
            .send(self.kind, request)
            .await
            .map_err(|source| DiscoveryError::Transport {
                url: self.url(path),
                source,
            })
    }

    /// Fetches `path` and returns the reply whatever its status.
    pub async fn fetch_raw(&self, path: &str) -> Result<BackendReply, DiscoveryError> {
        let response = self.send(path).await?;
        let status = response.status;
        let content_type = response.header("content-type").map(str::to_string);
        let body = response
            .collect()
            .await
            .map_err(|source| DiscoveryError::Transport {
                url: self.url(path),
                source,
            })?;
        Ok(BackendReply {
            status,
            content_type,
            body,
        })
    }

    /// Fetches `path` and parses a 2xx body as JSON.
    pub async fn fetch_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DiscoveryError> {
        let reply = self.fetch_raw(path).await?;
        if !(200..300).contains(&reply.status) {
            return Err(DiscoveryError::Status {
                url: self.url(path),
                status: reply.status,
            });
        }
        serde_json::from_slice(&reply.body).map_err(|source| DiscoveryError::Malformed {
            url: self.url(path),
            source,
        })
    }

    /// The first target of the backend's `/json/list`.
    pub async fn fetch_backend_descriptor(&self) -> Result<TargetDescriptor, DiscoveryError> {
        let targets: Vec<TargetDescriptor> = self.fetch_json("/json/list").await?;
        targets
            .into_iter()
            .next()
            .ok_or_else(|| DiscoveryError::NoTargets(self.url("/json/list")))
    }

    /// The backend's `/json/version` document.
    pub async fn fetch_version(&self) -> Result<Map<String, Value>, DiscoveryError> {
        self.fetch_json("/json/version").await
    }

    /// The backend's `/json/protocol` schema.
    pub async fn fetch_protocol(&self) -> Result<Value, DiscoveryError> {
        self.fetch_json("/json/protocol").await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
