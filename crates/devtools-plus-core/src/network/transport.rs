//! Outbound HTTP transports.
//!
//! # The transport table (for beginners)
//!
//! Everything the process sends over HTTP goes through a [`Transports`] table:
//! one [`Transport`] per [`TransportKind`] (plain HTTP/1.1, TLS, HTTP/2).
//! Callers look up the entry for the kind they need *at call time*.
//!
//! That indirection is what makes request tracking possible.  When the
//! front-end enables the `Network` domain, the tracker swaps each table entry
//! for a proxy that records the request and forwards it to the original.
//! Disabling swaps the originals back.  Code holding an `Arc<Transports>`
//! never notices the difference.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use thiserror::Error;

// ── Kinds ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportKind {
    /// HTTP/1.1 over TCP.
    Plain,
    /// HTTP/1.1 over TLS.
    Encrypted,
    /// HTTP/2.
    Multiplexed,
}

impl TransportKind {
    pub const ALL: [TransportKind; 3] = [Self::Plain, Self::Encrypted, Self::Multiplexed];

    /// URL scheme used when describing a request made with this kind.
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Plain => "http",
            Self::Encrypted | Self::Multiplexed => "https",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "http",
            Self::Encrypted => "https",
            Self::Multiplexed => "http2",
        })
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no {0} transport is registered")]
    Unavailable(TransportKind),

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Connecting or sending the request head failed.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body stream failed part way through.
    #[error("response body failed: {0}")]
    Body(String),
}

// ── Requests and responses ────────────────────────────────────────────────────

/// A request as seen by a transport: host and path, without the scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: String,
    /// `host[:port]`.
    pub host: String,
    /// Path plus query, starting with `/`.
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn new(method: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            host: host.into(),
            path: path.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new("GET", host, path)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Full URL for this request when sent with `kind`.
    pub fn url(&self, kind: TransportKind) -> String {
        format!("{}://{}{}", kind.scheme(), self.host, self.path)
    }
}

/// Splits `http://host:port/path` into the transport kind, host, and path.
///
/// `http` maps to [`TransportKind::Plain`], `https` to
/// [`TransportKind::Encrypted`].  A missing path becomes `/`.
///
/// # Errors
///
/// [`TransportError::InvalidUrl`] for other schemes or an empty host.
pub fn split_url(url: &str) -> Result<(TransportKind, String, String), TransportError> {
    let invalid = || TransportError::InvalidUrl(url.to_string());
    let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
    let kind = match scheme.to_ascii_lowercase().as_str() {
        "http" => TransportKind::Plain,
        "https" => TransportKind::Encrypted,
        _ => return Err(invalid()),
    };
    let (host, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    if host.is_empty() {
        return Err(invalid());
    }
    Ok((kind, host.to_string(), path.to_string()))
}

/// Response body chunks, in arrival order.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: BodyStream,
}

impl TransportResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Reads the whole body.
    pub async fn collect(self) -> Result<Bytes, TransportError> {
        let mut body = self.body;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("status_text", &self.status_text)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

// ── Transport trait and table ─────────────────────────────────────────────────

/// Sends one HTTP request.
///
/// Implemented by the real network clients and by the tracker's recording
/// proxy.  `async_trait` keeps the trait object-safe so the table can hold
/// `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}

/// The process-wide transport table.
#[derive(Default)]
pub struct Transports {
    entries: RwLock<HashMap<TransportKind, Arc<dyn Transport>>>,
}

impl Transports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `transport` for `kind`, returning the entry it replaced.
    pub fn register(
        &self,
        kind: TransportKind,
        transport: Arc<dyn Transport>,
    ) -> Option<Arc<dyn Transport>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, transport)
    }

    /// The entry currently installed for `kind`.
    pub fn get(&self, kind: TransportKind) -> Option<Arc<dyn Transport>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    /// Kinds with an installed entry, in a stable order.
    pub fn kinds(&self) -> Vec<TransportKind> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        TransportKind::ALL
            .into_iter()
            .filter(|k| entries.contains_key(k))
            .collect()
    }

    /// Sends `request` through whatever is installed for `kind` right now.
    ///
    /// The table lock is released before the request is awaited.
    pub async fn send(
        &self,
        kind: TransportKind,
        request: OutboundRequest,
    ) -> Result<TransportResponse, TransportError> {
        let transport = self.get(kind).ok_or(TransportError::Unavailable(kind))?;
        transport.send(request).await
    }
}
