//! `reqwest`-backed entries for the transport table.
//!
//! One [`ReqwestTransport`] per [`TransportKind`], each with its own client so
//! the protocol constraints of the kind are enforced by the client itself:
//!
//! | Kind          | Client                         |
//! |---------------|--------------------------------|
//! | `Plain`       | HTTP/1.1, `http://`            |
//! | `Encrypted`   | HTTP/1.1, `https://` only      |
//! | `Multiplexed` | HTTP/2 prior knowledge         |

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Method};
use tracing::debug;

use devtools_plus_core::network::transport::{
    OutboundRequest, Transport, TransportError, TransportKind, TransportResponse, Transports,
};

pub struct ReqwestTransport {
    kind: TransportKind,
    client: Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// [`TransportError::Request`] if the TLS backend cannot be initialised.
    pub fn new(kind: TransportKind) -> Result<Self, TransportError> {
        let builder = Client::builder();
        let builder = match kind {
            TransportKind::Plain => builder.http1_only(),
            TransportKind::Encrypted => builder.http1_only().https_only(true),
            TransportKind::Multiplexed => builder.http2_prior_knowledge(),
        };
        let client = builder
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { kind, client })
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::InvalidRequest(format!("bad method '{}'", request.method)))?;
        let url = request.url(self.kind);
        debug!("{} {url} via {}", request.method, self.kind);

        let mut builder = self.client.request(method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Body(e.to_string())));

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: Box::pin(body),
        })
    }
}

/// A transport table with a `reqwest` client for every kind.
///
/// # Errors
///
/// Propagates the first client construction failure.
pub fn default_transports() -> Result<Transports, TransportError> {
    let transports = Transports::new();
    for kind in TransportKind::ALL {
        transports.register(kind, Arc::new(ReqwestTransport::new(kind)?));
    }
    Ok(transports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_transports_cover_every_kind() {
        // Arrange / Act
        let transports = default_transports().unwrap();

        // Assert
        assert_eq!(transports.kinds(), TransportKind::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_bad_method_is_rejected_before_sending() {
        let transport = ReqwestTransport::new(TransportKind::Plain).unwrap();

        let result = transport
            .send(OutboundRequest::new("GE T", "127.0.0.1:1", "/"))
            .await;

        assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_request_error() {
        // Port 1 on loopback is never listening in a test environment.
        let transport = ReqwestTransport::new(TransportKind::Plain).unwrap();

        let result = transport
            .send(OutboundRequest::get("127.0.0.1:1", "/json/list"))
            .await;

        assert!(matches!(result, Err(TransportError::Request(_))));
    }
}
