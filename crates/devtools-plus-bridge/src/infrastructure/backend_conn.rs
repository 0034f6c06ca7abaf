//! WebSocket connection to the backend inspector.
//!
//! Each relay session gets its own backend connection.  The backend treats
//! the bridge as just another DevTools client.

use anyhow::Context;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

pub type BackendStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The two halves of a connected backend WebSocket.
///
/// Split up front so the front→back flow can own `sink` while the
/// back→front flow owns `stream`.
pub struct BackendConnection {
    pub sink: SplitSink<BackendStream, Message>,
    pub stream: SplitStream<BackendStream>,
}

impl BackendConnection {
    /// Opens a WebSocket to `ws_url`, e.g. `ws://127.0.0.1:9229/<uuid>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connection or the WebSocket handshake
    /// fails (backend not running, target id no longer valid, ...).
    pub async fn connect(ws_url: &str) -> anyhow::Result<Self> {
        let (socket, response) = connect_async(ws_url)
            .await
            .with_context(|| format!("failed to connect to backend at {ws_url}"))?;
        debug!("backend handshake with {ws_url}: HTTP {}", response.status());

        let (sink, stream) = socket.split();
        Ok(Self { sink, stream })
    }
}
