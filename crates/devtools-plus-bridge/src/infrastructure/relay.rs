//! The relay: one front-end WebSocket bridged to one backend WebSocket.
//!
//! # Session lifecycle
//!
//! 1. **Connecting** – ask discovery for the backend's debugger URL and open
//!    a WebSocket to it.  On failure the front-end gets a close frame with
//!    code 1011 and the reason, and the session ends.
//! 2. **Bridging** – three tasks run concurrently:
//!    - Front-end → Backend: each text frame is shown to the session's
//!      [`DomainRouter`].  Local commands are answered straight back to the
//!      front-end; everything else goes to the backend with its `sessionId`
//!      rewritten from the public to the private token.
//!    - Backend → Front-end: backend events for locally synthesized domains
//!      are dropped; everything else goes to the front-end with the private
//!      token rewritten back to the public one.
//!    - Network events: tracked requests become `Network.*` events for the
//!      front-end while this session has the domain enabled.
//! 3. **Closing** – as soon as either forwarding task ends (peer closed or
//!    transport error), the other tasks are told to stop and the opposite
//!    side is closed.
//! 4. **Closed** – the session record is released.
//!
//! Both sinks sit behind a `tokio::sync::Mutex` because two tasks write to
//! the front-end (forwarded backend frames and local replies/events).  Tasks
//! only stop between frames, never half way through a send.

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use axum::extract::ws::{close_code, CloseFrame, Message as FrontMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as BackendMessage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use devtools_plus_core::network::events::NetworkEvent;
use devtools_plus_core::{Disposition, DomainRouter, Origin, SessionTokens};

use crate::application::rewrite::backend_port;
use crate::application::session::SessionState;
use crate::infrastructure::backend_conn::{BackendConnection, BackendStream};
use crate::infrastructure::http_server::ServerState;

/// Close reasons longer than this do not fit in a control frame.
const MAX_CLOSE_REASON: usize = 123;

type FrontSink = Arc<Mutex<SplitSink<WebSocket, FrontMessage>>>;
type BackendSink = Arc<Mutex<SplitSink<BackendStream, BackendMessage>>>;

/// Why a session's forwarding stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEnd {
    FrontEndClosed,
    BackendClosed,
    Cancelled,
}

impl fmt::Display for FlowEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FrontEndClosed => "front-end disconnected",
            Self::BackendClosed => "backend disconnected",
            Self::Cancelled => "cancelled",
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Runs one relay session to completion and logs how it ended.
pub async fn run_relay(socket: WebSocket, peer: SocketAddr, state: Arc<ServerState>) {
    let session = state.sessions.lock().await.open(peer);
    info!("session {session}: front-end {peer} connected");

    match relay_session(socket, session, &state).await {
        Ok(end) => info!("session {session} closed normally ({end})"),
        Err(e) => warn!("session {session} closed with error: {e:#}"),
    }
}

async fn transition(state: &ServerState, session: Uuid, next: SessionState) {
    if let Err(e) = state.sessions.lock().await.transition(session, next) {
        error!("session {session}: {e}");
    }
}

fn close_reason(text: &str) -> String {
    if text.len() <= MAX_CLOSE_REASON {
        return text.to_string();
    }
    let mut end = MAX_CLOSE_REASON;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Port of the backend debugger URL; it names the private session token.
fn resolve_backend_port(ws_url: &str) -> anyhow::Result<u16> {
    backend_port(ws_url)
        .ok_or_else(|| anyhow!("cannot determine the port of backend URL '{ws_url}'"))
}

async fn connect_backend(state: &ServerState) -> anyhow::Result<(String, u16, BackendConnection)> {
    let descriptor = state
        .discovery
        .fetch_backend_descriptor()
        .await
        .context("backend discovery failed")?;
    let url = descriptor
        .web_socket_debugger_url
        .ok_or_else(|| anyhow!("target '{}' has no webSocketDebuggerUrl", descriptor.id))?;
    let port = resolve_backend_port(&url)?;
    let connection = BackendConnection::connect(&url).await?;
    Ok((url, port, connection))
}

async fn relay_session(
    mut socket: WebSocket,
    session: Uuid,
    state: &Arc<ServerState>,
) -> anyhow::Result<FlowEnd> {
    // ── Connecting ────────────────────────────────────────────────────────────
    let (backend_url, private_port, backend) = match connect_backend(state).await {
        Ok(connected) => connected,
        Err(e) => {
            let frame = CloseFrame {
                code: close_code::ERROR,
                reason: Cow::Owned(close_reason(&format!("{e:#}"))),
            };
            if let Err(send_err) = socket.send(FrontMessage::Close(Some(frame))).await {
                debug!("session {session}: close frame not delivered: {send_err}");
            }
            transition(state, session, SessionState::Closed).await;
            return Err(e);
        }
    };
    info!("session {session}: connected to backend {backend_url}");

    let tokens = SessionTokens::for_ports(state.config.port(), private_port);
    {
        let mut sessions = state.sessions.lock().await;
        if let Err(e) = sessions.set_backend(session, backend_url.as_str()) {
            error!("session {session}: {e}");
        }
    }

    let events = state.context.tracker().subscribe();
    let router = Arc::new(DomainRouter::new(Arc::clone(&state.context)));
    transition(state, session, SessionState::Bridging).await;

    // ── Bridging ──────────────────────────────────────────────────────────────
    let (front_sink, front_stream) = socket.split();
    let front_sink: FrontSink = Arc::new(Mutex::new(front_sink));
    let backend_sink: BackendSink = Arc::new(Mutex::new(backend.sink));
    let tokens = Arc::new(tokens);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut front_task = tokio::spawn(front_to_back(
        session,
        front_stream,
        Arc::clone(&front_sink),
        Arc::clone(&backend_sink),
        Arc::clone(&router),
        Arc::clone(&tokens),
        shutdown_rx.clone(),
    ));
    let mut backend_task = tokio::spawn(back_to_front(
        session,
        backend.stream,
        Arc::clone(&front_sink),
        Arc::clone(&router),
        Arc::clone(&tokens),
        shutdown_rx.clone(),
    ));
    let event_pump = tokio::spawn(pump_network_events(
        session,
        events,
        Arc::clone(&front_sink),
        Arc::clone(&router),
        shutdown_rx,
    ));

    enum Finished {
        FrontToBack(Result<anyhow::Result<FlowEnd>, tokio::task::JoinError>),
        BackToFront(Result<anyhow::Result<FlowEnd>, tokio::task::JoinError>),
    }

    let finished = tokio::select! {
        r = &mut front_task => Finished::FrontToBack(r),
        r = &mut backend_task => Finished::BackToFront(r),
    };

    // ── Closing ───────────────────────────────────────────────────────────────
    transition(state, session, SessionState::Closing).await;
    let _ = shutdown_tx.send(true);

    let (result, remaining): (_, JoinHandle<anyhow::Result<FlowEnd>>) = match finished {
        Finished::FrontToBack(r) => {
            close_backend(session, &backend_sink).await;
            (r, backend_task)
        }
        Finished::BackToFront(r) => {
            close_front_end(session, &front_sink).await;
            (r, front_task)
        }
    };

    if let Err(e) = remaining.await {
        warn!("session {session}: forwarding task panicked: {e}");
    }
    if let Err(e) = event_pump.await {
        warn!("session {session}: event task panicked: {e}");
    }
    drop(router);

    // ── Closed ────────────────────────────────────────────────────────────────
    transition(state, session, SessionState::Closed).await;
    result.context("forwarding task panicked")?
}

async fn close_backend(session: Uuid, sink: &BackendSink) {
    if let Err(e) = sink.lock().await.close().await {
        debug!("session {session}: backend close: {e}");
    }
}

async fn close_front_end(session: Uuid, sink: &FrontSink) {
    let frame = CloseFrame {
        code: close_code::NORMAL,
        reason: Cow::Borrowed("backend disconnected"),
    };
    let mut sink = sink.lock().await;
    if let Err(e) = sink.send(FrontMessage::Close(Some(frame))).await {
        debug!("session {session}: front-end close: {e}");
    }
}

// ── Flows ─────────────────────────────────────────────────────────────────────

async fn front_to_back(
    session: Uuid,
    mut stream: SplitStream<WebSocket>,
    front: FrontSink,
    backend: BackendSink,
    router: Arc<DomainRouter>,
    tokens: Arc<SessionTokens>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<FlowEnd> {
    loop {
        let message = tokio::select! {
            _ = shutdown.changed() => return Ok(FlowEnd::Cancelled),
            message = stream.next() => message,
        };
        let message = match message {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("session {session}: front-end read failed")))
            }
            None => return Ok(FlowEnd::FrontEndClosed),
        };

        match message {
            FrontMessage::Text(text) => match router.route(Origin::FrontEnd, &text) {
                Disposition::Forward => {
                    debug!("session {session}: front→back {} bytes", text.len());
                    let outbound = tokens.to_backend(&text).into_owned();
                    backend
                        .lock()
                        .await
                        .send(BackendMessage::Text(outbound))
                        .await
                        .with_context(|| format!("session {session}: backend write failed"))?;
                }
                Disposition::LocalCommand(reply) => {
                    let mut sink = front.lock().await;
                    for frame in reply.into_frames() {
                        sink.send(FrontMessage::Text(frame))
                            .await
                            .with_context(|| format!("session {session}: front-end write failed"))?;
                    }
                }
                Disposition::LocalEventSuppressed => {}
            },
            FrontMessage::Binary(bytes) => {
                backend
                    .lock()
                    .await
                    .send(BackendMessage::Binary(bytes))
                    .await
                    .with_context(|| format!("session {session}: backend write failed"))?;
            }
            FrontMessage::Close(_) => return Ok(FlowEnd::FrontEndClosed),
            FrontMessage::Ping(_) | FrontMessage::Pong(_) => {}
        }
    }
}

async fn back_to_front(
    session: Uuid,
    mut stream: SplitStream<BackendStream>,
    front: FrontSink,
    router: Arc<DomainRouter>,
    tokens: Arc<SessionTokens>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<FlowEnd> {
    loop {
        let message = tokio::select! {
            _ = shutdown.changed() => return Ok(FlowEnd::Cancelled),
            message = stream.next() => message,
        };
        let message = match message {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                return Err(e).context(format!("session {session}: backend read failed"))
            }
            None => return Ok(FlowEnd::BackendClosed),
        };

        let outbound = match message {
            BackendMessage::Text(text) => match router.route(Origin::Backend, &text) {
                Disposition::Forward => {
                    debug!("session {session}: back→front {} bytes", text.len());
                    FrontMessage::Text(tokens.to_frontend(&text).into_owned())
                }
                Disposition::LocalEventSuppressed => continue,
                Disposition::LocalCommand(_) => continue,
            },
            BackendMessage::Binary(bytes) => FrontMessage::Binary(bytes),
            BackendMessage::Close(_) => return Ok(FlowEnd::BackendClosed),
            BackendMessage::Ping(_) | BackendMessage::Pong(_) | BackendMessage::Frame(_) => continue,
        };
        front
            .lock()
            .await
            .send(outbound)
            .await
            .with_context(|| format!("session {session}: front-end write failed"))?;
    }
}

async fn pump_network_events(
    session: Uuid,
    mut events: broadcast::Receiver<NetworkEvent>,
    front: FrontSink,
    router: Arc<DomainRouter>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => return,
            event = events.recv() => event,
        };
        let event = match event {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("session {session}: dropped {skipped} network events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };
        if !router.network_enabled() {
            continue;
        }
        let frame = match event.to_message() {
            Ok(frame) => frame,
            Err(e) => {
                error!("session {session}: cannot encode {}: {e}", event.method());
                continue;
            }
        };
        if front.lock().await.send(FrontMessage::Text(frame)).await.is_err() {
            debug!("session {session}: front-end gone, stopping event delivery");
            return;
        }
    }
}
