//! HTTP discovery surface and WebSocket accept point.
//!
//! One `axum` router serves everything on the bridge's port:
//!
//! | Path                      | Answer                                            |
//! |---------------------------|---------------------------------------------------|
//! | `/json`, `/json/list`     | backend target list, rewritten for the bridge     |
//! | `/json/version`           | backend version with the bridge's identity        |
//! | `/json/protocol`          | backend schema plus the `Network` domain          |
//! | `/json/activate/{id}`     | 200 for the current target id, 404 otherwise      |
//! | `/json/close/{id}`        | 501                                               |
//! | `/json/new`               | 501                                               |
//! | `/favicon`, `/favicon.ico`| configured icon file or the built-in SVG          |
//! | anything else + upgrade   | one relay session                                 |
//! | anything else             | passed through to the backend                     |
//!
//! # Shutdown
//!
//! The server stops accepting once the shared `running` flag is cleared
//! (see `main.rs`).  The flag is polled every 200 ms.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Path as UrlPath, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{info, warn};

use devtools_plus_core::network::schema::merge_network_domain;
use devtools_plus_core::BridgeContext;

use crate::application::rewrite::{rewrite_debugger_url, rewrite_list_item, rewrite_version};
use crate::application::session::SessionTable;
use crate::domain::config::BridgeConfig;
use crate::domain::descriptor::TargetDescriptor;
use crate::infrastructure::discovery::{DiscoveryClient, DiscoveryError};
use crate::infrastructure::relay::run_relay;

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(200);

const BUILTIN_FAVICON: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 32 32"><rect width="32" height="32" rx="6" fill="#1a73e8"/><path d="M9 10l7 6-7 6" stroke="#fff" stroke-width="3" fill="none" stroke-linecap="round" stroke-linejoin="round"/><path d="M18 22h6" stroke="#fff" stroke-width="3" stroke-linecap="round"/></svg>"##;

/// State shared by every handler and relay session.
pub struct ServerState {
    pub config: BridgeConfig,
    pub context: Arc<BridgeContext>,
    pub discovery: DiscoveryClient,
    pub sessions: Mutex<SessionTable>,
}

impl ServerState {
    /// An absolute icon URL configured in place of a file path.
    fn favicon_url(&self) -> Option<&str> {
        self.config
            .favicon_path
            .as_deref()
            .and_then(Path::to_str)
            .filter(|p| p.starts_with("http://") || p.starts_with("https://"))
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// The backend could not be reached or answered nonsense.
struct BadGateway(DiscoveryError);

impl IntoResponse for BadGateway {
    fn into_response(self) -> Response {
        warn!("discovery failed: {}", self.0);
        (StatusCode::BAD_GATEWAY, self.0.to_string()).into_response()
    }
}

impl From<DiscoveryError> for BadGateway {
    fn from(e: DiscoveryError) -> Self {
        Self(e)
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/json", get(list))
        .route("/json/list", get(list))
        .route("/json/version", get(version))
        .route("/json/protocol", get(protocol))
        .route("/json/activate/:id", get(activate))
        .route("/json/close/:id", get(not_implemented))
        .route("/json/new", get(not_implemented))
        .route("/favicon", get(favicon))
        .route("/favicon.ico", get(favicon))
        .fallback(upgrade_or_pass_through)
        .with_state(state)
}

async fn list(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<TargetDescriptor>>, BadGateway> {
    let descriptor = state.discovery.fetch_backend_descriptor().await?;
    let origin = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| state.config.bind_addr.to_string());
    let item = rewrite_list_item(descriptor, state.config.port(), &origin, state.favicon_url());
    Ok(Json(vec![item]))
}

async fn version(State(state): State<Arc<ServerState>>) -> Result<Response, BadGateway> {
    let backend_version = state.discovery.fetch_version().await?;
    let bridge_ws = match state.discovery.fetch_backend_descriptor().await {
        Ok(d) => d
            .web_socket_debugger_url
            .as_deref()
            .and_then(|url| rewrite_debugger_url(url, state.config.port())),
        Err(e) => {
            warn!("no target for /json/version: {e}");
            None
        }
    };
    Ok(Json(rewrite_version(backend_version, bridge_ws)).into_response())
}

async fn protocol(State(state): State<Arc<ServerState>>) -> Result<Response, BadGateway> {
    let mut schema = state.discovery.fetch_protocol().await?;
    merge_network_domain(&mut schema);
    Ok(Json(schema).into_response())
}

async fn activate(
    State(state): State<Arc<ServerState>>,
    UrlPath(id): UrlPath<String>,
) -> Result<Response, BadGateway> {
    let descriptor = state.discovery.fetch_backend_descriptor().await?;
    Ok(if descriptor.id == id {
        (StatusCode::OK, "Target activated").into_response()
    } else {
        (StatusCode::NOT_FOUND, format!("No such target id: {id}")).into_response()
    })
}

async fn not_implemented() -> impl IntoResponse {
    (StatusCode::NOT_IMPLEMENTED, "Not implemented")
}

fn favicon_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => return None,
    })
}

async fn favicon(State(state): State<Arc<ServerState>>) -> Response {
    if let Some(path) = state.config.favicon_path.as_deref() {
        if state.favicon_url().is_none() {
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    let mime = favicon_mime(path).unwrap_or("application/octet-stream");
                    return ([(header::CONTENT_TYPE, mime)], bytes).into_response();
                }
                Err(e) => warn!("cannot read favicon {}: {e}", path.display()),
            }
        }
    }
    ([(header::CONTENT_TYPE, "image/svg+xml")], BUILTIN_FAVICON).into_response()
}

async fn upgrade_or_pass_through(
    ws: Option<WebSocketUpgrade>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<ServerState>>,
    uri: Uri,
) -> Response {
    if let Some(ws) = ws {
        info!("new front-end connection from {peer} on {}", uri.path());
        return ws.on_upgrade(move |socket| run_relay(socket, peer, state));
    }

    let path = uri.path_and_query().map_or("/", |p| p.as_str());
    match state.discovery.fetch_raw(path).await {
        Ok(reply) => {
            let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut response = Response::new(Body::from(reply.body));
            *response.status_mut() = status;
            if let Some(value) = reply
                .content_type
                .and_then(|ct| header::HeaderValue::from_str(&ct).ok())
            {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => BadGateway(e).into_response(),
    }
}

// ── Server entry points ───────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound (port in use, no
/// permission) or the backend URL is invalid.
pub async fn run_server(
    config: BridgeConfig,
    context: Arc<BridgeContext>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.bind_addr))?;
    serve_on(listener, config, context, running).await
}

/// Serves on an already-bound listener.  The bound address replaces
/// `config.bind_addr`, so port `0` works.
pub async fn serve_on(
    listener: TcpListener,
    mut config: BridgeConfig,
    context: Arc<BridgeContext>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    config.bind_addr = listener
        .local_addr()
        .context("listener has no local address")?;
    let discovery = DiscoveryClient::new(&config.backend_url, Arc::clone(context.transports()))
        .with_context(|| format!("invalid backend URL '{}'", config.backend_url))?;

    info!(
        "DevTools-Plus bridge listening on {}, backend {}",
        config.bind_addr, config.backend_url
    );

    let state = Arc::new(ServerState {
        config,
        context,
        discovery,
        sessions: Mutex::new(SessionTable::new()),
    });

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown(running))
    .await
    .context("HTTP server failed")?;

    info!("listener closed");
    Ok(())
}

async fn wait_for_shutdown(running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
    }
    info!("shutdown flag set; no longer accepting connections");
}
