//! End-to-end tests: a real bridge in front of a fake inspector backend.
//!
//! The fake backend is a small axum app that serves `/json/list`,
//! `/json/version`, and `/json/protocol`, and accepts WebSocket connections on
//! `/abc`.  On connect it sends its greeting frames (by default one
//! `Network.*` event followed by `Debugger.paused`), then echoes every text
//! frame it receives and records it on a channel for the test to inspect.

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as AxMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use devtools_plus_bridge::domain::BridgeConfig;
use devtools_plus_bridge::infrastructure::{default_transports, serve_on};
use devtools_plus_core::{BridgeContext, MemoryNode, VendorNode};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSED: &str = "<closed>";
const WAIT: Duration = Duration::from_secs(5);

const NETWORK_EVENT: &str = r#"{"method":"Network.requestWillBeSent","params":{"requestId":"backend-1"}}"#;
const DOM_EVENT: &str = r#"{"method":"DOM.documentUpdated","params":{}}"#;
const PAUSED_EVENT: &str = r#"{"method":"Debugger.paused","params":{"callFrames":[],"reason":"other"}}"#;

// ── Fake backend ──────────────────────────────────────────────────────────────

#[derive(Clone)]
struct BackendState {
    port: u16,
    received: mpsc::UnboundedSender<String>,
    hang_up: Arc<Notify>,
    /// Frames sent to every new session before echoing starts.
    greeting: Arc<Vec<&'static str>>,
}

struct FakeBackend {
    port: u16,
    received: Mutex<mpsc::UnboundedReceiver<String>>,
    hang_up: Arc<Notify>,
}

async fn backend_list(State(state): State<BackendState>) -> Json<Value> {
    let port = state.port;
    Json(json!([{
        "description": "node.js instance",
        "devtoolsFrontendUrl": format!("devtools://devtools/bundled/js_app.html?experiments=true&v8only=true&ws=127.0.0.1:{port}/abc"),
        "faviconUrl": "https://nodejs.org/static/images/favicons/favicon.ico",
        "id": "abc",
        "title": "app.js",
        "type": "node",
        "url": "file:///srv/app.js",
        "webSocketDebuggerUrl": format!("ws://127.0.0.1:{port}/abc")
    }]))
}

async fn backend_version() -> Json<Value> {
    Json(json!({"Browser": "node.js/v20.11.0", "Protocol-Version": "1.1"}))
}

async fn backend_protocol() -> Json<Value> {
    Json(json!({
        "version": {"major": "1", "minor": "3"},
        "domains": [{"domain": "Runtime"}, {"domain": "Debugger"}]
    }))
}

async fn backend_ws(ws: WebSocketUpgrade, State(state): State<BackendState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| backend_session(socket, state))
}

async fn backend_session(mut socket: WebSocket, state: BackendState) {
    for frame in state.greeting.iter().copied() {
        if socket.send(AxMessage::Text(frame.to_string())).await.is_err() {
            return;
        }
    }
    loop {
        tokio::select! {
            _ = state.hang_up.notified() => {
                let _ = socket.send(AxMessage::Close(None)).await;
                return;
            }
            message = socket.recv() => match message {
                Some(Ok(AxMessage::Text(text))) => {
                    let _ = state.received.send(text.clone());
                    if socket.send(AxMessage::Text(text)).await.is_err() {
                        return;
                    }
                }
                Some(Ok(AxMessage::Close(_))) | None | Some(Err(_)) => {
                    let _ = state.received.send(CLOSED.to_string());
                    return;
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

async fn start_backend() -> FakeBackend {
    start_backend_greeting_with(vec![NETWORK_EVENT, PAUSED_EVENT]).await
}

async fn start_backend_greeting_with(greeting: Vec<&'static str>) -> FakeBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();
    let hang_up = Arc::new(Notify::new());
    let state = BackendState {
        port,
        received: tx,
        hang_up: Arc::clone(&hang_up),
        greeting: Arc::new(greeting),
    };
    let app = Router::new()
        .route("/json/list", get(backend_list))
        .route("/json/version", get(backend_version))
        .route("/json/protocol", get(backend_protocol))
        .route("/abc", get(backend_ws))
        .with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    FakeBackend {
        port,
        received: Mutex::new(rx),
        hang_up,
    }
}

impl FakeBackend {
    async fn next_received(&self) -> String {
        tokio::time::timeout(WAIT, self.received.lock().await.recv())
            .await
            .expect("backend received nothing in time")
            .expect("backend channel closed")
    }
}

// ── Bridge ────────────────────────────────────────────────────────────────────

async fn start_bridge(backend_url: String) -> SocketAddr {
    start_bridge_with_document(backend_url, None).await
}

/// Starts a bridge whose context carries `document`, making `DOM` local.
async fn start_bridge_with_document(
    backend_url: String,
    document: Option<Arc<MemoryNode>>,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = BridgeConfig {
        bind_addr: addr,
        backend_url,
        ..BridgeConfig::default()
    };
    let transports = Arc::new(default_transports().unwrap());
    let mut context = BridgeContext::with_limits(transports, config.buffer_limits());
    if let Some(document) = document {
        context = context.with_document(document as Arc<dyn VendorNode>).unwrap();
    }
    let context = Arc::new(context);
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(async move {
        serve_on(listener, config, context, running).await.unwrap();
    });
    addr
}

async fn bridge_with_backend() -> (FakeBackend, SocketAddr) {
    let backend = start_backend().await;
    let bridge = start_bridge(format!("http://127.0.0.1:{}", backend.port)).await;
    (backend, bridge)
}

async fn connect_front_end(bridge: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{bridge}/abc")).await.unwrap();
    client
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let message = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("no frame in time")
            .expect("stream ended")
            .expect("read failed");
        match message {
            Message::Text(text) => return text,
            Message::Close(frame) => panic!("unexpected close: {frame:?}"),
            _ => continue,
        }
    }
}

/// Reads text frames until one satisfies `pred`, skipping the others.
async fn text_matching(client: &mut Client, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let value: Value = serde_json::from_str(&next_text(client).await).unwrap();
        if pred(&value) {
            return value;
        }
    }
}

async fn get_json(url: String) -> (u16, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap_or(Value::Null))
}

// ── Discovery surface ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_json_list_points_front_end_at_the_bridge() {
    // Arrange
    let (backend, bridge) = bridge_with_backend().await;

    // Act
    let (status, list) = get_json(format!("http://{bridge}/json/list")).await;

    // Assert
    assert_eq!(status, 200);
    let item = &list[0];
    assert_eq!(
        item["webSocketDebuggerUrl"],
        format!("ws://127.0.0.1:{}/abc", bridge.port())
    );
    assert_eq!(item["description"], "node.js instance with DevTools-Plus");
    assert_eq!(item["type"], "page");
    assert_eq!(item["faviconUrl"], format!("http://{bridge}/favicon"));
    let frontend = item["devtoolsFrontendUrl"].as_str().unwrap();
    assert!(frontend.ends_with(&format!("ws=127.0.0.1:{}/abc", bridge.port())));
    assert!(!frontend.contains("v8only"));
    assert!(!frontend.contains(&backend.port.to_string()));
}

#[tokio::test]
async fn test_json_version_and_protocol_are_rewritten() {
    let (_backend, bridge) = bridge_with_backend().await;

    let (_, version) = get_json(format!("http://{bridge}/json/version")).await;
    let (_, protocol) = get_json(format!("http://{bridge}/json/protocol")).await;

    assert_eq!(version["Protocol-Version"], "1.2");
    assert_eq!(
        version["webSocketDebuggerUrl"],
        format!("ws://127.0.0.1:{}/abc", bridge.port())
    );
    let domains: Vec<&str> = protocol["domains"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["domain"].as_str())
        .collect();
    assert_eq!(domains, ["Runtime", "Debugger", "Network"]);
}

#[tokio::test]
async fn test_activate_close_and_new_stubs() {
    let (_backend, bridge) = bridge_with_backend().await;
    let http = reqwest::Client::new();

    let known = http.get(format!("http://{bridge}/json/activate/abc")).send().await.unwrap();
    let unknown = http.get(format!("http://{bridge}/json/activate/zzz")).send().await.unwrap();
    let close = http.get(format!("http://{bridge}/json/close/abc")).send().await.unwrap();
    let new = http.get(format!("http://{bridge}/json/new")).send().await.unwrap();

    assert_eq!(known.status().as_u16(), 200);
    assert_eq!(known.text().await.unwrap(), "Target activated");
    assert_eq!(unknown.status().as_u16(), 404);
    assert_eq!(unknown.text().await.unwrap(), "No such target id: zzz");
    assert_eq!(close.status().as_u16(), 501);
    assert_eq!(new.status().as_u16(), 501);
}

#[tokio::test]
async fn test_favicon_falls_back_to_builtin_svg() {
    let (_backend, bridge) = bridge_with_backend().await;

    let response = reqwest::get(format!("http://{bridge}/favicon")).await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "image/svg+xml"
    );
}

#[tokio::test]
async fn test_unknown_paths_pass_through_to_backend() {
    let (_backend, bridge) = bridge_with_backend().await;

    let response = reqwest::get(format!("http://{bridge}/not-a-route")).await.unwrap();

    // The fake backend has no such route, so its 404 comes back unchanged.
    assert_eq!(response.status().as_u16(), 404);
}

// ── Relay ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_backend_network_event_is_suppressed_and_others_forwarded() {
    // Arrange
    let (_backend, bridge) = bridge_with_backend().await;

    // Act
    let mut client = connect_front_end(bridge).await;
    let first = next_text(&mut client).await;

    // Assert: the backend's Network event never arrives; Debugger.paused is
    // forwarded byte for byte.
    assert_eq!(first, PAUSED_EVENT);
}

#[tokio::test]
async fn test_attached_document_makes_dom_local() {
    // Arrange: a backend that also emits a DOM event, and a bridge with a document
    let backend = start_backend_greeting_with(vec![DOM_EVENT, PAUSED_EVENT]).await;
    let document = MemoryNode::document("app://index");
    let html = document.append_child(MemoryNode::element("html"));
    html.append_child(MemoryNode::element("body"));
    let bridge = start_bridge_with_document(
        format!("http://127.0.0.1:{}", backend.port),
        Some(document),
    )
    .await;
    let mut client = connect_front_end(bridge).await;

    // Assert: the backend's DOM event is suppressed
    assert_eq!(next_text(&mut client).await, PAUSED_EVENT);

    // Act
    client
        .send(Message::Text(r#"{"id":1,"method":"DOM.getDocument"}"#.to_string()))
        .await
        .unwrap();
    let reply = text_matching(&mut client, |v| v["id"] == 1).await;

    // Assert: answered locally from the attached document
    assert_eq!(reply["result"]["root"]["nodeType"], 9);
    assert_eq!(reply["result"]["root"]["documentURL"], "app://index");

    // Assert: the command never reached the backend
    client
        .send(Message::Text(r#"{"id":2,"method":"Runtime.enable"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(backend.next_received().await, r#"{"id":2,"method":"Runtime.enable"}"#);
}

#[tokio::test]
async fn test_session_id_is_rewritten_both_ways() {
    // Arrange
    let (backend, bridge) = bridge_with_backend().await;
    let mut client = connect_front_end(bridge).await;
    next_text(&mut client).await; // Debugger.paused
    let command = format!(
        r#"{{"id":7,"method":"Runtime.evaluate","params":{{"expression":"1"}},"sessionId":"S:{}:1"}}"#,
        bridge.port()
    );

    // Act
    client.send(Message::Text(command.clone())).await.unwrap();
    let at_backend = backend.next_received().await;
    let echoed = next_text(&mut client).await;

    // Assert
    assert_eq!(
        at_backend,
        command.replace(&format!(":{}:", bridge.port()), &format!(":{}:", backend.port))
    );
    assert_eq!(echoed, command);
}

#[tokio::test]
async fn test_unknown_request_id_gets_error_response_only() {
    let (_backend, bridge) = bridge_with_backend().await;
    let mut client = connect_front_end(bridge).await;

    client
        .send(Message::Text(
            r#"{"id":3,"method":"Network.getResponseBody","params":{"requestId":"nope"}}"#.into(),
        ))
        .await
        .unwrap();
    let response = text_matching(&mut client, |v| v["id"] == 3).await;

    assert_eq!(response["error"]["code"], -32000);
    assert_eq!(
        response["error"]["message"],
        "No resource with given identifier found"
    );
}

#[tokio::test]
async fn test_tracked_discovery_request_reaches_front_end() {
    // Arrange: enable Network on a live session
    let (_backend, bridge) = bridge_with_backend().await;
    let mut client = connect_front_end(bridge).await;
    client
        .send(Message::Text(r#"{"id":1,"method":"Network.enable","params":{}}"#.into()))
        .await
        .unwrap();
    let enabled = text_matching(&mut client, |v| v["id"] == 1).await;
    assert_eq!(enabled["result"], json!({}));

    // Act: the bridge fetches the backend list through its transport table
    let (status, _) = get_json(format!("http://{bridge}/json/list")).await;
    assert_eq!(status, 200);

    // Assert: the request shows up as Network events, in order
    let sent = text_matching(&mut client, |v| v["method"] == "Network.requestWillBeSent").await;
    let request_id = sent["params"]["requestId"].as_str().unwrap().to_string();
    assert!(sent["params"]["request"]["url"]
        .as_str()
        .unwrap()
        .ends_with("/json/list"));
    let finished = text_matching(&mut client, |v| {
        v["method"] == "Network.loadingFinished" && v["params"]["requestId"] == request_id.as_str()
    })
    .await;
    assert_eq!(finished["params"]["requestId"], request_id.as_str());

    // And its body is available locally
    let command = format!(
        r#"{{"id":2,"method":"Network.getResponseBody","params":{{"requestId":"{request_id}"}}}}"#
    );
    client.send(Message::Text(command)).await.unwrap();
    let body = text_matching(&mut client, |v| v["id"] == 2).await;
    assert_eq!(body["result"]["base64Encoded"], false);
    assert!(body["result"]["body"].as_str().unwrap().contains(r#""id":"abc""#));
}

#[tokio::test]
async fn test_front_end_close_closes_backend() {
    // Arrange
    let (backend, bridge) = bridge_with_backend().await;
    let mut client = connect_front_end(bridge).await;
    next_text(&mut client).await;

    // Act
    client.close(None).await.unwrap();

    // Assert
    assert_eq!(backend.next_received().await, CLOSED);
}

#[tokio::test]
async fn test_backend_close_closes_front_end() {
    // Arrange
    let (backend, bridge) = bridge_with_backend().await;
    let mut client = connect_front_end(bridge).await;
    next_text(&mut client).await;

    // Act
    backend.hang_up.notify_one();

    // Assert: the next thing the front-end sees is a close frame or the end
    // of the stream.
    let ended = tokio::time::timeout(WAIT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "front-end was not closed");
}

#[tokio::test]
async fn test_discovery_failure_closes_front_end_with_1011() {
    // Arrange: a backend URL nobody listens on
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = unused.local_addr().unwrap().port();
    drop(unused);
    let bridge = start_bridge(format!("http://127.0.0.1:{dead_port}")).await;

    // Act
    let mut client = connect_front_end(bridge).await;
    let message = tokio::time::timeout(WAIT, client.next())
        .await
        .expect("no frame in time")
        .expect("stream ended")
        .expect("read failed");

    // Assert
    match message {
        Message::Close(Some(frame)) => {
            assert_eq!(u16::from(frame.code), 1011);
            assert!(frame.reason.contains("backend discovery failed"));
        }
        other => panic!("expected a close frame, got {other:?}"),
    }
}
