//! Integration tests for request tracking through the public API.
//!
//! These tests drive the transport table, tracker, router, and event channel
//! together, the way a relay session does.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use devtools_plus_core::network::events::NetworkEvent;
use devtools_plus_core::{
    BridgeContext, Disposition, DomainRouter, OutboundRequest, Origin, Transport, TransportError,
    TransportKind, TransportResponse, Transports,
};
use futures_util::stream;
use serde_json::Value;

/// Answers every request with its own path, split into three chunks with a
/// yield between them so concurrent requests interleave.
struct EchoPathTransport;

#[async_trait]
impl Transport for EchoPathTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let path = request.path.clone();
        let chunks: Vec<Result<Bytes, TransportError>> = path
            .as_bytes()
            .chunks(path.len().div_ceil(3).max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let body = futures_util::StreamExt::then(stream::iter(chunks), |chunk| async move {
            tokio::task::yield_now().await;
            chunk
        });
        Ok(TransportResponse {
            status: 200,
            status_text: "OK".to_string(),
            headers: BTreeMap::from([("content-type".to_string(), "text/plain".to_string())]),
            body: Box::pin(body),
        })
    }
}

fn context() -> Arc<BridgeContext> {
    let transports = Arc::new(Transports::new());
    transports.register(TransportKind::Plain, Arc::new(EchoPathTransport));
    Arc::new(BridgeContext::new(transports))
}

fn local_response(disposition: Disposition) -> Value {
    match disposition {
        Disposition::LocalCommand(reply) => {
            serde_json::from_str(&reply.response).expect("response is JSON")
        }
        other => panic!("expected local command, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_keep_per_request_event_order() {
    // Arrange
    let ctx = context();
    let router = DomainRouter::new(Arc::clone(&ctx));
    let mut events = ctx.tracker().subscribe();
    local_response(router.route(Origin::FrontEnd, r#"{"id":1,"method":"Network.enable"}"#));

    // Act – 16 requests in parallel through the shared table
    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let transports = Arc::clone(ctx.transports());
            tokio::spawn(async move {
                let response = transports
                    .send(TransportKind::Plain, OutboundRequest::get("svc", format!("/item/{i}")))
                    .await
                    .expect("send");
                response.collect().await.expect("body")
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("task");
    }

    // Assert – group events by request and check each sequence
    let mut by_request: HashMap<String, Vec<&'static str>> = HashMap::new();
    while let Ok(event) = events.try_recv() {
        by_request
            .entry(event.request_id().to_string())
            .or_default()
            .push(event.method());
    }
    assert_eq!(by_request.len(), 16);
    for methods in by_request.values() {
        assert_eq!(methods.first(), Some(&"Network.requestWillBeSent"));
        assert_eq!(methods.get(1), Some(&"Network.responseReceived"));
        assert_eq!(methods.last(), Some(&"Network.loadingFinished"));
        assert!(methods[2..methods.len() - 1]
            .iter()
            .all(|m| *m == "Network.dataReceived"));
    }
}

#[tokio::test]
async fn test_get_response_body_through_router_returns_tracked_body() {
    // Arrange
    let ctx = context();
    let router = DomainRouter::new(Arc::clone(&ctx));
    let mut events = ctx.tracker().subscribe();
    router.route(Origin::FrontEnd, r#"{"id":1,"method":"Network.enable"}"#);

    ctx.transports()
        .send(TransportKind::Plain, OutboundRequest::get("svc", "/hello"))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    let id = match events.recv().await.unwrap() {
        NetworkEvent::RequestWillBeSent { request_id, .. } => request_id,
        other => panic!("unexpected first event {other:?}"),
    };

    // Act
    let command = format!(
        r#"{{"id":2,"method":"Network.getResponseBody","params":{{"requestId":"{id}"}}}}"#
    );
    let response = local_response(router.route(Origin::FrontEnd, &command));

    // Assert
    assert_eq!(response["result"]["body"], "/hello");
    assert_eq!(response["result"]["base64Encoded"], false);
}

#[tokio::test]
async fn test_requests_after_last_session_disables_are_not_tracked() {
    let ctx = context();
    let router = DomainRouter::new(Arc::clone(&ctx));
    router.route(Origin::FrontEnd, r#"{"id":1,"method":"Network.enable"}"#);
    router.route(Origin::FrontEnd, r#"{"id":2,"method":"Network.disable"}"#);
    let mut events = ctx.tracker().subscribe();

    ctx.transports()
        .send(TransportKind::Plain, OutboundRequest::get("svc", "/quiet"))
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    let next = tokio::time::timeout(Duration::from_millis(50), events.recv()).await;
    assert!(next.is_err(), "no events once tracking is disabled");
    assert!(ctx.tracker().log().is_empty());
}
