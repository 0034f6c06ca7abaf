//! Request tracking for the `Network` domain.
//!
//! # How interception works (for beginners)
//!
//! [`RequestTracker::enable`] walks the [`Transports`] table and replaces every
//! installed entry with a [`TrackingTransport`] that wraps the original.  Each
//! request that passes through the proxy is recorded in the shared
//! [`RequestLog`]:
//!
//! ```text
//! begin()            → Network.requestWillBeSent
//! record_response()  → Network.responseReceived
//! append() per chunk → Network.dataReceived
//! finish() / fail()  → Network.loadingFinished / Network.loadingFailed
//! ```
//!
//! A request whose send future or body stream is dropped early is finalized as
//! canceled, so every record eventually completes.
//!
//! Events are published on a `tokio::sync::broadcast` channel while the log's
//! lock is held, so for any one request subscribers always observe them in the
//! order above, even when chunks of different requests interleave across
//! threads.
//!
//! [`RequestTracker::disable`] puts the saved originals back.  Requests that
//! were already in flight keep their proxy (they hold an `Arc` to it) and still
//! complete their records.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::events::{
    Initiator, NetworkEvent, RequestId, RequestPayload, ResponsePayload, RESOURCE_TYPE,
};
use super::transport::{
    BodyStream, OutboundRequest, Transport, TransportError, TransportKind, TransportResponse,
    Transports,
};

/// Records kept by default before the oldest completed ones are evicted.
pub const DEFAULT_MAX_TRACKED_REQUESTS: usize = 1000;

/// Capacity of the event channel.  A subscriber that falls this far behind
/// skips events (and is told how many).
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// `loaderId` reported on every event.  Requests made by the bridge process do
/// not belong to a page load.
const LOADER_ID: &str = "devtools-plus";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("No resource with given identifier found")]
    NotFound(RequestId),

    #[error("Request content was not yet received for request {0}")]
    NotFinished(RequestId),
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Sent; no response head yet.
    Pending,
    /// Response head received; body streaming.
    Receiving,
    Finished,
    Failed,
}

impl RequestState {
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/// A snapshot of one tracked request.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedRequest {
    pub id: RequestId,
    pub kind: TransportKind,
    pub timestamp: f64,
    pub wall_time: f64,
    pub request: RequestPayload,
    pub response: Option<ResponsePayload>,
    /// Stored body bytes (possibly truncated by the per-resource limit).
    pub body: Vec<u8>,
    /// Every body byte that arrived, stored or not.
    pub received_bytes: usize,
    pub truncated: bool,
    pub state: RequestState,
    pub error: Option<String>,
}

/// The result of `Network.getResponseBody`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub body: String,
    pub base64_encoded: bool,
}

/// Retention limits for the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    /// Maximum number of records; the oldest completed ones are evicted first.
    pub max_requests: usize,
    /// Maximum stored body bytes across all records.
    pub max_total_bytes: Option<usize>,
    /// Maximum stored body bytes per record.  Later bytes are counted but dropped.
    pub max_resource_bytes: Option<usize>,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_TRACKED_REQUESTS,
            max_total_bytes: None,
            max_resource_bytes: None,
        }
    }
}

// ── Request log ───────────────────────────────────────────────────────────────

struct LogState {
    requests: HashMap<RequestId, TrackedRequest>,
    /// Start order, oldest first.
    order: VecDeque<RequestId>,
    stored_bytes: usize,
    limits: BufferLimits,
}

impl LogState {
    /// Removes the oldest completed record.  In-flight records are never evicted.
    fn evict_oldest_completed(&mut self) -> bool {
        let Some(pos) = self.order.iter().position(|id| {
            self.requests
                .get(id)
                .is_some_and(|r| r.state.is_complete())
        }) else {
            return false;
        };
        if let Some(id) = self.order.remove(pos) {
            if let Some(record) = self.requests.remove(&id) {
                self.stored_bytes -= record.body.len();
                debug!("evicted tracked request {id}");
            }
        }
        true
    }

    fn make_room_for_one(&mut self) {
        while self.requests.len() >= self.limits.max_requests.max(1) {
            if !self.evict_oldest_completed() {
                break;
            }
        }
    }

    fn enforce_total(&mut self) {
        let Some(max_total) = self.limits.max_total_bytes else {
            return;
        };
        while self.stored_bytes > max_total {
            if !self.evict_oldest_completed() {
                break;
            }
        }
    }
}

/// The shared record of every tracked request, plus the event channel.
pub struct RequestLog {
    state: Mutex<LogState>,
    events: broadcast::Sender<NetworkEvent>,
    clock: Instant,
}

impl RequestLog {
    pub fn new(limits: BufferLimits) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(LogState {
                requests: HashMap::new(),
                order: VecDeque::new(),
                stored_bytes: 0,
                limits,
            }),
            events,
            clock: Instant::now(),
        }
    }

    /// A receiver for every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }

    pub fn limits(&self) -> BufferLimits {
        self.lock().limits
    }

    /// Updates the byte limits (from `Network.enable`).  `None` leaves a limit
    /// unchanged.
    pub fn set_buffer_limits(&self, max_total_bytes: Option<usize>, max_resource_bytes: Option<usize>) {
        let mut state = self.lock();
        if max_total_bytes.is_some() {
            state.limits.max_total_bytes = max_total_bytes;
        }
        if max_resource_bytes.is_some() {
            state.limits.max_resource_bytes = max_resource_bytes;
        }
        state.enforce_total();
    }

    /// Opens a record for a request about to be sent.
    pub fn begin(&self, kind: TransportKind, request: &OutboundRequest) -> RequestId {
        let id = RequestId::new_v4();
        let (timestamp, wall_time) = self.now();
        let url = request.url(kind);
        let payload = RequestPayload {
            url: url.clone(),
            method: request.method.clone(),
            headers: request.headers.clone(),
            post_data: request
                .body
                .as_ref()
                .and_then(|b| std::str::from_utf8(b).ok())
                .map(str::to_string),
        };

        let mut state = self.lock();
        state.make_room_for_one();
        state.order.push_back(id.clone());
        state.requests.insert(
            id.clone(),
            TrackedRequest {
                id: id.clone(),
                kind,
                timestamp,
                wall_time,
                request: payload.clone(),
                response: None,
                body: Vec::new(),
                received_bytes: 0,
                truncated: false,
                state: RequestState::Pending,
                error: None,
            },
        );
        self.publish(NetworkEvent::RequestWillBeSent {
            request_id: id.clone(),
            loader_id: LOADER_ID.to_string(),
            document_url: url,
            request: payload,
            timestamp,
            wall_time,
            initiator: Initiator::default(),
            resource_type: RESOURCE_TYPE,
        });
        id
    }

    /// Records the response head.
    pub fn record_response(
        &self,
        id: &RequestId,
        status: u16,
        status_text: &str,
        headers: &BTreeMap<String, String>,
    ) {
        let (timestamp, _) = self.now();
        let mut state = self.lock();
        let Some(record) = state.requests.get_mut(id) else {
            return;
        };
        if record.state != RequestState::Pending {
            return;
        }
        let mime_type = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.split(';').next().unwrap_or_default().trim().to_string())
            .unwrap_or_default();
        let response = ResponsePayload {
            url: record.request.url.clone(),
            status,
            status_text: status_text.to_string(),
            headers: headers.clone(),
            mime_type,
        };
        record.response = Some(response.clone());
        record.state = RequestState::Receiving;
        self.publish(NetworkEvent::ResponseReceived {
            request_id: id.clone(),
            loader_id: LOADER_ID.to_string(),
            timestamp,
            resource_type: RESOURCE_TYPE,
            response,
        });
    }

    /// Appends one body chunk.  Ignored once the record is complete.
    pub fn append(&self, id: &RequestId, chunk: &[u8]) {
        let (timestamp, _) = self.now();
        let mut state = self.lock();
        let max_resource = state.limits.max_resource_bytes;
        let Some(record) = state.requests.get_mut(id) else {
            return;
        };
        if record.state.is_complete() {
            return;
        }
        record.state = RequestState::Receiving;
        record.received_bytes += chunk.len();
        let room = max_resource
            .map(|max| max.saturating_sub(record.body.len()))
            .unwrap_or(usize::MAX);
        let keep = room.min(chunk.len());
        if keep < chunk.len() {
            record.truncated = true;
        }
        record.body.extend_from_slice(&chunk[..keep]);
        state.stored_bytes += keep;
        self.publish(NetworkEvent::DataReceived {
            request_id: id.clone(),
            timestamp,
            data_length: chunk.len(),
            encoded_data_length: chunk.len(),
        });
        state.enforce_total();
    }

    /// Marks the record finished.  Only the first completion counts.
    pub fn finish(&self, id: &RequestId) {
        let (timestamp, _) = self.now();
        let mut state = self.lock();
        let Some(record) = state.requests.get_mut(id) else {
            return;
        };
        if record.state.is_complete() {
            return;
        }
        record.state = RequestState::Finished;
        let encoded_data_length = record.received_bytes;
        self.publish(NetworkEvent::LoadingFinished {
            request_id: id.clone(),
            timestamp,
            encoded_data_length,
        });
        state.enforce_total();
    }

    /// Marks the record failed, keeping whatever body bytes arrived.
    pub fn fail(&self, id: &RequestId, error_text: &str, canceled: bool) {
        let (timestamp, _) = self.now();
        let mut state = self.lock();
        let Some(record) = state.requests.get_mut(id) else {
            return;
        };
        if record.state.is_complete() {
            return;
        }
        record.state = RequestState::Failed;
        record.error = Some(error_text.to_string());
        self.publish(NetworkEvent::LoadingFailed {
            request_id: id.clone(),
            timestamp,
            resource_type: RESOURCE_TYPE,
            error_text: error_text.to_string(),
            canceled,
        });
        state.enforce_total();
    }

    /// The stored body of a completed request.
    ///
    /// Text-like MIME types are returned verbatim when the bytes are valid
    /// UTF-8; everything else is base64 encoded.
    ///
    /// # Errors
    ///
    /// [`TrackerError::NotFound`] for unknown (or evicted) ids,
    /// [`TrackerError::NotFinished`] while the body is still streaming.
    pub fn response_body(&self, id: &RequestId) -> Result<ResponseBody, TrackerError> {
        let state = self.lock();
        let record = state
            .requests
            .get(id)
            .ok_or_else(|| TrackerError::NotFound(id.clone()))?;
        if !record.state.is_complete() {
            return Err(TrackerError::NotFinished(id.clone()));
        }
        let mime = record
            .response
            .as_ref()
            .map(|r| r.mime_type.as_str())
            .unwrap_or_default();
        Ok(encode_body(&record.body, mime))
    }

    /// A copy of one record.
    pub fn get(&self, id: &RequestId) -> Option<TrackedRequest> {
        self.lock().requests.get(id).cloned()
    }

    /// Copies of every record, oldest first.
    pub fn snapshot(&self) -> Vec<TrackedRequest> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.requests.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every record.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.requests.clear();
        state.order.clear();
        state.stored_bytes = 0;
    }

    fn publish(&self, event: NetworkEvent) {
        // `send` only fails when nobody is subscribed.
        let _ = self.events.send(event);
    }

    fn now(&self) -> (f64, f64) {
        let monotonic = self.clock.elapsed().as_secs_f64();
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        (monotonic, wall)
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new(BufferLimits::default())
    }
}

fn is_textual(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.starts_with("text/")
        || mime.ends_with("+json")
        || mime.ends_with("+xml")
        || matches!(
            mime.as_str(),
            "application/json"
                | "application/javascript"
                | "application/x-javascript"
                | "application/ecmascript"
                | "application/xml"
                | "application/x-www-form-urlencoded"
        )
}

fn encode_body(body: &[u8], mime: &str) -> ResponseBody {
    if is_textual(mime) {
        if let Ok(text) = std::str::from_utf8(body) {
            return ResponseBody {
                body: text.to_string(),
                base64_encoded: false,
            };
        }
    }
    ResponseBody {
        body: base64::engine::general_purpose::STANDARD.encode(body),
        base64_encoded: true,
    }
}

// ── Tracking proxy ────────────────────────────────────────────────────────────

/// Records every request it forwards to `inner`.
pub struct TrackingTransport {
    kind: TransportKind,
    inner: Arc<dyn Transport>,
    log: Arc<RequestLog>,
}

impl TrackingTransport {
    pub fn new(kind: TransportKind, inner: Arc<dyn Transport>, log: Arc<RequestLog>) -> Self {
        Self { kind, inner, log }
    }
}

#[async_trait]
impl Transport for TrackingTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let id = self.log.begin(self.kind, &request);
        let mut guard = SendGuard {
            id: id.clone(),
            log: Arc::clone(&self.log),
            armed: true,
        };
        let result = self.inner.send(request).await;
        guard.armed = false;
        match result {
            Ok(response) => {
                self.log
                    .record_response(&id, response.status, &response.status_text, &response.headers);
                let TransportResponse {
                    status,
                    status_text,
                    headers,
                    body,
                } = response;
                Ok(TransportResponse {
                    status,
                    status_text,
                    headers,
                    body: Box::pin(TrackedBody {
                        id,
                        inner: body,
                        log: Arc::clone(&self.log),
                        done: false,
                    }),
                })
            }
            Err(error) => {
                self.log.fail(&id, &error.to_string(), false);
                Err(error)
            }
        }
    }
}

/// Finalizes the record as canceled if the send future is dropped before the
/// response head arrives.
struct SendGuard {
    id: RequestId,
    log: Arc<RequestLog>,
    armed: bool,
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        if self.armed {
            self.log.fail(&self.id, "request canceled", true);
        }
    }
}

/// Body stream wrapper that feeds chunks into the log.
///
/// Dropping it before the stream ends finalizes the record as canceled, so no
/// record stays in flight forever.
struct TrackedBody {
    id: RequestId,
    inner: BodyStream,
    log: Arc<RequestLog>,
    done: bool,
}

impl Stream for TrackedBody {
    type Item = Result<Bytes, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.log.append(&this.id, &chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(error))) => {
                this.done = true;
                this.log.fail(&this.id, &error.to_string(), false);
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                this.done = true;
                this.log.finish(&this.id);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        if !self.done {
            self.log
                .fail(&self.id, "response body dropped before completion", true);
        }
    }
}

// ── Tracker ───────────────────────────────────────────────────────────────────

/// What [`RequestTracker::enable`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterceptionReport {
    /// Kinds whose entry was replaced by a tracking proxy.
    pub installed: Vec<TransportKind>,
    /// Kinds that were already being tracked.
    pub already_tracked: Vec<TransportKind>,
    /// Kinds with no entry in the table; their traffic cannot be tracked.
    pub missing: Vec<TransportKind>,
}

impl InterceptionReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Installs and removes tracking proxies on a [`Transports`] table.
pub struct RequestTracker {
    transports: Arc<Transports>,
    log: Arc<RequestLog>,
    /// Originals replaced by `enable`, keyed by kind.  Non-empty iff enabled.
    saved: Mutex<HashMap<TransportKind, Arc<dyn Transport>>>,
}

impl RequestTracker {
    pub fn new(transports: Arc<Transports>) -> Self {
        Self::with_limits(transports, BufferLimits::default())
    }

    pub fn with_limits(transports: Arc<Transports>, limits: BufferLimits) -> Self {
        Self {
            transports,
            log: Arc::new(RequestLog::new(limits)),
            saved: Mutex::new(HashMap::new()),
        }
    }

    pub fn log(&self) -> &Arc<RequestLog> {
        &self.log
    }

    pub fn transports(&self) -> &Arc<Transports> {
        &self.transports
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.log.subscribe()
    }

    pub fn is_enabled(&self) -> bool {
        !self.saved().is_empty()
    }

    /// Wraps every installed transport in a tracking proxy.
    ///
    /// Idempotent: a kind that is already wrapped is left alone, so calling
    /// `enable` twice never stacks proxies and never loses the true original.
    pub fn enable(&self) -> InterceptionReport {
        let mut saved = self.saved();
        let mut report = InterceptionReport::default();
        for kind in TransportKind::ALL {
            if saved.contains_key(&kind) {
                report.already_tracked.push(kind);
                continue;
            }
            let Some(original) = self.transports.get(kind) else {
                report.missing.push(kind);
                continue;
            };
            let proxy = TrackingTransport::new(kind, Arc::clone(&original), Arc::clone(&self.log));
            self.transports.register(kind, Arc::new(proxy));
            saved.insert(kind, original);
            report.installed.push(kind);
        }
        if !report.missing.is_empty() {
            warn!(
                "request tracking unavailable for {:?}: no transport registered",
                report.missing
            );
        }
        info!("request tracking enabled for {:?}", report.installed);
        report
    }

    /// Restores the original transports.  Returns how many were restored;
    /// zero when tracking was not enabled.
    pub fn disable(&self) -> usize {
        let mut saved = self.saved();
        let restored = saved.len();
        for (kind, original) in saved.drain() {
            self.transports.register(kind, original);
        }
        if restored > 0 {
            info!("request tracking disabled; {restored} transport(s) restored");
        }
        restored
    }

    pub fn response_body(&self, id: &RequestId) -> Result<ResponseBody, TrackerError> {
        self.log.response_body(id)
    }

    pub fn reset(&self) {
        self.log.reset();
    }

    fn saved(&self) -> MutexGuard<'_, HashMap<TransportKind, Arc<dyn Transport>>> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
