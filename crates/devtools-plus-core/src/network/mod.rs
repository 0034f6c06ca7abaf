//! The `Network` domain: transports, request tracking, and events.

pub mod agent;
pub mod events;
pub mod schema;
pub mod tracker;
pub mod transport;

pub use agent::NetworkAgent;
pub use events::{NetworkEvent, RequestId};
pub use tracker::{
    BufferLimits, InterceptionReport, RequestLog, RequestTracker, ResponseBody, TrackerError,
    DEFAULT_MAX_TRACKED_REQUESTS,
};
pub use transport::{
    split_url, BodyStream, OutboundRequest, Transport, TransportError, TransportKind,
    TransportResponse, Transports,
};
