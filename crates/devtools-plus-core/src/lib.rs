//! # devtools-plus-core
//!
//! The protocol-level heart of the DevTools-Plus bridge.  Everything here is
//! independent of sockets and HTTP servers: it sees text frames and transport
//! calls, and decides what to do with them.
//!
//! # Architecture overview (for beginners)
//!
//! A DevTools front-end (Chrome's inspector UI, VS Code, ...) speaks the
//! DevTools protocol to a debugging backend, here a Node.js inspector.  The
//! bridge sits in the middle and adds capabilities the backend lacks:
//!
//! - **`protocol`** – The JSON message envelope and the `sessionId` token
//!   rewriting applied to every forwarded frame.
//!
//! - **`network`** – A `Network` domain for the process the bridge runs in.
//!   Outbound HTTP goes through a swappable [`Transports`] table; enabling the
//!   domain wraps each entry in a recording proxy that emits `Network.*`
//!   events and keeps response bodies for `Network.getResponseBody`.
//!
//! - **`dom`** – A `DOM` domain for embedder-supplied document trees, built on
//!   an [`IdentityRegistry`] that hands out stable integer node ids without
//!   keeping nodes alive.
//!
//! - **`router`** – Per-session routing: which frames are answered locally,
//!   which backend events are suppressed, and which are forwarded untouched.
//!
//! - **`context`** – The process-wide state every session shares.

pub mod context;
pub mod dom;
pub mod network;
pub mod protocol;
pub mod router;

pub use context::BridgeContext;
pub use dom::{DomAgent, DomError, IdentityRegistry, MemoryNode, NodeId, NodeType, VendorNode};
pub use network::{
    BufferLimits, NetworkEvent, OutboundRequest, RequestId, RequestTracker, Transport,
    TransportError, TransportKind, TransportResponse, Transports,
};
pub use protocol::{ProtocolError, ProtocolMessage, SessionTokens};
pub use router::{Disposition, DomainRouter, LocalReply, Origin};
