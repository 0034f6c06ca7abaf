//! Application layer for devtools-plus-bridge.
//!
//! Pure logic sitting between the wire and the domain types: how backend
//! discovery documents are rewritten for the bridge's address, and which
//! states a relay session may move through.
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or serving HTTP (that is infrastructure)
//! - Tokio task spawning (that happens in the infrastructure layer)
//! - Protocol routing (that lives in `devtools-plus-core`)

pub mod rewrite;
pub mod session;

pub use rewrite::{backend_port, rewrite_debugger_url, rewrite_list_item, rewrite_version};
pub use session::{SessionError, SessionRecord, SessionState, SessionTable};
