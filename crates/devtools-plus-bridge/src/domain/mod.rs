//! Domain layer for devtools-plus-bridge.
//!
//! Pure types with no I/O: runtime configuration and the target descriptor
//! shape served by the `/json` discovery endpoints.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `axum`, or WebSocket types
//! - File I/O or environment variable reading
//! - Anything that could block or fail due to external state

pub mod config;
pub mod descriptor;

pub use config::BridgeConfig;
pub use descriptor::TargetDescriptor;
