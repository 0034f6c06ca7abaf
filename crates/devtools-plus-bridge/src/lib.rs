//! devtools-plus-bridge library crate.
//!
//! A DevTools protocol bridge that sits between a front-end (Chrome's
//! inspector, VS Code, ...) and a Node.js inspector, and adds the `Network`
//! domain the inspector does not implement.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Front-end (CDP JSON over WebSocket, /json over HTTP)
//!         ↕
//! [devtools-plus-bridge]
//!   ├── domain/           Pure types: BridgeConfig, TargetDescriptor
//!   ├── application/      Descriptor rewriting, session state machine
//!   └── infrastructure/
//!         ├── http_server/  /json endpoints + WebSocket upgrade (axum)
//!         ├── relay/        Front-end ↔ backend forwarding per session
//!         ├── backend_conn/ WebSocket to the inspector (tokio-tungstenite)
//!         ├── discovery/    Backend /json documents via the transport table
//!         ├── transport/    reqwest clients for the transport table
//!         └── config_file/  Optional TOML file
//!         ↕
//! Node.js inspector (port 9229 by default)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O, no async, no frameworks.
//! - `application` depends on `domain` only.
//! - `infrastructure` depends on all other layers plus `tokio`, `axum`,
//!   `tokio-tungstenite`, and `reqwest`.
//!
//! Routing decisions, request tracking, and the DOM registry live in
//! `devtools-plus-core`, which has no sockets at all.

/// Domain layer: pure configuration and descriptor types (no I/O).
pub mod domain;

/// Application layer: descriptor rewriting and session lifecycle rules.
pub mod application;

/// Infrastructure layer: HTTP/WebSocket server, relay, backend connection.
pub mod infrastructure;
