//! Infrastructure layer for devtools-plus-bridge.
//!
//! Everything that touches the outside world.
//!
//! # Responsibilities
//!
//! - Serving the `/json` discovery endpoints and accepting front-end
//!   WebSocket upgrades (`http_server`)
//! - Running relay sessions between a front-end and the backend (`relay`)
//! - Opening the backend WebSocket (`backend_conn`)
//! - Fetching backend discovery documents through the transport table
//!   (`discovery`)
//! - The `reqwest` clients installed in the transport table (`transport`)
//! - Loading the optional TOML config file (`config_file`)
//!
//! # What does NOT belong here?
//!
//! - Descriptor rewriting rules (that is the application layer)
//! - Protocol routing and the Network/DOM domains (`devtools-plus-core`)

pub mod backend_conn;
pub mod config_file;
pub mod discovery;
pub mod http_server;
pub mod relay;
pub mod transport;

pub use http_server::{run_server, serve_on};
pub use transport::default_transports;
