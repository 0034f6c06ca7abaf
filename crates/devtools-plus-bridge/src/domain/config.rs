//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! `main.rs` fills it from (in order of precedence) CLI flags, `DEVTOOLS_PLUS_*`
//! environment variables, an optional TOML file, and the defaults below.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use devtools_plus_core::network::tracker::{BufferLimits, DEFAULT_MAX_TRACKED_REQUESTS};

/// Port the bridge listens on by default.
pub const DEFAULT_PORT: u16 = 8229;

/// Default backend: a Node.js inspector on its standard port.
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:9229";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use devtools_plus_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.port(), 8229);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// Base URL of the backend inspector's HTTP endpoint, e.g.
    /// `http://127.0.0.1:9229`.  Discovery requests go to `{backend_url}/json/...`.
    pub backend_url: String,

    /// Image served at `/favicon`.  `None` serves the built-in icon.
    pub favicon_path: Option<PathBuf>,

    /// Tracked requests kept before the oldest completed ones are evicted.
    pub max_tracked_requests: usize,

    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl BridgeConfig {
    /// The port front-ends connect to.  Used when rewriting descriptor URLs
    /// and session tokens.
    pub fn port(&self) -> u16 {
        self.bind_addr.port()
    }

    pub fn buffer_limits(&self) -> BufferLimits {
        BufferLimits {
            max_requests: self.max_tracked_requests,
            ..BufferLimits::default()
        }
    }
}

impl Default for BridgeConfig {
    /// | Field                | Default                 |
    /// |----------------------|-------------------------|
    /// | bind_addr            | `127.0.0.1:8229`        |
    /// | backend_url          | `http://127.0.0.1:9229` |
    /// | favicon_path         | none (built-in icon)    |
    /// | max_tracked_requests | 1000                    |
    /// | log_level            | `info`                  |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            favicon_path: None,
            max_tracked_requests: DEFAULT_MAX_TRACKED_REQUESTS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
