//! DevTools-Plus bridge entry point.
//!
//! Serves the DevTools discovery endpoints and protocol WebSocket on its own
//! port, relays every front-end session to a Node.js inspector, and answers
//! the `Network` domain locally.
//!
//! # Usage
//!
//! ```text
//! devtools-plus [OPTIONS]
//!
//! Options:
//!   --port <PORT>                  Listener port [default: 8229]
//!   --bind <ADDR>                  Listener address [default: 127.0.0.1]
//!   --backend <URL>                Inspector HTTP endpoint [default: http://127.0.0.1:9229]
//!   --favicon <PATH|URL>           Icon served at /favicon
//!   --max-tracked-requests <N>     Tracked requests kept [default: 1000]
//!   --log-level <FILTER>           Default log filter [default: info]
//!   --config <FILE>                TOML file with a [bridge] table
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                             | Flag                     |
//! |--------------------------------------|--------------------------|
//! | `DEVTOOLS_PLUS_PORT`                 | `--port`                 |
//! | `DEVTOOLS_PLUS_BIND`                 | `--bind`                 |
//! | `DEVTOOLS_PLUS_BACKEND`              | `--backend`              |
//! | `DEVTOOLS_PLUS_FAVICON`              | `--favicon`              |
//! | `DEVTOOLS_PLUS_MAX_TRACKED_REQUESTS` | `--max-tracked-requests` |
//! | `DEVTOOLS_PLUS_LOG_LEVEL`            | `--log-level`            |
//! | `DEVTOOLS_PLUS_CONFIG`               | `--config`               |
//!
//! Precedence: flag or variable, then the config file, then the defaults.
//! `RUST_LOG`, when set, replaces the log filter entirely.
//!
//! # Architecture overview
//!
//! ```text
//! DevTools front-end  (CDP over WebSocket, /json over HTTP)
//!       ↕
//! devtools-plus  ← this process
//!   domain/          BridgeConfig, TargetDescriptor
//!   application/     descriptor rewriting, session states
//!   infrastructure/  axum server, relay, backend connection
//!       ↕
//! Node.js inspector  (port 9229)
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use devtools_plus_bridge::domain::config::{BridgeConfig, DEFAULT_PORT};
use devtools_plus_bridge::infrastructure::config_file::{load_config_file, ConfigFile};
use devtools_plus_bridge::infrastructure::{default_transports, run_server};
use devtools_plus_core::BridgeContext;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// DevTools-Plus: adds a Network panel to Node.js debugging sessions.
///
/// Every option is optional so that values missing on the command line can
/// come from the config file before falling back to the defaults.
#[derive(Debug, Default, Parser)]
#[command(
    name = "devtools-plus",
    about = "DevTools protocol bridge adding the Network domain to Node.js inspectors",
    version
)]
struct Cli {
    /// TCP port front-ends connect to.
    #[arg(long, env = "DEVTOOLS_PLUS_PORT")]
    port: Option<u16>,

    /// IP address to bind to.  `0.0.0.0` exposes the bridge on every interface.
    #[arg(long, env = "DEVTOOLS_PLUS_BIND")]
    bind: Option<String>,

    /// HTTP endpoint of the backend inspector.
    #[arg(long, env = "DEVTOOLS_PLUS_BACKEND")]
    backend: Option<String>,

    /// Icon file served at `/favicon`, or an absolute URL advertised instead.
    #[arg(long, env = "DEVTOOLS_PLUS_FAVICON")]
    favicon: Option<PathBuf>,

    /// Tracked requests kept before the oldest completed ones are evicted.
    #[arg(long, env = "DEVTOOLS_PLUS_MAX_TRACKED_REQUESTS")]
    max_tracked_requests: Option<usize>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "DEVTOOLS_PLUS_LOG_LEVEL")]
    log_level: Option<String>,

    /// TOML configuration file.
    #[arg(long, env = "DEVTOOLS_PLUS_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Merges the arguments over `file` over [`BridgeConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address is not a valid IP address.
    fn into_bridge_config(self, file: ConfigFile) -> anyhow::Result<BridgeConfig> {
        let defaults = BridgeConfig::default();
        let section = file.bridge;

        let port = self.port.or(section.port).unwrap_or(DEFAULT_PORT);
        let bind_addr = match self.bind.or(section.bind) {
            Some(bind) => {
                let ip: IpAddr = bind
                    .parse()
                    .with_context(|| format!("invalid bind address: '{bind}'"))?;
                SocketAddr::new(ip, port)
            }
            None => SocketAddr::new(defaults.bind_addr.ip(), port),
        };

        Ok(BridgeConfig {
            bind_addr,
            backend_url: self
                .backend
                .or(section.backend)
                .unwrap_or(defaults.backend_url),
            favicon_path: self.favicon.or(section.favicon),
            max_tracked_requests: self
                .max_tracked_requests
                .or(section.max_tracked_requests)
                .unwrap_or(defaults.max_tracked_requests),
            log_level: self
                .log_level
                .or(section.log_level)
                .unwrap_or(defaults.log_level),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the config file, if any, is loaded.
/// 2. `tracing_subscriber` is initialised from `RUST_LOG` or the configured
///    log level.
/// 3. The transport table is filled with `reqwest` clients and wrapped in a
///    [`BridgeContext`] shared by every session.
/// 4. A Ctrl+C handler clears a shared `AtomicBool`.
/// 5. [`run_server`] serves until the flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file = match cli.config.as_deref() {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };
    let config = cli.into_bridge_config(file)?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "DevTools-Plus bridge starting: listen={}, backend={}",
        config.bind_addr, config.backend_url
    );

    // ── Shared bridge state ───────────────────────────────────────────────────
    let transports = Arc::new(default_transports().context("failed to build HTTP clients")?);
    let context = Arc::new(BridgeContext::with_limits(transports, config.buffer_limits()));

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Main server loop ──────────────────────────────────────────────────────
    run_server(config, context, running).await?;

    info!("DevTools-Plus bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use devtools_plus_bridge::infrastructure::config_file::parse_config;

    #[test]
    fn test_cli_defaults_leave_everything_unset() {
        // Arrange: parse with no arguments
        let cli = Cli::parse_from(["devtools-plus"]);

        // Assert
        assert_eq!(cli.port, None);
        assert_eq!(cli.backend, None);
        assert_eq!(cli.config, None);
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::parse_from(["devtools-plus", "--port", "9999"]);
        assert_eq!(cli.port, Some(9999));
    }

    #[test]
    fn test_cli_backend_override() {
        let cli = Cli::parse_from(["devtools-plus", "--backend", "http://10.0.0.5:9229"]);
        assert_eq!(cli.backend.as_deref(), Some("http://10.0.0.5:9229"));
    }

    #[test]
    fn test_cli_max_tracked_requests_override() {
        let cli = Cli::parse_from(["devtools-plus", "--max-tracked-requests", "10"]);
        assert_eq!(cli.max_tracked_requests, Some(10));
    }

    #[test]
    fn test_into_bridge_config_defaults() {
        // Arrange
        let cli = Cli::parse_from(["devtools-plus"]);

        // Act
        let config = cli.into_bridge_config(ConfigFile::default()).unwrap();

        // Assert
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_into_bridge_config_custom_bind_and_port() {
        let cli = Cli::parse_from(["devtools-plus", "--bind", "0.0.0.0", "--port", "8300"]);
        let config = cli.into_bridge_config(ConfigFile::default()).unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8300");
    }

    #[test]
    fn test_file_values_fill_in_missing_flags() {
        let file = parse_config(
            "[bridge]\nport = 9100\nbackend = \"http://inspector:9229\"\nlog_level = \"debug\"\n",
        )
        .unwrap();
        let cli = Cli::parse_from(["devtools-plus"]);

        let config = cli.into_bridge_config(file).unwrap();

        assert_eq!(config.port(), 9100);
        assert_eq!(config.backend_url, "http://inspector:9229");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_flags_win_over_file() {
        let file = parse_config("[bridge]\nport = 9100\nmax_tracked_requests = 5\n").unwrap();
        let cli = Cli::parse_from(["devtools-plus", "--port", "9200"]);

        let config = cli.into_bridge_config(file).unwrap();

        assert_eq!(config.port(), 9200);
        assert_eq!(config.max_tracked_requests, 5);
    }

    #[test]
    fn test_into_bridge_config_invalid_bind_returns_error() {
        // Arrange: an invalid IP address string
        let cli = Cli {
            bind: Some("not.an.ip".to_string()),
            ..Cli::default()
        };

        // Act
        let result = cli.into_bridge_config(ConfigFile::default());

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }
}
