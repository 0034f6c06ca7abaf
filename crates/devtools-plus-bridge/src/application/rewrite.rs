//! Rewriting backend discovery documents into the bridge's public address.
//!
//! # What gets rewritten (for beginners)
//!
//! A front-end finds debuggable targets by fetching `/json/list` and then
//! opening the `webSocketDebuggerUrl` of the target it wants.  If the bridge
//! served the backend's list unchanged, the front-end would connect straight
//! to the backend and bypass the bridge entirely.  So every URL that points at
//! the backend is moved to the bridge's port:
//!
//! ```text
//! backend:  ws://127.0.0.1:9229/abc
//! bridge:   ws://127.0.0.1:8229/abc
//! ```
//!
//! `devtoolsFrontendUrl` embeds the same address without the scheme
//! (`...&ws=127.0.0.1:9229/abc`, or `wss=` for TLS), so it is rewritten the
//! same way.  The
//! `v8only=true&` flag is dropped so the front-end shows every panel,
//! including Network.
//!
//! Everything here is pure string and JSON manipulation.

use serde_json::{Map, Value};

use crate::domain::descriptor::{
    browser_name, TargetDescriptor, DESCRIPTION_SUFFIX, PROTOCOL_VERSION, TARGET_TYPE,
    WEBKIT_VERSION,
};

const V8_ONLY_FLAG: &str = "v8only=true&";

// ── URL helpers ───────────────────────────────────────────────────────────────

/// Splits `scheme://authority/rest` into its three parts.  `rest` keeps its
/// leading `/` and is empty when the URL has no path.
fn split_authority(url: &str) -> Option<(&str, &str, &str)> {
    let (scheme, rest) = url.split_once("://")?;
    let end = rest
        .find(|c| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(end);
    if authority.is_empty() {
        return None;
    }
    Some((scheme, authority, tail))
}

/// Host part of an authority, with IPv6 brackets kept.
fn host_of(authority: &str) -> &str {
    if authority.starts_with('[') {
        return match authority.find(']') {
            Some(i) => &authority[..=i],
            None => authority,
        };
    }
    authority
        .rsplit_once(':')
        .map_or(authority, |(host, _)| host)
}

fn explicit_port(authority: &str) -> Option<u16> {
    let host = host_of(authority);
    authority[host.len()..].strip_prefix(':')?.parse().ok()
}

/// The port a WebSocket URL connects to, falling back to the scheme default.
///
/// ```rust
/// use devtools_plus_bridge::application::rewrite::backend_port;
///
/// assert_eq!(backend_port("ws://127.0.0.1:9229/abc"), Some(9229));
/// assert_eq!(backend_port("wss://inspector.local/abc"), Some(443));
/// ```
pub fn backend_port(ws_url: &str) -> Option<u16> {
    let (scheme, authority, _) = split_authority(ws_url)?;
    explicit_port(authority).or(match scheme.to_ascii_lowercase().as_str() {
        "ws" | "http" => Some(80),
        "wss" | "https" => Some(443),
        _ => None,
    })
}

/// Replaces the port of `ws_url` with `bridge_port`, keeping host and path.
///
/// Returns `None` when `ws_url` has no `scheme://authority` prefix.
pub fn rewrite_debugger_url(ws_url: &str, bridge_port: u16) -> Option<String> {
    let (scheme, authority, tail) = split_authority(ws_url)?;
    Some(format!("{scheme}://{}:{bridge_port}{tail}", host_of(authority)))
}

/// `host:port` of a URL.
pub fn origin_of(url: &str) -> Option<&str> {
    split_authority(url).map(|(_, authority, _)| authority)
}

/// Moves the `ws=` (or `wss=`) parameter of a front-end URL from the backend
/// address to the bridge address and removes `v8only=true&`.
///
/// The parameter name is the URL's scheme.
pub fn rewrite_frontend_url(frontend_url: &str, backend_ws: &str, bridge_ws: &str) -> String {
    let embedded = |url: &str| match url.split_once("://") {
        Some((scheme, rest)) => format!("{}={rest}", scheme.to_ascii_lowercase()),
        None => format!("ws={url}"),
    };
    frontend_url
        .replace(&embedded(backend_ws), &embedded(bridge_ws))
        .replace(V8_ONLY_FLAG, "")
}

// ── Documents ─────────────────────────────────────────────────────────────────

/// Rewrites one `/json/list` entry for a bridge listening on `bridge_port`.
///
/// `fallback_origin` is used for the favicon link when the descriptor has no
/// debugger URL to take the bridge origin from.  `favicon_override` is an
/// absolute icon URL configured by the operator, used as-is.
pub fn rewrite_list_item(
    mut descriptor: TargetDescriptor,
    bridge_port: u16,
    fallback_origin: &str,
    favicon_override: Option<&str>,
) -> TargetDescriptor {
    let bridge_ws = descriptor
        .web_socket_debugger_url
        .as_deref()
        .and_then(|url| rewrite_debugger_url(url, bridge_port));

    if let (Some(backend_ws), Some(bridge_ws)) =
        (descriptor.web_socket_debugger_url.as_deref(), bridge_ws.as_deref())
    {
        descriptor.devtools_frontend_url = descriptor
            .devtools_frontend_url
            .as_deref()
            .map(|url| rewrite_frontend_url(url, backend_ws, bridge_ws));
    } else {
        descriptor.devtools_frontend_url = descriptor
            .devtools_frontend_url
            .map(|url| url.replace(V8_ONLY_FLAG, ""));
    }

    let origin = bridge_ws
        .as_deref()
        .and_then(origin_of)
        .unwrap_or(fallback_origin)
        .to_string();
    if bridge_ws.is_some() {
        descriptor.web_socket_debugger_url = bridge_ws;
    }

    descriptor.description.push_str(DESCRIPTION_SUFFIX);
    descriptor.favicon_url = Some(match favicon_override {
        Some(url) => url.to_string(),
        None => format!("http://{origin}/favicon"),
    });
    descriptor.target_type = TARGET_TYPE.to_string();
    descriptor
}

/// `User-Agent` reported by `/json/version`.
pub fn user_agent() -> String {
    format!(
        "Mozilla/5.0 ({}; {}) DevTools-Plus/{}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        env!("CARGO_PKG_VERSION")
    )
}

/// Overrides the identity fields of a backend `/json/version` document.
pub fn rewrite_version(mut version: Map<String, Value>, bridge_ws: Option<String>) -> Map<String, Value> {
    version.insert("Browser".into(), Value::String(browser_name()));
    version.insert("Protocol-Version".into(), Value::String(PROTOCOL_VERSION.into()));
    version.insert("User-Agent".into(), Value::String(user_agent()));
    version.insert("WebKit-Version".into(), Value::String(WEBKIT_VERSION.into()));
    if let Some(url) = bridge_ws {
        version.insert("webSocketDebuggerUrl".into(), Value::String(url));
    }
    version
}

// ── Tests ─────────────────────────────────────────────────────────────────────
