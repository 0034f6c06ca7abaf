//! Target descriptors as served by `/json/list`.
//!
//! The backend inspector describes each debuggable target with a small JSON
//! object.  The bridge fetches it, rewrites a handful of fields, and serves it
//! back under its own address.  Fields the bridge does not know about are kept
//! in [`TargetDescriptor::extra`] and round-trip untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Appended to the backend's description so the front-end shows which
/// targets go through the bridge.
pub const DESCRIPTION_SUFFIX: &str = " with DevTools-Plus";

/// Advertised target type.  `page` makes front-ends enable the Network panel.
pub const TARGET_TYPE: &str = "page";

/// `Protocol-Version` reported by `/json/version`.
pub const PROTOCOL_VERSION: &str = "1.2";

/// `WebKit-Version` reported by `/json/version`.
pub const WEBKIT_VERSION: &str = "537.36 (@cfede9db1d154de0468cb0538479f34c0755a0f4)";

/// `Browser` reported by `/json/version`.
pub fn browser_name() -> String {
    format!("DevTools-Plus/{}", env!("CARGO_PKG_VERSION"))
}

/// One entry of `/json/list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetDescriptor {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub target_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devtools_frontend_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_socket_debugger_url: Option<String>,
    /// Backend fields the bridge passes through unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_parses_node_inspector_entry() {
        // Arrange
        let raw = json!({
            "description": "node.js instance",
            "devtoolsFrontendUrl": "devtools://devtools/bundled/js_app.html?experiments=true&v8only=true&ws=127.0.0.1:9229/abc",
            "faviconUrl": "https://nodejs.org/static/images/favicons/favicon.ico",
            "id": "abc",
            "title": "app.js",
            "type": "node",
            "url": "file:///srv/app.js",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9229/abc"
        });

        // Act
        let descriptor: TargetDescriptor = serde_json::from_value(raw).unwrap();

        // Assert
        assert_eq!(descriptor.target_type, "node");
        assert_eq!(
            descriptor.web_socket_debugger_url.as_deref(),
            Some("ws://127.0.0.1:9229/abc")
        );
        assert!(descriptor.extra.is_empty());
    }

    #[test]
    fn test_unknown_fields_survive_serialization() {
        let raw = json!({"id": "x", "url": "", "parentId": "p1"});

        let descriptor: TargetDescriptor = serde_json::from_value(raw).unwrap();
        let back = serde_json::to_value(&descriptor).unwrap();

        assert_eq!(back["parentId"], "p1");
        assert!(back.get("faviconUrl").is_none());
    }

    #[test]
    fn test_browser_name_carries_crate_version() {
        assert!(browser_name().starts_with("DevTools-Plus/"));
    }
}
