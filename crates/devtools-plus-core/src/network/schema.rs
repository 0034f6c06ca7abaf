//! The `Network` domain description served from `/json/protocol`.
//!
//! Node.js inspectors describe only the domains they implement.  The bridge
//! adds its own `Network` domain so front-ends enable the Network panel.

use std::sync::OnceLock;

use serde_json::{json, Value};

pub const NETWORK_DOMAIN: &str = "Network";

/// The static domain description, built once on first use.
pub fn network_domain() -> &'static Value {
    static DOMAIN: OnceLock<Value> = OnceLock::new();
    DOMAIN.get_or_init(|| {
        json!({
            "domain": NETWORK_DOMAIN,
            "experimental": false,
            "dependencies": ["Debugger", "Runtime"],
            "types": [
                { "id": "RequestId", "type": "string", "description": "Unique request identifier." },
                { "id": "TimeSinceEpoch", "type": "number", "description": "UTC time in seconds, counted from January 1, 1970." },
                { "id": "MonotonicTime", "type": "number", "description": "Monotonically increasing time in seconds since an arbitrary point in the past." },
                { "id": "Headers", "type": "object", "description": "Request / response headers as keys / values of JSON object." },
                {
                    "id": "Request",
                    "type": "object",
                    "properties": [
                        { "name": "url", "type": "string" },
                        { "name": "method", "type": "string" },
                        { "name": "headers", "$ref": "Headers" },
                        { "name": "postData", "type": "string", "optional": true }
                    ]
                },
                {
                    "id": "Response",
                    "type": "object",
                    "properties": [
                        { "name": "url", "type": "string" },
                        { "name": "status", "type": "integer" },
                        { "name": "statusText", "type": "string" },
                        { "name": "headers", "$ref": "Headers" },
                        { "name": "mimeType", "type": "string" }
                    ]
                }
            ],
            "commands": [
                {
                    "name": "enable",
                    "parameters": [
                        { "name": "maxTotalBufferSize", "type": "integer", "optional": true },
                        { "name": "maxResourceBufferSize", "type": "integer", "optional": true }
                    ]
                },
                { "name": "disable" },
                {
                    "name": "getResponseBody",
                    "parameters": [ { "name": "requestId", "$ref": "RequestId" } ],
                    "returns": [
                        { "name": "body", "type": "string" },
                        { "name": "base64Encoded", "type": "boolean" }
                    ]
                },
                { "name": "canClearBrowserCache", "returns": [ { "name": "result", "type": "boolean" } ] },
                { "name": "canClearBrowserCookies", "returns": [ { "name": "result", "type": "boolean" } ] },
                { "name": "setCacheDisabled", "parameters": [ { "name": "cacheDisabled", "type": "boolean" } ] },
                { "name": "setUserAgentOverride", "parameters": [ { "name": "userAgent", "type": "string" } ] },
                { "name": "setExtraHTTPHeaders", "parameters": [ { "name": "headers", "$ref": "Headers" } ] }
            ],
            "events": [
                {
                    "name": "requestWillBeSent",
                    "parameters": [
                        { "name": "requestId", "$ref": "RequestId" },
                        { "name": "loaderId", "type": "string" },
                        { "name": "documentURL", "type": "string" },
                        { "name": "request", "$ref": "Request" },
                        { "name": "timestamp", "$ref": "MonotonicTime" },
                        { "name": "wallTime", "$ref": "TimeSinceEpoch" },
                        { "name": "initiator", "type": "object" },
                        { "name": "type", "type": "string", "optional": true }
                    ]
                },
                {
                    "name": "responseReceived",
                    "parameters": [
                        { "name": "requestId", "$ref": "RequestId" },
                        { "name": "loaderId", "type": "string" },
                        { "name": "timestamp", "$ref": "MonotonicTime" },
                        { "name": "type", "type": "string" },
                        { "name": "response", "$ref": "Response" }
                    ]
                },
                {
                    "name": "dataReceived",
                    "parameters": [
                        { "name": "requestId", "$ref": "RequestId" },
                        { "name": "timestamp", "$ref": "MonotonicTime" },
                        { "name": "dataLength", "type": "integer" },
                        { "name": "encodedDataLength", "type": "integer" }
                    ]
                },
                {
                    "name": "loadingFinished",
                    "parameters": [
                        { "name": "requestId", "$ref": "RequestId" },
                        { "name": "timestamp", "$ref": "MonotonicTime" },
                        { "name": "encodedDataLength", "type": "number" }
                    ]
                },
                {
                    "name": "loadingFailed",
                    "parameters": [
                        { "name": "requestId", "$ref": "RequestId" },
                        { "name": "timestamp", "$ref": "MonotonicTime" },
                        { "name": "type", "type": "string" },
                        { "name": "errorText", "type": "string" },
                        { "name": "canceled", "type": "boolean", "optional": true }
                    ]
                }
            ]
        })
    })
}

/// Appends the `Network` domain to a protocol description's `domains` array.
///
/// Returns `false` (and leaves `protocol` untouched) when there is no
/// `domains` array or a `Network` domain is already listed.
pub fn merge_network_domain(protocol: &mut Value) -> bool {
    let Some(domains) = protocol.get_mut("domains").and_then(Value::as_array_mut) else {
        return false;
    };
    let present = domains
        .iter()
        .any(|d| d.get("domain").and_then(Value::as_str) == Some(NETWORK_DOMAIN));
    if present {
        return false;
    }
    domains.push(network_domain().clone());
    true
}
