//! `Network.*` event payloads.
//!
//! Each variant serializes to a complete protocol event,
//! `{"method":"Network.<name>","params":{...}}`, via serde's adjacent tagging.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one tracked request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// A fresh random (v4) identifier.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource type reported for every tracked request.
pub const RESOURCE_TYPE: &str = "Other";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Initiator {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl Default for Initiator {
    fn default() -> Self {
        Self { kind: "other" }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum NetworkEvent {
    #[serde(rename = "Network.requestWillBeSent", rename_all = "camelCase")]
    RequestWillBeSent {
        request_id: RequestId,
        loader_id: String,
        #[serde(rename = "documentURL")]
        document_url: String,
        request: RequestPayload,
        timestamp: f64,
        wall_time: f64,
        initiator: Initiator,
        #[serde(rename = "type")]
        resource_type: &'static str,
    },

    #[serde(rename = "Network.responseReceived", rename_all = "camelCase")]
    ResponseReceived {
        request_id: RequestId,
        loader_id: String,
        timestamp: f64,
        #[serde(rename = "type")]
        resource_type: &'static str,
        response: ResponsePayload,
    },

    #[serde(rename = "Network.dataReceived", rename_all = "camelCase")]
    DataReceived {
        request_id: RequestId,
        timestamp: f64,
        data_length: usize,
        encoded_data_length: usize,
    },

    #[serde(rename = "Network.loadingFinished", rename_all = "camelCase")]
    LoadingFinished {
        request_id: RequestId,
        timestamp: f64,
        encoded_data_length: usize,
    },

    #[serde(rename = "Network.loadingFailed", rename_all = "camelCase")]
    LoadingFailed {
        request_id: RequestId,
        timestamp: f64,
        #[serde(rename = "type")]
        resource_type: &'static str,
        error_text: String,
        canceled: bool,
    },
}

impl NetworkEvent {
    pub fn method(&self) -> &'static str {
        match self {
            Self::RequestWillBeSent { .. } => "Network.requestWillBeSent",
            Self::ResponseReceived { .. } => "Network.responseReceived",
            Self::DataReceived { .. } => "Network.dataReceived",
            Self::LoadingFinished { .. } => "Network.loadingFinished",
            Self::LoadingFailed { .. } => "Network.loadingFailed",
        }
    }

    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::RequestWillBeSent { request_id, .. }
            | Self::ResponseReceived { request_id, .. }
            | Self::DataReceived { request_id, .. }
            | Self::LoadingFinished { request_id, .. }
            | Self::LoadingFailed { request_id, .. } => request_id,
        }
    }

    /// `true` for `loadingFinished` and `loadingFailed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoadingFinished { .. } | Self::LoadingFailed { .. })
    }

    /// The wire form of the event.
    pub fn to_message(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(RequestId::new_v4(), RequestId::new_v4());
    }

    #[test]
    fn test_event_serializes_as_protocol_message() {
        // Arrange
        let event = NetworkEvent::LoadingFinished {
            request_id: RequestId::from("r-1"),
            timestamp: 1.5,
            encoded_data_length: 42,
        };

        // Act
        let value: Value = serde_json::from_str(&event.to_message().unwrap()).unwrap();

        // Assert
        assert_eq!(value["method"], "Network.loadingFinished");
        assert_eq!(value["method"], event.method());
        assert_eq!(value["params"]["requestId"], "r-1");
        assert_eq!(value["params"]["encodedDataLength"], 42);
    }

    #[test]
    fn test_request_will_be_sent_uses_protocol_field_names() {
        let event = NetworkEvent::RequestWillBeSent {
            request_id: RequestId::from("r-2"),
            loader_id: "bridge".to_string(),
            document_url: "http://h/".to_string(),
            request: RequestPayload {
                url: "http://h/".to_string(),
                method: "GET".to_string(),
                headers: BTreeMap::new(),
                post_data: None,
            },
            timestamp: 0.0,
            wall_time: 0.0,
            initiator: Initiator::default(),
            resource_type: RESOURCE_TYPE,
        };

        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["params"]["documentURL"], "http://h/");
        assert_eq!(value["params"]["wallTime"], 0.0);
        assert_eq!(value["params"]["initiator"]["type"], "other");
        assert_eq!(value["params"]["type"], "Other");
        assert!(value["params"]["request"].get("postData").is_none());
    }

    #[test]
    fn test_terminal_events() {
        let failed = NetworkEvent::LoadingFailed {
            request_id: RequestId::from("x"),
            timestamp: 0.0,
            resource_type: RESOURCE_TYPE,
            error_text: "net::ERR_FAILED".to_string(),
            canceled: false,
        };
        let data = NetworkEvent::DataReceived {
            request_id: RequestId::from("x"),
            timestamp: 0.0,
            data_length: 1,
            encoded_data_length: 1,
        };

        assert!(failed.is_terminal());
        assert!(!data.is_terminal());
        assert_eq!(failed.request_id().as_str(), "x");
    }
}
