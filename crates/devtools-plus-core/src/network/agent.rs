//! `Network` domain command handling for one front-end session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::events::RequestId;
use super::tracker::TrackerError;
use crate::context::BridgeContext;
use crate::protocol::message::{parse_params, CommandOutput, ProtocolError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnableParams {
    max_total_buffer_size: Option<usize>,
    max_resource_buffer_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseBodyParams {
    request_id: RequestId,
}

/// Per-session `Network` state.
///
/// Enabling takes a reference on process-wide tracking through the
/// [`BridgeContext`]; disabling (or dropping the agent when the session ends)
/// gives it back.  Tracking stays on while any session has it enabled.
pub struct NetworkAgent {
    context: Arc<BridgeContext>,
    enabled: AtomicBool,
}

impl NetworkAgent {
    pub fn new(context: Arc<BridgeContext>) -> Self {
        Self {
            context,
            enabled: AtomicBool::new(false),
        }
    }

    /// Whether this session wants `Network.*` events.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Dispatches one `Network.<command>` call.
    pub fn handle(&self, command: &str, params: &Value) -> Result<CommandOutput, ProtocolError> {
        match command {
            "enable" => {
                let p: EnableParams = parse_params(params)?;
                self.enable(p.max_total_buffer_size, p.max_resource_buffer_size);
                Ok(CommandOutput::empty())
            }
            "disable" => {
                self.disable();
                Ok(CommandOutput::empty())
            }
            "getResponseBody" => {
                let p: ResponseBodyParams = parse_params(params)?;
                let body = self.context.tracker().response_body(&p.request_id)?;
                Ok(CommandOutput::with_result(json!(body)))
            }
            "canClearBrowserCache" | "canClearBrowserCookies" => {
                Ok(CommandOutput::with_result(json!({ "result": false })))
            }
            "setCacheDisabled" | "setUserAgentOverride" | "setExtraHTTPHeaders" => {
                debug!("Network.{command} acknowledged without effect");
                Ok(CommandOutput::empty())
            }
            "clearBrowserCache" | "clearBrowserCookies" | "emulateNetworkConditions" => Err(
                ProtocolError::server_error(format!("Network.{command} is not supported")),
            ),
            _ => Err(ProtocolError::method_not_found(&format!("Network.{command}"))),
        }
    }

    fn enable(&self, max_total: Option<usize>, max_resource: Option<usize>) {
        self.context
            .tracker()
            .log()
            .set_buffer_limits(max_total, max_resource);
        if !self.enabled.swap(true, Ordering::AcqRel) {
            let report = self.context.acquire_network();
            info!(
                "Network domain enabled for session; tracking {:?}",
                report.installed
            );
        }
    }

    fn disable(&self) {
        if self.enabled.swap(false, Ordering::AcqRel) {
            self.context.release_network();
        }
    }
}

impl Drop for NetworkAgent {
    fn drop(&mut self) {
        self.disable();
    }
}

impl From<TrackerError> for ProtocolError {
    fn from(error: TrackerError) -> Self {
        ProtocolError::server_error(error.to_string())
    }
}
