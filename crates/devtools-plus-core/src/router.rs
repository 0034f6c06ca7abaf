//! Per-session domain routing.
//!
//! # What the router decides (for beginners)
//!
//! Every text frame crossing the bridge is shown to [`DomainRouter::route`]
//! along with the side it came from.  The answer is one of:
//!
//! | Disposition              | Meaning                                                   |
//! |--------------------------|-----------------------------------------------------------|
//! | `Forward`                | Pass the frame to the other side (after token rewriting). |
//! | `LocalCommand(reply)`    | A front-end command for a local domain; `reply` holds the |
//! |                          | response and events to write back to the front-end.       |
//! | `LocalEventSuppressed`   | A backend event for a local domain; drop it.              |
//!
//! Local domains are `Network` always, and `DOM` when the bridge has a
//! document attached.  Frames that do not parse as protocol messages, or that
//! have no `Domain.method`, are forwarded untouched.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::BridgeContext;
use crate::network::agent::NetworkAgent;
use crate::network::schema::NETWORK_DOMAIN;
use crate::protocol::message::{self, CommandOutput, ProtocolError, ProtocolMessage};

pub const DOM_DOMAIN: &str = "DOM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    FrontEnd,
    Backend,
}

/// Serialized frames to write back to the front-end for a local command.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalReply {
    /// Events produced by the command, in emission order.
    pub events: Vec<String>,
    /// The response (`result` or `error`).
    pub response: String,
}

impl LocalReply {
    /// Events first, then the response.
    pub fn into_frames(self) -> impl Iterator<Item = String> {
        self.events.into_iter().chain(std::iter::once(self.response))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Forward,
    LocalCommand(LocalReply),
    LocalEventSuppressed,
}

/// Routes frames for one relay session.
pub struct DomainRouter {
    context: Arc<BridgeContext>,
    network: NetworkAgent,
}

impl DomainRouter {
    pub fn new(context: Arc<BridgeContext>) -> Self {
        Self {
            network: NetworkAgent::new(Arc::clone(&context)),
            context,
        }
    }

    /// Whether this session has asked for `Network.*` events.
    pub fn network_enabled(&self) -> bool {
        self.network.is_enabled()
    }

    pub fn route(&self, origin: Origin, raw: &str) -> Disposition {
        let Some(message) = ProtocolMessage::parse(raw) else {
            return Disposition::Forward;
        };
        let Some(domain) = message.domain() else {
            return Disposition::Forward;
        };
        if !self.is_local(domain) {
            return Disposition::Forward;
        }

        match (origin, message.id) {
            (Origin::Backend, _) => {
                debug!(
                    "suppressing backend {}",
                    message.method.as_deref().unwrap_or_default()
                );
                Disposition::LocalEventSuppressed
            }
            (Origin::FrontEnd, Some(id)) => Disposition::LocalCommand(self.dispatch(id, &message)),
            // A front-end frame without an id is not a command; leave it alone.
            (Origin::FrontEnd, None) => Disposition::Forward,
        }
    }

    fn is_local(&self, domain: &str) -> bool {
        domain == NETWORK_DOMAIN || (domain == DOM_DOMAIN && self.context.dom().is_some())
    }

    fn dispatch(&self, id: u64, message: &ProtocolMessage) -> LocalReply {
        let session = message.session_id.as_deref();
        let method = message.method.as_deref().unwrap_or_default();
        let command = message.command().unwrap_or_default();

        let outcome: Result<CommandOutput, ProtocolError> = match (message.domain(), self.context.dom()) {
            (Some(NETWORK_DOMAIN), _) => self.network.handle(command, &message.params),
            (Some(DOM_DOMAIN), Some(dom)) => dom.handle(command, &message.params),
            _ => Err(ProtocolError::method_not_found(method)),
        };

        match outcome {
            Ok(output) => LocalReply {
                events: output
                    .events
                    .into_iter()
                    .map(|(name, params)| message::event(&name, params, session))
                    .collect(),
                response: message::response(id, output.result, session),
            },
            Err(error) => {
                warn!("{method} failed: {error}");
                LocalReply {
                    events: Vec::new(),
                    response: message::error_response(id, &error, session),
                }
            }
        }
    }
}
