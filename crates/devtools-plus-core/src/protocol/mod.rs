//! DevTools wire protocol helpers.
//!
//! - [`message`] – the JSON envelope (`id` / `method` / `params` / `sessionId`)
//!   plus builders for responses, error responses, and events.
//! - [`session_token`] – the textual rewriting of `sessionId` values as
//!   messages cross the bridge.

pub mod message;
pub mod session_token;

pub use message::{CommandOutput, ProtocolError, ProtocolMessage};
pub use session_token::SessionTokens;
