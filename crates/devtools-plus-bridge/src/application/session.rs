//! Relay session lifecycle.
//!
//! Every front-end connection gets one [`SessionRecord`] in the shared
//! [`SessionTable`].  The relay moves it through
//!
//! ```text
//! Connecting ──► Bridging ──► Closing ──► Closed
//!      │                                   ▲
//!      └───────────────────────────────────┘   (discovery / connect failure)
//! ```
//!
//! Reaching `Closed` releases the record.  Any other move is rejected with
//! [`SessionError::IllegalTransition`], so a bug in the relay shows up as a
//! logged error instead of a session stuck in a half-open state.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Bridging,
    Closing,
    Closed,
}

impl SessionState {
    /// Whether `self → next` is a legal move.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Bridging) | (Connecting, Closed) | (Bridging, Closing) | (Closing, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("unknown session {0}")]
    UnknownSession(Uuid),

    #[error("illegal session transition {from} -> {to}")]
    IllegalTransition { from: SessionState, to: SessionState },
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub peer: SocketAddr,
    pub state: SessionState,
    /// Backend WebSocket URL, once discovery has found it.
    pub backend_url: Option<String>,
    pub opened_at: Instant,
}

/// All live relay sessions.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<Uuid, SessionRecord>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session in `Connecting` and returns its id.
    pub fn open(&mut self, peer: SocketAddr) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            SessionRecord {
                id,
                peer,
                state: SessionState::Connecting,
                backend_url: None,
                opened_at: Instant::now(),
            },
        );
        id
    }

    /// Moves session `id` to `next`.  Moving to `Closed` removes the record.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownSession`] if `id` is not live,
    /// [`SessionError::IllegalTransition`] if the move is not allowed.  The
    /// record is left unchanged on error.
    pub fn transition(&mut self, id: Uuid, next: SessionState) -> Result<(), SessionError> {
        let record = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        if !record.state.can_transition_to(next) {
            return Err(SessionError::IllegalTransition {
                from: record.state,
                to: next,
            });
        }
        record.state = next;
        if next == SessionState::Closed {
            self.sessions.remove(&id);
        }
        Ok(())
    }

    pub fn set_backend(&mut self, id: Uuid, url: impl Into<String>) -> Result<(), SessionError> {
        let record = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        record.backend_url = Some(url.into());
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<&SessionRecord> {
        self.sessions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
