//! Process-wide state shared by every relay session.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::dom::{DomAgent, DomError, VendorNode};
use crate::network::tracker::{BufferLimits, InterceptionReport, RequestTracker};
use crate::network::transport::Transports;

/// Everything a [`DomainRouter`](crate::router::DomainRouter) needs: the
/// transport table, the request tracker, and (optionally) an attached document.
pub struct BridgeContext {
    transports: Arc<Transports>,
    tracker: RequestTracker,
    dom: Option<DomAgent>,
    /// Sessions that currently have `Network` enabled.
    network_sessions: Mutex<usize>,
}

impl BridgeContext {
    pub fn new(transports: Arc<Transports>) -> Self {
        Self::with_limits(transports, BufferLimits::default())
    }

    pub fn with_limits(transports: Arc<Transports>, limits: BufferLimits) -> Self {
        Self {
            tracker: RequestTracker::with_limits(Arc::clone(&transports), limits),
            transports,
            dom: None,
            network_sessions: Mutex::new(0),
        }
    }

    /// Attaches a document so `DOM.*` is answered locally.
    ///
    /// # Errors
    ///
    /// [`DomError::NotADocument`] unless `document` is a type-9 node.
    pub fn with_document(mut self, document: Arc<dyn VendorNode>) -> Result<Self, DomError> {
        self.dom = Some(DomAgent::new(document)?);
        Ok(self)
    }

    pub fn transports(&self) -> &Arc<Transports> {
        &self.transports
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    pub fn dom(&self) -> Option<&DomAgent> {
        self.dom.as_ref()
    }

    /// Registers one more session with `Network` enabled.  The first one turns
    /// tracking on.
    pub fn acquire_network(&self) -> InterceptionReport {
        let mut sessions = self.network_sessions.lock().unwrap_or_else(PoisonError::into_inner);
        *sessions += 1;
        debug!("network sessions: {}", *sessions);
        if *sessions == 1 {
            self.tracker.enable()
        } else {
            InterceptionReport {
                already_tracked: self.transports.kinds(),
                ..InterceptionReport::default()
            }
        }
    }

    /// Releases one session's hold on tracking.  The last one turns it off.
    pub fn release_network(&self) {
        let mut sessions = self.network_sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if *sessions == 0 {
            return;
        }
        *sessions -= 1;
        debug!("network sessions: {}", *sessions);
        if *sessions == 0 {
            self.tracker.disable();
        }
    }

    pub fn network_sessions(&self) -> usize {
        *self.network_sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
