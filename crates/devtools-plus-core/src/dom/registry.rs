//! Identity registry: live vendor nodes ⇄ integer handles.
//!
//! # How identity works (for beginners)
//!
//! The front-end needs a small integer for every node it has seen so it can
//! say "give me the children of node 12".  The registry hands those integers
//! out and remembers which node each one belongs to.
//!
//! Two rules shape the design:
//!
//! 1. **Same node, same handle.**  Asking twice for the same node returns the
//!    same integer.  Nodes are keyed by their `Arc` allocation address.
//! 2. **Handles never keep nodes alive.**  The registry stores `Weak`
//!    references only.  Once the embedder drops a node, its handle stops
//!    resolving, even if the front-end still remembers it.
//!
//! A `Weak` also pins the allocation itself (not the value) until it is
//! dropped, so an address in the table can never be reused by a *different*
//! node while its entry exists.  [`IdentityRegistry::sweep`] removes entries
//! whose nodes are gone and releases those addresses.
//!
//! # Thread safety
//!
//! Handle issuance and insertion happen under a single write lock, so two
//! threads identifying the same node at once still get the same handle.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tracing::trace;

use super::node::{NodeId, NodeType, VendorNode};
use super::DomError;

#[derive(Default)]
struct RegistryState {
    /// Next handle to issue.  Handles start at 0 and are never reused.
    next_id: u64,
    by_address: HashMap<usize, NodeId>,
    entries: HashMap<NodeId, Weak<dyn VendorNode>>,
}

/// Maps vendor nodes to stable [`NodeId`] handles without owning them.
#[derive(Default)]
pub struct IdentityRegistry {
    state: RwLock<RegistryState>,
}

fn address_of(node: &Arc<dyn VendorNode>) -> usize {
    Arc::as_ptr(node) as *const () as usize
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for `node`, issuing a new one on first sight.
    ///
    /// # Errors
    ///
    /// [`DomError::InvalidNodeType`] if the node's kind is not one of the
    /// supported DOM4 kinds.  Nothing is recorded in that case.
    pub fn identify(&self, node: &Arc<dyn VendorNode>) -> Result<NodeId, DomError> {
        NodeType::try_from(node.node_type())?;

        let key = address_of(node);
        let mut state = self.write();
        if let Some(id) = state.by_address.get(&key) {
            return Ok(*id);
        }

        let id = NodeId(state.next_id);
        state.next_id += 1;
        state.by_address.insert(key, id);
        state.entries.insert(id, Arc::downgrade(node));
        trace!("registered node {id} (type {})", node.node_type());
        Ok(id)
    }

    /// Returns the node behind `id`, or `None` if the handle is unknown or its
    /// node has been dropped.
    pub fn resolve(&self, id: NodeId) -> Option<Arc<dyn VendorNode>> {
        self.read().entries.get(&id).and_then(Weak::upgrade)
    }

    /// Like [`resolve`](Self::resolve) but reports a missing node as an error.
    pub fn require(&self, id: NodeId) -> Result<Arc<dyn VendorNode>, DomError> {
        self.resolve(id).ok_or(DomError::NodeNotFound(id))
    }

    /// Identifies every child of `node`, in order.
    ///
    /// # Errors
    ///
    /// The first child with an unsupported kind aborts the walk.  Children
    /// before it keep the handles they were given.
    pub fn children_of(&self, node: &Arc<dyn VendorNode>) -> Result<Vec<NodeId>, DomError> {
        Ok(self
            .identified_children(node)?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// [`children_of`](Self::children_of), also returning the child nodes.
    pub fn identified_children(
        &self,
        node: &Arc<dyn VendorNode>,
    ) -> Result<Vec<(NodeId, Arc<dyn VendorNode>)>, DomError> {
        node.children()
            .into_iter()
            .map(|child| Ok((self.identify(&child)?, child)))
            .collect()
    }

    /// Drops entries whose nodes have been reclaimed.  Returns how many were
    /// removed.  Removed handles are never issued again.
    pub fn sweep(&self) -> usize {
        let mut state = self.write();
        let before = state.entries.len();
        state.entries.retain(|_, weak| weak.strong_count() > 0);
        let RegistryState {
            by_address,
            entries,
            ..
        } = &mut *state;
        by_address.retain(|_, id| entries.contains_key(id));
        before - entries.len()
    }

    /// Number of entries, including ones whose nodes are already gone but have
    /// not been swept.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
