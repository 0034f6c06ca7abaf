//! DOM inspection for embedded documents.
//!
//! The bridge can serve the `DOM` protocol domain itself when an embedder
//! attaches a document tree.  The pieces:
//!
//! - [`node`] – the [`VendorNode`] trait every foreign tree implements, the
//!   seven supported node kinds, and the protocol `Node` description.
//! - [`registry`] – the [`IdentityRegistry`] mapping live vendor nodes to
//!   stable integer handles without keeping them alive.
//! - [`memory`] – [`MemoryNode`], a small owned tree for embedders that build
//!   their document in Rust (and for tests).
//! - [`agent`] – [`DomAgent`], which answers `DOM.*` commands.

pub mod agent;
pub mod memory;
pub mod node;
pub mod registry;

use thiserror::Error;

pub use agent::DomAgent;
pub use memory::MemoryNode;
pub use node::{NodeId, NodeType, RemoteNode, VendorNode};
pub use registry::IdentityRegistry;

/// Errors raised while identifying, resolving, or editing nodes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// The vendor node reports a kind outside the supported DOM4 set.
    #[error("invalid node type {0}")]
    InvalidNodeType(u16),

    /// The handle was never issued, or its node has been reclaimed.
    #[error("Could not find node with given id")]
    NodeNotFound(NodeId),

    /// Only a document (type 9) can be attached as the inspection root.
    #[error("document root must be a document node, got node type {0}")]
    NotADocument(u16),

    /// `depth` must be a positive integer or `-1` for the whole subtree.
    #[error("Please provide a positive integer as a depth or -1 for entire subtree")]
    InvalidDepth(i64),

    #[error("invalid selector '{0}'")]
    InvalidSelector(String),

    /// The operation does not apply to this node kind.
    #[error("{0}")]
    InvalidOperation(String),

    /// The vendor tree does not implement this operation.
    #[error("{0} is not supported by this document")]
    NotSupported(&'static str),
}
