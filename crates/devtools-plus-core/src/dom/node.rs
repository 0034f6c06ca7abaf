//! Vendor nodes and their protocol description.
//!
//! # Vendor nodes (for beginners)
//!
//! The bridge does not own the documents it inspects.  An embedder hands it a
//! tree of objects that implement [`VendorNode`]: a thin read/edit interface
//! over whatever the embedder really stores (a server-side DOM, a UI widget
//! tree, ...).  Nodes are shared as `Arc<dyn VendorNode>`, and the bridge only
//! ever keeps `Weak` references to them so that inspecting a document never
//! extends the lifetime of its nodes.
//!
//! Implementations must return the *same* `Arc` for the same node on every
//! call to [`VendorNode::children`].  Node identity is the allocation address,
//! so a tree that builds fresh wrapper objects per call would look like a new
//! set of nodes each time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::DomError;

// ── Node handles ──────────────────────────────────────────────────────────────

/// Opaque integer handle the front-end uses to refer to a node.
///
/// Issued by the [`IdentityRegistry`](super::IdentityRegistry), starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Node kinds ────────────────────────────────────────────────────────────────

/// The DOM4 node kinds the registry accepts.
///
/// Attribute (2), CDATA (4), entity (5/6) and notation (12) nodes are obsolete
/// in DOM4 and are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    DocumentFragment = 11,
}

impl NodeType {
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for NodeType {
    type Error = DomError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Element),
            3 => Ok(Self::Text),
            7 => Ok(Self::ProcessingInstruction),
            8 => Ok(Self::Comment),
            9 => Ok(Self::Document),
            10 => Ok(Self::DocumentType),
            11 => Ok(Self::DocumentFragment),
            other => Err(DomError::InvalidNodeType(other)),
        }
    }
}

// ── Vendor interface ──────────────────────────────────────────────────────────

/// A node in an embedder-owned tree.
///
/// The read accessors are required.  The edit and query operations default to
/// [`DomError::NotSupported`] so read-only trees implement only what they have.
pub trait VendorNode: Send + Sync {
    /// Raw DOM node type code.  Validated by the registry, not trusted.
    fn node_type(&self) -> u16;

    /// Tag name for elements, target for processing instructions, doctype
    /// name for document types.  Ignored for the other kinds.
    fn name(&self) -> Option<String> {
        None
    }

    /// Character data for text, comment and processing-instruction nodes.
    fn value(&self) -> Option<String> {
        None
    }

    /// Attributes in document order.  Elements only.
    fn attributes(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn children(&self) -> Vec<Arc<dyn VendorNode>>;

    fn child_count(&self) -> usize {
        self.children().len()
    }

    /// Document URL.  Documents only.
    fn document_url(&self) -> Option<String> {
        None
    }

    /// First descendant element matching `selector`.
    fn query_selector(&self, _selector: &str) -> Result<Option<Arc<dyn VendorNode>>, DomError> {
        Err(DomError::NotSupported("querySelector"))
    }

    /// All descendant elements matching `selector`, in document order.
    fn query_selector_all(&self, _selector: &str) -> Result<Vec<Arc<dyn VendorNode>>, DomError> {
        Err(DomError::NotSupported("querySelectorAll"))
    }

    fn set_attribute_value(&self, _name: &str, _value: &str) -> Result<(), DomError> {
        Err(DomError::NotSupported("setAttributeValue"))
    }

    fn remove_attribute(&self, _name: &str) -> Result<(), DomError> {
        Err(DomError::NotSupported("removeAttribute"))
    }

    fn set_node_value(&self, _value: &str) -> Result<(), DomError> {
        Err(DomError::NotSupported("setNodeValue"))
    }

    /// Detaches this node from its parent.
    fn remove(&self) -> Result<(), DomError> {
        Err(DomError::NotSupported("removeNode"))
    }

    fn outer_html(&self) -> Result<String, DomError> {
        Err(DomError::NotSupported("getOuterHTML"))
    }
}

// ── Protocol description ──────────────────────────────────────────────────────

/// The protocol's `DOM.Node` object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNode {
    pub node_id: NodeId,
    pub backend_node_id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    pub node_type: u16,
    pub node_name: String,
    pub local_name: String,
    pub node_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_node_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<RemoteNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<String>>,
    #[serde(rename = "documentURL", skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
    #[serde(rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_id: Option<String>,
}

impl RemoteNode {
    /// Describes one node (without children) under handle `id`.
    pub fn describe(id: NodeId, node: &dyn VendorNode, kind: NodeType) -> Self {
        let name = node.name().unwrap_or_default();
        let value = node.value().unwrap_or_default();

        let (node_name, local_name, node_value) = match kind {
            NodeType::Element => {
                let local = name.rsplit(':').next().unwrap_or_default().to_string();
                (name, local, String::new())
            }
            NodeType::Text => ("#text".to_string(), String::new(), value),
            NodeType::ProcessingInstruction => (name, String::new(), value),
            NodeType::Comment => ("#comment".to_string(), String::new(), value),
            NodeType::Document => ("#document".to_string(), String::new(), String::new()),
            NodeType::DocumentType => (name, String::new(), String::new()),
            NodeType::DocumentFragment => {
                ("#document-fragment".to_string(), String::new(), String::new())
            }
        };

        let attributes = (kind == NodeType::Element).then(|| {
            node.attributes()
                .into_iter()
                .flat_map(|(name, value)| [name, value])
                .collect()
        });

        let document_url = (kind == NodeType::Document).then(|| node.document_url()).flatten();
        let (public_id, system_id) = if kind == NodeType::DocumentType {
            (Some(String::new()), Some(String::new()))
        } else {
            (None, None)
        };

        Self {
            node_id: id,
            backend_node_id: id,
            parent_id: None,
            node_type: kind.code(),
            node_name,
            local_name,
            node_value,
            child_node_count: Some(node.child_count()),
            children: None,
            attributes,
            base_url: document_url.clone(),
            document_url,
            public_id,
            system_id,
        }
    }
}
