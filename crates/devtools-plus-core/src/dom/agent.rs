//! `DOM` domain command handling for an attached document.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::node::{NodeId, NodeType, RemoteNode, VendorNode};
use super::registry::IdentityRegistry;
use super::DomError;
use crate::protocol::message::{parse_params, CommandOutput, ProtocolError};

/// Default `depth` for `getDocument` and `requestChildNodes`.
const DEFAULT_DEPTH: i64 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepthParams {
    depth: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeParams {
    node_id: NodeId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChildNodesParams {
    node_id: NodeId,
    depth: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectorParams {
    node_id: NodeId,
    selector: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetAttributeParams {
    node_id: NodeId,
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttributeNameParams {
    node_id: NodeId,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeValueParams {
    node_id: NodeId,
    value: String,
}

/// Serves `DOM.*` for one document.
///
/// The agent is shared by every relay session; handles issued to one
/// front-end are valid for all of them.
pub struct DomAgent {
    document: Arc<dyn VendorNode>,
    registry: IdentityRegistry,
}

impl DomAgent {
    /// # Errors
    ///
    /// [`DomError::NotADocument`] unless `document` is a type-9 node.
    pub fn new(document: Arc<dyn VendorNode>) -> Result<Self, DomError> {
        let code = document.node_type();
        if NodeType::try_from(code).ok() != Some(NodeType::Document) {
            return Err(DomError::NotADocument(code));
        }
        Ok(Self {
            document,
            registry: IdentityRegistry::new(),
        })
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Dispatches one `DOM.<command>` call.
    pub fn handle(&self, command: &str, params: &Value) -> Result<CommandOutput, ProtocolError> {
        debug!("DOM.{command}");
        match command {
            "enable" | "disable" => Ok(CommandOutput::empty()),
            "getDocument" => {
                let p: DepthParams = parse_params(params)?;
                let root = self.get_document(p.depth.unwrap_or(DEFAULT_DEPTH))?;
                Ok(CommandOutput::with_result(json!({ "root": root })))
            }
            "requestChildNodes" => {
                let p: ChildNodesParams = parse_params(params)?;
                let nodes = self.request_child_nodes(p.node_id, p.depth.unwrap_or(DEFAULT_DEPTH))?;
                Ok(CommandOutput::empty().and_event(
                    "DOM.setChildNodes",
                    json!({ "parentId": p.node_id, "nodes": nodes }),
                ))
            }
            "querySelector" => {
                let p: SelectorParams = parse_params(params)?;
                let id = self.query_selector(p.node_id, &p.selector)?;
                Ok(CommandOutput::with_result(json!({ "nodeId": id })))
            }
            "querySelectorAll" => {
                let p: SelectorParams = parse_params(params)?;
                let ids = self.query_selector_all(p.node_id, &p.selector)?;
                Ok(CommandOutput::with_result(json!({ "nodeIds": ids })))
            }
            "getAttributes" => {
                let p: NodeParams = parse_params(params)?;
                let attributes = self.get_attributes(p.node_id)?;
                Ok(CommandOutput::with_result(json!({ "attributes": attributes })))
            }
            "setAttributeValue" => {
                let p: SetAttributeParams = parse_params(params)?;
                self.node(p.node_id)?.set_attribute_value(&p.name, &p.value)?;
                Ok(CommandOutput::empty())
            }
            "removeAttribute" => {
                let p: AttributeNameParams = parse_params(params)?;
                self.node(p.node_id)?.remove_attribute(&p.name)?;
                Ok(CommandOutput::empty())
            }
            "setNodeValue" => {
                let p: NodeValueParams = parse_params(params)?;
                self.node(p.node_id)?.set_node_value(&p.value)?;
                Ok(CommandOutput::empty())
            }
            "removeNode" => {
                let p: NodeParams = parse_params(params)?;
                self.node(p.node_id)?.remove()?;
                Ok(CommandOutput::empty())
            }
            "getOuterHTML" => {
                let p: NodeParams = parse_params(params)?;
                let html = self.node(p.node_id)?.outer_html()?;
                Ok(CommandOutput::with_result(json!({ "outerHTML": html })))
            }
            _ => Err(ProtocolError::method_not_found(&format!("DOM.{command}"))),
        }
    }

    /// Describes the document root down to `depth` levels (`-1` for all).
    pub fn get_document(&self, depth: i64) -> Result<RemoteNode, DomError> {
        check_depth(depth)?;
        self.describe(&self.document, depth, None)
    }

    /// Describes the children of `id` down to `depth` levels.
    pub fn request_child_nodes(&self, id: NodeId, depth: i64) -> Result<Vec<RemoteNode>, DomError> {
        check_depth(depth)?;
        let node = self.node(id)?;
        self.describe_children(&node, id, depth)
    }

    /// Returns the first descendant of `id` matching `selector`, or `None`.
    pub fn query_selector(&self, id: NodeId, selector: &str) -> Result<Option<NodeId>, DomError> {
        self.node(id)?
            .query_selector(selector)?
            .map(|found| self.registry.identify(&found))
            .transpose()
    }

    pub fn query_selector_all(&self, id: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError> {
        self.node(id)?
            .query_selector_all(selector)?
            .iter()
            .map(|found| self.registry.identify(found))
            .collect()
    }

    /// Attributes as a flat `[name, value, name, value, ...]` list.
    pub fn get_attributes(&self, id: NodeId) -> Result<Vec<String>, DomError> {
        let node = self.node(id)?;
        if NodeType::try_from(node.node_type())? != NodeType::Element {
            return Err(DomError::InvalidOperation("Node is not an Element".to_string()));
        }
        Ok(node
            .attributes()
            .into_iter()
            .flat_map(|(name, value)| [name, value])
            .collect())
    }

    fn node(&self, id: NodeId) -> Result<Arc<dyn VendorNode>, DomError> {
        self.registry.require(id)
    }

    fn describe(
        &self,
        node: &Arc<dyn VendorNode>,
        depth: i64,
        parent: Option<NodeId>,
    ) -> Result<RemoteNode, DomError> {
        let id = self.registry.identify(node)?;
        let kind = NodeType::try_from(node.node_type())?;
        let mut remote = RemoteNode::describe(id, node.as_ref(), kind);
        remote.parent_id = parent;
        if depth != 0 {
            remote.children = Some(self.describe_children(node, id, depth)?);
        }
        Ok(remote)
    }

    fn describe_children(
        &self,
        node: &Arc<dyn VendorNode>,
        id: NodeId,
        depth: i64,
    ) -> Result<Vec<RemoteNode>, DomError> {
        let next = if depth < 0 { depth } else { depth - 1 };
        self.registry
            .identified_children(node)?
            .iter()
            .map(|(_, child)| self.describe(child, next, Some(id)))
            .collect()
    }
}

fn check_depth(depth: i64) -> Result<(), DomError> {
    if depth == 0 || depth < -1 {
        return Err(DomError::InvalidDepth(depth));
    }
    Ok(())
}

impl From<DomError> for ProtocolError {
    fn from(error: DomError) -> Self {
        ProtocolError::server_error(error.to_string())
    }
}
