//! An owned, mutable document tree implementing [`VendorNode`].
//!
//! Embedders that render their own UI from Rust data can build a
//! [`MemoryNode`] tree and attach it to the bridge.  Selector support covers
//! simple compound selectors only (`div`, `#id`, `.class`, `p.note#x`, `*`),
//! optionally joined by commas.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use super::node::{NodeType, VendorNode};
use super::DomError;

pub struct MemoryNode {
    node_type: u16,
    name: Option<String>,
    value: RwLock<Option<String>>,
    attributes: RwLock<Vec<(String, String)>>,
    children: RwLock<Vec<Arc<MemoryNode>>>,
    parent: RwLock<Weak<MemoryNode>>,
    document_url: Option<String>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryNode {
    fn build(node_type: u16, name: Option<String>, value: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            node_type,
            name,
            value: RwLock::new(value),
            attributes: RwLock::new(Vec::new()),
            children: RwLock::new(Vec::new()),
            parent: RwLock::new(Weak::new()),
            document_url: None,
        })
    }

    pub fn document(url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            node_type: NodeType::Document.code(),
            name: None,
            value: RwLock::new(None),
            attributes: RwLock::new(Vec::new()),
            children: RwLock::new(Vec::new()),
            parent: RwLock::new(Weak::new()),
            document_url: Some(url.into()),
        })
    }

    pub fn element(tag: impl Into<String>) -> Arc<Self> {
        Self::build(NodeType::Element.code(), Some(tag.into()), None)
    }

    pub fn text(data: impl Into<String>) -> Arc<Self> {
        Self::build(NodeType::Text.code(), None, Some(data.into()))
    }

    pub fn comment(data: impl Into<String>) -> Arc<Self> {
        Self::build(NodeType::Comment.code(), None, Some(data.into()))
    }

    pub fn processing_instruction(target: impl Into<String>, data: impl Into<String>) -> Arc<Self> {
        Self::build(
            NodeType::ProcessingInstruction.code(),
            Some(target.into()),
            Some(data.into()),
        )
    }

    pub fn doctype(name: impl Into<String>) -> Arc<Self> {
        Self::build(NodeType::DocumentType.code(), Some(name.into()), None)
    }

    pub fn fragment() -> Arc<Self> {
        Self::build(NodeType::DocumentFragment.code(), None, None)
    }

    /// A node with an arbitrary type code, for mirroring foreign trees that
    /// may contain kinds the registry rejects.
    pub fn with_raw_type(node_type: u16) -> Arc<Self> {
        Self::build(node_type, None, None)
    }

    /// Sets (or replaces) an attribute, keeping first-insertion order.
    pub fn set_attribute(&self, name: &str, value: &str) {
        let mut attributes = write(&self.attributes);
        match attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => attributes.push((name.to_string(), value.to_string())),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        read(&self.attributes)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Appends `child` (detaching it from any previous parent) and returns it.
    pub fn append_child(self: &Arc<Self>, child: Arc<MemoryNode>) -> Arc<MemoryNode> {
        child.detach();
        *write(&child.parent) = Arc::downgrade(self);
        write(&self.children).push(Arc::clone(&child));
        child
    }

    pub fn parent(&self) -> Option<Arc<MemoryNode>> {
        read(&self.parent).upgrade()
    }

    /// Removes this node from its parent's child list.  Returns `false` if it
    /// had no parent.
    pub fn detach(&self) -> bool {
        let Some(parent) = self.parent() else {
            return false;
        };
        write(&parent.children).retain(|c| !std::ptr::eq(Arc::as_ptr(c), self));
        *write(&self.parent) = Weak::new();
        true
    }

    fn kind(&self) -> Option<NodeType> {
        NodeType::try_from(self.node_type).ok()
    }

    fn element_children(&self) -> Vec<Arc<MemoryNode>> {
        read(&self.children).clone()
    }

    fn collect_matches(&self, selectors: &[Compound], out: &mut Vec<Arc<MemoryNode>>, first_only: bool) {
        for child in self.element_children() {
            if first_only && !out.is_empty() {
                return;
            }
            if selectors.iter().any(|s| s.matches(&child)) {
                out.push(Arc::clone(&child));
            }
            child.collect_matches(selectors, out, first_only);
        }
    }

    fn write_html(&self, out: &mut String) {
        let value = read(&self.value).clone().unwrap_or_default();
        match self.kind() {
            Some(NodeType::Element) => {
                let tag = self.name.as_deref().unwrap_or_default();
                out.push('<');
                out.push_str(tag);
                for (name, value) in read(&self.attributes).iter() {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
                out.push('>');
                for child in self.element_children() {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            Some(NodeType::Text) => out.push_str(&escape(&value, false)),
            Some(NodeType::Comment) => {
                out.push_str("<!--");
                out.push_str(&value);
                out.push_str("-->");
            }
            Some(NodeType::ProcessingInstruction) => {
                out.push_str("<?");
                out.push_str(self.name.as_deref().unwrap_or_default());
                out.push(' ');
                out.push_str(&value);
                out.push_str("?>");
            }
            Some(NodeType::DocumentType) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(self.name.as_deref().unwrap_or_default());
                out.push('>');
            }
            Some(NodeType::Document) | Some(NodeType::DocumentFragment) | None => {
                for child in self.element_children() {
                    child.write_html(out);
                }
            }
        }
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

impl VendorNode for MemoryNode {
    fn node_type(&self) -> u16 {
        self.node_type
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn value(&self) -> Option<String> {
        read(&self.value).clone()
    }

    fn attributes(&self) -> Vec<(String, String)> {
        read(&self.attributes).clone()
    }

    fn children(&self) -> Vec<Arc<dyn VendorNode>> {
        read(&self.children)
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn VendorNode>)
            .collect()
    }

    fn child_count(&self) -> usize {
        read(&self.children).len()
    }

    fn document_url(&self) -> Option<String> {
        self.document_url.clone()
    }

    fn query_selector(&self, selector: &str) -> Result<Option<Arc<dyn VendorNode>>, DomError> {
        let selectors = parse_selector_list(selector)?;
        let mut found = Vec::new();
        self.collect_matches(&selectors, &mut found, true);
        Ok(found.into_iter().next().map(|n| n as Arc<dyn VendorNode>))
    }

    fn query_selector_all(&self, selector: &str) -> Result<Vec<Arc<dyn VendorNode>>, DomError> {
        let selectors = parse_selector_list(selector)?;
        let mut found = Vec::new();
        self.collect_matches(&selectors, &mut found, false);
        Ok(found.into_iter().map(|n| n as Arc<dyn VendorNode>).collect())
    }

    fn set_attribute_value(&self, name: &str, value: &str) -> Result<(), DomError> {
        if self.kind() != Some(NodeType::Element) {
            return Err(DomError::InvalidOperation("Node is not an Element".to_string()));
        }
        self.set_attribute(name, value);
        Ok(())
    }

    fn remove_attribute(&self, name: &str) -> Result<(), DomError> {
        if self.kind() != Some(NodeType::Element) {
            return Err(DomError::InvalidOperation("Node is not an Element".to_string()));
        }
        write(&self.attributes).retain(|(n, _)| n != name);
        Ok(())
    }

    fn set_node_value(&self, value: &str) -> Result<(), DomError> {
        match self.kind() {
            Some(NodeType::Text | NodeType::Comment | NodeType::ProcessingInstruction) => {
                *write(&self.value) = Some(value.to_string());
                Ok(())
            }
            _ => Err(DomError::InvalidOperation(
                "Can only set value of text nodes".to_string(),
            )),
        }
    }

    fn remove(&self) -> Result<(), DomError> {
        if self.detach() {
            Ok(())
        } else {
            Err(DomError::InvalidOperation("Node has no parent".to_string()))
        }
    }

    fn outer_html(&self) -> Result<String, DomError> {
        let mut out = String::new();
        self.write_html(&mut out);
        Ok(out)
    }
}

// ── Selectors ─────────────────────────────────────────────────────────────────

/// One compound selector: optional tag, ids, classes.
#[derive(Debug, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
}

impl Compound {
    fn matches(&self, node: &MemoryNode) -> bool {
        if node.kind() != Some(NodeType::Element) {
            return false;
        }
        if let Some(tag) = &self.tag {
            let name = node.name.as_deref().unwrap_or_default();
            if !name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if !self
            .ids
            .iter()
            .all(|id| node.attribute("id").as_deref() == Some(id.as_str()))
        {
            return false;
        }
        let classes = node.attribute("class").unwrap_or_default();
        self.classes
            .iter()
            .all(|c| classes.split_ascii_whitespace().any(|have| have == c))
    }
}

fn parse_selector_list(selector: &str) -> Result<Vec<Compound>, DomError> {
    selector
        .split(',')
        .map(|part| parse_compound(part.trim(), selector))
        .collect()
}

fn parse_compound(part: &str, whole: &str) -> Result<Compound, DomError> {
    let invalid = || DomError::InvalidSelector(whole.to_string());
    if part.is_empty() {
        return Err(invalid());
    }

    let mut compound = Compound::default();
    let mut rest = part;

    let tag_end = rest.find(['#', '.']).unwrap_or(rest.len());
    let tag = &rest[..tag_end];
    if tag != "*" && !tag.is_empty() {
        if !is_identifier(tag) {
            return Err(invalid());
        }
        compound.tag = Some(tag.to_string());
    }
    rest = &rest[tag_end..];

    while let Some(marker) = rest.chars().next() {
        let body = &rest[1..];
        let end = body.find(['#', '.']).unwrap_or(body.len());
        let ident = &body[..end];
        if !is_identifier(ident) {
            return Err(invalid());
        }
        match marker {
            '#' => compound.ids.push(ident.to_string()),
            _ => compound.classes.push(ident.to_string()),
        }
        rest = &body[end..];
    }
    Ok(compound)
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == ':')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Arc<MemoryNode> {
        let doc = MemoryNode::document("app://main");
        doc.append_child(MemoryNode::doctype("html"));
        let html = doc.append_child(MemoryNode::element("html"));
        let body = html.append_child(MemoryNode::element("body"));
        let p1 = body.append_child(MemoryNode::element("p"));
        p1.set_attribute("id", "first");
        p1.set_attribute("class", "note big");
        p1.append_child(MemoryNode::text("a < b"));
        let p2 = body.append_child(MemoryNode::element("p"));
        p2.set_attribute("class", "note");
        body.append_child(MemoryNode::comment("end"));
        doc
    }

    #[test]
    fn test_query_selector_by_tag_returns_first_in_document_order() {
        let doc = sample();

        let found = doc.query_selector("p").unwrap().unwrap();

        assert_eq!(found.attributes()[0], ("id".to_string(), "first".to_string()));
    }

    #[test]
    fn test_query_selector_all_by_class() {
        let doc = sample();
        assert_eq!(doc.query_selector_all(".note").unwrap().len(), 2);
        assert_eq!(doc.query_selector_all("p.big").unwrap().len(), 1);
        assert_eq!(doc.query_selector_all("#first, body").unwrap().len(), 2);
    }

    #[test]
    fn test_query_selector_no_match_is_none() {
        let doc = sample();
        assert!(doc.query_selector("section").unwrap().is_none());
    }

    #[test]
    fn test_unsupported_selector_syntax_is_rejected() {
        let doc = sample();
        assert!(matches!(
            doc.query_selector("body > p"),
            Err(DomError::InvalidSelector(_))
        ));
        assert!(matches!(doc.query_selector(""), Err(DomError::InvalidSelector(_))));
    }

    #[test]
    fn test_outer_html_serializes_subtree_with_escaping() {
        let doc = sample();
        let p = doc.query_selector("#first").unwrap().unwrap();

        assert_eq!(
            p.outer_html().unwrap(),
            r#"<p id="first" class="note big">a &lt; b</p>"#
        );
    }

    #[test]
    fn test_document_outer_html_includes_doctype_and_comment() {
        let html = sample().outer_html().unwrap();
        assert!(html.starts_with("<!DOCTYPE html><html><body>"));
        assert!(html.ends_with("<!--end--></body></html>"));
    }

    #[test]
    fn test_remove_detaches_from_parent() {
        // Arrange
        let parent = MemoryNode::element("div");
        let child = parent.append_child(MemoryNode::element("span"));

        // Act
        child.remove().unwrap();

        // Assert
        assert_eq!(parent.child_count(), 0);
        assert!(child.parent().is_none());
        assert!(child.remove().is_err(), "second removal has no parent");
    }

    #[test]
    fn test_set_node_value_only_applies_to_character_data() {
        let text = MemoryNode::text("a");
        let element = MemoryNode::element("b");

        text.set_node_value("changed").unwrap();

        assert_eq!(text.value().as_deref(), Some("changed"));
        assert!(element.set_node_value("x").is_err());
    }

    #[test]
    fn test_attribute_edits_keep_order() {
        let el = MemoryNode::element("a");
        el.set_attribute("href", "/");
        el.set_attribute("title", "t");
        el.set_attribute_value("href", "/home").unwrap();
        el.remove_attribute("title").unwrap();

        assert_eq!(el.attributes(), vec![("href".to_string(), "/home".to_string())]);
    }

    #[test]
    fn test_append_child_moves_node_between_parents() {
        let a = MemoryNode::element("a");
        let b = MemoryNode::element("b");
        let child = a.append_child(MemoryNode::text("t"));

        b.append_child(Arc::clone(&child));

        assert_eq!(a.child_count(), 0);
        assert_eq!(b.child_count(), 1);
    }
}
