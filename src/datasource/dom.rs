//! A minimal arena-backed DOM satisfying the [`DomNode`] contract.
//!
//! The parent/sibling/child graph is cyclic, so nodes live in a flat arena
//! and refer to each other through indices. Arena indices are assigned in
//! document order (an element, then its attributes, then its children), so
//! the index doubles as the document-order id.

use super::{DomNode, NodeType, QName};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

pub type NodeId = usize;

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeType,
    prefix: Option<String>,
    local_name: Option<String>,
    namespace_uri: Option<String>,
    value: Option<String>,
    parent: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
    /// Position among the parent's children. Zero for attributes and roots.
    sibling_index: usize,
    children: Vec<NodeId>,
    attributes: Vec<NodeId>,
}

impl NodeData {
    fn unnamed(kind: NodeType, value: Option<String>) -> Self {
        NodeData {
            kind,
            prefix: None,
            local_name: None,
            namespace_uri: None,
            value,
            parent: None,
            prev_sibling: None,
            next_sibling: None,
            sibling_index: 0,
            children: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

/// An in-memory document tree. Node 0 is always the root (a document or
/// fragment node); the tree is immutable once built.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    /// Parses XML text into a document. The XML parser itself is
    /// `roxmltree`; this walks its tree into the arena so the rest of the
    /// engine only ever sees the [`DomNode`] contract.
    pub fn parse(text: &str) -> Result<Document, roxmltree::Error> {
        let parsed = roxmltree::Document::parse(text)?;
        let mut builder = DocumentBuilder::new();
        for child in parsed.root().children() {
            copy_node(&mut builder, child);
        }
        Ok(builder.build())
    }

    /// The document (or fragment) node.
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef { id: 0, doc: self }
    }

    /// The single element child of the root, if the document has one.
    pub fn root_element(&self) -> Option<NodeRef<'_>> {
        self.root()
            .children()
            .find(|n| n.node_type() == NodeType::Element)
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        if id < self.nodes.len() {
            Some(NodeRef { id, doc: self })
        } else {
            None
        }
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id]
    }
}

fn copy_node(builder: &mut DocumentBuilder, node: roxmltree::Node) {
    match node.node_type() {
        roxmltree::NodeType::Element => {
            let tag = node.tag_name();
            let ns = tag.namespace();
            let prefix = prefix_for(node, ns);
            builder.start_element(prefix, tag.name(), ns);
            for attr in node.attributes() {
                let ans = attr.namespace();
                builder.attribute(prefix_for(node, ans), attr.name(), ans, attr.value());
            }
            for child in node.children() {
                copy_node(builder, child);
            }
            builder.end_element();
        }
        roxmltree::NodeType::Text => {
            if let Some(text) = node.text() {
                builder.text(text);
            }
        }
        roxmltree::NodeType::Comment => {
            builder.comment(node.text().unwrap_or(""));
        }
        roxmltree::NodeType::PI => {
            if let Some(pi) = node.pi() {
                builder.processing_instruction(pi.target, pi.value.unwrap_or(""));
            }
        }
        roxmltree::NodeType::Root => {}
    }
}

fn prefix_for<'a>(node: roxmltree::Node<'a, '_>, uri: Option<&str>) -> Option<&'a str> {
    let uri = uri?;
    if uri == XML_NAMESPACE {
        Some("xml")
    } else {
        node.lookup_prefix(uri)
    }
}

/// Builds a [`Document`] programmatically. Attributes must be added to an
/// element before its children so that arena indices stay in document
/// order.
#[derive(Debug)]
pub struct DocumentBuilder {
    nodes: Vec<NodeData>,
    open: Vec<NodeId>,
}

impl DocumentBuilder {
    /// A builder whose root is a document node.
    pub fn new() -> Self {
        Self::with_root(NodeType::Root)
    }

    /// A builder whose root is a fragment node (no single-element-child
    /// constraint).
    pub fn fragment() -> Self {
        Self::with_root(NodeType::Fragment)
    }

    fn with_root(kind: NodeType) -> Self {
        DocumentBuilder {
            nodes: vec![NodeData::unnamed(kind, None)],
            open: vec![0],
        }
    }

    fn append_child(&mut self, mut data: NodeData) -> NodeId {
        let parent = *self.open.last().expect("BUG: builder root missing");
        let id = self.nodes.len();
        data.parent = Some(parent);
        data.sibling_index = self.nodes[parent].children.len();
        data.prev_sibling = self.nodes[parent].children.last().copied();
        if let Some(prev) = data.prev_sibling {
            self.nodes[prev].next_sibling = Some(id);
        }
        self.nodes.push(data);
        self.nodes[parent].children.push(id);
        id
    }

    pub fn start_element(
        &mut self,
        prefix: Option<&str>,
        local_name: &str,
        namespace_uri: Option<&str>,
    ) -> &mut Self {
        let mut data = NodeData::unnamed(NodeType::Element, None);
        data.prefix = prefix.map(str::to_string);
        data.local_name = Some(local_name.to_string());
        data.namespace_uri = namespace_uri.map(str::to_string);
        let id = self.append_child(data);
        self.open.push(id);
        self
    }

    pub fn end_element(&mut self) -> &mut Self {
        debug_assert!(self.open.len() > 1, "end_element without start_element");
        if self.open.len() > 1 {
            self.open.pop();
        }
        self
    }

    pub fn attribute(
        &mut self,
        prefix: Option<&str>,
        local_name: &str,
        namespace_uri: Option<&str>,
        value: &str,
    ) -> &mut Self {
        let element = *self.open.last().expect("BUG: builder root missing");
        debug_assert_eq!(self.nodes[element].kind, NodeType::Element);
        let id = self.nodes.len();
        let mut data = NodeData::unnamed(NodeType::Attribute, Some(value.to_string()));
        data.prefix = prefix.map(str::to_string);
        data.local_name = Some(local_name.to_string());
        data.namespace_uri = namespace_uri.map(str::to_string);
        data.parent = Some(element);
        self.nodes.push(data);
        self.nodes[element].attributes.push(id);
        self
    }

    pub fn text(&mut self, value: &str) -> &mut Self {
        self.append_child(NodeData::unnamed(NodeType::Text, Some(value.to_string())));
        self
    }

    pub fn cdata(&mut self, value: &str) -> &mut Self {
        self.append_child(NodeData::unnamed(NodeType::CData, Some(value.to_string())));
        self
    }

    pub fn comment(&mut self, value: &str) -> &mut Self {
        self.append_child(NodeData::unnamed(NodeType::Comment, Some(value.to_string())));
        self
    }

    pub fn processing_instruction(&mut self, target: &str, value: &str) -> &mut Self {
        let mut data = NodeData::unnamed(
            NodeType::ProcessingInstruction,
            Some(value.to_string()),
        );
        data.local_name = Some(target.to_string());
        self.append_child(data);
        self
    }

    pub fn build(self) -> Document {
        Document { nodes: self.nodes }
    }
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A cheap `Copy` handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'d> {
    id: NodeId,
    doc: &'d Document,
}

impl<'d> NodeRef<'d> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'d Document {
        self.doc
    }

    fn data(&self) -> &'d NodeData {
        self.doc.data(self.id)
    }

    /// Position among the parent's children, in document order.
    pub fn sibling_index(&self) -> usize {
        self.data().sibling_index
    }

    /// The DOM-style node name: `#document`, `#text`, `#comment`,
    /// `#cdata-section`, the qualified name for elements and attributes,
    /// or the target for processing-instructions.
    pub fn node_name(&self) -> String {
        match self.node_type() {
            NodeType::Root => "#document".to_string(),
            NodeType::Fragment => "#document-fragment".to_string(),
            NodeType::Text => "#text".to_string(),
            NodeType::CData => "#cdata-section".to_string(),
            NodeType::Comment => "#comment".to_string(),
            NodeType::DocumentType => "#doctype".to_string(),
            _ => self.name().map(|q| q.qualified()).unwrap_or_default(),
        }
    }

    /// Element descendants with the given local name, in pre-order.
    pub fn get_elements_by_tag_name(&self, name: &str) -> Vec<NodeRef<'d>> {
        let mut found = Vec::new();
        collect_elements(*self, name, &mut found);
        found
    }
}

fn collect_elements<'d>(node: NodeRef<'d>, name: &str, found: &mut Vec<NodeRef<'d>>) {
    for child in node.children() {
        if child.node_type() == NodeType::Element {
            if name == "*" || child.data().local_name.as_deref() == Some(name) {
                found.push(child);
            }
            collect_elements(child, name, found);
        }
    }
}

fn append_text(node: NodeRef, out: &mut String) {
    for child in node.children() {
        match child.node_type() {
            NodeType::Text | NodeType::CData => {
                if let Some(v) = child.data().value.as_deref() {
                    out.push_str(v);
                }
            }
            NodeType::Element => append_text(child, out),
            _ => {}
        }
    }
}

impl<'d> PartialEq for NodeRef<'d> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.doc, other.doc)
    }
}

impl<'d> Eq for NodeRef<'d> {}

impl<'d> PartialOrd for NodeRef<'d> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'d> Ord for NodeRef<'d> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl<'d> Hash for NodeRef<'d> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<'d> DomNode<'d> for NodeRef<'d> {
    fn node_type(&self) -> NodeType {
        self.data().kind
    }

    fn name(&self) -> Option<QName<'d>> {
        let data = self.data();
        data.local_name.as_deref().map(|local| QName {
            prefix: data.prefix.as_deref(),
            local_part: local,
        })
    }

    fn namespace_uri(&self) -> Option<&'d str> {
        self.data().namespace_uri.as_deref()
    }

    fn node_value(&self) -> Option<&'d str> {
        self.data().value.as_deref()
    }

    fn string_value(&self) -> String {
        match self.node_type() {
            NodeType::Root | NodeType::Element | NodeType::Fragment => {
                let mut out = String::new();
                append_text(*self, &mut out);
                out
            }
            _ => self.data().value.clone().unwrap_or_default(),
        }
    }

    fn document_order(&self) -> usize {
        self.id
    }

    fn parent(&self) -> Option<Self> {
        let doc = self.doc;
        self.data().parent.map(|id| NodeRef { id, doc })
    }

    fn previous_sibling(&self) -> Option<Self> {
        let doc = self.doc;
        self.data().prev_sibling.map(|id| NodeRef { id, doc })
    }

    fn next_sibling(&self) -> Option<Self> {
        let doc = self.doc;
        self.data().next_sibling.map(|id| NodeRef { id, doc })
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'd> {
        let doc = self.doc;
        let ids = self.data().children.clone();
        Box::new(ids.into_iter().map(move |id| NodeRef { id, doc }))
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'd> {
        let doc = self.doc;
        let ids = self.data().attributes.clone();
        Box::new(ids.into_iter().map(move |id| NodeRef { id, doc }))
    }
}
