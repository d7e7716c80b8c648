//! Defines the core abstraction for a navigable, read-only document tree.

use std::hash::Hash;

pub mod dom;

/// A qualified name, consisting of an optional prefix and a local part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QName<'a> {
    pub prefix: Option<&'a str>,
    pub local_part: &'a str,
}

impl<'a> QName<'a> {
    /// The name as written, `prefix:local` or just `local`.
    pub fn qualified(&self) -> String {
        match self.prefix {
            Some(p) => format!("{}:{}", p, self.local_part),
            None => self.local_part.to_string(),
        }
    }
}

/// The kind of a node in the document tree, aligned with the XPath 1.0
/// data model plus the structural kinds a DOM can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Element,
    Attribute,
    Text,
    CData,
    Comment,
    ProcessingInstruction,
    DocumentType,
    Fragment,
}

/// The universal contract for a node in a read-only, hierarchical document.
///
/// The XPath engine is written exclusively against this trait, so it can
/// operate on any tree (the arena DOM in [`dom`], a UI tree, a virtual DOM)
/// that implements it. Implementations are expected to be cheap `Copy`
/// handles into a tree owned elsewhere; `'d` is the lifetime of that tree.
///
/// `Ord` must agree with [`DomNode::document_order`]: document order is the
/// pre-order traversal order, with an element's attributes between the
/// element itself and its first child.
pub trait DomNode<'d>:
    std::fmt::Debug + Clone + Copy + PartialEq + Eq + Hash + PartialOrd + Ord
{
    /// The kind of the node (Element, Text, Attribute, ...).
    fn node_type(&self) -> NodeType;

    /// The qualified name of the node. `None` for node kinds that have no
    /// name, such as text or root nodes. For a processing-instruction this
    /// is its target.
    fn name(&self) -> Option<QName<'d>>;

    /// The namespace URI this node's name resolved to at parse time, if any.
    fn namespace_uri(&self) -> Option<&'d str>;

    /// The text carried directly by this node: character data for text,
    /// CDATA and comment nodes, the value for attributes, the content for
    /// processing-instructions. `None` for structural nodes.
    fn node_value(&self) -> Option<&'d str>;

    /// The string value of the node, as defined by the XPath 1.0 `string()`
    /// function: the concatenation of all descendant text in document order,
    /// or the attribute value for attributes.
    fn string_value(&self) -> String;

    /// Monotonic document-wide identifier. Stable for the lifetime of the
    /// tree; used for deduplication and document-order sorting.
    fn document_order(&self) -> usize;

    /// The parent node. `None` for the root.
    fn parent(&self) -> Option<Self>;

    /// The previous sibling in document order. Always `None` for attributes.
    fn previous_sibling(&self) -> Option<Self>;

    /// The next sibling in document order. Always `None` for attributes.
    fn next_sibling(&self) -> Option<Self>;

    /// An iterator over the child nodes. Empty for leaf nodes and
    /// attributes; attributes are not children of their element.
    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'd>;

    /// An iterator over the attribute nodes. Empty for non-element nodes.
    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'd>;

    fn first_child(&self) -> Option<Self> {
        self.children().next()
    }

    fn last_child(&self) -> Option<Self> {
        self.children().last()
    }
}
