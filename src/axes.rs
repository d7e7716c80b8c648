//! Contains pure functions for collecting nodes along each XPath axis.
//!
//! Every function yields nodes in axis order: document order for forward
//! axes, reverse document order for `ancestor`, `ancestor-or-self`,
//! `preceding` and `preceding-sibling`. Deduplication and the final
//! document-order sort happen once per location path, not here.

use crate::ast::Axis;
use crate::datasource::DomNode;

/// Collects the nodes on `axis` from a single origin node.
pub fn collect<'d, N: DomNode<'d>>(axis: Axis, node: N) -> Vec<N> {
    let mut results = Vec::new();
    match axis {
        Axis::SelfAxis => results.push(node),
        Axis::Child => collect_child_nodes(node, &mut results),
        Axis::Parent => collect_parent_nodes(node, &mut results),
        Axis::Descendant => collect_descendant_nodes(node, &mut results),
        Axis::DescendantOrSelf => collect_descendant_or_self_nodes(node, &mut results),
        Axis::Ancestor => collect_ancestor_nodes(node, &mut results),
        Axis::AncestorOrSelf => {
            results.push(node);
            collect_ancestor_nodes(node, &mut results);
        }
        Axis::FollowingSibling => collect_following_sibling_nodes(node, &mut results),
        Axis::PrecedingSibling => collect_preceding_sibling_nodes(node, &mut results),
        Axis::Following => collect_following_nodes(node, &mut results),
        Axis::Preceding => collect_preceding_nodes(node, &mut results),
        Axis::Attribute => collect_attribute_nodes(node, &mut results),
        // The node model has no namespace nodes, so the axis is empty.
        Axis::Namespace => {}
    }
    results
}

pub fn collect_child_nodes<'d, N: DomNode<'d>>(node: N, results: &mut Vec<N>) {
    results.extend(node.children());
}

pub fn collect_attribute_nodes<'d, N: DomNode<'d>>(node: N, results: &mut Vec<N>) {
    results.extend(node.attributes());
}

pub fn collect_descendant_nodes<'d, N: DomNode<'d>>(node: N, results: &mut Vec<N>) {
    for child in node.children() {
        results.push(child);
        collect_descendant_nodes(child, results);
    }
}

pub fn collect_descendant_or_self_nodes<'d, N: DomNode<'d>>(node: N, results: &mut Vec<N>) {
    results.push(node);
    collect_descendant_nodes(node, results);
}

pub fn collect_parent_nodes<'d, N: DomNode<'d>>(node: N, results: &mut Vec<N>) {
    if let Some(parent) = node.parent() {
        results.push(parent);
    }
}

pub fn collect_ancestor_nodes<'d, N: DomNode<'d>>(node: N, results: &mut Vec<N>) {
    let mut current = node.parent();
    while let Some(p) = current {
        results.push(p);
        current = p.parent();
    }
}

pub fn collect_following_sibling_nodes<'d, N: DomNode<'d>>(node: N, results: &mut Vec<N>) {
    let mut current = node.next_sibling();
    while let Some(sibling) = current {
        results.push(sibling);
        current = sibling.next_sibling();
    }
}

pub fn collect_preceding_sibling_nodes<'d, N: DomNode<'d>>(node: N, results: &mut Vec<N>) {
    let mut current = node.previous_sibling();
    while let Some(sibling) = current {
        results.push(sibling);
        current = sibling.previous_sibling();
    }
}

pub fn collect_following_nodes<'d, N: DomNode<'d>>(node: N, results: &mut Vec<N>) {
    let mut current = Some(node);
    while let Some(c) = current {
        let mut sibling = c.next_sibling();
        while let Some(s) = sibling {
            collect_descendant_or_self_nodes(s, results);
            sibling = s.next_sibling();
        }
        current = c.parent();
    }
}

pub fn collect_preceding_nodes<'d, N: DomNode<'d>>(node: N, results: &mut Vec<N>) {
    let mut current = Some(node);
    while let Some(c) = current {
        let mut sibling = c.previous_sibling();
        while let Some(s) = sibling {
            // Nearest subtree first, and each subtree in reverse document
            // order, to keep the whole axis in reverse document order.
            let mut subtree = Vec::new();
            collect_descendant_or_self_nodes(s, &mut subtree);
            results.extend(subtree.into_iter().rev());
            sibling = s.previous_sibling();
        }
        current = c.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::dom::Document;

    // <root> <para id="p1">Hello</para> <!--c--> <div/> <?pi v?> <para>World</para> </root>
    fn fixture() -> Document {
        Document::parse(
            "<root><para id=\"p1\">Hello</para><!--c--><div/><?pi v?><para>World</para></root>",
        )
        .unwrap()
    }

    fn local_names<'d, N: DomNode<'d>>(nodes: &[N]) -> Vec<String> {
        nodes
            .iter()
            .map(|n| n.name().map(|q| q.local_part.to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn child_axis_keeps_document_order() {
        let doc = fixture();
        let root_el = doc.root_element().unwrap();
        let children = collect(Axis::Child, root_el);
        assert_eq!(children.len(), 5);
        assert_eq!(local_names(&children), vec!["para", "", "div", "pi", "para"]);
    }

    #[test]
    fn descendant_axis_is_preorder() {
        let doc = fixture();
        let descendants = collect(Axis::Descendant, doc.root());
        // root element, then each child with its own subtree before the next.
        assert!(descendants.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(descendants.len(), 8);
    }

    #[test]
    fn ancestor_axes_run_nearest_first() {
        let doc = fixture();
        let para = doc.root_element().unwrap().first_child().unwrap();
        let text = para.first_child().unwrap();

        let ancestors = collect(Axis::Ancestor, text);
        assert_eq!(ancestors.len(), 3);
        assert_eq!(ancestors[0], para);
        assert_eq!(ancestors[2], doc.root());

        let or_self = collect(Axis::AncestorOrSelf, text);
        assert_eq!(or_self.len(), 4);
        assert_eq!(or_self[0], text);
        assert_eq!(or_self[1], para);
    }

    #[test]
    fn sibling_axes_run_in_axis_order() {
        let doc = fixture();
        let children: Vec<_> = doc.root_element().unwrap().children().collect();
        let div = children[2];

        let following = collect(Axis::FollowingSibling, div);
        assert_eq!(following, vec![children[3], children[4]]);

        let preceding = collect(Axis::PrecedingSibling, div);
        assert_eq!(preceding, vec![children[1], children[0]]);
    }

    #[test]
    fn following_excludes_descendants_and_ancestors() {
        let doc = fixture();
        let para = doc.root_element().unwrap().first_child().unwrap();
        let text = para.first_child().unwrap();

        let following = collect(Axis::Following, text);
        // Everything after the text node except ancestors: c, div, pi,
        // para, World.
        assert_eq!(following.len(), 5);
        assert!(following.windows(2).all(|w| w[0] < w[1]));
        assert!(!following.contains(&para));
    }

    #[test]
    fn preceding_is_reverse_document_order() {
        let doc = fixture();
        let children: Vec<_> = doc.root_element().unwrap().children().collect();
        let last_para = children[4];

        let preceding = collect(Axis::Preceding, last_para);
        // pi, div, c, text, para — nearest first.
        assert_eq!(preceding.len(), 5);
        assert!(preceding.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(preceding[0], children[3]);
    }

    #[test]
    fn attribute_and_namespace_axes() {
        let doc = fixture();
        let para = doc.root_element().unwrap().first_child().unwrap();
        let attrs = collect(Axis::Attribute, para);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].string_value(), "p1");

        assert!(collect(Axis::Namespace, para).is_empty());
        // Attributes on a non-element origin yield nothing.
        let text = para.first_child().unwrap();
        assert!(collect(Axis::Attribute, text).is_empty());
    }
}
