//! Sorting a node list by evaluated sort keys, the way an XSLT `xsl:sort`
//! consumer needs it.

use crate::ast::Expression;
use crate::datasource::DomNode;
use crate::engine::{evaluate, string_to_number, EvaluationContext};
use crate::error::XPathError;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDataType {
    #[default]
    Text,
    Number,
}

/// One sort criterion: an expression evaluated per node, compared as text
/// or as a number, ascending or descending.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub select: Expression,
    pub data_type: SortDataType,
    pub order: SortOrder,
}

#[derive(Debug, PartialEq)]
enum KeyValue {
    Text(String),
    Number(f64),
}

impl KeyValue {
    fn compare(&self, other: &KeyValue) -> Ordering {
        match (self, other) {
            (KeyValue::Text(a), KeyValue::Text(b)) => a.cmp(b),
            (KeyValue::Number(a), KeyValue::Number(b)) => {
                // NaN sorts first so unparseable values cluster together.
                match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
                }
            }
            _ => Ordering::Equal,
        }
    }
}

/// Sorts `nodes` in place by the given keys. Every key is evaluated once
/// per node up front (context node = the node, position = its original
/// 1-based index, size = the list length). The original index acts as a
/// final ascending key, which makes the sort stable by construction.
pub fn sort_node_set<'d, N>(
    nodes: &mut Vec<N>,
    keys: &[SortKey],
    ctx: &EvaluationContext<'d, N>,
) -> Result<(), XPathError>
where
    N: DomNode<'d> + 'd,
{
    if nodes.len() < 2 || keys.is_empty() {
        return Ok(());
    }

    let size = nodes.len();
    let mut decorated: Vec<(Vec<KeyValue>, usize, N)> = Vec::with_capacity(size);
    for (index, node) in nodes.iter().enumerate() {
        let node_ctx = ctx.clone_for(*node, index + 1, size);
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let value = evaluate(&key.select, &node_ctx)?;
            values.push(match key.data_type {
                SortDataType::Text => KeyValue::Text(value.to_string()),
                SortDataType::Number => KeyValue::Number(string_to_number(&value.to_string())),
            });
        }
        decorated.push((values, index, *node));
    }

    decorated.sort_by(|a, b| {
        for (key, (left, right)) in keys.iter().zip(a.0.iter().zip(b.0.iter())) {
            let mut ordering = left.compare(right);
            if key.order == SortOrder::Descending {
                ordering = ordering.reverse();
            }
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.1.cmp(&b.1)
    });

    nodes.clear();
    nodes.extend(decorated.into_iter().map(|(_, _, node)| node));
    Ok(())
}
