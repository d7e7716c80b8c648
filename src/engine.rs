//! The evaluation engine for executing a parsed XPath AST against a generic
//! [`DomNode`] tree.

use crate::ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, Step};
use crate::datasource::{DomNode, NodeType};
use crate::error::XPathError;
use crate::{axes, functions, operators};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// Represents the possible result types of an XPath expression evaluation.
#[derive(Debug, Clone)]
pub enum XPathValue<N> {
    NodeSet(Vec<N>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl<'d, N: DomNode<'d>> XPathValue<N> {
    /// Coerces the XPath value to a boolean as per XPath 1.0 rules.
    pub fn to_bool(&self) -> bool {
        match self {
            XPathValue::NodeSet(nodes) => !nodes.is_empty(),
            XPathValue::String(s) => !s.is_empty(),
            XPathValue::Number(n) => *n != 0.0 && !n.is_nan(),
            XPathValue::Boolean(b) => *b,
        }
    }

    /// Coerces the XPath value to a number as per XPath 1.0 rules.
    pub fn to_number(&self) -> f64 {
        match self {
            XPathValue::Number(n) => *n,
            XPathValue::String(s) => string_to_number(s),
            XPathValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            XPathValue::NodeSet(nodes) => {
                // The string-value of the first node in document order,
                // regardless of how the set happens to be stored.
                match nodes.iter().min() {
                    Some(node) => string_to_number(&node.string_value()),
                    None => f64::NAN,
                }
            }
        }
    }

    /// The node-set behind this value, or a type error for scalars.
    pub fn into_node_set(self) -> Result<Vec<N>, XPathError> {
        match self {
            XPathValue::NodeSet(nodes) => Ok(nodes),
            other => Err(XPathError::Type(format!(
                "expected a node-set, got a {}",
                other.type_name()
            ))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            XPathValue::NodeSet(_) => "node-set",
            XPathValue::String(_) => "string",
            XPathValue::Number(_) => "number",
            XPathValue::Boolean(_) => "boolean",
        }
    }
}

impl<'d, N: DomNode<'d>> fmt::Display for XPathValue<N> {
    /// Coerces the XPath value to a string as per XPath 1.0 rules.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XPathValue::NodeSet(nodes) => {
                let first = nodes.iter().min().map(|n| n.string_value());
                write!(f, "{}", first.unwrap_or_default())
            }
            XPathValue::String(s) => write!(f, "{}", s),
            XPathValue::Number(n) => write!(f, "{}", format_number(*n)),
            XPathValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// The canonical XPath 1.0 decimal form of a number: `NaN`, signed
/// `Infinity`, integers without a decimal point, and no negative zero.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value == 0.0 {
        "0".to_string()
    } else {
        format!("{}", value)
    }
}

/// String-to-number coercion; NaN on anything unparseable (including the
/// empty string).
pub(crate) fn string_to_number(s: &str) -> f64 {
    s.trim().parse().unwrap_or(f64::NAN)
}

/// XPath `round()`: halves round towards positive infinity. `floor(n + 0.5)`
/// handles both signs; NaN, infinities and zero pass through.
pub(crate) fn round_half_up(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() || n == 0.0 {
        n
    } else {
        (n + 0.5).floor()
    }
}

/// A container for all state needed during expression evaluation.
/// `'d` is the lifetime of the underlying document tree.
pub struct EvaluationContext<'d, N: DomNode<'d>> {
    pub context_node: N,
    pub root_node: N,
    /// 1-based position of the context node in the current node list.
    pub context_position: usize,
    pub context_size: usize,
    variables: Rc<HashMap<String, XPathValue<N>>>,
    case_insensitive: bool,
    return_on_first_match: bool,
    _marker: PhantomData<&'d ()>,
}

impl<'d, N: DomNode<'d>> EvaluationContext<'d, N> {
    pub fn new(context_node: N, root_node: N) -> Self {
        EvaluationContext {
            context_node,
            root_node,
            context_position: 1,
            context_size: 1,
            variables: Rc::new(HashMap::new()),
            case_insensitive: false,
            return_on_first_match: false,
            _marker: PhantomData,
        }
    }

    /// Binds a variable, visible to this context and every clone made from
    /// it afterwards.
    pub fn set_variable(&mut self, name: &str, value: XPathValue<N>) {
        Rc::make_mut(&mut self.variables).insert(name.to_string(), value);
    }

    pub fn variable(&self, name: &str) -> Option<&XPathValue<N>> {
        self.variables.get(name)
    }

    /// Case-insensitive element and attribute name matching, for trees
    /// parsed from HTML.
    pub fn set_case_insensitive(&mut self, on: bool) {
        self.case_insensitive = on;
    }

    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Lets non-positional location paths stop at their first hit.
    pub fn set_return_on_first_match(&mut self, on: bool) {
        self.return_on_first_match = on;
    }

    pub fn return_on_first_match(&self) -> bool {
        self.return_on_first_match
    }

    pub fn position(&self) -> usize {
        self.context_position
    }

    pub fn size(&self) -> usize {
        self.context_size
    }

    /// A context for another node in a node list, sharing the variable
    /// scope and flags.
    pub fn clone_for(&self, node: N, position: usize, size: usize) -> Self {
        EvaluationContext {
            context_node: node,
            root_node: self.root_node,
            context_position: position,
            context_size: size,
            variables: Rc::clone(&self.variables),
            case_insensitive: self.case_insensitive,
            return_on_first_match: self.return_on_first_match,
            _marker: PhantomData,
        }
    }
}

/// Evaluates a compiled expression and returns a concrete `XPathValue`.
pub fn evaluate<'d, N>(
    expr: &Expression,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError>
where
    N: DomNode<'d> + 'd,
{
    match expr {
        Expression::Literal(s) => Ok(XPathValue::String(s.clone())),
        Expression::Number(n) => Ok(XPathValue::Number(*n)),
        Expression::Variable(name) => match ctx.variable(name) {
            Some(value) => Ok(value.clone()),
            None => Err(XPathError::UnknownVariable(name.clone())),
        },
        Expression::FunctionCall { name, args } => {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(evaluate(arg, ctx)?);
            }
            functions::evaluate_function(name, evaluated, ctx)
        }
        Expression::LocationPath(path) => {
            Ok(XPathValue::NodeSet(evaluate_location_path(path, ctx)?))
        }
        Expression::Path { filter, rel } => {
            let starts = evaluate(filter, ctx)?.into_node_set()?;
            let mut nodes = Vec::new();
            for node in starts {
                let sub = ctx.clone_for(node, 1, 1);
                nodes.extend(evaluate_location_path(rel, &sub)?);
            }
            sort_document_order(&mut nodes);
            Ok(XPathValue::NodeSet(nodes))
        }
        Expression::Filter {
            primary,
            predicates,
        } => {
            let nodes = evaluate(primary, ctx)?.into_node_set()?;
            let filtered = apply_predicates(nodes, predicates, ctx)?;
            Ok(XPathValue::NodeSet(filtered))
        }
        Expression::Union { left, right } => {
            let mut nodes = evaluate(left, ctx)?.into_node_set()?;
            nodes.extend(evaluate(right, ctx)?.into_node_set()?);
            sort_document_order(&mut nodes);
            Ok(XPathValue::NodeSet(nodes))
        }
        Expression::BinaryOp { left, op, right } => match op {
            BinaryOperator::Or => {
                if evaluate(left, ctx)?.to_bool() {
                    Ok(XPathValue::Boolean(true))
                } else {
                    Ok(XPathValue::Boolean(evaluate(right, ctx)?.to_bool()))
                }
            }
            BinaryOperator::And => {
                if !evaluate(left, ctx)?.to_bool() {
                    Ok(XPathValue::Boolean(false))
                } else {
                    Ok(XPathValue::Boolean(evaluate(right, ctx)?.to_bool()))
                }
            }
            _ => {
                let left_value = evaluate(left, ctx)?;
                let right_value = evaluate(right, ctx)?;
                operators::evaluate(*op, left_value, right_value)
            }
        },
        Expression::UnaryMinus(inner) => {
            let negated = -evaluate(inner, ctx)?.to_number();
            // Negating zero must not produce -0.
            Ok(XPathValue::Number(if negated == 0.0 { 0.0 } else { negated }))
        }
    }
}

/// Sorts into document order and drops duplicates by document-order id.
pub(crate) fn sort_document_order<'d, N: DomNode<'d>>(nodes: &mut Vec<N>) {
    nodes.sort();
    nodes.dedup_by(|a, b| a.document_order() == b.document_order());
}

fn evaluate_location_path<'d, N>(
    path: &LocationPath,
    ctx: &EvaluationContext<'d, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DomNode<'d> + 'd,
{
    let start = if path.is_absolute {
        ctx.root_node
    } else {
        ctx.context_node
    };
    if path.steps.is_empty() {
        return Ok(vec![start]);
    }
    // The shortcut only applies when no step selects by position.
    let first_match = ctx.return_on_first_match()
        && !path.steps.iter().any(|s| s.has_positional_predicate);
    let mut nodes = Vec::new();
    walk_steps(&path.steps, 0, start, ctx, first_match, &mut nodes)?;
    sort_document_order(&mut nodes);
    Ok(nodes)
}

/// Applies steps depth-first from a single origin node. Positions restart
/// for every origin, so each step is evaluated per input node rather than
/// over a merged candidate list.
fn walk_steps<'d, N>(
    steps: &[Step],
    index: usize,
    input: N,
    ctx: &EvaluationContext<'d, N>,
    first_match: bool,
    out: &mut Vec<N>,
) -> Result<(), XPathError>
where
    N: DomNode<'d> + 'd,
{
    let candidates = evaluate_step(&steps[index], input, ctx)?;
    if index + 1 == steps.len() {
        if first_match {
            if let Some(first) = candidates.first() {
                out.push(*first);
            }
        } else {
            out.extend(candidates);
        }
    } else {
        for node in candidates {
            walk_steps(steps, index + 1, node, ctx, first_match, out)?;
            if first_match && !out.is_empty() {
                break;
            }
        }
    }
    Ok(())
}

/// Evaluates a single step from a single origin: axis, node test, then
/// predicates in order.
fn evaluate_step<'d, N>(
    step: &Step,
    origin: N,
    ctx: &EvaluationContext<'d, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DomNode<'d> + 'd,
{
    let mut candidates = axes::collect(step.axis, origin);
    candidates.retain(|node| node_test_matches(&step.node_test, *node, step.axis, ctx));
    apply_predicates(candidates, &step.predicates, ctx)
}

/// Filters a node list through predicates. Positions are 1..=N over the
/// surviving candidates of the previous predicate, counted in the order
/// the list arrives in (axis direction for steps).
fn apply_predicates<'d, N>(
    mut nodes: Vec<N>,
    predicates: &[Expression],
    ctx: &EvaluationContext<'d, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DomNode<'d> + 'd,
{
    for predicate in predicates {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in nodes.iter().enumerate() {
            let predicate_ctx = ctx.clone_for(*node, i + 1, size);
            let value = evaluate(predicate, &predicate_ctx)?;
            let keep = match value {
                // A numeric predicate selects by position.
                XPathValue::Number(n) => (i + 1) as f64 == round_half_up(n),
                other => other.to_bool(),
            };
            if keep {
                kept.push(*node);
            }
        }
        nodes = kept;
    }
    Ok(nodes)
}

fn node_test_matches<'d, N>(
    test: &NodeTest,
    node: N,
    axis: Axis,
    ctx: &EvaluationContext<'d, N>,
) -> bool
where
    N: DomNode<'d>,
{
    let names_equal = |a: &str, b: &str| {
        if ctx.case_insensitive() {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    };
    match test {
        NodeTest::Wildcard => match axis {
            Axis::Attribute => node.node_type() == NodeType::Attribute,
            _ => node.node_type() == NodeType::Element,
        },
        NodeTest::Name { prefix, local } => {
            let Some(qname) = node.name() else {
                return false;
            };
            let prefix_matches = match (prefix.as_deref(), qname.prefix) {
                (None, None) => true,
                (Some(a), Some(b)) => names_equal(a, b),
                _ => false,
            };
            prefix_matches && names_equal(local, qname.local_part)
        }
        NodeTest::NamespaceWildcard(prefix) => node
            .name()
            .and_then(|q| q.prefix)
            .is_some_and(|p| names_equal(prefix, p)),
        NodeTest::Node => true,
        NodeTest::Text => {
            matches!(node.node_type(), NodeType::Text | NodeType::CData)
        }
        NodeTest::Comment => node.node_type() == NodeType::Comment,
        NodeTest::ProcessingInstruction(target) => {
            node.node_type() == NodeType::ProcessingInstruction
                && target
                    .as_ref()
                    .map_or(true, |t| {
                        node.name().is_some_and(|q| q.local_part == t.as_str())
                    })
        }
    }
}
