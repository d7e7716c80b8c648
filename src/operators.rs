//! Binary operator semantics: XPath 1.0 comparisons and arithmetic.
//!
//! `or`/`and` short-circuit in the evaluator and never reach this module.

use crate::ast::BinaryOperator;
use crate::datasource::DomNode;
use crate::engine::{string_to_number, XPathValue};
use crate::error::XPathError;

/// Applies a non-logical binary operator to two evaluated values.
pub fn evaluate<'d, N: DomNode<'d>>(
    op: BinaryOperator,
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, XPathError> {
    match op {
        BinaryOperator::Equals => Ok(XPathValue::Boolean(equality(&left, &right, false))),
        BinaryOperator::NotEquals => Ok(XPathValue::Boolean(equality(&left, &right, true))),
        BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => {
            Ok(XPathValue::Boolean(relational(op, &left, &right)))
        }
        BinaryOperator::Plus => Ok(XPathValue::Number(left.to_number() + right.to_number())),
        BinaryOperator::Minus => Ok(XPathValue::Number(left.to_number() - right.to_number())),
        BinaryOperator::Multiply => Ok(XPathValue::Number(left.to_number() * right.to_number())),
        // True division; division by zero follows IEEE and yields ±Inf.
        BinaryOperator::Divide => Ok(XPathValue::Number(left.to_number() / right.to_number())),
        // IEEE remainder with the sign of the dividend.
        BinaryOperator::Modulo => Ok(XPathValue::Number(left.to_number() % right.to_number())),
        BinaryOperator::Or | BinaryOperator::And => Err(XPathError::Type(
            "logical operators must be evaluated with short-circuiting".to_string(),
        )),
    }
}

/// `=` and `!=`. Node-sets compare existentially over string-values; a
/// boolean on either side forces boolean comparison, otherwise a number
/// forces numeric comparison.
fn equality<'d, N: DomNode<'d>>(
    left: &XPathValue<N>,
    right: &XPathValue<N>,
    negate: bool,
) -> bool {
    use XPathValue::*;
    match (left, right) {
        (NodeSet(a), NodeSet(b)) => {
            let values: Vec<_> = b.iter().map(|n| n.string_value()).collect();
            a.iter().any(|n| {
                let s = n.string_value();
                values.iter().any(|v| (s == *v) != negate)
            })
        }
        (NodeSet(nodes), Boolean(b)) | (Boolean(b), NodeSet(nodes)) => {
            (!nodes.is_empty() == *b) != negate
        }
        (NodeSet(nodes), Number(x)) | (Number(x), NodeSet(nodes)) => nodes
            .iter()
            .any(|n| (string_to_number(&n.string_value()) == *x) != negate),
        (NodeSet(nodes), String(s)) | (String(s), NodeSet(nodes)) => {
            nodes.iter().any(|n| (n.string_value() == *s) != negate)
        }
        (Boolean(_), _) | (_, Boolean(_)) => (left.to_bool() == right.to_bool()) != negate,
        (Number(_), _) | (_, Number(_)) => (left.to_number() == right.to_number()) != negate,
        (String(a), String(b)) => (a == b) != negate,
    }
}

/// `<`, `<=`, `>`, `>=`: always numeric. Node-sets compare existentially
/// over the numeric value of their string-values.
fn relational<'d, N: DomNode<'d>>(
    op: BinaryOperator,
    left: &XPathValue<N>,
    right: &XPathValue<N>,
) -> bool {
    use XPathValue::*;
    match (left, right) {
        (NodeSet(a), NodeSet(b)) => {
            let values: Vec<f64> = b
                .iter()
                .map(|n| string_to_number(&n.string_value()))
                .collect();
            a.iter().any(|n| {
                let x = string_to_number(&n.string_value());
                values.iter().any(|y| compare(op, x, *y))
            })
        }
        (NodeSet(nodes), other) => nodes
            .iter()
            .any(|n| compare(op, string_to_number(&n.string_value()), other.to_number())),
        (other, NodeSet(nodes)) => nodes
            .iter()
            .any(|n| compare(op, other.to_number(), string_to_number(&n.string_value()))),
        _ => compare(op, left.to_number(), right.to_number()),
    }
}

fn compare(op: BinaryOperator, x: f64, y: f64) -> bool {
    match op {
        BinaryOperator::LessThan => x < y,
        BinaryOperator::LessThanOrEqual => x <= y,
        BinaryOperator::GreaterThan => x > y,
        BinaryOperator::GreaterThanOrEqual => x >= y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::dom::{Document, NodeRef};
    use crate::engine::{evaluate as eval_expr, EvaluationContext};
    use crate::parser::parse_expression;

    fn eval<'d>(
        text: &str,
        ctx: &EvaluationContext<'d, NodeRef<'d>>,
    ) -> XPathValue<NodeRef<'d>> {
        eval_expr(&parse_expression(text).unwrap(), ctx).unwrap()
    }

    fn context(doc: &Document) -> EvaluationContext<'_, NodeRef<'_>> {
        EvaluationContext::new(doc.root(), doc.root())
    }

    #[test]
    fn test_arithmetic() {
        let doc = Document::parse("<r/>").unwrap();
        let ctx = context(&doc);
        assert_eq!(eval("1 + 2 * 3", &ctx).to_number(), 7.0);
        assert_eq!(eval("10 div 4", &ctx).to_number(), 2.5);
        assert_eq!(eval("7 div 2", &ctx).to_number(), 3.5);
        assert_eq!(eval("'6' * '7'", &ctx).to_number(), 42.0);
        assert!(eval("'x' + 1", &ctx).to_number().is_nan());
    }

    #[test]
    fn test_mod_follows_dividend_sign() {
        let doc = Document::parse("<r/>").unwrap();
        let ctx = context(&doc);
        assert_eq!(eval("5 mod 2", &ctx).to_number(), 1.0);
        assert_eq!(eval("-5 mod 2", &ctx).to_number(), -1.0);
        assert_eq!(eval("5 mod -2", &ctx).to_number(), 1.0);
        assert_eq!(eval("-5 mod -2", &ctx).to_number(), -1.0);
    }

    #[test]
    fn test_division_by_zero_is_infinite() {
        let doc = Document::parse("<r/>").unwrap();
        let ctx = context(&doc);
        assert_eq!(eval("1 div 0", &ctx).to_number(), f64::INFINITY);
        assert_eq!(eval("-1 div 0", &ctx).to_number(), f64::NEG_INFINITY);
        assert!(eval("0 div 0", &ctx).to_number().is_nan());
    }

    #[test]
    fn test_scalar_equality() {
        let doc = Document::parse("<r/>").unwrap();
        let ctx = context(&doc);
        assert!(eval("1 = 1", &ctx).to_bool());
        assert!(eval("1 != 2", &ctx).to_bool());
        assert!(eval("'a' = 'a'", &ctx).to_bool());
        // A number on one side forces numeric comparison.
        assert!(eval("'1.0' = 1", &ctx).to_bool());
        // A boolean on one side forces boolean comparison.
        assert!(eval("1 = true()", &ctx).to_bool());
        assert!(eval("'' != true()", &ctx).to_bool());
        // NaN never equals anything, including itself.
        assert!(!eval("(0 div 0) = (0 div 0)", &ctx).to_bool());
    }

    #[test]
    fn test_node_set_equality_is_existential() {
        let doc =
            Document::parse("<r><v>1</v><v>2</v><w>2</w><w>3</w></r>").unwrap();
        let ctx = context(&doc);
        // Some v equals some w (both have a "2").
        assert!(eval("/r/v = /r/w", &ctx).to_bool());
        // And some v differs from some w, so != holds too.
        assert!(eval("/r/v != /r/w", &ctx).to_bool());
        assert!(eval("/r/v = '1'", &ctx).to_bool());
        assert!(eval("/r/v = 2", &ctx).to_bool());
        assert!(!eval("/r/v = 3", &ctx).to_bool());
        // Empty node-sets compare false against scalars either way.
        assert!(!eval("/r/missing = ''", &ctx).to_bool());
        assert!(!eval("/r/missing != ''", &ctx).to_bool());
        // Against a boolean, only emptiness matters.
        assert!(eval("/r/missing = false()", &ctx).to_bool());
        assert!(eval("/r/v = true()", &ctx).to_bool());
    }

    #[test]
    fn test_relational_coerces_to_numbers() {
        let doc = Document::parse("<r><v>1</v><v>2</v></r>").unwrap();
        let ctx = context(&doc);
        assert!(eval("1 < 2", &ctx).to_bool());
        assert!(eval("2 <= 2", &ctx).to_bool());
        assert!(eval("'10' > '9'", &ctx).to_bool());
        assert!(eval("/r/v < 2", &ctx).to_bool());
        assert!(eval("/r/v >= 2", &ctx).to_bool());
        assert!(!eval("/r/v > 2", &ctx).to_bool());
        assert!(eval("true() > 0", &ctx).to_bool());
    }
}
