//! An XPath 1.0 parser and evaluation engine.
//!
//! Expressions are tokenized by a regex-table lexer, parsed by a
//! precedence-driven shift/reduce engine into an [`ast::Expression`] tree,
//! and evaluated against any tree implementing the [`DomNode`] contract.
//! A minimal arena DOM ([`datasource::dom::Document`]) is included, with
//! XML ingestion via `roxmltree`.
//!
//! ```
//! use xpath1::datasource::dom::Document;
//! use xpath1::{eval, EvaluationContext};
//!
//! let doc = Document::parse("<page><q>new york</q></page>").unwrap();
//! let ctx = EvaluationContext::new(doc.root(), doc.root());
//! let value = eval("string(/page/q)", &ctx).unwrap();
//! assert_eq!(value.to_string(), "new york");
//! ```

pub mod ast;
pub mod axes;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod functions;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod sort;

pub use ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, Step};
pub use datasource::{DomNode, NodeType, QName};
pub use engine::{evaluate, EvaluationContext, XPathValue};
pub use error::XPathError;
pub use parser::{parse_expression, Parser};
pub use sort::{sort_node_set, SortDataType, SortKey, SortOrder};

/// Parses and evaluates in one call. For repeated evaluation of the same
/// text, parse once through a [`Parser`] and reuse the expression.
pub fn eval<'d, N>(
    text: &str,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError>
where
    N: DomNode<'d> + 'd,
{
    let expr = parse_expression(text)?;
    evaluate(&expr, ctx)
}
