//! Defines the Abstract Syntax Tree (AST) for XPath 1.0 expressions.

/// The top-level expression that can be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(String),
    Number(f64),
    LocationPath(LocationPath),
    /// A filter expression followed by a relative path, e.g. `$var/item`
    /// or `id('x')//name`.
    Path {
        filter: Box<Expression>,
        rel: LocationPath,
    },
    /// A primary expression narrowed by predicates, e.g. `$nodes[3]`.
    Filter {
        primary: Box<Expression>,
        predicates: Vec<Expression>,
    },
    Union {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Variable(String),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryMinus(Box<Expression>),
}

impl Expression {
    /// Checks if the expression is a `LocationPath` variant.
    pub fn is_location_path(&self) -> bool {
        matches!(self, Expression::LocationPath(_))
    }
}

/// A binary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    Or,
    And,
    // Equality
    Equals,
    NotEquals,
    // Relational
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Additive
    Plus,
    Minus,
    // Multiplicative
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOperator {
    /// True for the operators whose result is always a number.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Plus
                | BinaryOperator::Minus
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
        )
    }
}

/// Represents a full location path, like `/child::foo` or `descendant::bar[1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    /// True if the path starts from the document root (e.g., `/foo`).
    pub is_absolute: bool,
    pub steps: Vec<Step>,
}

/// Represents a single step in a location path, like `child::foo[position() > 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expression>,
    /// Whether any predicate could select by position. Computed when
    /// predicates are attached; gates the first-match shortcut, so a false
    /// positive only costs performance while a false negative would change
    /// results.
    pub has_positional_predicate: bool,
}

impl Step {
    pub fn new(axis: Axis, node_test: NodeTest) -> Self {
        Step {
            axis,
            node_test,
            predicates: Vec::new(),
            has_positional_predicate: false,
        }
    }

    /// The implicit `descendant-or-self::node()` step that `//` expands to.
    pub fn abbreviated_descendant() -> Self {
        Step::new(Axis::DescendantOrSelf, NodeTest::Node)
    }

    pub fn push_predicate(&mut self, predicate: Expression) {
        if !self.has_positional_predicate && has_positional_selector(&predicate, false) {
            self.has_positional_predicate = true;
        }
        self.predicates.push(predicate);
    }
}

/// The axis of movement from the context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    SelfAxis,
    Child,
    Parent,
    Descendant,
    DescendantOrSelf,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
    Namespace,
}

impl Axis {
    /// Reverse axes yield candidates in reverse document order, which is
    /// the order predicate positions count in.
    pub fn is_reverse(&self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }

    /// Parses an axis name as written in an expression.
    pub fn from_name(name: &str) -> Option<Axis> {
        Some(match name {
            "self" => Axis::SelfAxis,
            "child" => Axis::Child,
            "parent" => Axis::Parent,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            "attribute" => Axis::Attribute,
            "namespace" => Axis::Namespace,
            _ => return None,
        })
    }
}

/// A test to apply to nodes on a given axis to see if they should be included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `*`: any element, or any attribute on the attribute axis.
    Wildcard,
    /// A name test (e.g., `foo`, `xsl:if`).
    Name {
        prefix: Option<String>,
        local: String,
    },
    /// `prefix:*`: any element under the given prefix.
    NamespaceWildcard(String),
    /// `node()`
    Node,
    /// `text()` (also matches CDATA sections)
    Text,
    /// `comment()`
    Comment,
    /// `processing-instruction()`, optionally restricted to a target.
    ProcessingInstruction(Option<String>),
}

impl NodeTest {
    /// Builds a name test from a written QName, splitting off the prefix.
    pub fn from_qname(qname: &str) -> NodeTest {
        match qname.split_once(':') {
            Some((prefix, local)) => NodeTest::Name {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            },
            None => NodeTest::Name {
                prefix: None,
                local: qname.to_string(),
            },
        }
    }
}

/// Whether a predicate expression could select by position: a bare numeric
/// value compared against the position, or a `position()`/`last()` call
/// anywhere in a boolean combination. Deliberately conservative — any
/// number-returning subtree at the top level counts.
fn has_positional_selector(expr: &Expression, nested: bool) -> bool {
    if !nested && returns_number(expr) {
        return true;
    }
    match expr {
        Expression::FunctionCall { name, .. } => name == "position" || name == "last",
        Expression::BinaryOp { left, right, .. } => {
            has_positional_selector(left, true) || has_positional_selector(right, true)
        }
        _ => false,
    }
}

/// Whether an expression always evaluates to a number.
fn returns_number(expr: &Expression) -> bool {
    match expr {
        Expression::Number(_) => true,
        Expression::UnaryMinus(_) => true,
        Expression::BinaryOp { op, .. } => op.is_arithmetic(),
        Expression::FunctionCall { name, .. } => matches!(
            name.as_str(),
            "last"
                | "position"
                | "count"
                | "string-length"
                | "number"
                | "sum"
                | "floor"
                | "ceiling"
                | "round"
        ),
        _ => false,
    }
}
