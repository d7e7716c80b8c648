//! A shift/reduce parser for the XPath 1.0 expression language.
//!
//! The grammar lives in a data table: every rule carries a target
//! non-terminal, a pattern of quantified symbols, a precedence and a
//! constructor. The engine itself is a small generic loop — lex a token,
//! reduce while the precedence discipline allows it, otherwise shift.
//! Rules are binned by their last matchable pattern element and sorted
//! longest-first, so candidate lookup is a single map access.

use crate::ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, Step};
use crate::error::XPathError;
use crate::lexer::{Lexer, Token, TokenKind};
use regex::Regex;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;

// --- Parser API ---

/// An XPath expression parser with a per-instance parse cache.
///
/// The cache maps source text to the parsed expression and is only written
/// on success. It is not synchronized; share nothing, or give each thread
/// its own parser.
#[derive(Default)]
pub struct Parser {
    cache: HashMap<String, Rc<Expression>>,
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            cache: HashMap::new(),
        }
    }

    /// Parses an expression, consulting the cache first.
    pub fn parse(&mut self, text: &str) -> Result<Rc<Expression>, XPathError> {
        if let Some(hit) = self.cache.get(text) {
            log::trace!("parse cache hit: {}", text);
            return Ok(Rc::clone(hit));
        }
        let expr = Rc::new(parse_expression(text)?);
        self.cache.insert(text.to_string(), Rc::clone(&expr));
        Ok(expr)
    }

    /// Parses an expression and overrides the axis of the first step.
    ///
    /// Pattern compilers use this to reinterpret `foo` as e.g.
    /// `descendant::foo`. The result is never cached — the override mutates
    /// the tree, and a cached entry must stay exactly what the text says.
    pub fn parse_with_axis(&mut self, text: &str, axis: Axis) -> Result<Expression, XPathError> {
        let mut expr = parse_expression(text)?;
        if let Expression::LocationPath(path) = &mut expr {
            if let Some(first) = path.steps.first_mut() {
                first.axis = axis;
            }
        }
        Ok(expr)
    }
}

/// Parses an expression without any caching.
pub fn parse_expression(text: &str) -> Result<Expression, XPathError> {
    let trimmed = text.trim();
    if let Some(expr) = fast_path(trimmed) {
        log::trace!("fast path parse: {}", trimmed);
        return Ok(expr);
    }
    let expr = parse_full(trimmed, text)?;
    log::debug!("parsed: {} => {:?}", text, expr);
    Ok(expr)
}

// --- Fast paths ---

static RE_SIMPLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\$|@)?\w+$").expect("BUG: invalid fast-path regex"));
static RE_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("BUG: invalid fast-path regex"));
static RE_NAME_CHAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+(/\w+)*$").expect("BUG: invalid fast-path regex"));

/// Recognizes the three textual shapes that need no grammar: a bare
/// name/attribute/variable, a pure integer, and a chain of simple names.
fn fast_path(text: &str) -> Option<Expression> {
    if RE_SIMPLE.is_match(text) {
        return Some(simple_expression(text));
    }
    if RE_NAME_CHAIN.is_match(text) {
        let steps = text
            .split('/')
            .map(|name| Step::new(Axis::Child, NodeTest::from_qname(name)))
            .collect();
        return Some(Expression::LocationPath(LocationPath {
            is_absolute: false,
            steps,
        }));
    }
    None
}

fn simple_expression(text: &str) -> Expression {
    if let Some(name) = text.strip_prefix('$') {
        return Expression::Variable(name.to_string());
    }
    if let Some(name) = text.strip_prefix('@') {
        return Expression::LocationPath(LocationPath {
            is_absolute: false,
            steps: vec![Step::new(Axis::Attribute, NodeTest::from_qname(name))],
        });
    }
    if RE_INTEGER.is_match(text) {
        return Expression::Number(text.parse().unwrap_or(f64::NAN));
    }
    Expression::LocationPath(LocationPath {
        is_absolute: false,
        steps: vec![Step::new(Axis::Child, NodeTest::from_qname(text))],
    })
}

// --- Grammar data ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NonTerm {
    Expr,
    Primary,
    Filter,
    Path,
    Union,
    Location,
    Absolute,
    Relative,
    Step,
    Test,
    Predicate,
    Variable,
    Call,
    Argument,
}

impl NonTerm {
    fn label(self) -> &'static str {
        match self {
            NonTerm::Expr => "Expr",
            NonTerm::Primary => "PrimaryExpr",
            NonTerm::Filter => "FilterExpr",
            NonTerm::Path => "PathExpr",
            NonTerm::Union => "UnionExpr",
            NonTerm::Location => "LocationPath",
            NonTerm::Absolute => "AbsoluteLocationPath",
            NonTerm::Relative => "RelativeLocationPath",
            NonTerm::Step => "Step",
            NonTerm::Test => "NodeTest",
            NonTerm::Predicate => "Predicate",
            NonTerm::Variable => "VariableReference",
            NonTerm::Call => "FunctionCall",
            NonTerm::Argument => "Argument",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Symbol {
    Tok(TokenKind),
    Nt(NonTerm),
}

/// Pattern quantifiers: exactly one, at most one, any number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quant {
    One,
    Optional,
    Any,
}

/// The semantic value carried by a parser frame.
#[derive(Debug, Clone)]
enum SemValue {
    Token(Token),
    Expr(Expression),
    Location(LocationPath),
    Step(Step),
    Test(NodeTest),
    Predicate(Expression),
    Argument(Expression),
}

type Action = fn(Vec<SemValue>) -> Result<SemValue, String>;

struct Rule {
    target: NonTerm,
    pattern: Vec<(Symbol, Quant)>,
    /// Declared precedence; -1 derives it from the pattern's tokens.
    prec: i32,
    action: Action,
}

struct Grammar {
    rules: Vec<Rule>,
    /// Rule indices binned by every symbol a pattern can end with, each
    /// bin sorted longest-pattern-first.
    index: HashMap<Symbol, Vec<usize>>,
}

fn t(kind: TokenKind) -> (Symbol, Quant) {
    (Symbol::Tok(kind), Quant::One)
}

fn nt(n: NonTerm) -> (Symbol, Quant) {
    (Symbol::Nt(n), Quant::One)
}

fn opt(n: NonTerm) -> (Symbol, Quant) {
    (Symbol::Nt(n), Quant::Optional)
}

fn star(n: NonTerm) -> (Symbol, Quant) {
    (Symbol::Nt(n), Quant::Any)
}

fn rule(target: NonTerm, pattern: Vec<(Symbol, Quant)>, prec: i32, action: Action) -> Rule {
    Rule {
        target,
        pattern,
        prec,
        action,
    }
}

static GRAMMAR: LazyLock<Grammar> = LazyLock::new(|| {
    use NonTerm::*;
    use TokenKind::*;

    let rules = vec![
        // Location paths
        rule(Location, vec![nt(Relative)], 18, act_pass),
        rule(Location, vec![nt(Absolute)], 18, act_pass),
        rule(Absolute, vec![t(Slash), nt(Relative)], 18, act_absolute),
        rule(
            Absolute,
            vec![t(DoubleSlash), nt(Relative)],
            18,
            act_absolute_descendant,
        ),
        // Precedence 0 so a bare `/` or `//` only reduces when nothing can
        // follow it.
        rule(Absolute, vec![t(Slash)], 0, act_root),
        rule(Absolute, vec![t(DoubleSlash)], 0, act_root_descendant),
        rule(Relative, vec![nt(Step)], 31, act_relative),
        rule(
            Relative,
            vec![nt(Relative), t(Slash), nt(Step)],
            31,
            act_relative_slash,
        ),
        rule(
            Relative,
            vec![nt(Relative), t(DoubleSlash), nt(Step)],
            31,
            act_relative_double_slash,
        ),
        // Steps
        rule(Step, vec![t(Dot)], 33, act_step_self),
        rule(Step, vec![t(DotDot)], 33, act_step_parent),
        rule(
            Step,
            vec![t(AxisName), t(AxisSeparator), nt(Test)],
            33,
            act_step_axis,
        ),
        rule(Step, vec![t(At), nt(Test)], 33, act_step_attribute),
        rule(Step, vec![nt(Test)], 33, act_step_child),
        rule(Step, vec![nt(Step), nt(Predicate)], 33, act_step_predicate),
        // Node tests
        rule(
            Test,
            vec![t(Name), t(Colon), t(Wildcard)],
            33,
            act_test_namespace_wildcard,
        ),
        rule(Test, vec![t(Wildcard)], 33, act_test_wildcard),
        rule(Test, vec![t(Name)], 33, act_test_name),
        rule(
            Test,
            vec![t(NodeTypeOpen), t(ParenClose)],
            33,
            act_test_node_type,
        ),
        rule(Test, vec![t(PiWithTarget)], 33, act_test_pi_target),
        rule(
            Predicate,
            vec![t(BracketOpen), nt(Expr), t(BracketClose)],
            33,
            act_predicate,
        ),
        // Primaries
        rule(Variable, vec![t(Dollar), t(Name)], 36, act_variable),
        rule(
            Call,
            vec![
                t(Name),
                t(ParenOpen),
                opt(Expr),
                star(Argument),
                t(ParenClose),
            ],
            -1,
            act_call,
        ),
        rule(Argument, vec![t(Comma), nt(Expr)], -1, act_argument),
        rule(Primary, vec![nt(Variable)], 33, act_pass),
        rule(
            Primary,
            vec![t(ParenOpen), nt(Expr), t(ParenClose)],
            33,
            act_parenthesized,
        ),
        rule(Primary, vec![t(Literal)], 33, act_literal),
        rule(Primary, vec![t(Number)], 33, act_number),
        rule(Primary, vec![nt(Call)], 33, act_pass),
        // Filters, paths, unions
        rule(
            Filter,
            vec![nt(Primary), star(Predicate)],
            31,
            act_filter,
        ),
        rule(Path, vec![nt(Location)], 20, act_path_location),
        rule(Path, vec![nt(Filter)], 19, act_pass),
        rule(
            Path,
            vec![nt(Filter), t(Slash), nt(Relative)],
            19,
            act_filter_path,
        ),
        rule(
            Path,
            vec![nt(Filter), t(DoubleSlash), nt(Relative)],
            19,
            act_filter_path_descendant,
        ),
        rule(Union, vec![nt(Path)], 20, act_pass),
        rule(Union, vec![nt(Union), t(Pipe), nt(Path)], 20, act_union),
        rule(Expr, vec![nt(Union)], 16, act_pass),
        // Operators; precedence comes from the operator token.
        rule(Expr, vec![nt(Expr), t(Or), nt(Expr)], -1, act_binary),
        rule(Expr, vec![nt(Expr), t(And), nt(Expr)], -1, act_binary),
        rule(Expr, vec![nt(Expr), t(Eq), nt(Expr)], -1, act_binary),
        rule(Expr, vec![nt(Expr), t(Neq), nt(Expr)], -1, act_binary),
        rule(Expr, vec![nt(Expr), t(Lt), nt(Expr)], -1, act_binary),
        rule(Expr, vec![nt(Expr), t(Le), nt(Expr)], -1, act_binary),
        rule(Expr, vec![nt(Expr), t(Gt), nt(Expr)], -1, act_binary),
        rule(Expr, vec![nt(Expr), t(Ge), nt(Expr)], -1, act_binary),
        rule(Expr, vec![nt(Expr), t(Plus), nt(Expr)], -1, act_binary),
        rule(Expr, vec![nt(Expr), t(Minus), nt(Expr)], -1, act_binary),
        rule(Expr, vec![nt(Expr), t(Multiply), nt(Expr)], -1, act_binary),
        rule(Expr, vec![nt(Expr), t(Div), nt(Expr)], -1, act_binary),
        rule(Expr, vec![nt(Expr), t(Mod), nt(Expr)], -1, act_binary),
        rule(Expr, vec![t(Minus), nt(Expr)], -1, act_unary_minus),
    ];

    let mut index: HashMap<Symbol, Vec<usize>> = HashMap::new();
    for (i, rule) in rules.iter().enumerate() {
        for key in bin_keys(&rule.pattern) {
            index.entry(key).or_default().push(i);
        }
    }
    for bin in index.values_mut() {
        bin.sort_by_key(|&i| std::cmp::Reverse(rules[i].pattern.len()));
    }

    Grammar { rules, index }
});

/// Every symbol a pattern can end with: the last element, plus earlier
/// ones while the tail can match empty.
fn bin_keys(pattern: &[(Symbol, Quant)]) -> Vec<Symbol> {
    let mut keys = Vec::new();
    for (symbol, quant) in pattern.iter().rev() {
        keys.push(*symbol);
        if *quant == Quant::One {
            break;
        }
    }
    keys
}

// --- Shift/reduce engine ---

struct Frame {
    symbol: Symbol,
    value: SemValue,
}

fn parse_full(trimmed: &str, original: &str) -> Result<Expression, XPathError> {
    let mut lexer = Lexer::new(trimmed);
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        let ahead = lexer.next_token()?;
        while try_reduce(&mut stack, ahead.as_ref(), original)? {}
        match ahead {
            Some(token) => {
                log::trace!("shift {:?}", token.kind);
                stack.push(Frame {
                    symbol: Symbol::Tok(token.kind),
                    value: SemValue::Token(token),
                });
            }
            None => break,
        }
    }

    if stack.len() == 1 && matches!(stack[0].value, SemValue::Expr(_)) {
        if let Some(Frame {
            value: SemValue::Expr(expr),
            ..
        }) = stack.pop()
        {
            return Ok(expr);
        }
    }
    Err(XPathError::Parse {
        expression: original.to_string(),
        stack: dump_stack(&stack),
    })
}

fn try_reduce(
    stack: &mut Vec<Frame>,
    ahead: Option<&Token>,
    original: &str,
) -> Result<bool, XPathError> {
    let Some(top) = stack.last() else {
        return Ok(false);
    };
    let Some(bin) = GRAMMAR.index.get(&top.symbol) else {
        return Ok(false);
    };

    for &rule_index in bin {
        let rule = &GRAMMAR.rules[rule_index];
        let Some(length) = match_pattern(stack, &rule.pattern) else {
            continue;
        };
        let prec = effective_precedence(rule);
        let reduce = match ahead {
            None => true,
            Some(token) => {
                let ahead_prec = token.kind.precedence();
                prec > ahead_prec
                    || (token.kind.is_left_associative() && prec >= ahead_prec)
            }
        };
        if !reduce {
            // The candidate loses to the lookahead; shift instead.
            return Ok(false);
        }
        let frames = stack.split_off(stack.len() - length);
        let values = frames.into_iter().map(|f| f.value).collect();
        let value = (rule.action)(values).map_err(|message| XPathError::Parse {
            expression: original.to_string(),
            stack: message,
        })?;
        log::trace!("reduce {} frames to {}", length, rule.target.label());
        stack.push(Frame {
            symbol: Symbol::Nt(rule.target),
            value,
        });
        return Ok(true);
    }
    Ok(false)
}

/// Matches a quantified pattern against the top of the stack, greedily and
/// without backtracking. Returns how many frames matched.
fn match_pattern(stack: &[Frame], pattern: &[(Symbol, Quant)]) -> Option<usize> {
    let mut s = stack.len();
    for (symbol, quant) in pattern.iter().rev() {
        match quant {
            Quant::One => {
                if s > 0 && stack[s - 1].symbol == *symbol {
                    s -= 1;
                } else {
                    return None;
                }
            }
            Quant::Optional => {
                if s > 0 && stack[s - 1].symbol == *symbol {
                    s -= 1;
                }
            }
            Quant::Any => {
                while s > 0 && stack[s - 1].symbol == *symbol {
                    s -= 1;
                }
            }
        }
    }
    let length = stack.len() - s;
    if length == 0 { None } else { Some(length) }
}

/// Declared precedence, or the highest precedence of the pattern's tokens
/// (a token without one contributes 2, so reductions still beat
/// unprecedented lookaheads).
fn effective_precedence(rule: &Rule) -> u32 {
    if rule.prec >= 0 {
        return rule.prec as u32;
    }
    rule.pattern
        .iter()
        .filter_map(|(symbol, _)| match symbol {
            Symbol::Tok(kind) => Some(kind.precedence().max(2)),
            Symbol::Nt(_) => None,
        })
        .max()
        .unwrap_or(2)
}

fn dump_stack(stack: &[Frame]) -> String {
    let labels: Vec<String> = stack
        .iter()
        .map(|frame| match (&frame.symbol, &frame.value) {
            (_, SemValue::Token(token)) => format!("'{}'", token.text),
            (Symbol::Nt(n), _) => n.label().to_string(),
            (Symbol::Tok(kind), _) => format!("{:?}", kind),
        })
        .collect();
    format!("[{}]", labels.join(" "))
}

// --- Rule constructors ---

fn bug(what: &str) -> String {
    format!("BUG: unexpected frame shape in {}", what)
}

fn pop_expr(value: SemValue) -> Result<Expression, String> {
    match value {
        SemValue::Expr(e) | SemValue::Predicate(e) | SemValue::Argument(e) => Ok(e),
        _ => Err(bug("expression frame")),
    }
}

fn pop_location(value: SemValue) -> Result<LocationPath, String> {
    match value {
        SemValue::Location(path) => Ok(path),
        _ => Err(bug("location frame")),
    }
}

fn pop_token_text(value: SemValue) -> Result<String, String> {
    match value {
        SemValue::Token(token) => Ok(token.text),
        _ => Err(bug("token frame")),
    }
}

fn act_pass(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    values.pop().ok_or_else(|| bug("pass"))
}

fn act_absolute(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let mut path = pop_location(values.pop().ok_or_else(|| bug("absolute"))?)?;
    path.is_absolute = true;
    Ok(SemValue::Location(path))
}

fn act_absolute_descendant(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let mut path = pop_location(values.pop().ok_or_else(|| bug("absolute"))?)?;
    path.is_absolute = true;
    path.steps.insert(0, Step::abbreviated_descendant());
    Ok(SemValue::Location(path))
}

fn act_root(_values: Vec<SemValue>) -> Result<SemValue, String> {
    Ok(SemValue::Location(LocationPath {
        is_absolute: true,
        steps: Vec::new(),
    }))
}

fn act_root_descendant(_values: Vec<SemValue>) -> Result<SemValue, String> {
    Ok(SemValue::Location(LocationPath {
        is_absolute: true,
        steps: vec![Step::abbreviated_descendant()],
    }))
}

fn act_relative(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    match values.pop() {
        Some(SemValue::Step(step)) => Ok(SemValue::Location(LocationPath {
            is_absolute: false,
            steps: vec![step],
        })),
        _ => Err(bug("relative")),
    }
}

fn act_relative_slash(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let step = match values.pop() {
        Some(SemValue::Step(step)) => step,
        _ => return Err(bug("relative step")),
    };
    values.pop();
    let mut path = pop_location(values.pop().ok_or_else(|| bug("relative"))?)?;
    path.steps.push(step);
    Ok(SemValue::Location(path))
}

fn act_relative_double_slash(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let step = match values.pop() {
        Some(SemValue::Step(step)) => step,
        _ => return Err(bug("relative step")),
    };
    values.pop();
    let mut path = pop_location(values.pop().ok_or_else(|| bug("relative"))?)?;
    path.steps.push(Step::abbreviated_descendant());
    path.steps.push(step);
    Ok(SemValue::Location(path))
}

fn act_step_self(_values: Vec<SemValue>) -> Result<SemValue, String> {
    Ok(SemValue::Step(Step::new(Axis::SelfAxis, NodeTest::Node)))
}

fn act_step_parent(_values: Vec<SemValue>) -> Result<SemValue, String> {
    Ok(SemValue::Step(Step::new(Axis::Parent, NodeTest::Node)))
}

fn act_step_axis(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let test = match values.pop() {
        Some(SemValue::Test(test)) => test,
        _ => return Err(bug("axis step")),
    };
    values.pop();
    let name = pop_token_text(values.pop().ok_or_else(|| bug("axis step"))?)?;
    let axis = Axis::from_name(&name).ok_or_else(|| format!("unknown axis '{}'", name))?;
    Ok(SemValue::Step(Step::new(axis, test)))
}

fn act_step_attribute(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    match values.pop() {
        Some(SemValue::Test(test)) => Ok(SemValue::Step(Step::new(Axis::Attribute, test))),
        _ => Err(bug("attribute step")),
    }
}

fn act_step_child(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    match values.pop() {
        Some(SemValue::Test(test)) => Ok(SemValue::Step(Step::new(Axis::Child, test))),
        _ => Err(bug("child step")),
    }
}

fn act_step_predicate(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let predicate = pop_expr(values.pop().ok_or_else(|| bug("step predicate"))?)?;
    match values.pop() {
        Some(SemValue::Step(mut step)) => {
            step.push_predicate(predicate);
            Ok(SemValue::Step(step))
        }
        _ => Err(bug("step predicate")),
    }
}

fn act_test_wildcard(_values: Vec<SemValue>) -> Result<SemValue, String> {
    Ok(SemValue::Test(NodeTest::Wildcard))
}

fn act_test_namespace_wildcard(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    values.pop();
    values.pop();
    let prefix = pop_token_text(values.pop().ok_or_else(|| bug("namespace wildcard"))?)?;
    Ok(SemValue::Test(NodeTest::NamespaceWildcard(prefix)))
}

fn act_test_name(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let name = pop_token_text(values.pop().ok_or_else(|| bug("name test"))?)?;
    Ok(SemValue::Test(NodeTest::from_qname(&name)))
}

fn act_test_node_type(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    values.pop();
    let opener = pop_token_text(values.pop().ok_or_else(|| bug("node type test"))?)?;
    let name = opener.trim_end_matches('(').trim_end();
    Ok(SemValue::Test(match name {
        "text" => NodeTest::Text,
        "comment" => NodeTest::Comment,
        "processing-instruction" => NodeTest::ProcessingInstruction(None),
        _ => NodeTest::Node,
    }))
}

fn act_test_pi_target(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let text = pop_token_text(values.pop().ok_or_else(|| bug("pi test"))?)?;
    let target = extract_quoted(&text).ok_or_else(|| bug("pi test"))?;
    Ok(SemValue::Test(NodeTest::ProcessingInstruction(Some(
        target,
    ))))
}

fn extract_quoted(text: &str) -> Option<String> {
    let start = text.find(['\'', '"'])?;
    let quote = text.as_bytes()[start] as char;
    let rest = &text[start + 1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

fn act_predicate(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    values.pop();
    let expr = pop_expr(values.pop().ok_or_else(|| bug("predicate"))?)?;
    Ok(SemValue::Predicate(expr))
}

fn act_variable(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let name = pop_token_text(values.pop().ok_or_else(|| bug("variable"))?)?;
    Ok(SemValue::Expr(Expression::Variable(name)))
}

fn act_call(values: Vec<SemValue>) -> Result<SemValue, String> {
    let mut name = None;
    let mut args = Vec::new();
    for value in values {
        match value {
            SemValue::Token(token) if token.kind == TokenKind::Name => {
                // Namespace prefixes on function names are ignored; only
                // the local name is dispatched on.
                let local = token.text.rsplit(':').next().unwrap_or("").to_string();
                name = Some(local);
            }
            SemValue::Token(_) => {}
            SemValue::Expr(expr) | SemValue::Argument(expr) => args.push(expr),
            _ => return Err(bug("function call")),
        }
    }
    Ok(SemValue::Expr(Expression::FunctionCall {
        name: name.ok_or_else(|| bug("function call"))?,
        args,
    }))
}

fn act_argument(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let expr = pop_expr(values.pop().ok_or_else(|| bug("argument"))?)?;
    Ok(SemValue::Argument(expr))
}

fn act_parenthesized(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    values.pop();
    let expr = pop_expr(values.pop().ok_or_else(|| bug("parenthesized"))?)?;
    Ok(SemValue::Expr(expr))
}

fn act_literal(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let text = pop_token_text(values.pop().ok_or_else(|| bug("literal"))?)?;
    let inner = text
        .strip_prefix(['\'', '"'])
        .and_then(|s| s.strip_suffix(['\'', '"']))
        .unwrap_or(&text);
    Ok(SemValue::Expr(Expression::Literal(inner.to_string())))
}

fn act_number(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let text = pop_token_text(values.pop().ok_or_else(|| bug("number"))?)?;
    Ok(SemValue::Expr(Expression::Number(
        text.parse().unwrap_or(f64::NAN),
    )))
}

fn act_filter(values: Vec<SemValue>) -> Result<SemValue, String> {
    let mut iter = values.into_iter();
    let primary = pop_expr(iter.next().ok_or_else(|| bug("filter"))?)?;
    let predicates: Vec<Expression> = iter
        .map(pop_expr)
        .collect::<Result<_, _>>()?;
    if predicates.is_empty() {
        Ok(SemValue::Expr(primary))
    } else {
        Ok(SemValue::Expr(Expression::Filter {
            primary: Box::new(primary),
            predicates,
        }))
    }
}

fn act_path_location(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let path = pop_location(values.pop().ok_or_else(|| bug("path"))?)?;
    Ok(SemValue::Expr(Expression::LocationPath(path)))
}

fn act_filter_path(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let rel = pop_location(values.pop().ok_or_else(|| bug("filter path"))?)?;
    values.pop();
    let filter = pop_expr(values.pop().ok_or_else(|| bug("filter path"))?)?;
    Ok(SemValue::Expr(Expression::Path {
        filter: Box::new(filter),
        rel,
    }))
}

fn act_filter_path_descendant(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let mut rel = pop_location(values.pop().ok_or_else(|| bug("filter path"))?)?;
    values.pop();
    let filter = pop_expr(values.pop().ok_or_else(|| bug("filter path"))?)?;
    rel.steps.insert(0, Step::abbreviated_descendant());
    Ok(SemValue::Expr(Expression::Path {
        filter: Box::new(filter),
        rel,
    }))
}

fn act_union(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let right = pop_expr(values.pop().ok_or_else(|| bug("union"))?)?;
    values.pop();
    let left = pop_expr(values.pop().ok_or_else(|| bug("union"))?)?;
    Ok(SemValue::Expr(Expression::Union {
        left: Box::new(left),
        right: Box::new(right),
    }))
}

fn act_unary_minus(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let expr = pop_expr(values.pop().ok_or_else(|| bug("unary minus"))?)?;
    Ok(SemValue::Expr(Expression::UnaryMinus(Box::new(expr))))
}

fn act_binary(mut values: Vec<SemValue>) -> Result<SemValue, String> {
    let right = pop_expr(values.pop().ok_or_else(|| bug("binary"))?)?;
    let op = match values.pop() {
        Some(SemValue::Token(token)) => operator_for(token.kind).ok_or_else(|| bug("binary"))?,
        _ => return Err(bug("binary")),
    };
    let left = pop_expr(values.pop().ok_or_else(|| bug("binary"))?)?;
    Ok(SemValue::Expr(Expression::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }))
}

fn operator_for(kind: TokenKind) -> Option<BinaryOperator> {
    Some(match kind {
        TokenKind::Or => BinaryOperator::Or,
        TokenKind::And => BinaryOperator::And,
        TokenKind::Eq => BinaryOperator::Equals,
        TokenKind::Neq => BinaryOperator::NotEquals,
        TokenKind::Lt => BinaryOperator::LessThan,
        TokenKind::Le => BinaryOperator::LessThanOrEqual,
        TokenKind::Gt => BinaryOperator::GreaterThan,
        TokenKind::Ge => BinaryOperator::GreaterThanOrEqual,
        TokenKind::Plus => BinaryOperator::Plus,
        TokenKind::Minus => BinaryOperator::Minus,
        TokenKind::Multiply => BinaryOperator::Multiply,
        TokenKind::Div => BinaryOperator::Divide,
        TokenKind::Mod => BinaryOperator::Modulo,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_step(name: &str) -> Step {
        Step::new(Axis::Child, NodeTest::from_qname(name))
    }

    fn child_path(names: &[&str]) -> Expression {
        Expression::LocationPath(LocationPath {
            is_absolute: false,
            steps: names.iter().map(|n| name_step(n)).collect(),
        })
    }

    #[test]
    fn test_parse_simple_path() {
        let result = parse_expression("foo/bar").unwrap();
        assert_eq!(result, child_path(&["foo", "bar"]));
        // The fast path and the full parser must agree.
        let full = parse_expression("foo /bar").unwrap();
        assert_eq!(result, full);
    }

    #[test]
    fn test_parse_unary_minus() {
        let result = parse_expression("-5").unwrap();
        assert_eq!(
            result,
            Expression::UnaryMinus(Box::new(Expression::Number(5.0)))
        );

        let result2 = parse_expression("10 - -5").unwrap();
        if let Expression::BinaryOp { left, op, right } = result2 {
            assert_eq!(op, BinaryOperator::Minus);
            assert_eq!(*left, Expression::Number(10.0));
            assert_eq!(
                *right,
                Expression::UnaryMinus(Box::new(Expression::Number(5.0)))
            );
        } else {
            panic!("Expected BinaryOp");
        }
    }

    #[test]
    fn test_parse_axes() {
        let result = parse_expression("following-sibling::foo").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(path.steps[0].axis, Axis::FollowingSibling);
        } else {
            panic!("Expected LocationPath");
        }

        let result = parse_expression("preceding::*").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(path.steps[0].axis, Axis::Preceding);
            assert_eq!(path.steps[0].node_test, NodeTest::Wildcard);
        } else {
            panic!("Expected LocationPath");
        }

        let result = parse_expression("ancestor-or-self::div").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(path.steps[0].axis, Axis::AncestorOrSelf);
        } else {
            panic!("Expected LocationPath");
        }
    }

    #[test]
    fn test_parse_path_starting_with_variable() {
        let result = parse_expression("$myVar/foo/bar").unwrap();
        assert_eq!(
            result,
            Expression::Path {
                filter: Box::new(Expression::Variable("myVar".to_string())),
                rel: LocationPath {
                    is_absolute: false,
                    steps: vec![name_step("foo"), name_step("bar")],
                },
            }
        );
    }

    #[test]
    fn test_parse_variable_reference() {
        let result = parse_expression("$myVar").unwrap();
        assert_eq!(result, Expression::Variable("myVar".to_string()));

        let result_with_op = parse_expression("$myVar + 5").unwrap();
        assert_eq!(
            result_with_op,
            Expression::BinaryOp {
                left: Box::new(Expression::Variable("myVar".to_string())),
                op: BinaryOperator::Plus,
                right: Box::new(Expression::Number(5.0)),
            }
        );
    }

    #[test]
    fn test_parse_predicate() {
        let result = parse_expression("foo[@id = 'a']").unwrap();
        let expected_predicate = Expression::BinaryOp {
            left: Box::new(Expression::LocationPath(LocationPath {
                is_absolute: false,
                steps: vec![Step::new(Axis::Attribute, NodeTest::from_qname("id"))],
            })),
            op: BinaryOperator::Equals,
            right: Box::new(Expression::Literal("a".to_string())),
        };
        if let Expression::LocationPath(path) = result {
            assert_eq!(path.steps.len(), 1);
            assert_eq!(path.steps[0].predicates, vec![expected_predicate]);
            assert!(!path.steps[0].has_positional_predicate);
        } else {
            panic!("Expected LocationPath");
        }
    }

    #[test]
    fn test_parse_numeric_predicate() {
        let result = parse_expression("foo[1]").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(path.steps[0].predicates, vec![Expression::Number(1.0)]);
            assert!(path.steps[0].has_positional_predicate);
        } else {
            panic!("Expected LocationPath");
        }
    }

    #[test]
    fn test_parse_function_in_predicate() {
        let result = parse_expression("para[position()=1]").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(path.steps.len(), 1);
            assert_eq!(path.steps[0].predicates.len(), 1);
            assert!(path.steps[0].has_positional_predicate);
        } else {
            panic!("Expected LocationPath");
        }
    }

    #[test]
    fn test_positional_predicate_flags() {
        let positional = [
            "//a[1]",
            "//a[last()]",
            "//a[position()=1]",
            "//a[@foo and position()=2]",
            "//a[0+1]",
            "//a[string-length('bar')]",
        ];
        for text in positional {
            let expr = parse_expression(text).unwrap();
            if let Expression::LocationPath(path) = expr {
                assert!(
                    path.steps[1].has_positional_predicate,
                    "expected positional: {}",
                    text
                );
            } else {
                panic!("Expected LocationPath for {}", text);
            }
        }

        let non_positional = ["//a", "//a[@foo]", "//a[@foo='1']", "//a[b[1]]"];
        for text in non_positional {
            let expr = parse_expression(text).unwrap();
            if let Expression::LocationPath(path) = expr {
                assert!(
                    !path.steps[1].has_positional_predicate,
                    "expected non-positional: {}",
                    text
                );
            } else {
                panic!("Expected LocationPath for {}", text);
            }
        }
    }

    #[test]
    fn test_parse_text_node_test() {
        let result = parse_expression("foo/text()").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(path.steps.len(), 2);
            assert_eq!(path.steps[1].node_test, NodeTest::Text);
        } else {
            panic!("Expected LocationPath");
        }
    }

    #[test]
    fn test_parse_processing_instruction_tests() {
        let result = parse_expression("//processing-instruction()").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(
                path.steps[1].node_test,
                NodeTest::ProcessingInstruction(None)
            );
        } else {
            panic!("Expected LocationPath");
        }

        let result = parse_expression("//processing-instruction('fmt')").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(
                path.steps[1].node_test,
                NodeTest::ProcessingInstruction(Some("fmt".to_string()))
            );
        } else {
            panic!("Expected LocationPath");
        }
    }

    #[test]
    fn test_parse_abbreviated_steps() {
        let result = parse_expression(".").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(path.steps[0].axis, Axis::SelfAxis);
            assert_eq!(path.steps[0].node_test, NodeTest::Node);
        } else {
            panic!("Expected LocationPath");
        }

        let result = parse_expression("../foo").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(path.steps[0].axis, Axis::Parent);
            assert_eq!(path.steps[1].node_test, NodeTest::from_qname("foo"));
        } else {
            panic!("Expected LocationPath");
        }
    }

    #[test]
    fn test_parse_operator_precedence() {
        let result = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            result,
            Expression::BinaryOp {
                left: Box::new(Expression::Number(1.0)),
                op: BinaryOperator::Plus,
                right: Box::new(Expression::BinaryOp {
                    left: Box::new(Expression::Number(2.0)),
                    op: BinaryOperator::Multiply,
                    right: Box::new(Expression::Number(3.0)),
                }),
            }
        );

        // Left associativity of additive operators.
        let result = parse_expression("8 - 4 - 2").unwrap();
        if let Expression::BinaryOp { left, op, right } = result {
            assert_eq!(op, BinaryOperator::Minus);
            assert_eq!(*right, Expression::Number(2.0));
            assert!(matches!(*left, Expression::BinaryOp { .. }));
        } else {
            panic!("Expected BinaryOp");
        }
    }

    #[test]
    fn test_parse_boolean_precedence() {
        let result = parse_expression("a = b or c = d and e = f").unwrap();
        if let Expression::BinaryOp { op, right, .. } = result {
            assert_eq!(op, BinaryOperator::Or);
            if let Expression::BinaryOp { op, .. } = *right {
                assert_eq!(op, BinaryOperator::And);
            } else {
                panic!("Expected and on the right of or");
            }
        } else {
            panic!("Expected BinaryOp");
        }
    }

    #[test]
    fn test_parse_descendant_or_self() {
        let result = parse_expression("//foo").unwrap();
        assert_eq!(
            result,
            Expression::LocationPath(LocationPath {
                is_absolute: true,
                steps: vec![Step::abbreviated_descendant(), name_step("foo")],
            })
        );
    }

    #[test]
    fn test_parse_union() {
        let result = parse_expression("//*[@id='u1']|//*[@class='u']").unwrap();
        assert!(matches!(result, Expression::Union { .. }));

        // Unions group left.
        let result = parse_expression("a|b|c").unwrap();
        if let Expression::Union { left, right } = result {
            assert!(matches!(*left, Expression::Union { .. }));
            assert_eq!(*right, child_path(&["c"]));
        } else {
            panic!("Expected Union");
        }
    }

    #[test]
    fn test_parse_filter_with_predicates() {
        let result = parse_expression("$items[3]").unwrap();
        assert_eq!(
            result,
            Expression::Filter {
                primary: Box::new(Expression::Variable("items".to_string())),
                predicates: vec![Expression::Number(3.0)],
            }
        );

        let result = parse_expression("(//a)[2]/b").unwrap();
        if let Expression::Path { filter, rel } = result {
            assert!(matches!(*filter, Expression::Filter { .. }));
            assert_eq!(rel.steps.len(), 1);
        } else {
            panic!("Expected Path");
        }
    }

    #[test]
    fn test_parse_function_calls() {
        let result = parse_expression("true()").unwrap();
        assert_eq!(
            result,
            Expression::FunctionCall {
                name: "true".to_string(),
                args: vec![],
            }
        );

        let result = parse_expression("concat('a', 'b', 'c')").unwrap();
        if let Expression::FunctionCall { name, args } = result {
            assert_eq!(name, "concat");
            assert_eq!(args.len(), 3);
        } else {
            panic!("Expected FunctionCall");
        }

        // Prefixes on function names are dropped.
        let result = parse_expression("fn:count(//a)").unwrap();
        if let Expression::FunctionCall { name, args } = result {
            assert_eq!(name, "count");
            assert_eq!(args.len(), 1);
        } else {
            panic!("Expected FunctionCall");
        }
    }

    #[test]
    fn test_parse_operator_keywords_as_names() {
        let result = parse_expression("child::and").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(path.steps[0].node_test, NodeTest::from_qname("and"));
        } else {
            panic!("Expected LocationPath");
        }

        let result = parse_expression("div/and").unwrap();
        assert_eq!(result, child_path(&["div", "and"]));
    }

    #[test]
    fn test_parse_namespace_wildcard() {
        let result = parse_expression("ns:*").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(
                path.steps[0].node_test,
                NodeTest::NamespaceWildcard("ns".to_string())
            );
        } else {
            panic!("Expected LocationPath");
        }
    }

    #[test]
    fn test_parse_root_paths() {
        let result = parse_expression("/").unwrap();
        assert_eq!(
            result,
            Expression::LocationPath(LocationPath {
                is_absolute: true,
                steps: vec![],
            })
        );

        let result = parse_expression("/page/location/@lat").unwrap();
        if let Expression::LocationPath(path) = result {
            assert!(path.is_absolute);
            assert_eq!(path.steps.len(), 3);
            assert_eq!(path.steps[2].axis, Axis::Attribute);
        } else {
            panic!("Expected LocationPath");
        }
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["foo[", "a =", ")(", "child::", "1 +"] {
            let err = parse_expression(bad).unwrap_err();
            let message = err.to_string();
            assert!(
                message.starts_with("XPath parse error "),
                "unexpected message for {}: {}",
                bad,
                message
            );
            assert!(message.contains(bad), "message should echo input: {}", message);
        }
    }

    #[test]
    fn test_cache_round_trip() {
        let mut parser = Parser::new();
        let first = parser.parse("//a[@href]").unwrap();
        let second = parser.parse("//a[@href]").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(*first, parse_expression("//a[@href]").unwrap());
    }

    #[test]
    fn test_parse_with_axis_override() {
        let mut parser = Parser::new();
        let expr = parser
            .parse_with_axis("item", Axis::Descendant)
            .unwrap();
        if let Expression::LocationPath(path) = expr {
            assert_eq!(path.steps[0].axis, Axis::Descendant);
        } else {
            panic!("Expected LocationPath");
        }
        // The override must not leak into cached plain parses.
        let plain = parser.parse("item").unwrap();
        if let Expression::LocationPath(path) = &*plain {
            assert_eq!(path.steps[0].axis, Axis::Child);
        } else {
            panic!("Expected LocationPath");
        }
    }

    #[test]
    fn test_parse_non_latin_identifiers() {
        let result = parse_expression("//数据[@属性='值']").unwrap();
        if let Expression::LocationPath(path) = result {
            assert_eq!(path.steps[1].node_test, NodeTest::from_qname("数据"));
        } else {
            panic!("Expected LocationPath");
        }
    }
}
