//! The XPath tokenizer: a fixed table of anchored regular expression rules.
//!
//! All rules are tried against the remaining input; the longest match wins
//! and ties go to the earlier rule. The lexer itself is stateless apart
//! from the previously emitted token kind, which drives three
//! context-sensitive adjustments: operator keywords demote to names,
//! `*` is a wildcard unless it follows an operand, and an axis name not
//! followed by `::` is an ordinary name.

use crate::error::XPathError;
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Or,
    And,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Multiply,
    Div,
    Mod,
    /// `*` as a node test.
    Wildcard,
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    Dollar,
    Comma,
    Pipe,
    /// `::`
    AxisSeparator,
    Colon,
    ParenOpen,
    ParenClose,
    BracketOpen,
    BracketClose,
    AxisName,
    /// A node-type opener: `node(`, `text(`, `comment(`,
    /// `processing-instruction(`.
    NodeTypeOpen,
    /// A complete `processing-instruction('target')` test.
    PiWithTarget,
    /// A quoted string; the text keeps its quotes.
    Literal,
    Number,
    /// A QName or NCName.
    Name,
}

impl TokenKind {
    /// Operator precedence when this token is the parser lookahead.
    /// Tokens that never act as operators bind at 0.
    pub fn precedence(self) -> u32 {
        match self {
            TokenKind::Or => 10,
            TokenKind::And => 11,
            TokenKind::Eq | TokenKind::Neq => 12,
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => 13,
            TokenKind::Plus | TokenKind::Minus => 14,
            TokenKind::Multiply | TokenKind::Div | TokenKind::Mod => 15,
            TokenKind::Pipe => 17,
            TokenKind::DoubleSlash => 19,
            TokenKind::Literal => 20,
            TokenKind::Slash => 30,
            TokenKind::BracketOpen => 32,
            TokenKind::Dot | TokenKind::DotDot | TokenKind::At | TokenKind::ParenOpen => 34,
            TokenKind::Number => 35,
            TokenKind::AxisSeparator | TokenKind::Colon => 100,
            _ => 0,
        }
    }

    pub fn is_left_associative(self) -> bool {
        matches!(
            self,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Multiply
                | TokenKind::Div
                | TokenKind::Mod
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

struct TokenRule {
    kind: TokenKind,
    re: Regex,
}

fn rule(kind: TokenKind, pattern: &str) -> TokenRule {
    TokenRule {
        kind,
        re: Regex::new(pattern).expect("BUG: invalid token rule regex"),
    }
}

static TOKEN_RULES: LazyLock<Vec<TokenRule>> = LazyLock::new(|| {
    vec![
        rule(TokenKind::DoubleSlash, r"^//"),
        rule(TokenKind::Slash, r"^/"),
        rule(TokenKind::DotDot, r"^\.\."),
        rule(TokenKind::Dot, r"^\."),
        rule(TokenKind::AxisSeparator, r"^::"),
        rule(TokenKind::Colon, r"^:"),
        rule(
            TokenKind::AxisName,
            r"^(ancestor-or-self|ancestor|attribute|child|descendant-or-self|descendant|following-sibling|following|namespace|parent|preceding-sibling|preceding|self)",
        ),
        rule(
            TokenKind::PiWithTarget,
            r#"^processing-instruction\s*\(\s*('[^']*'|"[^"]*")\s*\)"#,
        ),
        rule(
            TokenKind::NodeTypeOpen,
            r"^(processing-instruction|comment|text|node)\s*\(",
        ),
        rule(TokenKind::ParenOpen, r"^\("),
        rule(TokenKind::ParenClose, r"^\)"),
        rule(TokenKind::BracketOpen, r"^\["),
        rule(TokenKind::BracketClose, r"^\]"),
        rule(TokenKind::At, r"^@"),
        rule(TokenKind::Comma, r"^,"),
        rule(TokenKind::Dollar, r"^\$"),
        rule(TokenKind::Pipe, r"^\|"),
        rule(TokenKind::Or, r"^or\b"),
        rule(TokenKind::And, r"^and\b"),
        rule(TokenKind::Mod, r"^mod\b"),
        rule(TokenKind::Div, r"^div\b"),
        rule(TokenKind::Neq, r"^!="),
        rule(TokenKind::Eq, r"^="),
        rule(TokenKind::Ge, r"^>="),
        rule(TokenKind::Gt, r"^>"),
        rule(TokenKind::Le, r"^<="),
        rule(TokenKind::Lt, r"^<"),
        rule(TokenKind::Plus, r"^\+"),
        rule(TokenKind::Minus, r"^-"),
        rule(TokenKind::Multiply, r"^\*"),
        rule(TokenKind::Literal, r"^'[^']*'"),
        rule(TokenKind::Literal, r#"^"[^"]*""#),
        rule(TokenKind::Number, r"^\d+(\.\d*)?"),
        rule(
            TokenKind::Name,
            r"^[\p{L}_][\p{L}\p{N}_.\-]*(:[\p{L}_][\p{L}\p{N}_.\-]*)?",
        ),
    ]
});

/// Tokens after which `and`/`or`/`div`/`mod` must be names instead of
/// operators (there is no left operand they could apply to).
const KEYWORD_DEMOTION_PREDECESSORS: [TokenKind; 5] = [
    TokenKind::At,
    TokenKind::DoubleSlash,
    TokenKind::Slash,
    TokenKind::AxisSeparator,
    TokenKind::Dollar,
];

/// Tokens that can end an operand; `*` after one of these is the multiply
/// operator, anywhere else it is the wildcard node test.
const OPERAND_ENDS: [TokenKind; 9] = [
    TokenKind::Name,
    TokenKind::Number,
    TokenKind::Literal,
    TokenKind::ParenClose,
    TokenKind::BracketClose,
    TokenKind::Dot,
    TokenKind::DotDot,
    TokenKind::Wildcard,
    TokenKind::PiWithTarget,
];

pub struct Lexer<'t> {
    input: &'t str,
    rest: &'t str,
    previous: Option<TokenKind>,
}

impl<'t> Lexer<'t> {
    pub fn new(input: &'t str) -> Self {
        Lexer {
            input,
            rest: input,
            previous: None,
        }
    }

    /// The portion of the input not yet consumed.
    pub fn remaining(&self) -> &'t str {
        self.rest
    }

    /// Lexes the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, XPathError> {
        self.rest = self.rest.trim_start();
        if self.rest.is_empty() {
            return Ok(None);
        }

        let mut best: Option<(&TokenRule, &str)> = None;
        for rule in TOKEN_RULES.iter() {
            if let Some(m) = rule.re.find(self.rest) {
                if best.map_or(true, |(_, text)| m.len() > text.len()) {
                    best = Some((rule, m.as_str()));
                }
            }
        }

        let Some((rule, text)) = best else {
            return Err(XPathError::Parse {
                expression: self.input.to_string(),
                stack: format!("unexpected character at '{}'", self.rest),
            });
        };

        let mut kind = rule.kind;
        let after = &self.rest[text.len()..];

        match kind {
            TokenKind::And | TokenKind::Or | TokenKind::Div | TokenKind::Mod => {
                // `child::and`, `div/and`: the keyword can only be an
                // operator with an operand to its left.
                let demote = match self.previous {
                    None => true,
                    Some(prev) => KEYWORD_DEMOTION_PREDECESSORS.contains(&prev),
                };
                if demote {
                    kind = TokenKind::Name;
                }
            }
            TokenKind::Multiply => {
                let operand_before = self
                    .previous
                    .is_some_and(|prev| OPERAND_ENDS.contains(&prev));
                if !operand_before {
                    kind = TokenKind::Wildcard;
                }
            }
            TokenKind::AxisName => {
                // `child` is also a fine element name; it is only an axis
                // when `::` follows.
                if !after.trim_start().starts_with("::") {
                    kind = TokenKind::Name;
                }
            }
            _ => {}
        }

        self.rest = after;
        self.previous = Some(kind);
        Ok(Some(Token {
            kind,
            text: text.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_token().unwrap() {
            tokens.push(token);
        }
        tokens
    }

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn longest_match_wins() {
        assert_eq!(kinds("//"), vec![TokenKind::DoubleSlash]);
        assert_eq!(kinds(".."), vec![TokenKind::DotDot]);
        assert_eq!(kinds("<="), vec![TokenKind::Le]);
        // `order` is longer than the `or` keyword match.
        assert_eq!(kinds("order"), vec![TokenKind::Name]);
        assert_eq!(kinds("android"), vec![TokenKind::Name]);
    }

    #[test]
    fn operator_keywords_demote_after_path_tokens() {
        assert_eq!(
            kinds("child::and"),
            vec![TokenKind::AxisName, TokenKind::AxisSeparator, TokenKind::Name]
        );
        assert_eq!(
            kinds("div/and"),
            vec![TokenKind::Name, TokenKind::Slash, TokenKind::Name]
        );
        assert_eq!(
            kinds("a and b"),
            vec![TokenKind::Name, TokenKind::And, TokenKind::Name]
        );
        assert_eq!(kinds("$mod"), vec![TokenKind::Dollar, TokenKind::Name]);
        // Start of input has no left operand.
        assert_eq!(kinds("or"), vec![TokenKind::Name]);
    }

    #[test]
    fn star_is_wildcard_unless_an_operand_precedes() {
        assert_eq!(kinds("*"), vec![TokenKind::Wildcard]);
        assert_eq!(
            kinds("@*"),
            vec![TokenKind::At, TokenKind::Wildcard]
        );
        assert_eq!(
            kinds("child::*"),
            vec![
                TokenKind::AxisName,
                TokenKind::AxisSeparator,
                TokenKind::Wildcard
            ]
        );
        assert_eq!(
            kinds("4 * 4"),
            vec![TokenKind::Number, TokenKind::Multiply, TokenKind::Number]
        );
        assert_eq!(
            kinds("a * b"),
            vec![TokenKind::Name, TokenKind::Multiply, TokenKind::Name]
        );
        assert_eq!(
            kinds("//*"),
            vec![TokenKind::DoubleSlash, TokenKind::Wildcard]
        );
        assert_eq!(
            kinds("ns:*"),
            vec![TokenKind::Name, TokenKind::Colon, TokenKind::Wildcard]
        );
    }

    #[test]
    fn axis_names_demote_without_separator() {
        assert_eq!(kinds("self"), vec![TokenKind::Name]);
        assert_eq!(kinds("child/parent"), vec![
            TokenKind::Name,
            TokenKind::Slash,
            TokenKind::Name
        ]);
        assert_eq!(
            kinds("self ::node()"),
            vec![
                TokenKind::AxisName,
                TokenKind::AxisSeparator,
                TokenKind::NodeTypeOpen,
                TokenKind::ParenClose
            ]
        );
    }

    #[test]
    fn node_type_tests_and_pi_targets() {
        assert_eq!(
            kinds("text()"),
            vec![TokenKind::NodeTypeOpen, TokenKind::ParenClose]
        );
        let tokens = lex("processing-instruction('fmt')");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::PiWithTarget);
        // Without a target the opener stays separate.
        assert_eq!(
            kinds("processing-instruction()"),
            vec![TokenKind::NodeTypeOpen, TokenKind::ParenClose]
        );
    }

    #[test]
    fn numbers_and_literals() {
        assert_eq!(kinds("3.14"), vec![TokenKind::Number]);
        assert_eq!(kinds("42"), vec![TokenKind::Number]);
        let tokens = lex("'it''s' \"quoted\"");
        assert_eq!(tokens[0].text, "'it'");
        assert_eq!(tokens[2].kind, TokenKind::Literal);
        assert_eq!(tokens[2].text, "\"quoted\"");
    }

    #[test]
    fn unicode_names() {
        assert_eq!(kinds("désqué"), vec![TokenKind::Name]);
        assert_eq!(kinds("数据/项目"), vec![
            TokenKind::Name,
            TokenKind::Slash,
            TokenKind::Name
        ]);
        let tokens = lex("ns:имя");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "ns:имя");
    }

    #[test]
    fn qname_does_not_swallow_axis_separator() {
        let tokens = lex("child::foo");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "child");
        assert_eq!(tokens[2].text, "foo");
    }

    #[test]
    fn unexpected_character_is_a_parse_error() {
        let mut lexer = Lexer::new("a ~ b");
        lexer.next_token().unwrap();
        let err = lexer.next_token().unwrap_err();
        assert!(err.to_string().starts_with("XPath parse error "));
    }
}
