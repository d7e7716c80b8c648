use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum XPathError {
    /// Lexing failed or the parser stack could not be reduced to a single
    /// expression. Carries the original expression and a dump of the
    /// residual stack.
    #[error("XPath parse error {expression}: {stack}")]
    Parse { expression: String, stack: String },

    #[error("Unknown variable: ${0}")]
    UnknownVariable(String),

    #[error("Unknown XPath function: {0}")]
    UnknownFunction(String),

    #[error("Function '{function}' error: {message}")]
    Function { function: String, message: String },

    #[error("Invalid regular expression syntax: {0}")]
    InvalidRegexFlags(String),

    #[error("Invalid matches argument: {0}")]
    InvalidRegexPattern(String),

    #[error("Type error: {0}")]
    Type(String),
}

impl XPathError {
    pub(crate) fn arity(function: &str, expected: &str) -> Self {
        XPathError::Function {
            function: function.to_string(),
            message: format!("Expected {} arguments", expected),
        }
    }
}
