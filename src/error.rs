use thiserror::Error;

/// Errors surfaced by compilation and evaluation.
///
/// The lexer, parser, and evaluator all report through this single type so
/// hosts have one boundary to match on. Short-circuit operators never
/// evaluate an operand they do not need, so errors inside an unused branch
/// are never observed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The lexer hit a character sequence that is not part of the grammar.
    #[error("Invalid expression token: {0}")]
    InvalidToken(String),

    /// A string, template, or interpolation ran off the end of the source.
    #[error("Unclosed {0}")]
    UnclosedLiteral(&'static str),

    /// The parser's current state has no handler for this token.
    #[error("Token {0} unexpected in expression")]
    UnexpectedToken(String),

    /// The expression ended with a dangling operator or open delimiter.
    #[error("Unexpected end of expression: missing {0}")]
    IncompleteExpression(&'static str),

    /// `=` with anything but a plain variable name on the left.
    #[error("Left side of assignment must be a variable name")]
    AssignmentTarget,

    #[error("Jexl Function {0} is not defined.")]
    UnknownFunction(String),

    #[error("Jexl Transform {0} is not defined.")]
    UnknownTransform(String),

    /// An error raised by a host-registered function, transform, or
    /// operator; the original message is carried through unchanged.
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Wrap a host-side failure message for propagation out of a
    /// registered callable.
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }
}
