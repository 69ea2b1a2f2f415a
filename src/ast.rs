pub mod expressions;
pub mod tokens;

pub use expressions::{Expr, Pool, TemplateElement};
pub use tokens::{TemplatePart, Token, TokenKind};
