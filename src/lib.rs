//! An embeddable expression language.
//!
//! Source strings compile through a context-sensitive lexer and a
//! streaming state-machine parser into a tree a [`Evaluator`] walks
//! against a host-supplied [`Context`]. Operators, expression functions,
//! and transforms all live in a pluggable [`Grammar`] table.
//!
//! ```
//! use jexl::{Context, Jexl, Value};
//!
//! let mut jexl = Jexl::new();
//! jexl.add_transform("upper", |args| {
//!     Ok(Value::from(args[0].to_display_string().to_uppercase()))
//! });
//!
//! let mut context = Context::new();
//! context.insert("name".to_string(), Value::from("world"));
//!
//! let greeting = jexl.evaluate("`hello ${name | upper}`", &mut context).unwrap();
//! assert_eq!(greeting, Value::from("hello WORLD"));
//! ```

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod grammar;
pub mod lexer;
pub mod parser;
pub mod value;

pub use ast::{Expr, Pool, TemplateElement, TemplatePart, Token, TokenKind};
pub use error::Error;
pub use evaluator::Evaluator;
pub use grammar::{
    BinaryEval, ExpressionFn, Grammar, GrammarElement, OperandThunk, Punctuation,
};
pub use lexer::Lexer;
pub use parser::Parser;
pub use value::{Context, Value};

/// The convenience facade: a grammar plus one-call compile and evaluate.
///
/// Compiled [`Expression`]s borrow the grammar, so the borrow checker
/// enforces the registration contract: adding or removing grammar
/// elements requires that no compiled expression is still alive, because
/// a grammar change can alter how source text tokenizes.
#[derive(Default)]
pub struct Jexl {
    grammar: Grammar,
}

impl Jexl {
    /// A facade over the default grammar.
    pub fn new() -> Self {
        Jexl {
            grammar: Grammar::default(),
        }
    }

    /// A facade over a caller-built grammar.
    pub fn with_grammar(grammar: Grammar) -> Self {
        Jexl { grammar }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Compile a source string for repeated evaluation.
    pub fn compile(&self, source: &str) -> Result<Expression<'_>, Error> {
        let ast = parser::parse(&self.grammar, source)?;
        Ok(Expression {
            grammar: &self.grammar,
            source: source.to_string(),
            ast,
        })
    }

    /// Compile and evaluate in one step. Assignments in the expression
    /// mutate `context`.
    pub fn evaluate(&self, source: &str, context: &mut Context) -> Result<Value, Error> {
        let ast = parser::parse(&self.grammar, source)?;
        Evaluator::new(&self.grammar, context).evaluate(&ast)
    }

    pub fn add_function<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.grammar.add_function(name, f);
    }

    pub fn add_functions<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, ExpressionFn)>,
    {
        self.grammar.add_functions(entries);
    }

    pub fn get_function(&self, name: &str) -> Option<&ExpressionFn> {
        self.grammar.get_function(name)
    }

    pub fn add_transform<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.grammar.add_transform(name, f);
    }

    pub fn add_transforms<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, ExpressionFn)>,
    {
        self.grammar.add_transforms(entries);
    }

    pub fn get_transform(&self, name: &str) -> Option<&ExpressionFn> {
        self.grammar.get_transform(name)
    }

    pub fn add_unary_op<F>(&mut self, lexeme: &str, f: F)
    where
        F: Fn(&Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.grammar.add_unary_op(lexeme, f);
    }

    pub fn add_binary_op<F>(&mut self, lexeme: &str, precedence: u8, f: F)
    where
        F: Fn(&Value, &Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.grammar.add_binary_op(lexeme, precedence, f);
    }

    pub fn add_binary_op_on_demand<F>(&mut self, lexeme: &str, precedence: u8, f: F)
    where
        F: Fn(&OperandThunk, &OperandThunk) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.grammar.add_binary_op_on_demand(lexeme, precedence, f);
    }

    pub fn remove_op(&mut self, lexeme: &str) {
        self.grammar.remove_op(lexeme);
    }
}

/// A compiled expression, evaluatable any number of times against
/// distinct contexts.
pub struct Expression<'g> {
    grammar: &'g Grammar,
    source: String,
    ast: Expr,
}

impl Expression<'_> {
    /// Evaluate against a context. Assignments mutate it.
    pub fn evaluate(&self, context: &mut Context) -> Result<Value, Error> {
        Evaluator::new(self.grammar, context).evaluate(&self.ast)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }
}
