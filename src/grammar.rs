//! The grammar is plain data shared by all three pipeline stages: the
//! lexer reads its lexeme table, the parser reads operator precedences,
//! and the evaluator reads the operator/function/transform callables.
//!
//! Registering or removing an element changes how source text tokenizes,
//! so expressions compiled against an earlier grammar must be recompiled.
//! A grammar is not internally synchronized; build it, then share it
//! read-only.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::error::Error;
use crate::value::Value;

/// Strict unary operator implementation.
pub type UnaryFn = Arc<dyn Fn(&Value) -> Result<Value, Error> + Send + Sync>;

/// Strict binary operator implementation: both operands pre-evaluated.
pub type BinaryFn = Arc<dyn Fn(&Value, &Value) -> Result<Value, Error> + Send + Sync>;

/// A deferred operand. Calling it evaluates the operand's subtree against
/// the active context; not calling it skips that subtree entirely.
pub type OperandThunk<'a> = dyn Fn() -> Result<Value, Error> + 'a;

/// On-demand binary operator implementation: receives one thunk per
/// operand and decides itself which to force, enabling short-circuit and
/// lazy semantics (`&&`, `||`, and any user-registered lazy operator).
pub type OnDemandFn =
    Arc<dyn Fn(&OperandThunk, &OperandThunk) -> Result<Value, Error> + Send + Sync>;

/// A registered expression function or transform. Transforms receive the
/// piped subject as their first argument.
pub type ExpressionFn = Arc<dyn Fn(&[Value]) -> Result<Value, Error> + Send + Sync>;

/// Structural tokens with no evaluation behavior of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punctuation {
    Dot,
    OpenBracket,
    CloseBracket,
    Pipe,
    OpenCurl,
    CloseCurl,
    Colon,
    Comma,
    OpenParen,
    CloseParen,
    Question,
    Semicolon,
}

#[derive(Clone)]
pub enum BinaryEval {
    Strict(BinaryFn),
    OnDemand(OnDemandFn),
}

/// One entry in the lexeme table.
#[derive(Clone)]
pub enum GrammarElement {
    Punctuation(Punctuation),
    UnaryOp { eval: UnaryFn },
    BinaryOp { precedence: u8, eval: BinaryEval },
}

/// The complete language definition: lexeme table plus the function and
/// transform registries.
#[derive(Clone)]
pub struct Grammar {
    elements: IndexMap<String, GrammarElement>,
    functions: IndexMap<String, ExpressionFn>,
    transforms: IndexMap<String, ExpressionFn>,
}

impl Default for Grammar {
    fn default() -> Self {
        let mut g = Grammar {
            elements: IndexMap::new(),
            functions: IndexMap::new(),
            transforms: IndexMap::new(),
        };

        g.punct(".", Punctuation::Dot);
        g.punct("[", Punctuation::OpenBracket);
        g.punct("]", Punctuation::CloseBracket);
        g.punct("|", Punctuation::Pipe);
        g.punct("{", Punctuation::OpenCurl);
        g.punct("}", Punctuation::CloseCurl);
        g.punct(":", Punctuation::Colon);
        g.punct(",", Punctuation::Comma);
        g.punct("(", Punctuation::OpenParen);
        g.punct(")", Punctuation::CloseParen);
        g.punct("?", Punctuation::Question);
        g.punct(";", Punctuation::Semicolon);

        g.add_unary_op("!", |v| Ok(Value::Bool(!v.is_truthy())));

        // The parser intercepts `=` before evaluation; the entry exists so
        // the lexer recognizes the lexeme and the parser sees precedence 2.
        g.add_binary_op("=", 2, |_, _| {
            Err(Error::custom("assignment must be handled by the parser"))
        });

        g.add_binary_op_on_demand("||", 10, |left, right| {
            let l = left()?;
            if l.is_truthy() {
                Ok(l)
            } else {
                right()
            }
        });
        g.add_binary_op_on_demand("&&", 10, |left, right| {
            let l = left()?;
            if l.is_truthy() {
                right()
            } else {
                Ok(l)
            }
        });

        g.add_binary_op("==", 20, |l, r| Ok(Value::Bool(l.loose_eq(r))));
        g.add_binary_op("!=", 20, |l, r| Ok(Value::Bool(!l.loose_eq(r))));
        g.add_binary_op("<", 20, |l, r| Ok(Value::Bool(compare(l, r, |o| o == std::cmp::Ordering::Less))));
        g.add_binary_op("<=", 20, |l, r| Ok(Value::Bool(compare(l, r, |o| o != std::cmp::Ordering::Greater))));
        g.add_binary_op(">", 20, |l, r| Ok(Value::Bool(compare(l, r, |o| o == std::cmp::Ordering::Greater))));
        g.add_binary_op(">=", 20, |l, r| Ok(Value::Bool(compare(l, r, |o| o != std::cmp::Ordering::Less))));
        g.add_binary_op("in", 20, |l, r| Ok(Value::Bool(membership(l, r))));

        g.add_binary_op("+", 30, |l, r| Ok(add(l, r)));
        g.add_binary_op("-", 30, |l, r| Ok(Value::Number(l.to_number() - r.to_number())));
        g.add_binary_op("*", 40, |l, r| Ok(Value::Number(l.to_number() * r.to_number())));
        g.add_binary_op("/", 40, |l, r| Ok(Value::Number(l.to_number() / r.to_number())));
        g.add_binary_op("//", 40, |l, r| {
            Ok(Value::Number((l.to_number() / r.to_number()).floor()))
        });
        g.add_binary_op("%", 50, |l, r| Ok(Value::Number(l.to_number() % r.to_number())));
        g.add_binary_op("^", 50, |l, r| {
            Ok(Value::Number(l.to_number().powf(r.to_number())))
        });

        g
    }
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    fn punct(&mut self, lexeme: &str, p: Punctuation) {
        self.elements
            .insert(lexeme.to_string(), GrammarElement::Punctuation(p));
    }

    pub fn element(&self, lexeme: &str) -> Option<&GrammarElement> {
        self.elements.get(lexeme)
    }

    /// Precedence of a registered binary operator, if any.
    pub fn binary_precedence(&self, lexeme: &str) -> Option<u8> {
        match self.elements.get(lexeme) {
            Some(GrammarElement::BinaryOp { precedence, .. }) => Some(*precedence),
            _ => None,
        }
    }

    /// Length in characters of the longest registered lexeme, the bound
    /// for the lexer's longest-match scan.
    pub fn max_lexeme_len(&self) -> usize {
        self.elements
            .keys()
            .map(|k| k.chars().count())
            .max()
            .unwrap_or(0)
    }

    /// Register a unary operator. Unary operators bind tighter than any
    /// binary operator and apply to the operand on their right.
    pub fn add_unary_op<F>(&mut self, lexeme: &str, eval: F)
    where
        F: Fn(&Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.elements.insert(
            lexeme.to_string(),
            GrammarElement::UnaryOp {
                eval: Arc::new(eval),
            },
        );
    }

    /// Register a strict binary operator: both operands are evaluated
    /// left-to-right before `eval` runs.
    pub fn add_binary_op<F>(&mut self, lexeme: &str, precedence: u8, eval: F)
    where
        F: Fn(&Value, &Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.elements.insert(
            lexeme.to_string(),
            GrammarElement::BinaryOp {
                precedence,
                eval: BinaryEval::Strict(Arc::new(eval)),
            },
        );
    }

    /// Register a binary operator that controls its own operand
    /// evaluation through thunks, for short-circuit or lazy semantics.
    pub fn add_binary_op_on_demand<F>(&mut self, lexeme: &str, precedence: u8, eval: F)
    where
        F: Fn(&OperandThunk, &OperandThunk) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.elements.insert(
            lexeme.to_string(),
            GrammarElement::BinaryOp {
                precedence,
                eval: BinaryEval::OnDemand(Arc::new(eval)),
            },
        );
    }

    /// Remove a unary or binary operator. Punctuation is structural and
    /// cannot be removed. Removing `=` disables assignment.
    pub fn remove_op(&mut self, lexeme: &str) {
        if matches!(
            self.elements.get(lexeme),
            Some(GrammarElement::UnaryOp { .. } | GrammarElement::BinaryOp { .. })
        ) {
            self.elements.shift_remove(lexeme);
        }
    }

    pub fn add_function<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(f));
    }

    pub fn add_functions<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, ExpressionFn)>,
    {
        for (name, f) in entries {
            self.functions.insert(name, f);
        }
    }

    pub fn get_function(&self, name: &str) -> Option<&ExpressionFn> {
        self.functions.get(name)
    }

    pub fn add_transform<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.transforms.insert(name.to_string(), Arc::new(f));
    }

    pub fn add_transforms<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, ExpressionFn)>,
    {
        for (name, f) in entries {
            self.transforms.insert(name, f);
        }
    }

    pub fn get_transform(&self, name: &str) -> Option<&ExpressionFn> {
        self.transforms.get(name)
    }
}

/// `+` adds numbers unless either side is a string, in which case both
/// sides concatenate as strings.
fn add(l: &Value, r: &Value) -> Value {
    if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
        Value::String(format!("{}{}", l.to_display_string(), r.to_display_string()))
    } else {
        Value::Number(l.to_number() + r.to_number())
    }
}

/// Ordering comparison: two strings compare lexicographically, anything
/// else compares numerically. NaN operands compare false.
fn compare(l: &Value, r: &Value, accept: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    if let (Value::String(a), Value::String(b)) = (l, r) {
        return accept(a.cmp(b));
    }
    l.to_number()
        .partial_cmp(&r.to_number())
        .is_some_and(accept)
}

/// `in`: substring test against a string, element membership against an
/// array, false against everything else.
fn membership(l: &Value, r: &Value) -> bool {
    match r {
        Value::String(haystack) => match l {
            Value::String(needle) => haystack.contains(needle.as_str()),
            _ => haystack.contains(&l.to_display_string()),
        },
        Value::Array(items) => items.iter().any(|item| item == l),
        _ => false,
    }
}
