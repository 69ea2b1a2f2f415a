use std::cell::RefCell;

use indexmap::IndexMap;

use crate::ast::{Expr, Pool, TemplateElement};
use crate::error::Error;
use crate::grammar::{BinaryEval, Grammar, GrammarElement};
use crate::value::{format_number, Context, Value};

/// Walks a parsed tree against a mutable context.
///
/// The evaluator holds two environments: the context proper, and — while
/// inside a relative filter body — the current element of the subject
/// array. Assignments write into the context and persist after the call;
/// nothing else in the evaluator outlives it.
///
/// # Examples
///
/// ```
/// use jexl::{parser, Context, Evaluator, Grammar, Value};
///
/// let grammar = Grammar::default();
/// let ast = parser::parse(&grammar, "n + 1").unwrap();
/// let mut context = Context::new();
/// context.insert("n".to_string(), Value::Number(41.0));
///
/// let mut evaluator = Evaluator::new(&grammar, &mut context);
/// assert_eq!(evaluator.evaluate(&ast).unwrap(), Value::Number(42.0));
/// ```
pub struct Evaluator<'a> {
    grammar: &'a Grammar,
    context: &'a mut Context,
    relative: Option<&'a Value>,
}

impl<'a> Evaluator<'a> {
    pub fn new(grammar: &'a Grammar, context: &'a mut Context) -> Self {
        Evaluator {
            grammar,
            context,
            relative: None,
        }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, Error> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),

            Expr::Identifier {
                name,
                from,
                relative,
            } => self.eval_identifier(name, from.as_deref(), *relative),

            Expr::Unary { op, right } => {
                let grammar = self.grammar;
                let value = self.evaluate(right)?;
                match grammar.element(op) {
                    Some(GrammarElement::UnaryOp { eval }) => (**eval)(&value),
                    _ => Err(Error::custom(format!("unary operator {op} is not defined"))),
                }
            }

            Expr::Binary { op, left, right } => {
                let grammar = self.grammar;
                match grammar.element(op) {
                    Some(GrammarElement::BinaryOp {
                        eval: BinaryEval::Strict(f),
                        ..
                    }) => {
                        let l = self.evaluate(left)?;
                        let r = self.evaluate(right)?;
                        (**f)(&l, &r)
                    }
                    Some(GrammarElement::BinaryOp {
                        eval: BinaryEval::OnDemand(f),
                        ..
                    }) => {
                        // each thunk evaluates its subtree against this
                        // evaluator's context when (and only if) called
                        let cell = RefCell::new(&mut *self);
                        let left_thunk = || cell.borrow_mut().evaluate(left);
                        let right_thunk = || cell.borrow_mut().evaluate(right);
                        (**f)(&left_thunk, &right_thunk)
                    }
                    _ => Err(Error::custom(format!(
                        "binary operator {op} is not defined"
                    ))),
                }
            }

            Expr::Assignment { target, value } => {
                let v = self.evaluate(value)?;
                self.context.insert(target.clone(), v.clone());
                Ok(v)
            }

            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for e in exprs {
                    last = self.evaluate(e)?;
                }
                Ok(last)
            }

            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.evaluate(item)?);
                }
                Ok(Value::Array(out))
            }

            Expr::Object(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value_expr) in entries {
                    let value = self.evaluate(value_expr)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Object(map))
            }

            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplateElement::Text(text) => out.push_str(text),
                        TemplateElement::Expr(e) => match self.evaluate(e)? {
                            // absent values interpolate as nothing
                            Value::Null | Value::Undefined => {}
                            value => out.push_str(&value.to_display_string()),
                        },
                    }
                }
                Ok(Value::String(out))
            }

            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let t = self.evaluate(test)?;
                if t.is_truthy() {
                    match consequent {
                        Some(c) => self.evaluate(c),
                        // elvis form yields the test's own value
                        None => Ok(t),
                    }
                } else {
                    self.evaluate(alternate)
                }
            }

            Expr::Call { pool, name, args } => {
                let f = match pool {
                    Pool::Functions => self
                        .grammar
                        .get_function(name)
                        .cloned()
                        .ok_or_else(|| Error::UnknownFunction(name.clone()))?,
                    Pool::Transforms => self
                        .grammar
                        .get_transform(name)
                        .cloned()
                        .ok_or_else(|| Error::UnknownTransform(name.clone()))?,
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg)?);
                }
                (*f)(&values)
            }

            Expr::Filter {
                subject,
                expr,
                relative,
            } => self.eval_filter(subject, expr, *relative),
        }
    }

    fn eval_identifier(
        &mut self,
        name: &str,
        from: Option<&Expr>,
        relative: bool,
    ) -> Result<Value, Error> {
        match from {
            None => {
                if relative {
                    Ok(match self.relative {
                        Some(element) => property_of(element, name),
                        None => Value::Undefined,
                    })
                } else {
                    Ok(self
                        .context
                        .get(name)
                        .cloned()
                        .unwrap_or(Value::Undefined))
                }
            }
            Some(subject) => {
                let mut base = self.evaluate(subject)?;
                // dotted chains project an array onto its first element,
                // one level only
                if let Value::Array(items) = base {
                    base = items.into_iter().next().unwrap_or(Value::Undefined);
                }
                Ok(property_of(&base, name))
            }
        }
    }

    fn eval_filter(&mut self, subject: &Expr, expr: &Expr, relative: bool) -> Result<Value, Error> {
        let subject_value = self.evaluate(subject)?;
        if relative {
            let items = match subject_value {
                Value::Null | Value::Undefined => Vec::new(),
                Value::Array(items) => items,
                other => vec![other],
            };
            let mut kept = Vec::new();
            for item in items {
                let keep = {
                    let mut sub = Evaluator {
                        grammar: self.grammar,
                        context: &mut *self.context,
                        relative: Some(&item),
                    };
                    sub.evaluate(expr)?.is_truthy()
                };
                if keep {
                    kept.push(item);
                }
            }
            Ok(Value::Array(kept))
        } else {
            let key = self.evaluate(expr)?;
            Ok(index_value(&subject_value, &key))
        }
    }
}

/// Property access by name. Missing properties and property reads on
/// null, undefined, numbers, and booleans yield undefined rather than an
/// error; strings and arrays answer `length`.
fn property_of(value: &Value, name: &str) -> Value {
    match value {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Undefined),
        Value::String(s) if name == "length" => Value::Number(s.chars().count() as f64),
        Value::Array(items) if name == "length" => Value::Number(items.len() as f64),
        _ => Value::Undefined,
    }
}

/// Bracket indexing with a computed key.
fn index_value(subject: &Value, key: &Value) -> Value {
    match subject {
        Value::Null | Value::Undefined => Value::Undefined,
        Value::Array(items) => match key {
            Value::Number(n) => array_index(items, *n),
            Value::String(s) => {
                if s == "length" {
                    Value::Number(items.len() as f64)
                } else {
                    match s.parse::<f64>() {
                        Ok(i) => array_index(items, i),
                        Err(_) => Value::Undefined,
                    }
                }
            }
            _ => Value::Undefined,
        },
        Value::String(s) => match key {
            Value::Number(n) => string_index(s, *n),
            Value::String(k) if k == "length" => Value::Number(s.chars().count() as f64),
            Value::String(k) => match k.parse::<f64>() {
                Ok(i) => string_index(s, i),
                Err(_) => Value::Undefined,
            },
            _ => Value::Undefined,
        },
        Value::Object(map) => {
            let k = match key {
                Value::String(s) => s.clone(),
                Value::Number(n) => format_number(*n),
                Value::Bool(b) => b.to_string(),
                _ => return Value::Undefined,
            };
            map.get(&k).cloned().unwrap_or(Value::Undefined)
        }
        _ => Value::Undefined,
    }
}

fn array_index(items: &[Value], index: f64) -> Value {
    if index.fract() != 0.0 || index < 0.0 {
        return Value::Undefined;
    }
    items.get(index as usize).cloned().unwrap_or(Value::Undefined)
}

fn string_index(s: &str, index: f64) -> Value {
    if index.fract() != 0.0 || index < 0.0 {
        return Value::Undefined;
    }
    s.chars()
        .nth(index as usize)
        .map(|c| Value::String(c.to_string()))
        .unwrap_or(Value::Undefined)
}
