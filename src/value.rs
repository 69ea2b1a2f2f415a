use indexmap::IndexMap;
use std::fmt;

/// The variable environment an expression is evaluated against.
///
/// Supplied mutably by the host: assignment expressions (`x = 5`) rebind
/// names in it, and the bindings survive the evaluation call.
pub type Context = IndexMap<String, Value>;

/// A dynamically typed expression value.
///
/// The language distinguishes `null` (a value the host put there) from
/// `undefined` (the result of looking up something that does not exist).
/// Both are falsy and compare loosely equal to each other, but they
/// serialize and display differently.
///
/// Objects preserve insertion order; lookup is still by key. Numbers are
/// IEEE-754 doubles throughout — there is no separate integer type.
///
/// # Examples
///
/// ```
/// use jexl::Value;
///
/// let n = Value::Number(3.0);
/// assert!(n.is_truthy());
/// assert!(!Value::Null.is_truthy());
/// assert!(Value::Null.loose_eq(&Value::Undefined));
/// assert!(Value::Number(5.0).loose_eq(&Value::String("5".into())));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An explicit null supplied by the host or the `null` literal.
    Null,

    /// The result of a lookup that found nothing.
    Undefined,

    Bool(bool),

    /// IEEE-754 double
    Number(f64),

    String(String),

    Array(Vec<Value>),

    /// String-keyed mapping, insertion order preserved.
    Object(IndexMap<String, Value>),
}

impl Value {
    /// A value is truthy unless it is `false`, `0`, `NaN`, the empty
    /// string, `null`, or `undefined`. Note that empty arrays and objects
    /// are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Undefined => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// Loose equality, the semantics behind `==` and `!=`.
    ///
    /// `null` and `undefined` are equal to each other and nothing else;
    /// numbers and strings compare through numeric parsing; booleans
    /// compare through their numeric value. Same-tag arrays and objects
    /// compare structurally.
    pub fn loose_eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Null | Undefined, Null | Undefined) => true,
            (Null | Undefined, _) | (_, Null | Undefined) => false,
            (Number(a), Number(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Array(a), Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Object(a), Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.loose_eq(w)))
            }
            (Number(a), String(_)) => *a == other.to_number(),
            (String(_), Number(b)) => self.to_number() == *b,
            (Bool(_), Number(_) | String(_)) => self.to_number() == other.to_number(),
            (Number(_) | String(_), Bool(_)) => self.to_number() == other.to_number(),
            _ => false,
        }
    }

    /// Numeric coercion: `null` is 0, `undefined` and non-numeric strings
    /// are NaN, the empty string is 0, booleans are 0/1. Arrays and
    /// objects do not coerce.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Undefined => f64::NAN,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Value::Array(_) | Value::Object(_) => f64::NAN,
        }
    }

    /// String conversion used by concatenation and template interpolation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Undefined => "undefined".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|v| match v {
                        Value::Null | Value::Undefined => String::new(),
                        other => other.to_display_string(),
                    })
                    .collect();
                parts.join(",")
            }
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// Format a double without a trailing `.0` when it holds an integer.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n == n.trunc() && n.abs() <= 9.0e15 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            // undefined has no JSON spelling
            Value::Null | Value::Undefined => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

#[test]
fn test_loose_eq_number_string() {
    assert!(Value::Number(5.0).loose_eq(&Value::String("5".into())));
    assert!(Value::String("  2.5 ".into()).loose_eq(&Value::Number(2.5)));
    assert!(!Value::Number(5.0).loose_eq(&Value::String("five".into())));
}

#[test]
fn test_format_number() {
    assert_eq!(format_number(20.0), "20");
    assert_eq!(format_number(-4.0), "-4");
    assert_eq!(format_number(3.5), "3.5");
    assert_eq!(format_number(f64::NAN), "NaN");
    assert_eq!(format_number(f64::INFINITY), "Infinity");
}
