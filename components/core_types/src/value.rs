//! Guest-language value representation.
//!
//! [`Value`] is a tagged union over every runtime type of the language.
//! Reference types (tables, functions, userdata, coroutines) are cheap to
//! clone and compare by identity; strings are shared immutable slices.

use std::fmt;
use std::sync::Arc;

use crate::{Callback, Closure, CoroutineRef, TableRef, UserData};

/// Runtime type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// `nil`
    Nil,
    /// `true` / `false`
    Boolean,
    /// Double-precision number
    Number,
    /// Immutable string
    String,
    /// Associative array
    Table,
    /// Compiled script function
    Function,
    /// Host function
    Callback,
    /// Host object
    UserData,
    /// Coroutine
    Thread,
    /// Transient multi-value
    Tuple,
}

impl DataType {
    /// Name reported by `type()`.
    pub fn name(self) -> &'static str {
        match self {
            DataType::Nil => "nil",
            DataType::Boolean => "boolean",
            DataType::Number => "number",
            DataType::String => "string",
            DataType::Table => "table",
            DataType::Function | DataType::Callback => "function",
            DataType::UserData => "userdata",
            DataType::Thread => "thread",
            DataType::Tuple => "tuple",
        }
    }
}

/// A guest-language value.
///
/// `Tuple` only appears transiently on the value stack to carry multiple
/// results; everywhere a single value is expected it collapses to its first
/// element (see [`Value::scalar`]).
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let v = Value::tuple(vec![Value::from(1), Value::from("two")]);
/// assert_eq!(v.scalar().as_number(), Some(1.0));
/// assert_eq!(Value::from(false).type_name(), "boolean");
/// ```
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    Nil,
    /// Boolean
    Boolean(bool),
    /// Number (always a double)
    Number(f64),
    /// String
    String(Arc<str>),
    /// Table
    Table(TableRef),
    /// Script function
    Function(Arc<Closure>),
    /// Host function
    Callback(Callback),
    /// Host object
    UserData(UserData),
    /// Coroutine
    Coroutine(CoroutineRef),
    /// Multiple values
    Tuple(Arc<[Value]>),
}

impl Value {
    /// Build a result from a list of values: a single value stays scalar,
    /// anything else becomes a tuple.
    pub fn tuple(mut values: Vec<Value>) -> Value {
        if values.len() == 1 {
            values.pop().unwrap_or_default()
        } else {
            Value::Tuple(values.into())
        }
    }

    /// The empty result of a function that returned nothing.
    pub fn void() -> Value {
        Value::Tuple(Arc::from(Vec::new()))
    }

    /// Runtime type tag.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Nil => DataType::Nil,
            Value::Boolean(_) => DataType::Boolean,
            Value::Number(_) => DataType::Number,
            Value::String(_) => DataType::String,
            Value::Table(_) => DataType::Table,
            Value::Function(_) => DataType::Function,
            Value::Callback(_) => DataType::Callback,
            Value::UserData(_) => DataType::UserData,
            Value::Coroutine(_) => DataType::Thread,
            Value::Tuple(_) => DataType::Tuple,
        }
    }

    /// Name reported by `type()`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Tuple(values) => values.first().map_or("nil", Value::type_name),
            other => other.data_type().name(),
        }
    }

    /// `nil` and `false` are falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil | Value::Boolean(false) => false,
            Value::Tuple(values) => values.first().is_some_and(Value::is_truthy),
            _ => true,
        }
    }

    /// True for `nil` and for an empty tuple.
    pub fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Tuple(values) => values.first().map_or(true, Value::is_nil),
            _ => false,
        }
    }

    /// True for script functions and host callbacks.
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Callback(_))
    }

    /// Collapse a tuple to its first element.
    pub fn scalar(self) -> Value {
        match self {
            Value::Tuple(values) => values.first().cloned().unwrap_or_default().scalar(),
            other => other,
        }
    }

    /// Expand a tuple into its elements; any other value becomes a single
    /// element list.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Value::Tuple(values) => values.to_vec(),
            other => vec![other],
        }
    }

    /// The `index`-th element of a result, `nil` when out of range.
    pub fn nth(&self, index: usize) -> Value {
        match self {
            Value::Tuple(values) => values.get(index).cloned().unwrap_or_default().scalar(),
            other if index == 0 => other.clone(),
            _ => Value::Nil,
        }
    }

    /// Numeric view with string coercion.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => str_to_number(s),
            Value::Tuple(_) => self.clone().scalar().as_number(),
            _ => None,
        }
    }

    /// Integral numeric view, accepting only numbers with no fraction.
    pub fn as_integer(&self) -> Option<i64> {
        self.as_number()
            .filter(|n| n.fract() == 0.0 && n.is_finite())
            .map(|n| n as i64)
    }

    /// String slice for string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Table handle for table values.
    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// String conversion used by concatenation: strings and numbers only.
    pub fn to_concat_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.to_string()),
            Value::Number(n) => Some(format_number(*n)),
            _ => None,
        }
    }

    /// Primitive equality: by value for primitives, by identity otherwise.
    pub fn raw_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Callback(a), Value::Callback(b)) => a.ptr_eq(b),
            (Value::UserData(a), Value::UserData(b)) => a.ptr_eq(b),
            (Value::Coroutine(a), Value::Coroutine(b)) => a.ptr_eq(b),
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.raw_equals(y))
            }
            (Value::Tuple(_), _) | (_, Value::Tuple(_)) => {
                self.clone().scalar().raw_equals(&other.clone().scalar())
            }
            _ => false,
        }
    }

    /// Identity address for reference types, used in `tostring` output.
    fn address(&self) -> usize {
        match self {
            Value::Table(t) => t.addr(),
            Value::Function(c) => Arc::as_ptr(c) as *const u8 as usize,
            Value::Callback(c) => c.addr(),
            Value::UserData(u) => u.addr(),
            Value::Coroutine(c) => c.addr(),
            _ => 0,
        }
    }
}

/// Format a number the way `tostring` does: integral values without a
/// fraction, everything else as the shortest round-tripping decimal.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let mut buffer = ryu::Buffer::new();
    buffer.format_finite(n).to_string()
}

/// Convert a string to a number using the guest language's lexical rules:
/// optional surrounding whitespace, decimal with optional exponent, or a
/// `0x` hexadecimal integer.
pub fn str_to_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negative, body) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let value = hex
            .bytes()
            .fold(0f64, |acc, b| acc * 16.0 + f64::from((b as char).to_digit(16).unwrap_or(0)));
        return Some(if negative { -value } else { value });
    }

    if !body
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
        || !body.bytes().next().is_some_and(|b| b.is_ascii_digit() || b == b'.')
    {
        return None;
    }

    body.parse::<f64>()
        .ok()
        .map(|v| if negative { -v } else { v })
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Tuple(values) => f.debug_list().entries(values.iter()).finish(),
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Table(_) => write!(f, "table: {:#x}", self.address()),
            Value::Function(_) => write!(f, "function: {:#x}", self.address()),
            Value::Callback(cb) => write!(f, "function: builtin: {}", cb.name()),
            Value::UserData(u) => match u.descriptor().as_string(u) {
                Some(text) => write!(f, "{}", text),
                None => write!(f, "userdata: {:#x}", self.address()),
            },
            Value::Coroutine(_) => write!(f, "thread: {:#x}", self.address()),
            Value::Tuple(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, "\t")?;
                    }
                    write!(f, "{}", v)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<Callback> for Value {
    fn from(cb: Callback) -> Self {
        Value::Callback(cb)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}
