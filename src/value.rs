//! Argument and result values of forwarded operations.

use core::fmt;

use rust_alloc::boxed::Box;
use rust_alloc::string::String;

use crate::Error;

/// An immutable name, written `:name` when displayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Box<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
    Symbol(Symbol),
}

impl Value {
    pub fn symbol(name: &str) -> Self {
        Self::Symbol(Symbol::new(name))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Symbol(_) => "symbol",
        }
    }

    fn mismatch(&self, expected: &'static str) -> Error {
        Error::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => fmt::Display::fmt(b, f),
            Self::Integer(i) => fmt::Display::fmt(i, f),
            Self::Float(x) => fmt::Display::fmt(x, f),
            Self::Str(s) => f.write_str(s),
            Self::Symbol(s) => fmt::Display::fmt(s, f),
        }
    }
}

/// Conversion of an operation's result into a [`Value`].
pub trait IntoValue {
    fn into_value(self) -> Value;
}

/// Conversion of an operation's argument out of a [`Value`].
pub trait FromValue<'a>: Sized {
    fn from_value(value: &'a Value) -> Result<Self, Error>;
}

/// Fails with [`Error::ArgumentCount`] unless exactly `expected` arguments were given.
#[doc(hidden)]
pub fn check_arity(args: &[Value], expected: usize) -> Result<(), Error> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Error::ArgumentCount {
            given: args.len(),
            expected,
        })
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Nil
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Integer(self)
    }
}

impl IntoValue for i32 {
    fn into_value(self) -> Value {
        Value::Integer(self.into())
    }
}

impl IntoValue for u32 {
    fn into_value(self) -> Value {
        Value::Integer(self.into())
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Str(self.into())
    }
}

impl IntoValue for Symbol {
    fn into_value(self) -> Value {
        Value::Symbol(self)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        self.map_or(Value::Nil, IntoValue::into_value)
    }
}

impl<'a> FromValue<'a> for &'a Value {
    fn from_value(value: &'a Value) -> Result<Self, Error> {
        Ok(value)
    }
}

impl<'a> FromValue<'a> for Value {
    fn from_value(value: &'a Value) -> Result<Self, Error> {
        Ok(value.clone())
    }
}

impl<'a> FromValue<'a> for bool {
    fn from_value(value: &'a Value) -> Result<Self, Error> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(other.mismatch("bool")),
        }
    }
}

impl<'a> FromValue<'a> for i64 {
    fn from_value(value: &'a Value) -> Result<Self, Error> {
        match value {
            Value::Integer(i) => Ok(*i),
            other => Err(other.mismatch("integer")),
        }
    }
}

impl<'a> FromValue<'a> for f64 {
    fn from_value(value: &'a Value) -> Result<Self, Error> {
        match value {
            Value::Float(x) => Ok(*x),
            // integers widen, as arithmetic on the target would
            Value::Integer(i) => Ok(*i as f64),
            other => Err(other.mismatch("float")),
        }
    }
}

impl<'a> FromValue<'a> for &'a str {
    fn from_value(value: &'a Value) -> Result<Self, Error> {
        match value {
            Value::Str(s) => Ok(s.as_str()),
            other => Err(other.mismatch("string")),
        }
    }
}

impl<'a> FromValue<'a> for String {
    fn from_value(value: &'a Value) -> Result<Self, Error> {
        <&str>::from_value(value).map(String::from)
    }
}

impl<'a> FromValue<'a> for &'a Symbol {
    fn from_value(value: &'a Value) -> Result<Self, Error> {
        match value {
            Value::Symbol(s) => Ok(s),
            other => Err(other.mismatch("symbol")),
        }
    }
}

impl<'a> FromValue<'a> for Symbol {
    fn from_value(value: &'a Value) -> Result<Self, Error> {
        <&Symbol>::from_value(value).cloned()
    }
}
