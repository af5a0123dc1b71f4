//! This module defines the value type shared by code and data. Expression trees
//! produced by the reader, core forms produced by the expander and runtime values
//! produced by the evaluator are all [`Value`]s: atoms (booleans, numbers, strings,
//! symbols), immutable lists, closures and native procedures. It also implements the
//! printer contract through [`Printer`], which needs the [`SymbolTable`] to render
//! symbol names.

use crate::Error;
use crate::evaluator::{Environment, Interpreter};
use crate::symbol::{Symbol, SymbolTable};
use std::fmt;
use std::rc::Rc;

/// Canonical erased native procedure signature.
///
/// Natives receive the interpreter so that they can call back into the evaluator
/// (`apply`, `eval`, `call/cc`) or write to its output sink.
pub type NativeFn = dyn Fn(&mut Interpreter, Vec<Value>) -> Result<Value, Error>;

/// Core value type of the interpreter
#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Symbol(Symbol),
    /// Immutable list; the empty list represents nil
    List(Rc<[Value]>),
    /// User-defined closure
    Procedure(Rc<Closure>),
    /// Host-provided procedure
    Native(Rc<NativeProcedure>),
    /// Result of forms evaluated for effect (`define`, `set!`, one-armed `if`...)
    Unspecified,
}

/// Parameter list of a closure
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// `(lambda (a b) ...)` - exact arity
    Fixed(Rc<[Symbol]>),
    /// `(lambda args ...)` - binds the whole argument list
    Variadic(Symbol),
}

impl Params {
    /// Interpret the parameter position of a `lambda` form
    pub(crate) fn from_value(value: &Value) -> Option<Params> {
        match value {
            Value::Symbol(s) => Some(Params::Variadic(*s)),
            Value::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::Symbol(s) => Some(*s),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(|syms| Params::Fixed(syms.into())),
            _ => None,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            Params::Fixed(syms) => Value::list(syms.iter().map(|s| Value::Symbol(*s)).collect()),
            Params::Variadic(s) => Value::Symbol(*s),
        }
    }
}

/// A procedure created by evaluating `lambda`. Never mutated after creation.
pub struct Closure {
    pub params: Params,
    pub body: Value,
    pub env: Rc<Environment>,
}

/// A procedure implemented by the host
pub struct NativeProcedure {
    pub name: String,
    pub func: Box<NativeFn>,
}

/// Numeric view of a value, used by the arithmetic builtins
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Float(x) => x,
        }
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(items.into())
    }

    pub fn nil() -> Value {
        Value::list(Vec::new())
    }

    pub fn native<F>(name: impl Into<String>, func: F) -> Value
    where
        F: Fn(&mut Interpreter, Vec<Value>) -> Result<Value, Error> + 'static,
    {
        Value::Native(Rc::new(NativeProcedure {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    /// Only `#f` is false
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::List(items) if items.is_empty())
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self, Value::Procedure(_) | Value::Native(_))
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(&items[..]),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<Symbol> {
        match self {
            Value::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Procedure(_) | Value::Native(_) => "procedure",
            Value::Unspecified => "unspecified",
        }
    }

    /// Render this value with the printer contract
    pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> Printer<'a> {
        Printer {
            value: self,
            symbols,
            style: PrintStyle::Written,
        }
    }

    /// Render this value the way `display` shows it: strings without quotes
    pub fn display_plain<'a>(&'a self, symbols: &'a SymbolTable) -> Printer<'a> {
        Printer {
            value: self,
            symbols,
            style: PrintStyle::Plain,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Float(x) => write!(f, "Float({x:?})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s:?})"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Procedure(closure) => {
                write!(f, "Procedure(params={:?}, body={:?})", closure.params, closure.body)
            }
            Value::Native(native) => write!(f, "Native({})", native.name),
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality; nested lists are compared with an explicit worklist so
    /// arbitrarily deep values compare in constant stack space
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some(pair) = pending.pop() {
            let same = match pair {
                (Value::Bool(a), Value::Bool(b)) => a == b,
                (Value::Integer(a), Value::Integer(b)) => a == b,
                (Value::Float(a), Value::Float(b)) => a == b,
                (Value::String(a), Value::String(b)) => a == b,
                (Value::Symbol(a), Value::Symbol(b)) => a == b,
                (Value::List(a), Value::List(b)) => {
                    if a.len() != b.len() {
                        return false;
                    }
                    pending.extend(a.iter().zip(b.iter()).rev());
                    true
                }
                // Procedures compare by identity
                (Value::Procedure(a), Value::Procedure(b)) => Rc::ptr_eq(a, b),
                (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
                (Value::Unspecified, Value::Unspecified) => true,
                _ => false,
            };
            if !same {
                return false;
            }
        }
        true
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        // Detach uniquely owned sublists onto a worklist so that freeing a deeply
        // nested list does not recurse once per level
        let Value::List(items) = self else {
            return;
        };
        let Some(children) = Rc::get_mut(items) else {
            return;
        };
        let mut pending = Vec::new();
        detach_sublists(children, &mut pending);
        while let Some(mut list) = pending.pop() {
            if let Some(children) = Rc::get_mut(&mut list) {
                detach_sublists(children, &mut pending);
            }
        }
    }
}

fn detach_sublists(children: &mut [Value], pending: &mut Vec<Rc<[Value]>>) {
    for child in children {
        if let Value::List(list) = child
            && !list.is_empty()
            && Rc::strong_count(list) == 1
        {
            pending.push(std::mem::take(list));
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(n as i64)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Integer(i) => Value::Integer(i),
            Number::Float(x) => Value::Float(x),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into).collect())
    }
}

// Fallible conversions from `Value` back into primitive Rust types, used by the
// typed builtin adapters.

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<i64, Error> {
        match value {
            Value::Integer(n) => Ok(n),
            other => Err(Error::TypeError(format!(
                "expected integer, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<f64, Error> {
        Number::try_from(value).map(Number::as_f64)
    }
}

impl TryFrom<Value> for Number {
    type Error = Error;

    fn try_from(value: Value) -> Result<Number, Error> {
        match value {
            Value::Integer(n) => Ok(Number::Integer(n)),
            Value::Float(x) => Ok(Number::Float(x)),
            other => Err(Error::TypeError(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<bool, Error> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(Error::TypeError(format!(
                "expected boolean, got {}",
                other.type_name()
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PrintStyle {
    /// Re-readable text (`write`, REPL output)
    Written,
    /// Strings emitted raw (`display`)
    Plain,
}

/// Display adapter pairing a value with the symbol table it was read with.
pub struct Printer<'a> {
    value: &'a Value,
    symbols: &'a SymbolTable,
    style: PrintStyle,
}

/// Text still to be written by the printer
enum Pending<'a> {
    Value(&'a Value),
    Text(&'static str),
}

impl Printer<'_> {
    fn write_atom(&self, value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match value {
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Integer(n) => write!(f, "{n}"),
            // Debug formatting keeps the decimal point so floats re-read as floats
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) if self.style == PrintStyle::Plain => write!(f, "{s}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Symbol(s) => write!(f, "{}", self.symbols.resolve(*s)),
            Value::List(_) => Ok(()),
            Value::Procedure(_) => write!(f, "#<procedure>"),
            Value::Native(native) => write!(f, "#<native:{}>", native.name),
            Value::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

impl fmt::Display for Printer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pending = vec![Pending::Value(self.value)];
        while let Some(next) = pending.pop() {
            match next {
                Pending::Text(text) => f.write_str(text)?,
                Pending::Value(Value::List(items)) => {
                    f.write_str("(")?;
                    pending.push(Pending::Text(")"));
                    for (i, item) in items.iter().enumerate().rev() {
                        pending.push(Pending::Value(item));
                        if i > 0 {
                            pending.push(Pending::Text(" "));
                        }
                    }
                }
                Pending::Value(atom) => self.write_atom(atom, f)?,
            }
        }
        Ok(())
    }
}
