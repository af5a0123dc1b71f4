//! Standard primitive library.
//!
//! Every primitive is described once in a registry of [`BuiltinOp`]s (name, arity,
//! implementation) and installed into the global environment by [`install`].
//! Pure primitives are plain typed Rust functions wired through the adapter layer
//! in `evaluator::intooperation`; primitives that need the interpreter (output,
//! `apply`, `eval`, `load`, `call/cc`, symbol conversion) are natives receiving
//! `&mut Interpreter`.
//!
//! ```scheme
//! (+ 1 2.5)              ; => 3.5, integers widen to floats
//! (/ 6 3)                ; => 2.0, division always yields a float
//! (< 1 2 3)              ; => #t, comparisons chain
//! (append '(1) '(2 3))   ; => (1 2 3)
//! (apply max '(3 9 2))   ; => 9
//! ```
//!
//! ## Error handling
//!
//! - **Type checks**: arguments of the wrong type raise `TypeError`
//! - **Overflow detection**: integer arithmetic reports overflow instead of wrapping
//! - **Arity checks**: argument counts are validated against the registered arity
//!
//! ## Adding new operations
//!
//! 1. Implement the function, either typed (`fn(i64, NumIter<'_>) -> Result<Number, Error>`)
//!    or as a native (`fn(&mut Interpreter, Vec<Value>) -> Result<Value, Error>`)
//! 2. Add a [`BuiltinOp`] entry to [`builtin_ops`] with its Scheme name and arity
//! 3. Add test cases covering edge cases and error conditions

use crate::Error;
use crate::ast::{Number, Value};
use crate::evaluator::intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};
use crate::evaluator::{Arity, Interpreter, NumIter, StringIter, ValueIter};
use std::cmp::Ordering;
use std::rc::Rc;

/// Signature of primitives that need the interpreter
pub type NativeOp = fn(&mut Interpreter, Vec<Value>) -> Result<Value, Error>;

/// Implementation of a primitive
pub enum OpKind {
    /// Typed function behind the adapter layer; never sees the interpreter
    Function(Box<OperationFn>),
    /// Receives the interpreter and the evaluated arguments
    Native(NativeOp),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::Native(_) => write!(f, "Native(<fn>)"),
        }
    }
}

/// Definition of a primitive
#[derive(Debug)]
pub struct BuiltinOp {
    /// The Scheme name the primitive is bound to
    pub name: &'static str,
    pub op_kind: OpKind,
    /// Accepted argument count, checked before the implementation runs
    pub arity: Arity,
}

impl BuiltinOp {
    fn call(&self, interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
        self.arity.validate(args.len())?;
        match &self.op_kind {
            OpKind::Function(func) => func(args),
            OpKind::Native(func) => func(interp, args),
        }
    }
}

//
// Arithmetic
//

fn combine(
    a: Number,
    b: Number,
    checked: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
    what: &str,
) -> Result<Number, Error> {
    match (a, b) {
        (Number::Integer(x), Number::Integer(y)) => checked(x, y)
            .map(Number::Integer)
            .ok_or_else(|| Error::EvalError(format!("integer overflow in {what}"))),
        _ => Ok(Number::Float(float(a.as_f64(), b.as_f64()))),
    }
}

fn builtin_add(mut args: NumIter<'_>) -> Result<Number, Error> {
    args.try_fold(Number::Integer(0), |sum, n| {
        combine(sum, n, i64::checked_add, |x, y| x + y, "addition")
    })
}

fn builtin_sub(first: Number, mut rest: NumIter<'_>) -> Result<Number, Error> {
    if rest.len() == 0 {
        return match first {
            Number::Integer(n) => n
                .checked_neg()
                .map(Number::Integer)
                .ok_or_else(|| Error::EvalError("integer overflow in negation".into())),
            Number::Float(x) => Ok(Number::Float(-x)),
        };
    }
    rest.try_fold(first, |acc, n| {
        combine(acc, n, i64::checked_sub, |x, y| x - y, "subtraction")
    })
}

fn builtin_mul(mut args: NumIter<'_>) -> Result<Number, Error> {
    args.try_fold(Number::Integer(1), |product, n| {
        combine(product, n, i64::checked_mul, |x, y| x * y, "multiplication")
    })
}

fn builtin_div(first: Number, mut rest: NumIter<'_>) -> Result<f64, Error> {
    fn divide(dividend: f64, divisor: Number) -> Result<f64, Error> {
        if divisor.as_f64() == 0.0 {
            Err(Error::EvalError("division by zero".into()))
        } else {
            Ok(dividend / divisor.as_f64())
        }
    }

    if rest.len() == 0 {
        return divide(1.0, first);
    }
    rest.try_fold(first.as_f64(), divide)
}

fn builtin_quotient(a: i64, b: i64) -> Result<i64, Error> {
    if b == 0 {
        return Err(Error::EvalError("division by zero".into()));
    }
    a.checked_div(b)
        .ok_or_else(|| Error::EvalError("integer overflow in quotient".into()))
}

fn builtin_remainder(a: i64, b: i64) -> Result<i64, Error> {
    if b == 0 {
        return Err(Error::EvalError("division by zero".into()));
    }
    a.checked_rem(b)
        .ok_or_else(|| Error::EvalError("integer overflow in remainder".into()))
}

fn builtin_abs(n: Number) -> Result<Number, Error> {
    match n {
        Number::Integer(i) => i
            .checked_abs()
            .map(Number::Integer)
            .ok_or_else(|| Error::EvalError("integer overflow in abs".into())),
        Number::Float(x) => Ok(Number::Float(x.abs())),
    }
}

/// Pick the extreme of `first` and `rest`; the result is a float if any argument is
fn extremum(first: Number, rest: NumIter<'_>, replaces: fn(f64, f64) -> bool) -> Number {
    let mut best = first;
    let mut inexact = matches!(first, Number::Float(_));
    for n in rest {
        inexact |= matches!(n, Number::Float(_));
        if replaces(n.as_f64(), best.as_f64()) {
            best = n;
        }
    }
    if inexact {
        Number::Float(best.as_f64())
    } else {
        best
    }
}

fn builtin_max(first: Number, rest: NumIter<'_>) -> Number {
    extremum(first, rest, |candidate, best| candidate > best)
}

fn builtin_min(first: Number, rest: NumIter<'_>) -> Number {
    extremum(first, rest, |candidate, best| candidate < best)
}

fn builtin_expt(base: Number, power: Number) -> Result<Number, Error> {
    match (base, power) {
        (Number::Integer(b), Number::Integer(p)) if p >= 0 => u32::try_from(p)
            .ok()
            .and_then(|p| b.checked_pow(p))
            .map(Number::Integer)
            .ok_or_else(|| Error::EvalError("integer overflow in expt".into())),
        _ => Ok(Number::Float(base.as_f64().powf(power.as_f64()))),
    }
}

fn builtin_atan(y: f64, mut rest: NumIter<'_>) -> Result<f64, Error> {
    match (rest.next(), rest.len()) {
        (None, _) => Ok(y.atan()),
        (Some(x), 0) => Ok(y.atan2(x.as_f64())),
        (Some(_), more) => Err(Error::arity_error(2, more + 2)),
    }
}

//
// Comparison
//

fn compare(a: Number, b: Number) -> Option<Ordering> {
    match (a, b) {
        (Number::Integer(x), Number::Integer(y)) => Some(x.cmp(&y)),
        _ => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

// Chained comparison: every adjacent pair must satisfy the ordering
macro_rules! numeric_comparison {
    ($name:ident, $( $ordering:pat_param )|+) => {
        fn $name(first: Number, rest: NumIter<'_>) -> bool {
            let mut prev = first;
            for current in rest {
                if !matches!(compare(prev, current), Some($( $ordering )|+)) {
                    return false;
                }
                prev = current;
            }
            true
        }
    };
}

numeric_comparison!(builtin_num_eq, Ordering::Equal);
numeric_comparison!(builtin_lt, Ordering::Less);
numeric_comparison!(builtin_gt, Ordering::Greater);
numeric_comparison!(builtin_le, Ordering::Less | Ordering::Equal);
numeric_comparison!(builtin_ge, Ordering::Greater | Ordering::Equal);

//
// Logic and equality
//

fn builtin_not(value: Value) -> bool {
    !value.is_truthy()
}

fn builtin_equal(first: Value, second: Value) -> bool {
    first == second
}

/// Identity for lists and procedures, value equality for atoms
fn builtin_eq(first: Value, second: Value) -> bool {
    match (&first, &second) {
        (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || (a.is_empty() && b.is_empty()),
        _ => first == second,
    }
}

//
// Lists
//

fn builtin_cons(first: Value, rest: Value) -> Result<Value, Error> {
    match &rest {
        Value::List(tail) => {
            let mut new_list = Vec::with_capacity(tail.len() + 1);
            new_list.push(first);
            new_list.extend_from_slice(tail);
            Ok(Value::list(new_list))
        }
        other => Err(Error::TypeError(format!(
            "cons requires a list as second argument, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_car(mut list: ValueIter<'_>) -> Result<Value, Error> {
    match list.next() {
        Some(first) => Ok(first.clone()),
        None => Err(Error::EvalError("car of empty list".into())),
    }
}

fn builtin_cdr(mut list: ValueIter<'_>) -> Result<Value, Error> {
    let Some(_) = list.next() else {
        return Err(Error::EvalError("cdr of empty list".into()));
    };
    Ok(Value::list(list.as_slice().to_vec()))
}

fn builtin_list(args: ValueIter<'_>) -> Value {
    Value::list(args.as_slice().to_vec())
}

fn builtin_append(lists: ValueIter<'_>) -> Result<Value, Error> {
    let mut result = Vec::new();
    for list in lists {
        match list {
            Value::List(items) => result.extend_from_slice(items),
            other => {
                return Err(Error::TypeError(format!(
                    "append expects lists, got {}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::list(result))
}

fn builtin_length(value: Value) -> Result<i64, Error> {
    let len = match &value {
        Value::List(items) => items.len(),
        Value::String(s) => s.chars().count(),
        other => {
            return Err(Error::TypeError(format!(
                "length expects a list or string, got {}",
                other.type_name()
            )));
        }
    };
    i64::try_from(len).map_err(|_| Error::EvalError("length out of range".into()))
}

//
// Type predicates
//

fn builtin_is_list(value: Value) -> bool {
    matches!(value, Value::List(_))
}

fn builtin_is_null(value: Value) -> bool {
    value.is_nil()
}

fn builtin_is_pair(value: Value) -> bool {
    matches!(&value, Value::List(items) if !items.is_empty())
}

fn builtin_is_symbol(value: Value) -> bool {
    matches!(value, Value::Symbol(_))
}

fn builtin_is_boolean(value: Value) -> bool {
    matches!(value, Value::Bool(_))
}

fn builtin_is_number(value: Value) -> bool {
    matches!(value, Value::Integer(_) | Value::Float(_))
}

fn builtin_is_integer(value: Value) -> bool {
    match value {
        Value::Integer(_) => true,
        Value::Float(x) => x.is_finite() && x.fract() == 0.0,
        _ => false,
    }
}

fn builtin_is_string(value: Value) -> bool {
    matches!(value, Value::String(_))
}

fn builtin_is_procedure(value: Value) -> bool {
    value.is_procedure()
}

//
// Strings and symbols
//

fn builtin_string_append(args: StringIter<'_>) -> String {
    args.collect()
}

fn native_symbol_to_string(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    match args.as_slice() {
        [Value::Symbol(s)] => Ok(Value::from(interp.symbols().resolve(*s))),
        [other] => Err(Error::TypeError(format!(
            "expected symbol, got {}",
            other.type_name()
        ))),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn native_string_to_symbol(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    match args.as_slice() {
        [Value::String(s)] => Ok(Value::Symbol(interp.intern(s))),
        [other] => Err(Error::TypeError(format!(
            "expected string, got {}",
            other.type_name()
        ))),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

//
// Control
//

fn fixed_args<const N: usize>(args: Vec<Value>) -> Result<[Value; N], Error> {
    <[Value; N]>::try_from(args).map_err(|args| Error::arity_error(N, args.len()))
}

fn native_apply(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let [procedure, list] = fixed_args(args)?;
    match &list {
        Value::List(items) => interp.apply(&procedure, items.to_vec()),
        other => Err(Error::TypeError(format!(
            "apply expects a list of arguments, got {}",
            other.type_name()
        ))),
    }
}

fn native_eval(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let [x] = fixed_args(args)?;
    let expanded = interp.expand(&x, false)?;
    interp.eval(&expanded)
}

fn native_load(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let [path] = fixed_args(args)?;
    match &path {
        Value::String(path) => {
            interp.load(path)?;
            Ok(Value::Unspecified)
        }
        other => Err(Error::TypeError(format!(
            "load expects a file name, got {}",
            other.type_name()
        ))),
    }
}

fn native_call_cc(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let [procedure] = fixed_args(args)?;
    interp.call_with_current_continuation(&procedure)
}

fn native_error(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let message = if args.is_empty() {
        "Error".to_owned()
    } else {
        args.iter()
            .map(|value| value.display_plain(interp.symbols()).to_string())
            .collect::<Vec<_>>()
            .join(" ")
    };
    Err(Error::EvalError(message))
}

//
// Output
//

fn native_display(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let [value] = fixed_args(args)?;
    let text = value.display_plain(interp.symbols()).to_string();
    interp.write_output(&text)?;
    Ok(Value::Unspecified)
}

fn native_write(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, Error> {
    let [value] = fixed_args(args)?;
    let text = interp.to_string(&value);
    interp.write_output(&text)?;
    Ok(Value::Unspecified)
}

fn native_newline(interp: &mut Interpreter, _args: Vec<Value>) -> Result<Value, Error> {
    interp.write_output("\n")?;
    Ok(Value::Unspecified)
}

/// The registry of all primitives, in installation order
pub fn builtin_ops() -> Vec<BuiltinOp> {
    fn function<Args, F>(name: &'static str, arity: Arity, f: F) -> BuiltinOp
    where
        F: IntoOperation<Args>,
    {
        BuiltinOp {
            name,
            op_kind: OpKind::Function(f.into_operation()),
            arity,
        }
    }

    fn variadic<Args, F>(name: &'static str, arity: Arity, f: F) -> BuiltinOp
    where
        F: IntoVariadicOperation<Args>,
    {
        BuiltinOp {
            name,
            op_kind: OpKind::Function(f.into_variadic_operation()),
            arity,
        }
    }

    fn native(name: &'static str, arity: Arity, f: NativeOp) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::Native(f),
            arity,
        }
    }

    use Arity::{Any, AtLeast, Exact};

    vec![
        // Arithmetic
        variadic::<(NumIter<'static>,), _>("+", Any, builtin_add),
        variadic::<(Number, NumIter<'static>), _>("-", AtLeast(1), builtin_sub),
        variadic::<(NumIter<'static>,), _>("*", Any, builtin_mul),
        variadic::<(Number, NumIter<'static>), _>("/", AtLeast(1), builtin_div),
        function::<(i64, i64), _>("quotient", Exact(2), builtin_quotient),
        function::<(i64, i64), _>("remainder", Exact(2), builtin_remainder),
        function::<(Number,), _>("abs", Exact(1), builtin_abs),
        variadic::<(Number, NumIter<'static>), _>("max", AtLeast(1), builtin_max),
        variadic::<(Number, NumIter<'static>), _>("min", AtLeast(1), builtin_min),
        function::<(Number, Number), _>("expt", Exact(2), builtin_expt),
        // Comparison
        variadic::<(Number, NumIter<'static>), _>("=", AtLeast(2), builtin_num_eq),
        variadic::<(Number, NumIter<'static>), _>("<", AtLeast(2), builtin_lt),
        variadic::<(Number, NumIter<'static>), _>(">", AtLeast(2), builtin_gt),
        variadic::<(Number, NumIter<'static>), _>("<=", AtLeast(2), builtin_le),
        variadic::<(Number, NumIter<'static>), _>(">=", AtLeast(2), builtin_ge),
        // Math
        function::<(f64,), _>("sqrt", Exact(1), f64::sqrt),
        function::<(f64,), _>("exp", Exact(1), f64::exp),
        function::<(f64,), _>("log", Exact(1), f64::ln),
        function::<(f64,), _>("sin", Exact(1), f64::sin),
        function::<(f64,), _>("cos", Exact(1), f64::cos),
        function::<(f64,), _>("tan", Exact(1), f64::tan),
        variadic::<(f64, NumIter<'static>), _>("atan", AtLeast(1), builtin_atan),
        function::<(f64,), _>("floor", Exact(1), f64::floor),
        function::<(f64,), _>("ceiling", Exact(1), f64::ceil),
        function::<(f64,), _>("round", Exact(1), f64::round_ties_even),
        // Logic and equality
        function::<(Value,), _>("not", Exact(1), builtin_not),
        function::<(Value, Value), _>("equal?", Exact(2), builtin_equal),
        function::<(Value, Value), _>("eq?", Exact(2), builtin_eq),
        // Lists
        function::<(Value, Value), _>("cons", Exact(2), builtin_cons),
        function::<(ValueIter<'static>,), _>("car", Exact(1), builtin_car),
        function::<(ValueIter<'static>,), _>("cdr", Exact(1), builtin_cdr),
        variadic::<(ValueIter<'static>,), _>("list", Any, builtin_list),
        variadic::<(ValueIter<'static>,), _>("append", Any, builtin_append),
        function::<(Value,), _>("length", Exact(1), builtin_length),
        // Predicates
        function::<(Value,), _>("list?", Exact(1), builtin_is_list),
        function::<(Value,), _>("null?", Exact(1), builtin_is_null),
        function::<(Value,), _>("pair?", Exact(1), builtin_is_pair),
        function::<(Value,), _>("symbol?", Exact(1), builtin_is_symbol),
        function::<(Value,), _>("boolean?", Exact(1), builtin_is_boolean),
        function::<(Value,), _>("number?", Exact(1), builtin_is_number),
        function::<(Value,), _>("integer?", Exact(1), builtin_is_integer),
        function::<(Value,), _>("string?", Exact(1), builtin_is_string),
        function::<(Value,), _>("procedure?", Exact(1), builtin_is_procedure),
        // Strings and symbols
        variadic::<(StringIter<'static>,), _>("string-append", Any, builtin_string_append),
        native("symbol->string", Exact(1), native_symbol_to_string),
        native("string->symbol", Exact(1), native_string_to_symbol),
        // Control
        native("apply", Exact(2), native_apply),
        native("eval", Exact(1), native_eval),
        native("load", Exact(1), native_load),
        native("call/cc", Exact(1), native_call_cc),
        native("call-with-current-continuation", Exact(1), native_call_cc),
        native("error", Any, native_error),
        // Output
        native("display", Exact(1), native_display),
        native("write", Exact(1), native_write),
        native("newline", Exact(0), native_newline),
    ]
}

/// Bind every primitive and the numeric constants in the global environment
pub(crate) fn install(interp: &mut Interpreter) {
    for op in builtin_ops() {
        let name = op.name;
        interp.register_native(name, move |interp, args| op.call(interp, args));
    }
    interp.define_global("pi", Value::Float(std::f64::consts::PI));
    interp.define_global("e", Value::Float(std::f64::consts::E));
}
