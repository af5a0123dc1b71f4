//! The evaluator and the interpreter context.
//!
//! [`Interpreter`] owns every piece of process-wide state: the symbol table, the
//! macro table, the global environment, the configuration and the output sink.
//!
//! Evaluation runs on an explicit stack of `Frame`s kept on the heap. A step either
//! produces a value, which is handed to the frame on top of the stack, or continues
//! with another form. Forms in tail position (an `if` branch, the last form of a
//! `begin` or matching `cond` clause, a closure body) continue without pushing a
//! frame, so tail calls run in constant space. Non-tail positions (tests, arguments,
//! definitions) push a frame; the number of pending frames is bounded by
//! `Config::max_eval_depth`. Natives that call back into the evaluator start a nested
//! run, bounded by `Config::max_reentry_depth`.
//!
//! ```text
//! (+ 1 (f x))    Arguments{+, [+, 1]} | Eval (f x)
//! (f x)          Arguments{+, [+, 1]} Arguments{f, []} | Eval f
//! ```

use crate::ast::{Closure, Params, Printer, Value};
use crate::builtinops;
use crate::expander;
use crate::reader::{InputPort, Reader};
use crate::symbol::{SpecialForm, Symbol, SymbolTable};
use crate::{Config, Error, SyntaxErrorKind};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

mod continuation;
mod environment;
pub mod intooperation;

pub use continuation::{ContinuationId, Escape};
pub use environment::Environment;
pub use intooperation::{NumIter, StringIter, ValueIter};

use intooperation::{IntoOperation, IntoVariadicOperation};

/// Scheme source of the derived forms installed at start-up
const PRELUDE: &str = include_str!("prelude.scm");

/// Number of arguments a builtin accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn validate(self, count: usize) -> Result<(), Error> {
        match self {
            Arity::Exact(n) if count != n => Err(Error::arity_error(n, count)),
            Arity::AtLeast(n) if count < n => Err(Error::arity_error(n, count)),
            _ => Ok(()),
        }
    }
}

/// Result of one evaluation step
enum Trampoline {
    /// A value to hand to the pending frame
    Value(Value),
    /// Continue with this form in this environment
    Eval(Value, Rc<Environment>),
}

/// Work waiting for the value of a non-tail sub-expression
enum Frame {
    /// Pick a branch once the test is known
    IfBranch {
        consequent: Value,
        alternative: Option<Value>,
        env: Rc<Environment>,
    },
    /// Test of clause `index` of a `cond` form is being evaluated
    CondTest {
        form: Rc<[Value]>,
        index: usize,
        env: Rc<Environment>,
    },
    /// Remaining expressions of a body; `next` is the one to run after this value
    Sequence {
        exprs: Rc<[Value]>,
        next: usize,
        env: Rc<Environment>,
    },
    Define {
        name: Symbol,
        env: Rc<Environment>,
    },
    Assign {
        name: Symbol,
        env: Rc<Environment>,
    },
    /// Operator and operands of an application evaluated so far, left to right
    Arguments {
        form: Rc<[Value]>,
        evaluated: Vec<Value>,
        env: Rc<Environment>,
    },
}

/// A Scheme interpreter instance.
pub struct Interpreter {
    pub(crate) symbols: SymbolTable,
    pub(crate) macros: HashMap<Symbol, Value>,
    global: Rc<Environment>,
    pub(crate) config: Config,
    output: Box<dyn Write>,
    pub(crate) next_continuation: u64,
    /// Nested runs of the evaluation loop
    reentry_depth: usize,
    pub(crate) expand_depth: usize,
}

impl Interpreter {
    /// Interpreter with the default configuration, standard library and prelude
    pub fn new() -> Result<Self, Error> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self, Error> {
        let load_prelude = config.load_prelude;
        let mut interp = Interpreter {
            symbols: SymbolTable::new(),
            macros: HashMap::new(),
            global: Environment::new(),
            config,
            output: Box::new(io::stdout()),
            next_continuation: 0,
            reentry_depth: 0,
            expand_depth: 0,
        };

        builtinops::install(&mut interp);
        expander::install_native_macros(&mut interp);
        if load_prelude {
            interp.eval_str(PRELUDE)?;
        }
        Ok(interp)
    }

    /// Redirect `display`, `write` and `newline`
    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.output = output;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn global_env(&self) -> &Rc<Environment> {
        &self.global
    }

    /// Bind `value` to `name` in the global environment
    pub fn define_global(&mut self, name: &str, value: Value) {
        let name = self.intern(name);
        self.global.define(name, value);
    }

    /// Register a native procedure that receives the interpreter and its evaluated
    /// arguments.
    ///
    /// ```
    /// use lispy::{Error, Interpreter, Value};
    ///
    /// let mut interp = Interpreter::new().unwrap();
    /// interp.register_native("arg-count", |_, args: Vec<Value>| {
    ///     Ok(Value::from(args.len() as i64))
    /// });
    /// assert_eq!(interp.eval_str("(arg-count 1 2 3)").unwrap(), Value::from(3));
    /// ```
    pub fn register_native<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut Interpreter, Vec<Value>) -> Result<Value, Error> + 'static,
    {
        self.define_global(name, Value::native(name, func));
    }

    /// Register a strongly-typed Rust function as a builtin.
    ///
    /// Arguments are extracted and type-checked by the adapter layer; arity is
    /// checked against the Rust signature. Supported parameter types:
    /// - `i64`, `f64`, [`Number`](crate::Number), `bool`
    /// - `&str` (borrowed from a string argument)
    /// - `Value` (the raw argument)
    /// - [`ValueIter`], [`NumIter`], [`StringIter`] (elements of a list argument)
    ///
    /// The function may return any `T: Into<Value>` or `Result<T, Error>`.
    pub fn register_builtin_operation<F, Args>(&mut self, name: &str, func: F)
    where
        F: IntoOperation<Args> + 'static,
    {
        let op = func.into_operation();
        self.register_native(name, move |_, args| op(args));
    }

    /// Register a Rust function whose last parameter collects the remaining
    /// arguments, e.g. `fn(NumIter<'_>)` or `fn(&str, StringIter<'_>)`.
    ///
    /// The total argument count is validated against `arity` before the adapter
    /// runs.
    pub fn register_variadic_builtin_operation<F, Args>(
        &mut self,
        name: &str,
        arity: Arity,
        func: F,
    ) where
        F: IntoVariadicOperation<Args> + 'static,
    {
        let op = func.into_variadic_operation();
        self.register_native(name, move |_, args| {
            arity.validate(args.len())?;
            op(args)
        });
    }

    /// Register a macro transformer under `name`
    pub(crate) fn define_macro(&mut self, name: Symbol, transformer: Value) {
        debug!(name = self.symbols.resolve(name), "registering macro");
        self.macros.insert(name, transformer);
    }

    pub fn is_macro(&self, name: &str) -> bool {
        self.symbols
            .get(name)
            .is_some_and(|sym| self.macros.contains_key(&sym))
    }

    /// Global bindings sorted by name
    pub fn global_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings: Vec<_> = self
            .global
            .local_bindings()
            .into_iter()
            .map(|(name, value)| (self.symbols.resolve(name).to_owned(), value))
            .collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        bindings
    }

    /// Read and expand the next top-level form. `None` at end of input.
    pub fn parse(&mut self, port: &mut InputPort) -> Result<Option<Value>, Error> {
        let max_depth = self.config.max_parse_depth;
        let datum = Reader::new(port, &mut self.symbols, max_depth).read()?;
        match datum {
            Some(x) => self.expand(&x, true).map(Some),
            None => Ok(None),
        }
    }

    /// Evaluate a core form in the global environment
    pub fn eval(&mut self, x: &Value) -> Result<Value, Error> {
        let global = Rc::clone(&self.global);
        self.eval_in(x, &global)
    }

    /// Evaluate a core form in `env`
    pub fn eval_in(&mut self, x: &Value, env: &Rc<Environment>) -> Result<Value, Error> {
        if self.reentry_depth >= self.config.max_reentry_depth {
            return Err(Error::EvalError(format!(
                "nested evaluation limit exceeded (max: {})",
                self.config.max_reentry_depth
            )));
        }
        self.reentry_depth += 1;
        let result = self.run(x.clone(), Rc::clone(env));
        self.reentry_depth -= 1;
        result
    }

    fn run(&mut self, x: Value, env: Rc<Environment>) -> Result<Value, Error> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut next = Trampoline::Eval(x, env);
        loop {
            next = match next {
                Trampoline::Eval(x, env) => self.step(&x, &env, &mut stack)?,
                Trampoline::Value(value) => match stack.pop() {
                    Some(frame) => self.resume(frame, value, &mut stack)?,
                    None => return Ok(value),
                },
            };
            if stack.len() > self.config.max_eval_depth {
                return Err(Error::EvalError(format!(
                    "evaluation depth limit exceeded (max: {})",
                    self.config.max_eval_depth
                )));
            }
        }
    }

    fn step(
        &mut self,
        x: &Value,
        env: &Rc<Environment>,
        stack: &mut Vec<Frame>,
    ) -> Result<Trampoline, Error> {
        let items = match x {
            Value::Symbol(name) => {
                return env
                    .lookup(*name)
                    .map(Trampoline::Value)
                    .ok_or_else(|| Error::UnboundVariable(self.symbols.resolve(*name).to_owned()));
            }
            Value::List(items) => items,
            _ => return Ok(Trampoline::Value(x.clone())),
        };

        let Some(head) = items.first() else {
            return Err(Error::EvalError("cannot evaluate empty list".to_owned()));
        };

        if let Value::Symbol(sym) = head
            && let Some(form) = self.symbols.keywords().special_form(*sym)
        {
            return self.step_special(form, items, env, stack);
        }

        // Procedure application: evaluate the operator first
        stack.push(Frame::Arguments {
            form: Rc::clone(items),
            evaluated: Vec::with_capacity(items.len()),
            env: Rc::clone(env),
        });
        Ok(Trampoline::Eval(head.clone(), Rc::clone(env)))
    }

    fn step_special(
        &mut self,
        form: SpecialForm,
        items: &Rc<[Value]>,
        env: &Rc<Environment>,
        stack: &mut Vec<Frame>,
    ) -> Result<Trampoline, Error> {
        match (form, &items[1..]) {
            (SpecialForm::Quote, [datum]) => Ok(Trampoline::Value(datum.clone())),

            (SpecialForm::If, [test, consequent, rest @ ..]) if rest.len() <= 1 => {
                stack.push(Frame::IfBranch {
                    consequent: consequent.clone(),
                    alternative: rest.first().cloned(),
                    env: Rc::clone(env),
                });
                Ok(Trampoline::Eval(test.clone(), Rc::clone(env)))
            }

            (SpecialForm::Cond, _) => self.cond_clause(Rc::clone(items), 1, env, stack),

            (SpecialForm::Set, [Value::Symbol(name), expr]) => {
                stack.push(Frame::Assign {
                    name: *name,
                    env: Rc::clone(env),
                });
                Ok(Trampoline::Eval(expr.clone(), Rc::clone(env)))
            }

            (SpecialForm::Define, [Value::Symbol(name), expr]) => {
                stack.push(Frame::Define {
                    name: *name,
                    env: Rc::clone(env),
                });
                Ok(Trampoline::Eval(expr.clone(), Rc::clone(env)))
            }

            (SpecialForm::Lambda, [params, body]) => {
                let params = Params::from_value(params)
                    .ok_or_else(|| self.malformed(&Value::List(Rc::clone(items))))?;
                Ok(Trampoline::Value(Value::Procedure(Rc::new(Closure {
                    params,
                    body: body.clone(),
                    env: Rc::clone(env),
                }))))
            }

            (SpecialForm::Begin, []) => Ok(Trampoline::Value(Value::Unspecified)),
            (SpecialForm::Begin, _) => Ok(sequence(Rc::clone(items), 1, env, stack)),

            (SpecialForm::DefineMacro | SpecialForm::Quasiquote, _) => Err(Error::Syntax(
                crate::SyntaxError::new(
                    SyntaxErrorKind::IllegalForm,
                    "form must be expanded before evaluation",
                    Some(self.to_string(&Value::List(Rc::clone(items)))),
                ),
            )),

            _ => Err(self.malformed(&Value::List(Rc::clone(items)))),
        }
    }

    /// Start testing clause `index` of the `cond` form `form`
    fn cond_clause(
        &self,
        form: Rc<[Value]>,
        index: usize,
        env: &Rc<Environment>,
        stack: &mut Vec<Frame>,
    ) -> Result<Trampoline, Error> {
        let test = match form.get(index).map(Value::as_list) {
            // No clause matched
            None => return Ok(Trampoline::Value(Value::Unspecified)),
            Some(Some([test, _, ..])) => Some(test.clone()),
            Some(_) => None,
        };
        let Some(test) = test else {
            return Err(self.malformed(&Value::List(form)));
        };
        stack.push(Frame::CondTest {
            form,
            index,
            env: Rc::clone(env),
        });
        Ok(Trampoline::Eval(test, Rc::clone(env)))
    }

    /// Hand `value` to the frame that was waiting for it
    fn resume(
        &mut self,
        frame: Frame,
        value: Value,
        stack: &mut Vec<Frame>,
    ) -> Result<Trampoline, Error> {
        match frame {
            Frame::IfBranch {
                consequent,
                alternative,
                env,
            } => Ok(if value.is_truthy() {
                Trampoline::Eval(consequent, env)
            } else {
                match alternative {
                    Some(alternative) => Trampoline::Eval(alternative, env),
                    None => Trampoline::Value(Value::Unspecified),
                }
            }),

            Frame::CondTest { form, index, env } => {
                if !value.is_truthy() {
                    return self.cond_clause(form, index + 1, &env, stack);
                }
                match &form[index] {
                    Value::List(clause) => Ok(sequence(Rc::clone(clause), 1, &env, stack)),
                    _ => Err(self.malformed(&Value::List(Rc::clone(&form)))),
                }
            }

            Frame::Sequence { exprs, next, env } => Ok(sequence(exprs, next, &env, stack)),

            Frame::Define { name, env } => {
                env.define(name, value);
                Ok(Trampoline::Value(Value::Unspecified))
            }

            Frame::Assign { name, env } => {
                if env.assign(name, value) {
                    Ok(Trampoline::Value(Value::Unspecified))
                } else {
                    Err(Error::AssignmentError(self.symbols.resolve(name).to_owned()))
                }
            }

            Frame::Arguments {
                form,
                mut evaluated,
                env,
            } => {
                evaluated.push(value);
                if let Some(operand) = form.get(evaluated.len()) {
                    let operand = operand.clone();
                    stack.push(Frame::Arguments {
                        form,
                        evaluated,
                        env: Rc::clone(&env),
                    });
                    return Ok(Trampoline::Eval(operand, env));
                }

                let args = evaluated.split_off(1);
                let Some(procedure) = evaluated.pop() else {
                    return Err(Error::EvalError("cannot evaluate empty list".to_owned()));
                };
                match &procedure {
                    Value::Procedure(closure) => {
                        let frame = self.enter_closure(closure, args)?;
                        Ok(Trampoline::Eval(closure.body.clone(), frame))
                    }
                    Value::Native(native) => (native.func)(self, args).map(Trampoline::Value),
                    other => Err(self.not_a_procedure(other)),
                }
            }
        }
    }

    /// Apply any procedure value to already-evaluated arguments
    pub fn apply(&mut self, procedure: &Value, args: Vec<Value>) -> Result<Value, Error> {
        match procedure {
            Value::Procedure(closure) => {
                let frame = self.enter_closure(closure, args)?;
                self.eval_in(&closure.body, &frame)
            }
            Value::Native(native) => (native.func)(self, args),
            other => Err(self.not_a_procedure(other)),
        }
    }

    /// Bind a closure's parameters, reporting arity errors with the parameter list
    /// and the arguments given
    fn enter_closure(&self, closure: &Closure, args: Vec<Value>) -> Result<Rc<Environment>, Error> {
        if let Params::Fixed(names) = &closure.params
            && names.len() != args.len()
        {
            let got = args.len();
            let given = Value::list(args);
            return Err(Error::arity_error_with_expr(
                names.len(),
                got,
                format!(
                    "(lambda {} ...) applied to {}",
                    self.printer(&closure.params.to_value()),
                    self.printer(&given)
                ),
            ));
        }
        Environment::bind(&closure.params, args, Rc::clone(&closure.env))
    }

    fn not_a_procedure(&self, value: &Value) -> Error {
        Error::TypeError(format!("not a procedure: {}", self.printer(value)))
    }

    fn malformed(&self, x: &Value) -> Error {
        Error::Syntax(crate::SyntaxError::new(
            SyntaxErrorKind::IllegalForm,
            "malformed special form",
            Some(self.to_string(x)),
        ))
    }

    /// Parse and evaluate every form in `text`, returning the last value
    pub fn eval_str(&mut self, text: &str) -> Result<Value, Error> {
        self.eval_port(&mut InputPort::from_source(text))
    }

    /// Parse and evaluate forms from `port` until end of input or the first error
    pub fn eval_port(&mut self, port: &mut InputPort) -> Result<Value, Error> {
        let mut last = Value::Unspecified;
        while let Some(x) = self.parse(port)? {
            last = self.eval(&x)?;
        }
        Ok(last)
    }

    /// Evaluate every top-level form of a source file.
    ///
    /// The configured source extension is appended when `path` lacks it. Loading
    /// stops at the first error, which is annotated with the file name.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = self.source_path(path.as_ref());
        debug!(path = %path.display(), "loading source file");

        let mut port = InputPort::open(&path)?;
        match self.eval_port(&mut port) {
            Ok(_) => Ok(()),
            Err(e) => Err(annotate_with_file(e, &path, port.line_number())),
        }
    }

    fn source_path(&self, path: &Path) -> PathBuf {
        let extension = &self.config.source_extension;
        if path.to_string_lossy().ends_with(extension.as_str()) {
            path.to_path_buf()
        } else {
            let mut name = path.as_os_str().to_owned();
            name.push(extension);
            PathBuf::from(name)
        }
    }

    /// Render a value with the printer contract
    pub fn to_string(&self, value: &Value) -> String {
        self.printer(value).to_string()
    }

    pub fn printer<'a>(&'a self, value: &'a Value) -> Printer<'a> {
        value.display(&self.symbols)
    }

    /// Write text to the output sink
    pub(crate) fn write_output(&mut self, text: &str) -> Result<(), Error> {
        self.output
            .write_all(text.as_bytes())
            .and_then(|()| self.output.flush())
            .map_err(|e| Error::Io(e.to_string()))
    }
}

/// Run `exprs[start..]` as a body: every expression but the last is evaluated for
/// effect, the last is in tail position
fn sequence(
    exprs: Rc<[Value]>,
    start: usize,
    env: &Rc<Environment>,
    stack: &mut Vec<Frame>,
) -> Trampoline {
    match exprs.get(start) {
        None => Trampoline::Value(Value::Unspecified),
        Some(expr) if start + 1 == exprs.len() => Trampoline::Eval(expr.clone(), Rc::clone(env)),
        Some(expr) => {
            let expr = expr.clone();
            stack.push(Frame::Sequence {
                exprs,
                next: start + 1,
                env: Rc::clone(env),
            });
            Trampoline::Eval(expr, Rc::clone(env))
        }
    }
}

fn annotate_with_file(error: Error, path: &Path, line: usize) -> Error {
    let location = format!("{}:{line}", path.display());
    match error {
        Error::Syntax(mut e) => {
            e.message = format!("{location}: {}", e.message);
            Error::Syntax(e)
        }
        Error::EvalError(msg) => Error::EvalError(format!("{location}: {msg}")),
        Error::TypeError(msg) => Error::TypeError(format!("{location}: {msg}")),
        Error::Io(msg) => Error::Io(format!("{location}: {msg}")),
        other => other,
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::Error;
    use crate::ast::Number;

    /// Test result variants for data-driven evaluator tests
    #[derive(Debug)]
    enum TestResult {
        /// Evaluation succeeds and prints as this text
        Prints(&'static str),
        /// Evaluation fails with an error whose text contains this string
        SpecificError(&'static str),
        /// Evaluation fails (any error)
        Error,
    }
    use TestResult::*;

    /// Test cases that share one interpreter, run in order
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.into_iter().enumerate() {
            let mut interp = Interpreter::new().unwrap();
            for (test_idx, (input, expected)) in test_cases.into_iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(&mut interp, input, &expected, &test_id);
            }
        }
    }

    fn execute_test_case(interp: &mut Interpreter, input: &str, expected: &TestResult, test_id: &str) {
        match (interp.eval_str(input), expected) {
            (Ok(actual), Prints(text)) => {
                assert_eq!(interp.to_string(&actual), *text, "{test_id}: {input}");
            }
            (Err(err), SpecificError(text)) => {
                let msg = err.to_string();
                assert!(
                    msg.contains(text),
                    "{test_id}: error for {input} should contain '{text}', got: {msg}"
                );
            }
            (Err(_), Error) => {}
            (result, expected) => {
                panic!("{test_id}: {input}: expected {expected:?}, got {result:?}")
            }
        }
    }

    #[test]
    fn test_core_forms() {
        run_tests_in_environment(vec![
            TestEnvironment(vec![
                ("42", Prints("42")),
                ("\"text\"", Prints("\"text\"")),
                ("#f", Prints("#f")),
                ("(quote (a b c))", Prints("(a b c)")),
                ("'()", Prints("()")),
                ("(if #t 1 2)", Prints("1")),
                ("(if #f 1 2)", Prints("2")),
                ("(if 0 'zero-is-true 'no)", Prints("zero-is-true")),
                ("(if '() 'nil-is-true 'no)", Prints("nil-is-true")),
                ("(if #f #f)", Prints("#<unspecified>")),
                ("(begin)", Prints("#<unspecified>")),
                ("(begin 1 2 3)", Prints("3")),
                ("(define x 10)", Prints("#<unspecified>")),
                ("x", Prints("10")),
                ("(set! x 11)", Prints("#<unspecified>")),
                ("x", Prints("11")),
                ("(set! never-defined 1)", SpecificError("cannot set! unbound variable never-defined")),
                ("(lambda (a) a)", Prints("#<procedure>")),
                ("((lambda (a b) (+ a b)) 1 2)", Prints("3")),
                ("car", Prints("#<native:car>")),
            ]),
            TestEnvironment(vec![
                ("(cond (#f 1) ((= 1 1) 2) (else 3))", Prints("2")),
                ("(cond (#f 1) (else 'fallback))", Prints("fallback")),
                ("(cond (#f 1))", Prints("#<unspecified>")),
                // all but the last clause expression run for effect
                ("(define n 0)", Prints("#<unspecified>")),
                ("(cond (#t (set! n 5) (+ n 1)))", Prints("6")),
                ("n", Prints("5")),
            ]),
        ]);
    }

    #[test]
    fn test_scoping() {
        run_tests_in_environment(vec![TestEnvironment(vec![
            ("(define x 1)", Prints("#<unspecified>")),
            ("(define (shadow) (define x 2) x)", Prints("#<unspecified>")),
            ("(shadow)", Prints("2")),
            ("x", Prints("1")),
            ("(define (bump) (set! x (+ x 1)))", Prints("#<unspecified>")),
            ("(bump)", Prints("#<unspecified>")),
            ("x", Prints("2")),
            // closures capture their defining environment
            ("(define (make-counter) (define count 0) (lambda () (set! count (+ count 1)) count))", Prints("#<unspecified>")),
            ("(define c1 (make-counter))", Prints("#<unspecified>")),
            ("(define c2 (make-counter))", Prints("#<unspecified>")),
            ("(c1)", Prints("1")),
            ("(c1)", Prints("2")),
            ("(c2)", Prints("1")),
        ])]);
    }

    #[test]
    fn test_procedure_application() {
        run_tests_in_environment(vec![TestEnvironment(vec![
            ("(define (f a b) (list a b))", Prints("#<unspecified>")),
            ("(f 1 2)", Prints("(1 2)")),
            ("(f 1)", SpecificError("expected 2 arguments, got 1")),
            ("(f 1 2 3)", SpecificError("(lambda (a b) ...) applied to (1 2 3)")),
            ("(define h (lambda args args))", Prints("#<unspecified>")),
            ("(h)", Prints("()")),
            ("(h 1 \"two\" 'three)", Prints("(1 \"two\" three)")),
            ("(1 2 3)", SpecificError("not a procedure: 1")),
            ("(\"f\")", SpecificError("not a procedure")),
            ("undefined-thing", SpecificError("Unbound variable: undefined-thing")),
            ("((if #t + -) 5 3)", Prints("8")),
            ("((if #f + -) 5 3)", Prints("2")),
        ])]);
    }

    #[test]
    fn test_tail_calls_run_in_constant_stack() {
        let mut interp = Interpreter::new().unwrap();
        interp
            .eval_str("(define (count-up n acc) (if (= n 0) acc (count-up (- n 1) (+ acc 1))))")
            .unwrap();
        assert_eq!(interp.eval_str("(count-up 100000 0)").unwrap(), Value::from(100_000));

        // tail calls through cond and begin
        interp
            .eval_str(
                "(define (loop n)
                   (cond ((= n 0) 'done)
                         (else (begin 'ignored (loop (- n 1))))))",
            )
            .unwrap();
        let done = interp.eval_str("(loop 50000)").unwrap();
        assert_eq!(interp.to_string(&done), "done");

        // mutual recursion in tail position
        interp
            .eval_str(
                "(define (even? n) (if (= n 0) #t (odd? (- n 1))))
                 (define (odd? n) (if (= n 0) #f (even? (- n 1))))",
            )
            .unwrap();
        assert_eq!(interp.eval_str("(even? 20001)").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_non_tail_recursion_is_bounded() {
        let mut interp = Interpreter::new().unwrap();
        interp
            .eval_str("(define (deep n) (if (= n 0) 0 (+ 1 (deep (- n 1)))))")
            .unwrap();
        // pending frames live on the heap, so deep non-tail recursion is fine
        assert_eq!(interp.eval_str("(deep 20000)").unwrap(), Value::from(20000));

        let limit = interp.config().max_eval_depth;
        match interp.eval_str(&format!("(deep {})", limit + 10)) {
            Err(Error::EvalError(msg)) => assert!(msg.contains("depth limit")),
            other => panic!("expected depth limit error, got {other:?}"),
        }
        // the interpreter stays usable afterwards
        assert_eq!(interp.eval_str("(deep 10)").unwrap(), Value::from(10));
    }

    #[test]
    fn test_configured_limits() {
        let mut interp = Interpreter::with_config(Config {
            max_eval_depth: 50,
            max_reentry_depth: 5,
            ..Config::default()
        })
        .unwrap();
        assert_eq!(interp.config().max_eval_depth, 50);
        assert_eq!(interp.config().max_reentry_depth, 5);

        interp
            .eval_str("(define (deep n) (if (= n 0) 0 (+ 1 (deep (- n 1)))))")
            .unwrap();
        assert_eq!(interp.eval_str("(deep 40)").unwrap(), Value::from(40));
        assert!(matches!(
            interp.eval_str("(deep 60)"),
            Err(Error::EvalError(msg)) if msg.contains("evaluation depth limit exceeded (max: 50)")
        ));

        // recursion through `apply` re-enters the evaluator from Rust
        interp
            .eval_str("(define (nested n) (if (= n 0) 0 (+ 1 (apply nested (list (- n 1))))))")
            .unwrap();
        assert_eq!(interp.eval_str("(nested 3)").unwrap(), Value::from(3));
        assert!(matches!(
            interp.eval_str("(nested 10)"),
            Err(Error::EvalError(msg)) if msg.contains("nested evaluation limit exceeded (max: 5)")
        ));
        assert_eq!(interp.eval_str("(nested 2)").unwrap(), Value::from(2));
    }

    #[test]
    fn test_long_argument_lists_and_bodies() {
        let mut interp = Interpreter::new().unwrap();
        let args = (1..=1000).map(|n| n.to_string()).collect::<Vec<_>>().join(" ");
        assert_eq!(
            interp.eval_str(&format!("(length (list {args}))")).unwrap(),
            Value::from(1000)
        );
        let body = "(set! n (+ n 1)) ".repeat(1000);
        interp.eval_str("(define n 0)").unwrap();
        interp.eval_str(&format!("(begin {body} n)")).unwrap();
        assert_eq!(interp.eval_str("n").unwrap(), Value::from(1000));
    }

    #[test]
    fn test_register_builtin_operation() {
        fn add(a: i64, b: i64) -> i64 {
            a + b
        }
        fn forty_two() -> i64 {
            42
        }
        fn safe_div(a: i64, b: i64) -> Result<i64, Error> {
            if b == 0 {
                Err(Error::EvalError("division by zero".into()))
            } else {
                Ok(a / b)
            }
        }

        let mut interp = Interpreter::new().unwrap();
        interp.register_builtin_operation::<_, (i64, i64)>("add2", add);
        interp.register_builtin_operation::<_, ()>("forty-two", forty_two);
        interp.register_builtin_operation::<_, (i64, i64)>("safe-div", safe_div);

        assert_eq!(interp.eval_str("(add2 7 5)").unwrap(), Value::from(12));
        assert_eq!(interp.eval_str("(forty-two)").unwrap(), Value::from(42));
        assert_eq!(interp.eval_str("(safe-div 6 3)").unwrap(), Value::from(2));
        let err = interp.eval_str("(safe-div 1 0)").unwrap_err();
        assert!(err.to_string().contains("division by zero"));
        assert!(matches!(
            interp.eval_str("(add2 1)"),
            Err(Error::ArityError { expected: 2, got: 1, .. })
        ));
        // typed builtins are first-class procedures
        assert_eq!(
            interp.eval_str("(apply add2 (list 1 2))").unwrap(),
            Value::from(3)
        );
    }

    #[test]
    fn test_register_variadic_builtin_operation() {
        fn weighted_sum(weight: i64, nums: NumIter<'_>) -> f64 {
            weight as f64 * nums.map(Number::as_f64).sum::<f64>()
        }
        fn count_strings(values: ValueIter<'_>) -> i64 {
            values.filter(|v| matches!(v, Value::String(_))).count() as i64
        }

        let mut interp = Interpreter::new().unwrap();
        interp.register_variadic_builtin_operation::<_, (i64, NumIter<'static>)>(
            "weighted-sum",
            Arity::AtLeast(2),
            weighted_sum,
        );
        interp.register_variadic_builtin_operation::<_, (ValueIter<'static>,)>(
            "count-strings",
            Arity::Any,
            count_strings,
        );

        assert_eq!(interp.eval_str("(weighted-sum 2 1 2.5)").unwrap(), Value::from(7.0));
        assert!(matches!(
            interp.eval_str("(weighted-sum 2)"),
            Err(Error::ArityError { expected: 2, got: 1, .. })
        ));
        assert_eq!(
            interp.eval_str("(count-strings 1 \"a\" 'b \"c\")").unwrap(),
            Value::from(2)
        );
    }

    #[test]
    fn test_register_native_with_interpreter_access() {
        let mut interp = Interpreter::new().unwrap();
        interp.register_native("twice", |interp, args: Vec<Value>| {
            let [f, x] = <[Value; 2]>::try_from(args)
                .map_err(|args| Error::arity_error(2, args.len()))?;
            let once = interp.apply(&f, vec![x])?;
            interp.apply(&f, vec![once])
        });
        assert_eq!(
            interp.eval_str("(twice (lambda (n) (* n 3)) 2)").unwrap(),
            Value::from(18)
        );
    }

    #[test]
    fn test_arity_validate() {
        assert!(Arity::Exact(2).validate(2).is_ok());
        assert_eq!(Arity::Exact(2).validate(3), Err(Error::arity_error(2, 3)));
        assert!(Arity::AtLeast(1).validate(5).is_ok());
        assert_eq!(Arity::AtLeast(1).validate(0), Err(Error::arity_error(1, 0)));
        assert!(Arity::Any.validate(0).is_ok());
    }

    #[test]
    fn test_unexpanded_forms_are_rejected() {
        let mut interp = Interpreter::new().unwrap();
        let quasi = interp.intern("quasiquote");
        let x = interp.intern("x");
        let form = Value::list(vec![Value::Symbol(quasi), Value::Symbol(x)]);
        assert!(matches!(interp.eval(&form), Err(Error::Syntax(_))));
        assert!(interp.eval(&Value::nil()).is_err());
    }

    #[test]
    fn test_eval_in_custom_environment() {
        let mut interp = Interpreter::new().unwrap();
        let y = interp.intern("y");
        let frame = Environment::bind(
            &Params::Fixed(vec![y].into()),
            vec![Value::from(5)],
            Rc::clone(interp.global_env()),
        )
        .unwrap();
        let mut port = InputPort::from_source("(* y y)");
        let form = interp.parse(&mut port).unwrap().unwrap();
        assert_eq!(interp.eval_in(&form, &frame).unwrap(), Value::from(25));
        assert!(interp.parse(&mut port).unwrap().is_none());
    }

    #[test]
    fn test_global_bindings_are_sorted() {
        let mut interp = Interpreter::with_config(Config {
            load_prelude: false,
            ..Config::default()
        })
        .unwrap();
        interp.define_global("zzz-last", Value::from(1));
        let bindings = interp.global_bindings();
        assert!(bindings.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(bindings.last().map(|(name, _)| name.as_str()), Some("zzz-last"));
        assert!(!interp.is_macro("and"));
        assert!(interp.is_macro("let"));
    }

    #[test]
    fn test_source_path_extension() {
        let interp = Interpreter::new().unwrap();
        assert_eq!(interp.source_path(Path::new("lib/util")), PathBuf::from("lib/util.scm"));
        assert_eq!(interp.source_path(Path::new("main.scm")), PathBuf::from("main.scm"));
    }
}
