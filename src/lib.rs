//! Lispy - an embeddable Scheme-family interpreter
//!
//! This crate reads textual s-expressions, expands them into a small canonical core
//! language (resolving macros, quasiquote and syntactic sugar) and evaluates the core
//! forms against a chain of lexical environments. Closure calls in tail position run in
//! constant stack space, and `call/cc` provides one-shot upward escape continuations.
//!
//! ```scheme
//! (define (count-up n acc)            ; tail-recursive loop
//!   (if (= n 0) acc (count-up (- n 1) (+ acc 1))))
//! (count-up 100000 0)                 ; => 100000, no stack growth
//!
//! `(1 ,(+ 1 1) ,@(list 3 4))          ; => (1 2 3 4)
//! (call/cc (lambda (k) (+ 1 (k 42)))) ; => 42
//! ```
//!
//! ## Pipeline
//!
//! text -> [`reader`] -> expression tree -> [`expander`] -> core form -> [`evaluator`] -> value
//!
//! All process-wide state (symbol table, macro table, global environment) lives in an
//! explicit [`Interpreter`] value; nothing is stored in hidden globals.
//!
//! ## Embedding
//!
//! ```
//! use lispy::{Interpreter, Value};
//!
//! fn double(n: i64) -> i64 {
//!     n * 2
//! }
//!
//! let mut interp = Interpreter::new().unwrap();
//! interp.register_builtin_operation::<_, (i64,)>("double", double);
//! assert_eq!(interp.eval_str("(double 21)").unwrap(), Value::Integer(42));
//! ```
//!
//! ## Modules
//!
//! - `symbol`: interning table and reserved keywords
//! - `ast`: values, procedures and the printer
//! - `reader`: tokenizer and s-expression reader
//! - `expander`: special-form validation, macro expansion and quasiquote
//! - `evaluator`: environments, the trampolined evaluator and escape continuations
//! - `builtinops`: the standard primitive library

use std::fmt;

/// Maximum nesting depth accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 256;

/// Maximum number of pending non-tail evaluations (argument, test and body positions).
/// These live on a heap stack, so the bound guards memory rather than the Rust stack.
pub const MAX_EVAL_DEPTH: usize = 100_000;

/// Maximum nesting of evaluations started from Rust: natives such as `apply`, `eval`
/// and `call/cc` calling back into the evaluator, and macro transformers
pub const MAX_REENTRY_DEPTH: usize = 200;

/// Maximum depth of nested macro expansion
pub const MAX_EXPAND_DEPTH: usize = 300;

/// Extension appended by `load` to script names that lack it
pub const SOURCE_EXTENSION: &str = ".scm";

/// Interpreter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub max_parse_depth: usize,
    pub max_eval_depth: usize,
    pub max_reentry_depth: usize,
    pub max_expand_depth: usize,
    /// Evaluate the Scheme prelude (`and`, `or`, `when`, `unless`) at start-up
    pub load_prelude: bool,
    pub source_extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_parse_depth: MAX_PARSE_DEPTH,
            max_eval_depth: MAX_EVAL_DEPTH,
            max_reentry_depth: MAX_REENTRY_DEPTH,
            max_expand_depth: MAX_EXPAND_DEPTH,
            load_prelude: true,
            source_extension: SOURCE_EXTENSION.to_owned(),
        }
    }
}

/// Categorizes the different kinds of syntax errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SyntaxErrorKind {
    /// A `)` with no matching `(`
    UnexpectedClose,
    /// Input ended inside an open list or after a quote marker
    UnexpectedEof,
    /// Text the tokenizer cannot make sense of (e.g. an unterminated string)
    InvalidToken,
    /// Nesting exceeded the configured parse or expansion depth
    TooDeeplyNested,
    /// Structurally invalid special form (wrong arity, bad binding list, illegal splice...)
    IllegalForm,
}

/// A structured error describing malformed input.
#[derive(Debug, PartialEq, Clone)]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub message: String,
    /// The offending text, if identifiable
    pub found: Option<String>,
}

impl SyntaxError {
    pub fn new(kind: SyntaxErrorKind, message: impl Into<String>, found: Option<String>) -> Self {
        SyntaxError {
            kind,
            message: message.into(),
            found,
        }
    }

    pub fn from_message(kind: SyntaxErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None)
    }

    /// True when more input could complete the expression (used by the REPL for
    /// multi-line entry)
    pub fn is_incomplete(&self) -> bool {
        self.kind == SyntaxErrorKind::UnexpectedEof
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Syntax(SyntaxError),
    UnboundVariable(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>,
    },
    /// `set!` of a name with no existing binding
    AssignmentError(String),
    TypeError(String),
    /// Raised by native procedures
    EvalError(String),
    Io(String),
    /// An escape procedure unwinding towards its `call/cc` site
    ContinuationInvoked(evaluator::Escape),
    /// An escape procedure invoked after its `call/cc` returned
    StaleContinuation,
}

impl Error {
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }

    pub(crate) fn syntax(kind: SyntaxErrorKind, message: impl Into<String>) -> Self {
        Error::Syntax(SyntaxError::from_message(kind, message))
    }

    /// True for syntax errors that more input could fix
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Error::Syntax(e) if e.is_incomplete())
    }
}

impl From<SyntaxError> for Error {
    fn from(e: SyntaxError) -> Self {
        Error::Syntax(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Syntax(e) => {
                write!(f, "SyntaxError: {}", e.message)?;
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                Ok(())
            }
            Error::UnboundVariable(var) => write!(f, "Unbound variable: {var}"),
            Error::ArityError {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "ArityError: {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: procedure expected {expected} arguments but got {got}"
                ),
            },
            Error::AssignmentError(var) => {
                write!(f, "AssignmentError: cannot set! unbound variable {var}")
            }
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::Io(msg) => write!(f, "IOError: {msg}"),
            Error::ContinuationInvoked(_) => {
                write!(f, "Continuation invoked outside of its call/cc")
            }
            Error::StaleContinuation => write!(
                f,
                "Continuation can't be resumed: its call/cc has already returned"
            ),
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod expander;
pub mod reader;
pub mod symbol;

pub use ast::{Number, Value};
pub use evaluator::{Arity, Environment, Interpreter};
pub use reader::InputPort;
pub use symbol::{Symbol, SymbolTable};
