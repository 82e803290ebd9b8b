//! lispblocks - a small interactive Lisp runtime
//!
//! This crate provides a tree-walking evaluator for a parenthesized
//! symbolic-expression language with closures, lexical scoping, macros and
//! quoting. Programs are submitted as text and run to completion; each run
//! reports either its printed result or an error, together with the block
//! records the program emitted.
//!
//! ```scheme
//! (def square (fn (x) (* x x)))
//! (defmacro! unless (fn (c a b) `(if ~c ~b ~a)))
//! (doseq (x (range 0 3)) (block x (square x) 0))
//! ```
//!
//! ## Evaluation model
//!
//! - Only `nil` and `false` are falsy; `0` and `()` are truthy
//! - Tail positions (`if`, `do`, `let`, closure bodies, `quasiquote`) do not
//!   grow the host stack, so deep tail recursion runs in constant space
//! - Macros receive unevaluated forms and are expanded before dispatch
//! - Strings are symbols whose text carries its own `"` delimiters
//!
//! ## Limits
//!
//! The evaluator runs on the caller's thread and stack. Non-tail recursion,
//! such as `(* n (fact (- n 1)))`, nests host calls and is capped at
//! [`MAX_EVAL_DEPTH`] levels, so `(fact 300)` fails with an evaluation error
//! while a tail-recursive loop may run for any number of iterations. Hosts
//! that run the interpreter on a thread with a larger stack can raise
//! [`Config::max_eval_depth`] accordingly.
//!
//! Lists built at run time nest at most [`MAX_VALUE_DEPTH`] levels, and
//! `range` produces at most [`MAX_RANGE_LENGTH`] elements. Both fail the run
//! with an evaluation error instead of exhausting the host.
//!
//! ## Modules
//!
//! - `reader`: text to AST
//! - `printer`: AST to text
//! - `evaluator`: the trampolined evaluation loop, environments and macros
//! - `quasiquote`: template expansion
//! - `atom`: mutable reference cells
//! - `builtinops`: native function registry
//! - `interpreter`: the request boundary (`interpret` a whole program)

use std::fmt;

use crate::ast::Value;

/// Maximum reader nesting depth, protecting the host stack from hostile input
pub const MAX_PARSE_DEPTH: usize = 128;

/// Maximum host recursion depth of the evaluator.
///
/// Only non-tail evaluation consumes depth (argument evaluation, non-tail
/// calls, macro application, natives calling back into the evaluator). The
/// default suits the 2 MiB stack of a spawned thread.
pub const MAX_EVAL_DEPTH: usize = 256;

/// Maximum nesting depth of a list value, protecting printing, comparison and
/// deallocation from unbounded recursion
pub const MAX_VALUE_DEPTH: usize = 512;

/// Maximum number of elements `range` produces
pub const MAX_RANGE_LENGTH: usize = 1 << 20;

/// Runtime limits applied to every run of an [`interpreter::Interpreter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Host recursion limit, see [`MAX_EVAL_DEPTH`]. Raise it only together
    /// with the stack size of the thread running the interpreter.
    pub max_eval_depth: usize,
    /// Optional budget of evaluation steps per run; `None` means unbounded
    pub max_steps: Option<u64>,
    /// Reader nesting limit, see [`MAX_PARSE_DEPTH`]; never above
    /// [`MAX_VALUE_DEPTH`]
    pub max_parse_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_eval_depth: MAX_EVAL_DEPTH,
            max_steps: None,
            max_parse_depth: MAX_PARSE_DEPTH,
        }
    }
}

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unterminated string, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
}

impl ParseError {
    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let context_start = error_offset.saturating_sub(20);
        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        ParseError {
            kind,
            message: message.into(),
            context: Some(display_context.replace('\n', "\\n").replace('\r', "")),
        }
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(ParseError),
    UnboundSymbol(String),
    IndexOutOfRange {
        index: usize,
        len: usize,
    },
    NotCallable(String),
    /// Raised by user code through `throw`
    UserRaised(Value),
    TypeError(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>,
    },
    EvalError(String),
    IoError(String),
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError naming the form or function that was misapplied
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: impl Into<String>) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression.into()),
        }
    }
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::ParseError(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::UnboundSymbol(name) => write!(f, "'{name}' not found"),
            Error::IndexOutOfRange { index, len } => {
                write!(f, "Error: index out of range ({index} >= {len})")
            }
            Error::NotCallable(what) => write!(f, "Cannot apply non-function: {what}"),
            Error::UserRaised(value) => write!(f, "Uncaught: {value}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
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
                    "ArityError: function expected {expected} arguments but got {got}"
                ),
            },
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::IoError(msg) => write!(f, "IoError: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod atom;
pub mod builtinops;
pub mod evaluator;
pub mod interpreter;
pub mod printer;
pub mod quasiquote;
pub mod reader;

pub use interpreter::{Block, Interpretation, Interpreter};
