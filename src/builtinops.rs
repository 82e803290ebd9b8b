//! Built-in operations registry.
//!
//! Every native function is defined once in [`BUILTIN_OPS`] with its
//! identifier and [`Arity`], and bound into the global environment by
//! [`crate::evaluator::create_global_env`]. Values refer to natives by
//! `&'static BuiltinOp`, so two references to the same native are equal.
//!
//! ```scheme
//! (+ 1 2 3)               ; arithmetic
//! (cons 0 (list 1 2))     ; list construction
//! (swap! counter inc)     ; atoms
//! (eval (read-string "(+ 1 2)"))
//! ```
//!
//! ## Functions vs Contextual Functions
//!
//! - **Functions** see only their evaluated arguments
//! - **Contextual functions** also receive the [`EvalContext`] so they can
//!   re-enter the evaluator (`eval`, `swap!`) or read its limits
//!   (`read-string`)
//!
//! Special forms are handled directly by the evaluator and are not in this registry.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the signature
//!    `fn(args: Vec<Value>) -> Result<Value, Error>`
//! 2. **Add to BUILTIN_OPS** with its identifier and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::fmt;
use std::fs;

use tracing::debug;

use crate::ast::{List, NumberType, Value, is_string_literal};
use crate::{Error, MAX_RANGE_LENGTH};
use crate::atom::Atom;
use crate::evaluator::{Arity, EvalContext, apply, eval};
use crate::printer::print;
use crate::reader::read_with_depth;

/// Represents the implementation of a built-in function
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Function of its evaluated arguments only
    Function(fn(Vec<Value>) -> Result<Value, Error>),
    /// Function that also needs the running evaluation context
    Contextual(fn(&mut EvalContext, Vec<Value>) -> Result<Value, Error>),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::Contextual(_) => write!(f, "Contextual(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The identifier this operation is bound to in the global environment
    pub id: &'static str,
    /// The implementation of this operation
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Compare operations by their id, which uniquely identifies them
        self.id == other.id
    }
}

impl BuiltinOp {
    /// Check if the given number of arguments is valid for this operation
    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(arg_count).map_err(|err| match err {
            Error::ArityError { expected, got, .. } => {
                Error::arity_error_with_expr(expected, got, self.id)
            }
            other => other,
        })
    }

    /// Invoke the operation with already-evaluated arguments
    pub fn call(&self, ctx: &mut EvalContext, args: Vec<Value>) -> Result<Value, Error> {
        self.validate_arity(args.len())?;
        match self.op_kind {
            OpKind::Function(func) => func(args),
            OpKind::Contextual(func) => func(ctx, args),
        }
    }
}

//
// Argument helpers
//

/// Destructure arguments whose count the registry has already validated
fn fixed<const N: usize>(args: Vec<Value>) -> Result<[Value; N], Error> {
    let got = args.len();
    <[Value; N]>::try_from(args).map_err(|_| Error::arity_error(N, got))
}

fn numbers(args: &[Value]) -> Result<Vec<NumberType>, Error> {
    args.iter().map(NumberType::try_from).collect()
}

fn string_arg<'a>(value: &'a Value, op: &str) -> Result<&'a str, Error> {
    value.literal_text().ok_or_else(|| {
        Error::TypeError(format!("{op} requires a string, got {}", value.type_name()))
    })
}

fn atom_arg<'a>(value: &'a Value, op: &str) -> Result<&'a Atom, Error> {
    match value {
        Value::Atom(atom) => Ok(atom),
        other => Err(Error::TypeError(format!(
            "{op} requires an atom, got {}",
            other.type_name()
        ))),
    }
}

#[expect(clippy::cast_precision_loss)] // list lengths stay far below 2^52
fn length_value(len: usize) -> Value {
    Value::Number(len as NumberType)
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // checked non-negative integral
fn index_arg(value: &Value) -> Result<usize, Error> {
    let n = NumberType::try_from(value)?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(Error::TypeError(format!(
            "nth requires a non-negative integer index, got {n}"
        )));
    }
    Ok(n as usize)
}

//
// Builtin Function Implementations
//

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(args: Vec<Value>) -> Result<Value, Error> {
            let nums = numbers(&args)?;
            // All adjacent pairs must satisfy the comparison
            Ok(Value::Bool(nums.windows(2).all(|pair| pair[0] $op pair[1])))
        }
    };
}

numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_add(args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::Number(numbers(&args)?.into_iter().sum()))
}

fn builtin_sub(args: Vec<Value>) -> Result<Value, Error> {
    match numbers(&args)?.split_first() {
        Some((first, [])) => Ok(Value::Number(-first)),
        Some((first, rest)) => Ok(Value::Number(rest.iter().fold(*first, |acc, n| acc - n))),
        None => Err(Error::arity_error(1, 0)),
    }
}

fn builtin_mul(args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::Number(numbers(&args)?.into_iter().product()))
}

/// Division follows IEEE semantics, so dividing by zero yields an infinity
fn builtin_div(args: Vec<Value>) -> Result<Value, Error> {
    match numbers(&args)?.split_first() {
        Some((first, [])) => Ok(Value::Number(1.0 / first)),
        Some((first, rest)) => Ok(Value::Number(rest.iter().fold(*first, |acc, n| acc / n))),
        None => Err(Error::arity_error(1, 0)),
    }
}

/// Structural equality; callables and atoms compare by identity
fn builtin_eq(args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::Bool(args.windows(2).all(|pair| pair[0] == pair[1])))
}

fn builtin_inc(args: Vec<Value>) -> Result<Value, Error> {
    let [n] = fixed(args)?;
    Ok(Value::Number(NumberType::try_from(&n)? + 1.0))
}

/// Numbers from `start` up to but excluding `end`, in steps of one.
///
/// Every element counts as an evaluation step. The range stops early once
/// adding one no longer changes the number.
fn builtin_range(ctx: &mut EvalContext, args: Vec<Value>) -> Result<Value, Error> {
    let [start, end] = fixed(args)?;
    let (start, end) = (NumberType::try_from(&start)?, NumberType::try_from(&end)?);
    if !start.is_finite() || !end.is_finite() {
        return Err(Error::TypeError(format!(
            "range requires finite bounds, got {start} and {end}"
        )));
    }

    let mut elements = Vec::new();
    let mut current = start;
    while current < end {
        if elements.len() == MAX_RANGE_LENGTH {
            return Err(Error::EvalError(format!(
                "range length limit exceeded (max: {MAX_RANGE_LENGTH})"
            )));
        }
        ctx.tick()?;
        elements.push(Value::Number(current));
        let next = current + 1.0;
        if next == current {
            break;
        }
        current = next;
    }
    Ok(Value::List(List::from(elements)))
}

fn builtin_list(args: Vec<Value>) -> Result<Value, Error> {
    Value::checked_list(args)
}

fn builtin_is_list(args: Vec<Value>) -> Result<Value, Error> {
    let [value] = fixed(args)?;
    Ok(Value::Bool(matches!(value, Value::List(_))))
}

fn builtin_is_empty(args: Vec<Value>) -> Result<Value, Error> {
    match fixed(args)? {
        [Value::List(items)] => Ok(Value::Bool(items.is_empty())),
        [Value::Nil] => Ok(Value::Bool(true)),
        [other] => Err(Error::TypeError(format!(
            "empty? requires a list, got {}",
            other.type_name()
        ))),
    }
}

/// Anything other than a list counts as empty
fn builtin_count(args: Vec<Value>) -> Result<Value, Error> {
    match fixed(args)? {
        [Value::List(items)] => Ok(length_value(items.len())),
        [_] => Ok(length_value(0)),
    }
}

fn builtin_first(args: Vec<Value>) -> Result<Value, Error> {
    match fixed(args)? {
        [Value::List(items)] => Ok(items.first().cloned().unwrap_or(Value::Nil)),
        [_] => Ok(Value::Nil),
    }
}

fn builtin_rest(args: Vec<Value>) -> Result<Value, Error> {
    match fixed(args)? {
        [Value::List(items)] if items.len() > 1 => {
            Ok(Value::List(items[1..].iter().cloned().collect()))
        }
        [_] => Ok(Value::List(List::default())),
    }
}

fn builtin_nth(args: Vec<Value>) -> Result<Value, Error> {
    let [list, index] = fixed(args)?;
    let index = index_arg(&index)?;
    match list {
        Value::List(items) => items.get(index).cloned().ok_or(Error::IndexOutOfRange {
            index,
            len: items.len(),
        }),
        other => Err(Error::TypeError(format!(
            "nth requires a list, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_cons(args: Vec<Value>) -> Result<Value, Error> {
    match fixed(args)? {
        [first, Value::List(tail)] => {
            let mut new_list = Vec::with_capacity(tail.len() + 1);
            new_list.push(first);
            new_list.extend(tail.into_vec());
            Value::checked_list(new_list)
        }
        [_, other] => Err(Error::TypeError(format!(
            "cons requires a list as second argument, got {}",
            other.type_name()
        ))),
    }
}

/// Join lists; non-list arguments after the first are appended as elements.
/// A first argument that is not a list yields the empty list.
fn builtin_concat(args: Vec<Value>) -> Result<Value, Error> {
    let mut args = args.into_iter();
    let Some(Value::List(first)) = args.next() else {
        return Ok(Value::List(List::default()));
    };
    let mut result = first.into_vec();
    for arg in args {
        match arg {
            Value::List(items) => result.extend(items.into_vec()),
            other => result.push(other),
        }
    }
    Value::checked_list(result)
}

/// Concatenate the plain text of every argument into a string literal
fn builtin_str(args: Vec<Value>) -> Result<Value, Error> {
    let joined: String = args.iter().map(|arg| print(arg, false)).collect();
    if is_string_literal(&joined) {
        Ok(Value::Symbol(joined))
    } else {
        Ok(Value::string_literal(&joined))
    }
}

/// Print the arguments readably on one line; returns the first argument
fn builtin_prn(args: Vec<Value>) -> Result<Value, Error> {
    let line: Vec<String> = args.iter().map(|arg| print(arg, true)).collect();
    println!("{}", line.join(" "));
    Ok(args.into_iter().next().unwrap_or(Value::Nil))
}

fn builtin_read_string(ctx: &mut EvalContext, args: Vec<Value>) -> Result<Value, Error> {
    let [source] = fixed(args)?;
    let text = string_arg(&source, "read-string")?;
    read_with_depth(text, ctx.config().max_parse_depth)
}

fn builtin_slurp(args: Vec<Value>) -> Result<Value, Error> {
    let [path] = fixed(args)?;
    let path = string_arg(&path, "slurp")?;
    debug!(path, "reading file");
    let content = fs::read_to_string(path).map_err(|e| Error::IoError(format!("{path}: {e}")))?;
    Ok(Value::string_literal(&content))
}

fn builtin_atom(args: Vec<Value>) -> Result<Value, Error> {
    let [value] = fixed(args)?;
    Ok(Value::Atom(Atom::new(value)))
}

fn builtin_is_atom(args: Vec<Value>) -> Result<Value, Error> {
    let [value] = fixed(args)?;
    Ok(Value::Bool(matches!(value, Value::Atom(_))))
}

fn builtin_deref(args: Vec<Value>) -> Result<Value, Error> {
    let [target] = fixed(args)?;
    Ok(atom_arg(&target, "deref")?.get())
}

fn builtin_reset(args: Vec<Value>) -> Result<Value, Error> {
    let [target, value] = fixed(args)?;
    Ok(atom_arg(&target, "reset!")?.reset(value))
}

/// `(swap! atom f & args)` stores `(f current args...)`
fn builtin_swap(ctx: &mut EvalContext, args: Vec<Value>) -> Result<Value, Error> {
    let mut args = args.into_iter();
    let (Some(target), Some(func)) = (args.next(), args.next()) else {
        return Err(Error::arity_error(2, 0));
    };
    let extra: Vec<Value> = args.collect();

    atom_arg(&target, "swap!")?.swap(|current| {
        let mut call_args = Vec::with_capacity(extra.len() + 1);
        call_args.push(current);
        call_args.extend(extra);
        apply(&func, call_args, ctx)
    })
}

/// Evaluate a form in the root environment, whatever scope the call is in
fn builtin_eval(ctx: &mut EvalContext, args: Vec<Value>) -> Result<Value, Error> {
    let [form] = fixed(args)?;
    let root = ctx.root().clone();
    eval(form, &root, ctx)
}

fn builtin_throw(args: Vec<Value>) -> Result<Value, Error> {
    let [value] = fixed(args)?;
    Err(Error::UserRaised(value))
}

/// Global registry of all built-in operations.
static BUILTIN_OPS: &[BuiltinOp] = &[
    // Arithmetic operations
    BuiltinOp {
        id: "+",
        op_kind: OpKind::Function(builtin_add),
        arity: Arity::AtLeast(0),
    },
    BuiltinOp {
        id: "-",
        op_kind: OpKind::Function(builtin_sub),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        id: "*",
        op_kind: OpKind::Function(builtin_mul),
        arity: Arity::AtLeast(0),
    },
    BuiltinOp {
        id: "/",
        op_kind: OpKind::Function(builtin_div),
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        id: "inc",
        op_kind: OpKind::Function(builtin_inc),
        arity: Arity::Exact(1),
    },
    // Comparison operations
    BuiltinOp {
        id: "<",
        op_kind: OpKind::Function(builtin_lt),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        id: "<=",
        op_kind: OpKind::Function(builtin_le),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        id: ">",
        op_kind: OpKind::Function(builtin_gt),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        id: ">=",
        op_kind: OpKind::Function(builtin_ge),
        arity: Arity::AtLeast(2),
    },
    BuiltinOp {
        id: "=",
        op_kind: OpKind::Function(builtin_eq),
        arity: Arity::AtLeast(2),
    },
    // List operations
    BuiltinOp {
        id: "range",
        op_kind: OpKind::Contextual(builtin_range),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "list",
        op_kind: OpKind::Function(builtin_list),
        arity: Arity::AtLeast(0),
    },
    BuiltinOp {
        id: "list?",
        op_kind: OpKind::Function(builtin_is_list),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "empty?",
        op_kind: OpKind::Function(builtin_is_empty),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "count",
        op_kind: OpKind::Function(builtin_count),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "first",
        op_kind: OpKind::Function(builtin_first),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "rest",
        op_kind: OpKind::Function(builtin_rest),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "nth",
        op_kind: OpKind::Function(builtin_nth),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "cons",
        op_kind: OpKind::Function(builtin_cons),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "concat",
        op_kind: OpKind::Function(builtin_concat),
        arity: Arity::AtLeast(0),
    },
    // String and I/O operations
    BuiltinOp {
        id: "str",
        op_kind: OpKind::Function(builtin_str),
        arity: Arity::AtLeast(0),
    },
    BuiltinOp {
        id: "prn",
        op_kind: OpKind::Function(builtin_prn),
        arity: Arity::AtLeast(0),
    },
    BuiltinOp {
        id: "read-string",
        op_kind: OpKind::Contextual(builtin_read_string),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "slurp",
        op_kind: OpKind::Function(builtin_slurp),
        arity: Arity::Exact(1),
    },
    // Atoms
    BuiltinOp {
        id: "atom",
        op_kind: OpKind::Function(builtin_atom),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "atom?",
        op_kind: OpKind::Function(builtin_is_atom),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "deref",
        op_kind: OpKind::Function(builtin_deref),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "reset!",
        op_kind: OpKind::Function(builtin_reset),
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "swap!",
        op_kind: OpKind::Contextual(builtin_swap),
        arity: Arity::AtLeast(2),
    },
    // Evaluation and errors
    BuiltinOp {
        id: "eval",
        op_kind: OpKind::Contextual(builtin_eval),
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "throw",
        op_kind: OpKind::Function(builtin_throw),
        arity: Arity::Exact(1),
    },
];

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}
