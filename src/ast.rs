//! This module defines the core AST types shared by the reader, evaluator and
//! printer. The main enum, [`Value`], is used uniformly as code and data:
//! numbers, booleans, nil, symbols, lists, closures, native functions and
//! atoms. Ergonomic helpers such as [`val`], [`sym`] and [`list`] keep AST
//! construction short in code and tests.
//!
//! Strings are not a separate variant. A string literal is a symbol whose text
//! begins and ends with a `"` delimiter carried inside the payload, and
//! [`is_string_literal`] is the single rule deciding between "literal" and
//! "symbol to resolve".

use std::fmt;
use std::mem;
use std::ops::Deref;
use std::rc::Rc;

use crate::{Error, MAX_VALUE_DEPTH};
use crate::atom::Atom;
use crate::builtinops::BuiltinOp;
use crate::evaluator::{Arity, Environment};

/// Type alias for number values in interpreter
pub(crate) type NumberType = f64;

/// Marker in a parameter list introducing the rest parameter
pub(crate) const VARIADIC_MARKER: &str = "&";

/// Check if symbol text is a string literal (quote-delimited on both ends)
pub fn is_string_literal(text: &str) -> bool {
    text.len() >= 2 && text.starts_with('"') && text.ends_with('"')
}

/// Core AST type in interpreter
#[derive(Clone, Default)]
pub enum Value {
    /// Numbers (double precision)
    Number(NumberType),
    /// Boolean values
    Bool(bool),
    /// The nil value, distinct from the empty list
    #[default]
    Nil,
    /// Symbols, and string literals carrying their own delimiters
    Symbol(String),
    /// Lists, used both for code and data
    List(List),
    /// User-defined functions and macros
    Function(Rc<Closure>),
    /// Native functions from the builtin registry
    BuiltinFunction(&'static BuiltinOp),
    /// Mutable reference cells
    Atom(Atom),
}

/// Immutable list storage. Clones share the elements; the nesting depth is
/// computed once, when the list is built.
#[derive(Clone)]
pub struct List {
    items: Rc<[Value]>,
    depth: usize,
}

impl List {
    /// Levels of list nesting, counting this one. Atoms end a level.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The elements, moved out when this is the only reference
    pub fn into_vec(mut self) -> Vec<Value> {
        self.take_unique().unwrap_or_else(|| self.items.to_vec())
    }

    /// Move the elements out if no other list shares them, leaving `nil`s
    pub(crate) fn take_unique(&mut self) -> Option<Vec<Value>> {
        Rc::get_mut(&mut self.items).map(|items| items.iter_mut().map(mem::take).collect())
    }
}

impl Deref for List {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.items
    }
}

impl From<Vec<Value>> for List {
    fn from(items: Vec<Value>) -> Self {
        let depth = 1 + items.iter().map(Value::nesting_depth).max().unwrap_or(0);
        List {
            items: items.into(),
            depth,
        }
    }
}

impl Default for List {
    fn default() -> Self {
        List::from(Vec::new())
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        List::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.items, &other.items) || self.items == other.items
    }
}

/// A user-defined function: parameters, body and the captured scope.
#[derive(Clone)]
pub struct Closure {
    pub params: Params,
    pub body: Value,
    pub env: Environment,
    /// Set only on the copy bound by `defmacro!`
    pub is_macro: bool,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Closure(params={:?}, body={:?}, macro={})",
            self.params, self.body, self.is_macro
        )
    }
}

/// Parameter specification of a closure: positional names and an optional
/// rest parameter introduced by `&`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    pub(crate) names: Vec<String>,
    pub(crate) rest: Option<String>,
}

impl Params {
    /// Parse a parameter list such as `(a b & more)`
    pub fn parse(spec: &Value) -> Result<Self, Error> {
        let Value::List(items) = spec else {
            return Err(Error::TypeError(format!(
                "fn parameters must be a list, got {spec}"
            )));
        };

        let mut params = Params::default();
        let mut iter = items.iter();
        while let Some(item) = iter.next() {
            let name = item.as_symbol().ok_or_else(|| {
                Error::TypeError(format!("fn parameters must be symbols, got {item}"))
            })?;

            if name == VARIADIC_MARKER {
                let rest = iter.next().and_then(Value::as_symbol).ok_or_else(|| {
                    Error::TypeError("'&' must be followed by a parameter name".to_owned())
                })?;
                if iter.next().is_some() {
                    return Err(Error::TypeError(
                        "'&' rest parameter must be the last parameter".to_owned(),
                    ));
                }
                params.rest = Some(rest.to_owned());
                break;
            }

            if params.names.iter().any(|existing| existing == name) {
                return Err(Error::EvalError(format!("Duplicate parameter name: {name}")));
            }
            params.names.push(name.to_owned());
        }

        Ok(params)
    }

    pub fn arity(&self) -> Arity {
        if self.rest.is_some() {
            Arity::AtLeast(self.names.len())
        } else {
            Arity::Exact(self.names.len())
        }
    }
}

impl Value {
    /// Build a string literal value from unwrapped text
    pub fn string_literal(text: &str) -> Value {
        Value::Symbol(format!("\"{text}\""))
    }

    /// Build a list built at run time, refusing nesting beyond [`MAX_VALUE_DEPTH`]
    pub fn checked_list(items: Vec<Value>) -> Result<Value, Error> {
        let list = List::from(items);
        if list.depth() > MAX_VALUE_DEPTH {
            return Err(Error::EvalError(format!(
                "List nesting limit exceeded (max: {MAX_VALUE_DEPTH})"
            )));
        }
        Ok(Value::List(list))
    }

    /// List nesting of this value; zero for anything that is not a list
    pub fn nesting_depth(&self) -> usize {
        match self {
            Value::List(list) => list.depth(),
            _ => 0,
        }
    }

    /// Only `nil` and `false` are falsy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_string_literal(&self) -> bool {
        matches!(self, Value::Symbol(text) if is_string_literal(text))
    }

    /// The text between the delimiters of a string literal
    pub fn literal_text(&self) -> Option<&str> {
        match self {
            Value::Symbol(text) if is_string_literal(text) => Some(&text[1..text.len() - 1]),
            _ => None,
        }
    }

    /// The name of a symbol that resolves through the environment
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(name) if !is_string_literal(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_symbol_named(&self, name: &str) -> bool {
        self.as_symbol() == Some(name)
    }

    /// Short description of the value's kind, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Nil => "nil",
            Value::Symbol(text) if is_string_literal(text) => "string",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Function(closure) if closure.is_macro => "macro",
            Value::Function(_) | Value::BuiltinFunction(_) => "function",
            Value::Atom(_) => "atom",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Nil => write!(f, "Nil"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Function(closure) => write!(f, "{closure:?}"),
            Value::BuiltinFunction(op) => write!(f, "BuiltinFunction({})", op.id),
            Value::Atom(atom) => write!(f, "{atom:?}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Callables and atoms compare by identity
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::BuiltinFunction(a), Value::BuiltinFunction(b)) => a.id == b.id,
            (Value::Atom(a), Value::Atom(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

// From trait implementations for Value - enables .into() conversion

/// `&str` converts to a string literal; use [`sym`] for symbols
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string_literal(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl From<Atom> for Value {
    fn from(atom: Atom) -> Self {
        Value::Atom(atom)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

impl TryFrom<&Value> for NumberType {
    type Error = Error;

    fn try_from(value: &Value) -> Result<NumberType, Error> {
        if let Value::Number(n) = value {
            Ok(*n)
        } else {
            Err(Error::TypeError(format!(
                "expected number, got {}",
                value.type_name()
            )))
        }
    }
}

/// Helper function for creating symbols
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating lists of mixed values
pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
    Value::List(items.into_iter().collect())
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (val(42), Value::Number(42.0)),
            (val(-17), Value::Number(-17.0)),
            (val(2.5), Value::Number(2.5)),
            (val(255u8), Value::Number(255.0)),
            (val(true), Value::Bool(true)),
            (val("hello"), Value::Symbol("\"hello\"".to_owned())),
            (val(""), Value::Symbol("\"\"".to_owned())),
            (sym("swap!"), Value::Symbol("swap!".to_owned())),
            (
                val([1, 2, 3]),
                Value::List(List::from(vec![
                    Value::Number(1.0),
                    Value::Number(2.0),
                    Value::Number(3.0),
                ])),
            ),
            (
                list([sym("if"), val(false), val(1)]),
                Value::List(List::from(vec![
                    Value::Symbol("if".to_owned()),
                    Value::Bool(false),
                    Value::Number(1.0),
                ])),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_string_literal_convention() {
        assert!(is_string_literal("\"abc\""));
        assert!(is_string_literal("\"\""));
        assert!(!is_string_literal("\""));
        assert!(!is_string_literal("abc"));
        assert!(!is_string_literal("\"abc"));

        assert_eq!(val("a b").literal_text(), Some("a b"));
        assert_eq!(sym("x").literal_text(), None);
        assert_eq!(sym("x").as_symbol(), Some("x"));
        assert_eq!(val("x").as_symbol(), None);
        assert_eq!(val("x").type_name(), "string");
        assert_eq!(sym("x").type_name(), "symbol");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!val(false).is_truthy());
        assert!(val(0).is_truthy());
        assert!(val(true).is_truthy());
        assert!(list([]).is_truthy());
        assert!(val("").is_truthy());
    }

    #[test]
    fn test_params_parse() {
        let params = Params::parse(&list([sym("a"), sym("b")])).unwrap();
        assert_eq!(params.names, vec!["a", "b"]);
        assert_eq!(params.rest, None);
        assert_eq!(params.arity(), Arity::Exact(2));

        let variadic = Params::parse(&list([sym("a"), sym("&"), sym("more")])).unwrap();
        assert_eq!(variadic.names, vec!["a"]);
        assert_eq!(variadic.rest.as_deref(), Some("more"));
        assert_eq!(variadic.arity(), Arity::AtLeast(1));

        assert!(Params::parse(&sym("a")).is_err());
        assert!(Params::parse(&list([val(1)])).is_err());
        assert!(Params::parse(&list([val("a")])).is_err());
        assert!(Params::parse(&list([sym("a"), sym("&")])).is_err());
        assert!(Params::parse(&list([sym("&"), sym("a"), sym("b")])).is_err());
        assert!(Params::parse(&list([sym("a"), sym("a")])).is_err());
    }

    #[test]
    fn test_list_depth_and_sharing() {
        assert_eq!(list([]).nesting_depth(), 1);
        assert_eq!(val([1, 2]).nesting_depth(), 1);
        assert_eq!(list([val(1), list([list([])])]).nesting_depth(), 3);
        assert_eq!(val(1).nesting_depth(), 0);
        // Atoms end a level
        let boxed = Value::Atom(Atom::new(list([list([])])));
        assert_eq!(list([boxed]).nesting_depth(), 1);

        let Value::List(shared) = val([1, 2, 3]) else {
            panic!("expected a list");
        };
        let alias = shared.clone();
        assert_eq!(shared.into_vec(), vec![val(1), val(2), val(3)]);
        assert_eq!(alias.len(), 3);
        assert_eq!(alias.into_vec(), vec![val(1), val(2), val(3)]);
    }

    #[test]
    fn test_checked_list_limits_nesting() {
        let mut value = Value::Nil;
        for _ in 0..MAX_VALUE_DEPTH {
            value = Value::checked_list(vec![value]).unwrap();
        }
        assert_eq!(value.nesting_depth(), MAX_VALUE_DEPTH);

        let err = Value::checked_list(vec![value]).unwrap_err();
        assert!(matches!(err, Error::EvalError(_)));
        assert!(format!("{err}").contains("nesting limit"));
    }

    #[test]
    fn test_identity_equality() {
        let a = Atom::new(val(1));
        let b = Atom::new(val(1));
        assert_eq!(Value::Atom(a.clone()), Value::Atom(a));
        assert_ne!(Value::Atom(b), Value::Atom(Atom::new(val(1))));
        assert_ne!(Value::Nil, list([]));
        assert_ne!(val(false), Value::Nil);
    }
}
