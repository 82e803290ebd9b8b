//! Value to text conversion.
//!
//! Two modes exist. Readable output (the [`fmt::Display`] impl) re-escapes
//! string literals so the text reads back to an equal value. Plain output
//! writes the raw text between the delimiters and is what `str` builds on.

use std::fmt::{self, Write};

use crate::MAX_VALUE_DEPTH;
use crate::ast::{NumberType, Value};
use crate::atom::Atom;

/// Text written for an atom already being printed, or nested too deeply
pub(crate) const ELIDED_ATOM: &str = "(atom ...)";

/// Render a value, escaping string literals when `readably` is set
pub fn print(value: &Value, readably: bool) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = Printer::new(readably).write_value(&mut out, value);
    out
}

/// Render the contents of `atom`, which counts as already being printed
pub(crate) fn print_atom_contents(atom: &Atom) -> String {
    let mut out = String::new();
    let mut printer = Printer::new(true);
    printer.open_atoms.push(atom.clone());
    let _ = printer.write_value(&mut out, &atom.get());
    out
}

/// Walks a value, tracking the atoms it is inside of. Atoms may refer to
/// themselves, so revisiting one, or opening more than [`MAX_VALUE_DEPTH`],
/// prints a placeholder instead of the contents.
struct Printer {
    readably: bool,
    open_atoms: Vec<Atom>,
}

impl Printer {
    fn new(readably: bool) -> Self {
        Printer {
            readably,
            open_atoms: Vec::new(),
        }
    }

    fn write_value<W: Write>(&mut self, out: &mut W, value: &Value) -> fmt::Result {
        match value {
            Value::Number(n) => write_number(out, *n),
            Value::Bool(b) => write!(out, "{b}"),
            Value::Nil => out.write_str("nil"),
            Value::Symbol(name) => match value.literal_text() {
                Some(text) if self.readably => write_escaped(out, text),
                Some(text) => out.write_str(text),
                None => out.write_str(name),
            },
            Value::List(items) => {
                out.write_char('(')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.write_char(' ')?;
                    }
                    self.write_value(out, item)?;
                }
                out.write_char(')')
            }
            Value::Function(_) | Value::BuiltinFunction(_) => out.write_str("#<function>"),
            Value::Atom(atom) => self.write_atom(out, atom),
        }
    }

    fn write_atom<W: Write>(&mut self, out: &mut W, atom: &Atom) -> fmt::Result {
        if self.open_atoms.len() >= MAX_VALUE_DEPTH
            || self.open_atoms.iter().any(|open| open.ptr_eq(atom))
        {
            return out.write_str(ELIDED_ATOM);
        }

        self.open_atoms.push(atom.clone());
        out.write_str("(atom ")?;
        let result = self.write_value(out, &atom.get());
        self.open_atoms.pop();
        result?;
        out.write_char(')')
    }
}

/// Integral values print without a fractional part
fn write_number<W: Write>(out: &mut W, n: NumberType) -> fmt::Result {
    if n.is_nan() {
        out.write_str("NaN")
    } else if n.is_infinite() {
        out.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        #[expect(clippy::cast_possible_truncation)] // bounded above
        let integral = n as i64;
        write!(out, "{integral}")
    } else {
        write!(out, "{n}")
    }
}

fn write_escaped<W: Write>(out: &mut W, text: &str) -> fmt::Result {
    out.write_char('"')?;
    for c in text.chars() {
        match c {
            '\\' => out.write_str("\\\\")?,
            '\n' | '\r' => out.write_str("\\n")?,
            '"' => out.write_str("\\\"")?,
            _ => out.write_char(c)?,
        }
    }
    out.write_char('"')
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::new(true).write_value(f, self)
    }
}
