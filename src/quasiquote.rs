//! Quasiquote template expansion.
//!
//! `quasiquote` rewrites a template into ordinary code built from `cons`,
//! `concat` and `quote`, so evaluating the result yields the template with its
//! `unquote` and `splice-unquote` holes filled in. The rewrite is purely
//! structural; it never evaluates anything.

use crate::Error;
use crate::ast::{List, Value, is_string_literal, list, sym};

fn is_headed_by(items: &[Value], name: &str) -> bool {
    items.first().is_some_and(|head| head.is_symbol_named(name))
}

/// The argument of a two-element form, `nil` when absent
fn form_argument(items: List) -> Value {
    items.into_vec().into_iter().nth(1).unwrap_or(Value::Nil)
}

/// Expand a quasiquote template into code.
///
/// Each element adds a level of `cons` nesting, so a template whose expansion
/// would nest beyond [`crate::MAX_VALUE_DEPTH`] is an error.
pub fn quasiquote(ast: Value) -> Result<Value, Error> {
    match ast {
        Value::List(items) if is_headed_by(&items, "unquote") => Ok(form_argument(items)),
        Value::List(items) => items
            .into_vec()
            .into_iter()
            .rev()
            .try_fold(list([]), |acc, element| match element {
                Value::List(inner) if is_headed_by(&inner, "splice-unquote") => {
                    Value::checked_list(vec![sym("concat"), form_argument(inner), acc])
                }
                element => Value::checked_list(vec![sym("cons"), quasiquote(element)?, acc]),
            }),
        Value::Symbol(name) if !is_string_literal(&name) => {
            Ok(list([sym("quote"), Value::Symbol(name)]))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::MAX_VALUE_DEPTH;
    use crate::ast::val;
    use crate::reader::read;

    fn expand(source: &str) -> Value {
        match read(source) {
            Ok(template) => quasiquote(template).unwrap(),
            Err(e) => panic!("failed to read {source:?}: {e}"),
        }
    }

    #[test]
    fn test_quasiquote_expansion_data_driven() {
        let test_cases = vec![
            // Self-evaluating values pass through
            ("1", "1"),
            ("nil", "nil"),
            ("\"s\"", "\"s\""),
            // Symbols are quoted
            ("x", "(quote x)"),
            // Unquote yields its argument
            ("(unquote x)", "x"),
            ("(unquote)", "nil"),
            // Lists fold from the right
            ("()", "()"),
            ("(a)", "(cons (quote a) ())"),
            ("(1 ~b)", "(cons 1 (cons b ()))"),
            ("(a ~@xs c)", "(cons (quote a) (concat xs (cons (quote c) ())))"),
            ("(~@xs)", "(concat xs ())"),
            // Nested templates recurse
            ("((a) ~b)", "(cons (cons (quote a) ()) (cons b ()))"),
        ];

        for (i, (template, expected)) in test_cases.iter().enumerate() {
            let actual = expand(template).to_string();
            assert_eq!(actual, *expected, "Quasiquote test #{} failed for {template}", i + 1);
        }
    }

    #[test]
    fn test_string_literal_named_unquote_is_data() {
        let template = list([val("unquote"), sym("x")]);
        let expanded = quasiquote(template).unwrap();
        assert_eq!(
            expanded,
            list([
                sym("cons"),
                val("unquote"),
                list([sym("cons"), list([sym("quote"), sym("x")]), list([])]),
            ])
        );
    }

    #[test]
    fn test_long_template_exceeds_nesting_limit() {
        let fits = list((1..MAX_VALUE_DEPTH).map(|_| val(1)));
        assert_eq!(quasiquote(fits).unwrap().nesting_depth(), MAX_VALUE_DEPTH);

        let too_long = list((0..MAX_VALUE_DEPTH * 4).map(|_| sym("x")));
        let err = quasiquote(too_long).unwrap_err();
        assert!(matches!(err, Error::EvalError(_)));
    }
}
