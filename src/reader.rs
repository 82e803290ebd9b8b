use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, not_line_ending},
    combinator::{all_consuming, opt, recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::{pair, terminated},
};

use crate::ast::{List, NumberType, Value, list};
use crate::{Error, MAX_PARSE_DEPTH, MAX_VALUE_DEPTH, ParseError, ParseErrorKind};

type NomError<'a> = nom::error::Error<&'a str>;

/// Characters that end a token
const DELIMITERS: &str = "()[]{}'\"`,;";

fn is_token_char(c: char) -> bool {
    !c.is_whitespace() && !DELIMITERS.contains(c)
}

fn failure<T>(input: &str, code: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Failure(NomError::new(input, code)))
}

/// Once a form has committed (opening paren, quote, reader macro), a failure
/// further in must not let `alt` backtrack to other alternatives.
fn commit<T>(result: IResult<&str, T>) -> IResult<&str, T> {
    result.map_err(|e| match e {
        nom::Err::Error(e) => nom::Err::Failure(e),
        other => other,
    })
}

/// Convert nom parsing errors to structured parse errors
fn parse_error_from_nom(input: &str, error: nom::Err<NomError<'_>>, max_depth: usize) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            match e.code {
                ErrorKind::TooLarge => ParseError::with_context(
                    ParseErrorKind::TooDeeplyNested,
                    format!("Expression too deeply nested (max depth: {max_depth})"),
                    input,
                    position,
                ),
                ErrorKind::Escaped => ParseError::with_context(
                    ParseErrorKind::InvalidSyntax,
                    format!("Unknown escape sequence at position {position}"),
                    input,
                    position,
                ),
                _ if e.input.is_empty() => {
                    ParseError::from_message(ParseErrorKind::Incomplete, "Unexpected end of input")
                }
                _ => {
                    let remaining_chars: String = e.input.chars().take(10).collect();
                    ParseError::with_context(
                        ParseErrorKind::InvalidSyntax,
                        format!("Invalid syntax near '{remaining_chars}'"),
                        input,
                        position,
                    )
                }
            }
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input")
        }
    }
}

/// Skip whitespace, commas and `;` comments
fn skip_ignored(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            take_while1(|c: char| c.is_whitespace() || c == ','),
            recognize(pair(char(';'), not_line_ending)),
        ))),
    )
    .parse(input)
}

/// Match the number shape `-?digits(.digits)?` against a whole token
fn parse_number(token: &str) -> Option<NumberType> {
    let shape = recognize((opt(char('-')), digit1, opt(pair(char('.'), digit1))));
    let parsed: Result<_, nom::Err<NomError<'_>>> = all_consuming(shape).parse(token);
    parsed.ok().and_then(|(_, text)| text.parse().ok())
}

/// Parse a bare token: number, keyword literal or symbol
fn parse_atom(input: &str) -> IResult<&str, Value> {
    let (remaining, token) = take_while1(is_token_char).parse(input)?;

    let atom = match token {
        "nil" => Value::Nil,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match parse_number(token) {
            Some(n) => Value::Number(n),
            None => Value::Symbol(token.to_owned()),
        },
    };
    Ok((remaining, atom))
}

/// Parse a string literal. The decoded text is kept between its delimiters.
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::from('"');

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => {
                text.push('"');
                return Ok((char_iter.as_str(), Value::Symbol(text)));
            }
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => text.push('\n'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(_) => return failure(remaining, ErrorKind::Escaped),
                    // Backslash at end of input
                    None => return failure(char_iter.as_str(), ErrorKind::Char),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = char_iter.as_str();
            }
            None => return failure(remaining, ErrorKind::Char),
        }
    }
}

/// Parse `'x`, `` `x ``, `~x`, `~@x` and `@x` into their long forms
fn parse_reader_macro(input: &str, depth: usize, max_depth: usize) -> IResult<&str, Value> {
    let (input, name) = alt((
        value("splice-unquote", tag("~@")),
        value("unquote", tag("~")),
        value("quote", tag("'")),
        value("quasiquote", tag("`")),
        value("deref", tag("@")),
    ))
    .parse(input)?;

    let (input, form) = commit(parse_form(input, depth + 1, max_depth))?;
    Ok((input, list([Value::Symbol(name.to_owned()), form])))
}

fn parse_list(input: &str, depth: usize, max_depth: usize) -> IResult<&str, Value> {
    let (mut input, _) = char('(').parse(input)?;
    let mut elements = Vec::new();

    loop {
        let (rest, ()) = skip_ignored(input)?;
        if let Some(after) = rest.strip_prefix(')') {
            return Ok((after, Value::List(List::from(elements))));
        }
        if rest.is_empty() {
            return failure(rest, ErrorKind::Char);
        }
        let (rest, element) = commit(parse_form(rest, depth + 1, max_depth))?;
        elements.push(element);
        input = rest;
    }
}

fn parse_form(input: &str, depth: usize, max_depth: usize) -> IResult<&str, Value> {
    if depth >= max_depth {
        return failure(input, ErrorKind::TooLarge);
    }
    let (input, ()) = skip_ignored(input)?;
    alt((
        |input| parse_reader_macro(input, depth, max_depth),
        |input| parse_list(input, depth, max_depth),
        parse_string,
        parse_atom,
    ))
    .parse(input)
}

/// Read exactly one form from `input`, nesting at most `max_depth` deep.
///
/// `max_depth` is capped at [`MAX_VALUE_DEPTH`].
pub fn read_with_depth(input: &str, max_depth: usize) -> Result<Value, Error> {
    let max_depth = max_depth.min(MAX_VALUE_DEPTH);
    match terminated(|input| parse_form(input, 0, max_depth), skip_ignored).parse(input) {
        Ok(("", value)) => Ok(value),
        Ok((remaining, _)) => Err(ParseError::with_context(
            ParseErrorKind::TrailingContent,
            format!(
                "Unexpected remaining input: '{}'",
                remaining.chars().take(20).collect::<String>()
            ),
            input,
            input.len() - remaining.len(),
        )
        .into()),
        Err(e) => Err(parse_error_from_nom(input, e, max_depth).into()),
    }
}

/// Read exactly one form from `input`.
///
/// Empty input, unbalanced parentheses, unterminated strings and text after
/// the form are errors.
pub fn read(input: &str) -> Result<Value, Error> {
    read_with_depth(input, MAX_PARSE_DEPTH)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{list, sym, val};

    /// Test result variants for comprehensive parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Value),                       // Parsing should succeed with this value
        SpecificError(ParseErrorKind),        // Parsing should fail with this kind
        AnyError,                             // Parsing should fail (any error)
    }
    use ParseTestResult::*;

    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Success(value.into())
    }

    /// Run parse tests with round-trip validation of successful reads
    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} ({input:?})", i + 1);
            let result = read(input);

            match (result, expected) {
                (Ok(actual), Success(expected_val)) => {
                    assert_eq!(actual, *expected_val, "{test_id}: value mismatch");

                    // display -> read -> display should be identical
                    let displayed = format!("{actual}");
                    let reparsed = read(&displayed).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{displayed}': {e:?}")
                    });
                    assert_eq!(reparsed, actual, "{test_id}: round-trip value mismatch");
                }
                (Err(_), AnyError) => {}
                (Err(crate::Error::ParseError(err)), SpecificError(kind)) => {
                    assert_eq!(err.kind, *kind, "{test_id}: wrong error kind ({err:?})");
                }
                (Err(err), SpecificError(kind)) => {
                    panic!("{test_id}: expected parse error {kind:?}, got {err:?}");
                }
                (Ok(actual), AnyError | SpecificError(_)) => {
                    panic!("{test_id}: expected error, got {actual:?}");
                }
                (Err(err), Success(_)) => {
                    panic!("{test_id}: expected success, got error {err:?}");
                }
            }
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_reader_comprehensive() {
        use ParseErrorKind::*;

        let test_cases = vec![
            // ===== NUMBERS =====
            ("42", success(42)),
            ("-5", success(-5)),
            ("0", success(0)),
            ("3.25", success(3.25)),
            ("-0.5", success(-0.5)),
            // Not numbers: read as symbols
            ("123abc", success(sym("123abc"))),
            ("1.", success(sym("1."))),
            (".5", success(sym(".5"))),
            ("-", success(sym("-"))),
            // ===== KEYWORD LITERALS =====
            ("nil", success(Value::Nil)),
            ("true", success(true)),
            ("false", success(false)),
            ("nil?", success(sym("nil?"))),
            // ===== SYMBOLS =====
            ("foo", success(sym("foo"))),
            ("+", success(sym("+"))),
            (">=", success(sym(">="))),
            ("swap!", success(sym("swap!"))),
            ("defmacro!", success(sym("defmacro!"))),
            ("a~b", success(sym("a~b"))),
            ("a@b", success(sym("a@b"))),
            ("&", success(sym("&"))),
            // ===== STRINGS =====
            ("\"hello\"", success("hello")),
            ("\"hello world\"", success("hello world")),
            ("\"\"", success("")),
            (r#""line\nbreak""#, success("line\nbreak")),
            (r#""quote\"inside""#, success("quote\"inside")),
            (r#""back\\slash""#, success("back\\slash")),
            ("\"(not a list)\"", success("(not a list)")),
            ("\"semi ; colon\"", success("semi ; colon")),
            (r#""bad\tescape""#, SpecificError(InvalidSyntax)),
            (r#""unterminated"#, SpecificError(Incomplete)),
            (r#""ends in backslash\"#, SpecificError(Incomplete)),
            // ===== LISTS =====
            ("()", success(list([]))),
            ("(42)", success([42])),
            ("(1 2 3)", success([1, 2, 3])),
            (
                "(1 hello \"world\" true nil)",
                success(list([val(1), sym("hello"), val("world"), val(true), Value::Nil])),
            ),
            ("((1 2) (3 4))", success([[1, 2], [3, 4]])),
            ("(((1)))", success(list([list([list([val(1)])])]))),
            ("(a(b)c)", success(list([sym("a"), list([sym("b")]), sym("c")]))),
            // ===== READER MACROS =====
            ("'foo", success(list([sym("quote"), sym("foo")]))),
            ("'(1 2)", success(list([sym("quote"), val([1, 2])]))),
            ("`x", success(list([sym("quasiquote"), sym("x")]))),
            ("~x", success(list([sym("unquote"), sym("x")]))),
            ("~@xs", success(list([sym("splice-unquote"), sym("xs")]))),
            ("@a", success(list([sym("deref"), sym("a")]))),
            (
                "`(a ~b ~@c)",
                success(list([
                    sym("quasiquote"),
                    list([
                        sym("a"),
                        list([sym("unquote"), sym("b")]),
                        list([sym("splice-unquote"), sym("c")]),
                    ]),
                ])),
            ),
            ("''a", success(list([sym("quote"), list([sym("quote"), sym("a")])]))),
            ("'", SpecificError(Incomplete)),
            // ===== WHITESPACE, COMMAS AND COMMENTS =====
            ("  42  ", success(42)),
            ("\t true\n", success(true)),
            ("( 1 ,  2\t\n3 )", success([1, 2, 3])),
            ("(1,2,3)", success([1, 2, 3])),
            ("(   )", success(list([]))),
            ("; leading comment\n7", success(7)),
            ("7 ; trailing comment", success(7)),
            ("(1 ; inside\n 2)", success([1, 2])),
            // ===== ERRORS =====
            ("(1 2 3", SpecificError(Incomplete)),
            ("((1 2)", SpecificError(Incomplete)),
            ("(1 ; comment eats the paren)", SpecificError(Incomplete)),
            ("", SpecificError(Incomplete)),
            ("   ", SpecificError(Incomplete)),
            ("; only a comment", SpecificError(Incomplete)),
            (")", SpecificError(InvalidSyntax)),
            ("(1 2))", SpecificError(TrailingContent)),
            ("1 2", SpecificError(TrailingContent)),
            ("(+ 1 2) (+ 3 4)", SpecificError(TrailingContent)),
            ("(1 [2])", AnyError),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_reader_depth_limits() {
        let parens_under_limit = format!(
            "{}1{}",
            "(".repeat(MAX_PARSE_DEPTH - 1),
            ")".repeat(MAX_PARSE_DEPTH - 1)
        );
        let quotes_under_limit = format!("{}a", "'".repeat(MAX_PARSE_DEPTH - 1));
        let parens_at_limit = format!(
            "{}1{}",
            "(".repeat(MAX_PARSE_DEPTH),
            ")".repeat(MAX_PARSE_DEPTH)
        );
        let quotes_at_limit = format!("{}a", "'".repeat(MAX_PARSE_DEPTH));

        run_parse_tests(vec![
            (
                parens_at_limit.as_str(),
                SpecificError(ParseErrorKind::TooDeeplyNested),
            ),
            (
                quotes_at_limit.as_str(),
                SpecificError(ParseErrorKind::TooDeeplyNested),
            ),
        ]);

        assert!(read(&parens_under_limit).is_ok());
        assert!(read(&quotes_under_limit).is_ok());

        let shallow = read_with_depth("((1))", 2);
        assert!(matches!(
            shallow,
            Err(crate::Error::ParseError(ParseError {
                kind: ParseErrorKind::TooDeeplyNested,
                ..
            }))
        ));
        assert_eq!(read_with_depth("(1)", 2).unwrap(), val([1]));
    }

    #[test]
    fn test_error_context() {
        let err = read("(1 2))").unwrap_err();
        let crate::Error::ParseError(parse_error) = err else {
            panic!("expected parse error");
        };
        assert!(parse_error.context.unwrap().contains(")"));
        assert!(parse_error.message.contains("Unexpected remaining input"));
    }
}
