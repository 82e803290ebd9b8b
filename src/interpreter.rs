//! The request boundary.
//!
//! An [`Interpreter`] owns a global environment that persists across runs.
//! Each call to [`Interpreter::interpret`] evaluates one program (a sequence
//! of forms) with a fresh [`EvalContext`], and reports the printed result or
//! the error together with every block the program emitted, including blocks
//! emitted before a failure.
//!
//! ```
//! use lispblocks::Interpreter;
//!
//! let mut interpreter = Interpreter::new();
//! let outcome = interpreter.interpret("(def sq (fn (x) (* x x))) (block 1 (sq 3) 0) (sq 4)");
//! assert_eq!(outcome.result.as_deref(), Some("16"));
//! assert_eq!(outcome.blocks.len(), 1);
//! ```

use tracing::{debug, error, warn};

use crate::ast::Value;
#[cfg(feature = "json")]
use crate::atom::Atom;
pub use crate::evaluator::Block;
use crate::evaluator::{EvalContext, Environment, create_global_env, eval};
#[cfg(feature = "json")]
use crate::printer::ELIDED_ATOM;
use crate::printer::print;
use crate::reader::read_with_depth;
#[cfg(feature = "json")]
use crate::MAX_VALUE_DEPTH;
use crate::{Config, Error};

/// Definitions evaluated into every new global environment
const BOOTSTRAP: &[&str] = &[
    "(def not (fn (a) (if a false true)))",
    r#"(def load-file (fn (f) (eval (read-string (str "(do " (slurp f) "\nnil)")))))"#,
];

/// Outcome of one program run. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    /// Readable rendering of the last form's value
    pub result: Option<String>,
    /// Rendering of the error that stopped the run
    pub error: Option<String>,
    /// Blocks emitted during the run, in emission order
    pub blocks: Vec<Block>,
}

impl Interpretation {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// JSON rendering: `{"result": ..., "blocks": [...]}` on success,
    /// `{"error": ..., "blocks": [...]}` on failure
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        if let Some(result) = &self.result {
            object.insert("result".to_owned(), serde_json::Value::String(result.clone()));
        }
        if let Some(error) = &self.error {
            object.insert("error".to_owned(), serde_json::Value::String(error.clone()));
        }
        object.insert(
            "blocks".to_owned(),
            self.blocks.iter().map(block_to_json).collect(),
        );
        serde_json::Value::Object(object)
    }
}

#[cfg(feature = "json")]
fn block_to_json(block: &Block) -> serde_json::Value {
    serde_json::json!({
        "x": value_to_json(&block.x),
        "y": value_to_json(&block.y),
        "z": value_to_json(&block.z),
    })
}

/// Convert a value to JSON.
///
/// String literals become JSON strings without their delimiters, lists become
/// arrays and nil becomes null. Integral numbers are emitted as integers.
/// An atom becomes `{"val": contents}`; one that contains itself is written
/// as the string `"(atom ...)"` where it recurs.
#[cfg(feature = "json")]
pub fn value_to_json(value: &Value) -> serde_json::Value {
    JsonWriter::default().convert(value)
}

/// Tracks the atoms being converted, in the same way the printer does
#[cfg(feature = "json")]
#[derive(Default)]
struct JsonWriter {
    open_atoms: Vec<Atom>,
}

#[cfg(feature = "json")]
impl JsonWriter {
    fn convert(&mut self, value: &Value) -> serde_json::Value {
        use serde_json::Value as Json;

        match value {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    #[expect(clippy::cast_possible_truncation)] // bounded above
                    let integral = *n as i64;
                    Json::from(integral)
                } else {
                    serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number)
                }
            }
            Value::Bool(b) => Json::Bool(*b),
            Value::Nil => Json::Null,
            Value::Symbol(name) => Json::String(value.literal_text().unwrap_or(name).to_owned()),
            Value::List(items) => items.iter().map(|item| self.convert(item)).collect(),
            Value::Atom(atom) => {
                if self.open_atoms.len() >= MAX_VALUE_DEPTH
                    || self.open_atoms.iter().any(|open| open.ptr_eq(atom))
                {
                    return Json::String(ELIDED_ATOM.to_owned());
                }
                self.open_atoms.push(atom.clone());
                let contents = self.convert(&atom.get());
                self.open_atoms.pop();
                serde_json::json!({ "val": contents })
            }
            Value::Function(_) | Value::BuiltinFunction(_) => Json::String(print(value, true)),
        }
    }
}

/// Program runner holding the global environment between runs.
///
/// Not `Send`: values share state through `Rc`. Run one interpreter per
/// thread.
pub struct Interpreter {
    root: Environment,
    config: Config,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let interpreter = Interpreter {
            root: create_global_env(),
            config,
        };
        for source in BOOTSTRAP {
            if let Err(e) = interpreter.eval_str(source) {
                error!(source, error = %e, "bootstrap definition failed");
            }
        }
        debug!(definitions = BOOTSTRAP.len(), "interpreter bootstrapped");
        interpreter
    }

    /// The global environment shared by every run
    pub fn root(&self) -> &Environment {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read and evaluate one form in the global environment. Blocks emitted
    /// along the way are discarded.
    pub fn eval_str(&self, input: &str) -> Result<Value, Error> {
        self.run(input).0
    }

    /// Read, evaluate and print one form
    pub fn rep(&self, input: &str) -> Result<String, Error> {
        self.eval_str(input).map(|value| print(&value, true))
    }

    fn run(&self, input: &str) -> (Result<Value, Error>, Vec<Block>) {
        let mut ctx = EvalContext::new(self.root.clone(), self.config);
        let result = read_with_depth(input, self.config.max_parse_depth)
            .and_then(|form| eval(form, &self.root, &mut ctx));
        (result, ctx.take_blocks())
    }

    /// Run a whole program: every form in `input`, in order, as one `do`
    pub fn interpret(&mut self, input: &str) -> Interpretation {
        debug!(input_len = input.len(), "interpreting program");

        // The newline keeps a trailing comment from swallowing the paren
        let program = format!("(do {input}\n)");
        let (result, blocks) = self.run(&program);

        match result {
            Ok(value) => {
                debug!(blocks = blocks.len(), "program finished");
                Interpretation {
                    result: Some(print(&value, true)),
                    error: None,
                    blocks,
                }
            }
            Err(e) => {
                warn!(error = %e, blocks = blocks.len(), "program failed");
                Interpretation {
                    result: None,
                    error: Some(e.to_string()),
                    blocks,
                }
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
