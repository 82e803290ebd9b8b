//! The evaluation loop.
//!
//! Evaluation is trampolined: special forms in tail position (`if`, `do`,
//! `let`, `quasiquote`, `doseq` and closure bodies) hand the next form back to
//! [`eval`]'s loop instead of recursing, so tail calls run in constant host
//! stack. Only genuinely nested evaluation (arguments, conditions, non-tail
//! calls, macro application and natives re-entering the evaluator) goes
//! through [`eval`] again and counts against [`Config::max_eval_depth`].
//!
//! All per-run state lives in an [`EvalContext`]: the root environment used by
//! `eval`, the [`BlockLog`] filled by `block`, the configured limits and the
//! step and depth counters.

use std::mem;
use std::rc::Rc;

use tracing::trace;

use crate::ast::{Closure, NumberType, Params, Value};
use crate::builtinops::get_builtin_ops;
use crate::quasiquote::quasiquote;
use crate::{Config, Error};

mod environment;
mod macroexpand;

pub use environment::Environment;
pub use macroexpand::{is_macro_call, macroexpand};

/// Value produced by every `block` form
const BLOCK_FORM_VALUE: NumberType = 7.0;

/// Argument count accepted by a callable or special form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
}

impl Arity {
    pub fn validate(self, got: usize) -> Result<(), Error> {
        match self {
            Arity::Exact(n) if got != n => Err(Error::arity_error(n, got)),
            Arity::AtLeast(min) | Arity::Range(min, _) if got < min => {
                Err(Error::arity_error(min, got))
            }
            Arity::Range(_, max) if got > max => Err(Error::arity_error(max, got)),
            _ => Ok(()),
        }
    }
}

/// A record emitted by the `block` form
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub x: Value,
    pub y: Value,
    pub z: Value,
}

/// Ordered log of the blocks emitted during one run
#[derive(Debug, Default)]
pub struct BlockLog(Vec<Block>);

impl BlockLog {
    pub fn push(&mut self, block: Block) {
        self.0.push(block);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.0.iter()
    }

    /// Take every record, leaving the log empty
    pub fn drain(&mut self) -> Vec<Block> {
        mem::take(&mut self.0)
    }
}

/// Mutable state threaded through one run of the evaluator
#[derive(Debug)]
pub struct EvalContext {
    root: Environment,
    blocks: BlockLog,
    config: Config,
    steps: u64,
    depth: usize,
}

impl EvalContext {
    pub fn new(root: Environment, config: Config) -> Self {
        EvalContext {
            root,
            blocks: BlockLog::default(),
            config,
            steps: 0,
            depth: 0,
        }
    }

    /// The environment `eval` evaluates in
    pub fn root(&self) -> &Environment {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn blocks(&self) -> &BlockLog {
        &self.blocks
    }

    pub fn take_blocks(&mut self) -> Vec<Block> {
        self.blocks.drain()
    }

    /// Evaluation steps taken so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn tick(&mut self) -> Result<(), Error> {
        self.steps += 1;
        match self.config.max_steps {
            Some(max) if self.steps > max => Err(Error::EvalError(format!(
                "Step limit exceeded (max: {max})"
            ))),
            _ => Ok(()),
        }
    }
}

/// Syntax handled directly by the evaluator, selected by the head symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecialForm {
    Def,
    Let,
    Do,
    If,
    Fn,
    Quote,
    Quasiquote,
    QuasiquoteExpand,
    DefMacro,
    MacroExpand,
    Block,
    Doseq,
}

impl SpecialForm {
    fn of(head: &Value) -> Option<Self> {
        head.as_symbol().and_then(Self::from_symbol)
    }

    fn from_symbol(name: &str) -> Option<Self> {
        let form = match name {
            "def" => SpecialForm::Def,
            "let" => SpecialForm::Let,
            "do" => SpecialForm::Do,
            "if" => SpecialForm::If,
            "fn" => SpecialForm::Fn,
            "quote" => SpecialForm::Quote,
            "quasiquote" => SpecialForm::Quasiquote,
            "quasiquoteexpand" => SpecialForm::QuasiquoteExpand,
            "defmacro!" => SpecialForm::DefMacro,
            "macroexpand" => SpecialForm::MacroExpand,
            "block" => SpecialForm::Block,
            "doseq" => SpecialForm::Doseq,
            _ => return None,
        };
        Some(form)
    }

    fn name(self) -> &'static str {
        match self {
            SpecialForm::Def => "def",
            SpecialForm::Let => "let",
            SpecialForm::Do => "do",
            SpecialForm::If => "if",
            SpecialForm::Fn => "fn",
            SpecialForm::Quote => "quote",
            SpecialForm::Quasiquote => "quasiquote",
            SpecialForm::QuasiquoteExpand => "quasiquoteexpand",
            SpecialForm::DefMacro => "defmacro!",
            SpecialForm::MacroExpand => "macroexpand",
            SpecialForm::Block => "block",
            SpecialForm::Doseq => "doseq",
        }
    }
}

/// Result of evaluating one form: a final value, or a form to evaluate next
/// in tail position
enum Step {
    Return(Value),
    Continue(Value, Environment),
}

/// Evaluate an expression (public API)
pub fn eval(ast: Value, env: &Environment, ctx: &mut EvalContext) -> Result<Value, Error> {
    let max_depth = ctx.config.max_eval_depth;
    if ctx.depth >= max_depth {
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {max_depth})"
        )));
    }
    ctx.depth += 1;
    let result = eval_loop(ast, env.clone(), ctx);
    ctx.depth -= 1;
    result
}

fn eval_loop(mut ast: Value, mut env: Environment, ctx: &mut EvalContext) -> Result<Value, Error> {
    loop {
        ctx.tick()?;
        ast = macroexpand(ast, &env, ctx)?;

        let mut items = match ast {
            Value::List(items) if !items.is_empty() => items.into_vec(),
            other => return eval_atom(other, &env),
        };

        let step = match items.first().and_then(SpecialForm::of) {
            Some(form) => {
                items.remove(0);
                eval_special_form(form, items, &env, ctx)?
            }
            None => eval_application(items, &env, ctx)?,
        };

        match step {
            Step::Return(value) => return Ok(value),
            Step::Continue(next, next_env) => {
                ast = next;
                env = next_env;
            }
        }
    }
}

/// Evaluate a form that is not a non-empty list
fn eval_atom(ast: Value, env: &Environment) -> Result<Value, Error> {
    match ast.as_symbol() {
        Some(name) => env.get(name),
        None => Ok(ast),
    }
}

fn eval_args(forms: Vec<Value>, env: &Environment, ctx: &mut EvalContext) -> Result<Vec<Value>, Error> {
    forms.into_iter().map(|form| eval(form, env, ctx)).collect()
}

/// Destructure the arguments of a fixed-arity special form
fn form_args<const N: usize>(form: SpecialForm, args: Vec<Value>) -> Result<[Value; N], Error> {
    let got = args.len();
    <[Value; N]>::try_from(args).map_err(|_| Error::arity_error_with_expr(N, got, form.name()))
}

fn binding_name(form: SpecialForm, target: &Value) -> Result<String, Error> {
    target.as_symbol().map(str::to_owned).ok_or_else(|| {
        Error::TypeError(format!("{} requires a symbol, got {target}", form.name()))
    })
}

fn eval_special_form(
    form: SpecialForm,
    args: Vec<Value>,
    env: &Environment,
    ctx: &mut EvalContext,
) -> Result<Step, Error> {
    match form {
        SpecialForm::Def => eval_def(args, env, ctx),
        SpecialForm::Let => eval_let(args, env, ctx),
        SpecialForm::Do => eval_do(args, env, ctx),
        SpecialForm::If => eval_if(args, env, ctx),
        SpecialForm::Fn => eval_fn(args, env),
        SpecialForm::Quote => {
            let [quoted] = form_args(form, args)?;
            Ok(Step::Return(quoted))
        }
        SpecialForm::Quasiquote => {
            let [template] = form_args(form, args)?;
            Ok(Step::Continue(quasiquote(template)?, env.clone()))
        }
        SpecialForm::QuasiquoteExpand => {
            let [template] = form_args(form, args)?;
            quasiquote(template).map(Step::Return)
        }
        SpecialForm::DefMacro => eval_defmacro(args, env, ctx),
        SpecialForm::MacroExpand => {
            let [call] = form_args(form, args)?;
            macroexpand(call, env, ctx).map(Step::Return)
        }
        SpecialForm::Block => eval_block(args, env, ctx),
        SpecialForm::Doseq => eval_doseq(args, env, ctx),
    }
}

fn eval_def(args: Vec<Value>, env: &Environment, ctx: &mut EvalContext) -> Result<Step, Error> {
    let [target, value_form] = form_args(SpecialForm::Def, args)?;
    let name = binding_name(SpecialForm::Def, &target)?;
    let value = eval(value_form, env, ctx)?;
    env.set(name, value.clone());
    Ok(Step::Return(value))
}

/// Bindings are evaluated in order in the new scope, so later values see
/// earlier names
fn eval_let(args: Vec<Value>, env: &Environment, ctx: &mut EvalContext) -> Result<Step, Error> {
    let [bindings, body] = form_args(SpecialForm::Let, args)?;
    let Value::List(bindings) = bindings else {
        return Err(Error::TypeError(format!(
            "let bindings must be a list, got {bindings}"
        )));
    };
    if bindings.len() % 2 != 0 {
        return Err(Error::EvalError(
            "let bindings must come in name/value pairs".to_owned(),
        ));
    }

    let let_env = Environment::with_parent(env);
    let mut pairs = bindings.into_vec().into_iter();
    while let (Some(target), Some(value_form)) = (pairs.next(), pairs.next()) {
        let name = binding_name(SpecialForm::Let, &target)?;
        let value = eval(value_form, &let_env, ctx)?;
        let_env.set(name, value);
    }

    Ok(Step::Continue(body, let_env))
}

fn eval_do(mut args: Vec<Value>, env: &Environment, ctx: &mut EvalContext) -> Result<Step, Error> {
    let Some(last) = args.pop() else {
        return Ok(Step::Return(Value::Nil));
    };
    for form in args {
        eval(form, env, ctx)?;
    }
    Ok(Step::Continue(last, env.clone()))
}

fn eval_if(args: Vec<Value>, env: &Environment, ctx: &mut EvalContext) -> Result<Step, Error> {
    Arity::Range(2, 3)
        .validate(args.len())
        .map_err(|_| Error::arity_error_with_expr(3, args.len(), "if"))?;

    let mut args = args.into_iter();
    let (Some(condition), Some(then_branch)) = (args.next(), args.next()) else {
        return Err(Error::arity_error_with_expr(3, 0, "if"));
    };

    if eval(condition, env, ctx)?.is_truthy() {
        Ok(Step::Continue(then_branch, env.clone()))
    } else {
        match args.next() {
            Some(else_branch) => Ok(Step::Continue(else_branch, env.clone())),
            None => Ok(Step::Return(Value::Nil)),
        }
    }
}

fn eval_fn(args: Vec<Value>, env: &Environment) -> Result<Step, Error> {
    let [params, body] = form_args(SpecialForm::Fn, args)?;
    let params = Params::parse(&params)?;
    Ok(Step::Return(Value::Function(Rc::new(Closure {
        params,
        body,
        env: env.clone(),
        is_macro: false,
    }))))
}

/// Binds a macro-tagged copy of the closure; the returned value is untagged
fn eval_defmacro(args: Vec<Value>, env: &Environment, ctx: &mut EvalContext) -> Result<Step, Error> {
    let [target, value_form] = form_args(SpecialForm::DefMacro, args)?;
    let name = binding_name(SpecialForm::DefMacro, &target)?;

    let closure = match eval(value_form, env, ctx)? {
        Value::Function(closure) => closure,
        other => {
            return Err(Error::TypeError(format!(
                "defmacro! requires a fn, got {}",
                other.type_name()
            )));
        }
    };

    trace!(name = %name, "defining macro");
    env.set(
        name,
        Value::Function(Rc::new(Closure {
            is_macro: true,
            ..(*closure).clone()
        })),
    );

    let plain = if closure.is_macro {
        Rc::new(Closure {
            is_macro: false,
            ..(*closure).clone()
        })
    } else {
        closure
    };
    Ok(Step::Return(Value::Function(plain)))
}

/// Every argument is evaluated; the first three form the record
fn eval_block(args: Vec<Value>, env: &Environment, ctx: &mut EvalContext) -> Result<Step, Error> {
    if args.len() < 3 {
        return Err(Error::arity_error_with_expr(3, args.len(), "block"));
    }

    let mut values = eval_args(args, env, ctx)?;
    values.truncate(3);
    let [x, y, z] = form_args(SpecialForm::Block, values)?;

    trace!(%x, %y, %z, "block emitted");
    ctx.blocks.push(Block { x, y, z });
    Ok(Step::Return(Value::Number(BLOCK_FORM_VALUE)))
}

/// Iterate the cartesian product of the bindings, evaluating the body for each
/// combination. The body is then evaluated once more in tail position with the
/// last bound values still in scope.
fn eval_doseq(args: Vec<Value>, env: &Environment, ctx: &mut EvalContext) -> Result<Step, Error> {
    let [bindings, body] = form_args(SpecialForm::Doseq, args)?;
    let Value::List(bindings) = bindings else {
        return Err(Error::TypeError(format!(
            "doseq bindings must be a list, got {bindings}"
        )));
    };
    if bindings.len() % 2 != 0 {
        return Err(Error::EvalError(
            "doseq bindings must come in name/sequence pairs".to_owned(),
        ));
    }

    let mut pairs = Vec::with_capacity(bindings.len() / 2);
    let mut iter = bindings.into_vec().into_iter();
    while let (Some(target), Some(sequence)) = (iter.next(), iter.next()) {
        pairs.push((binding_name(SpecialForm::Doseq, &target)?, sequence));
    }

    let loop_env = Environment::with_parent(env);
    doseq_iterate(&pairs, &body, &loop_env, ctx)?;
    Ok(Step::Continue(body, loop_env))
}

fn doseq_iterate(
    pairs: &[(String, Value)],
    body: &Value,
    env: &Environment,
    ctx: &mut EvalContext,
) -> Result<(), Error> {
    let Some(((name, sequence), rest)) = pairs.split_first() else {
        return eval(body.clone(), env, ctx).map(drop);
    };

    let elements = match eval(sequence.clone(), env, ctx)? {
        Value::List(elements) => elements,
        other => {
            return Err(Error::TypeError(format!(
                "doseq sequence for '{name}' must be a list, got {}",
                other.type_name()
            )));
        }
    };

    for element in elements.into_vec() {
        env.set(name.as_str(), element);
        doseq_iterate(rest, body, env, ctx)?;
    }
    Ok(())
}

/// Evaluate every element, then apply the head to the rest
fn eval_application(items: Vec<Value>, env: &Environment, ctx: &mut EvalContext) -> Result<Step, Error> {
    let mut values = eval_args(items, env, ctx)?;
    let callee = values.remove(0);

    match callee {
        Value::Function(closure) => {
            let call_env = Environment::with_bindings(&closure.env, &closure.params, values)?;
            trace!("tail call into closure");
            Ok(Step::Continue(closure.body.clone(), call_env))
        }
        Value::BuiltinFunction(op) => op.call(ctx, values).map(Step::Return),
        other => Err(Error::NotCallable(other.to_string())),
    }
}

/// Run a closure's body with `args` bound to its parameters
pub(crate) fn call_closure(closure: &Closure, args: Vec<Value>, ctx: &mut EvalContext) -> Result<Value, Error> {
    let call_env = Environment::with_bindings(&closure.env, &closure.params, args)?;
    eval(closure.body.clone(), &call_env, ctx)
}

/// Call a function value with already-evaluated arguments
pub fn apply(callable: &Value, args: Vec<Value>, ctx: &mut EvalContext) -> Result<Value, Error> {
    match callable {
        Value::Function(closure) => call_closure(closure, args, ctx),
        Value::BuiltinFunction(op) => op.call(ctx, args),
        other => Err(Error::NotCallable(other.to_string())),
    }
}

/// Create a global environment with built-in functions
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    for builtin_op in get_builtin_ops() {
        env.set(builtin_op.id, Value::BuiltinFunction(builtin_op));
    }
    env
}
