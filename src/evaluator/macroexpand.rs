use std::rc::Rc;

use tracing::trace;

use super::{EvalContext, Environment, call_closure};
use crate::Error;
use crate::ast::{Closure, Value};

/// The macro a form invokes, if its head symbol resolves to one
fn macro_for(ast: &Value, env: &Environment) -> Option<Rc<Closure>> {
    let Value::List(items) = ast else {
        return None;
    };
    let name = items.first()?.as_symbol()?;
    let scope = env.find(name)?;
    match scope.get(name) {
        Ok(Value::Function(closure)) if closure.is_macro => Some(closure),
        _ => None,
    }
}

/// A non-empty list whose head symbol is bound to a macro
pub fn is_macro_call(ast: &Value, env: &Environment) -> bool {
    macro_for(ast, env).is_some()
}

/// Expand `ast` until it is no longer a macro call.
///
/// Each macro receives the unevaluated argument forms and its result replaces
/// the whole call.
pub fn macroexpand(ast: Value, env: &Environment, ctx: &mut EvalContext) -> Result<Value, Error> {
    let mut ast = ast;
    while let Some(closure) = macro_for(&ast, env) {
        let args: Vec<Value> = match ast {
            Value::List(items) => items.into_vec().into_iter().skip(1).collect(),
            _ => Vec::new(),
        };
        ctx.tick()?;
        trace!(args = args.len(), "expanding macro call");
        ast = call_closure(&closure, args, ctx)?;
    }
    Ok(ast)
}
