use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Params, Value};

/// Environment for variable bindings.
///
/// Cloning an `Environment` yields another handle to the same scope. Closures
/// keep their defining scope alive through such a handle, and a scope that
/// binds a closure capturing it forms a reference cycle; such scopes live as
/// long as the interpreter that created them.
#[derive(Clone)]
pub struct Environment(Rc<Scope>);

struct Scope {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
}

impl Environment {
    pub fn new() -> Self {
        Environment(Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        }))
    }

    /// Create a child scope binding `params` to `args`.
    ///
    /// Positional names take one argument each; the rest parameter, if any,
    /// receives the remaining arguments as a list.
    pub fn with_bindings(
        parent: &Environment,
        params: &Params,
        args: Vec<Value>,
    ) -> Result<Self, Error> {
        params.arity().validate(args.len())?;

        let env = Environment::with_parent(parent);
        {
            let mut bindings = env.0.bindings.borrow_mut();
            let mut args = args.into_iter();
            for (name, arg) in params.names.iter().zip(args.by_ref()) {
                bindings.insert(name.clone(), arg);
            }
            if let Some(rest) = &params.rest {
                bindings.insert(rest.clone(), Value::checked_list(args.collect())?);
            }
        }
        Ok(env)
    }

    /// Bind `name` in this scope, replacing any existing binding here
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// The nearest scope, starting here, that binds `name`
    pub fn find(&self, name: &str) -> Option<Environment> {
        let mut scope = self;
        loop {
            if scope.0.bindings.borrow().contains_key(name) {
                return Some(scope.clone());
            }
            scope = scope.0.parent.as_ref()?;
        }
    }

    /// Resolve `name` through the scope chain
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.0.bindings.borrow().get(name) {
                return Ok(value.clone());
            }
            match &scope.0.parent {
                Some(parent) => scope = parent,
                None => return Err(Error::UnboundSymbol(name.to_owned())),
            }
        }
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Start with parent bindings (so they can be overridden by local bindings)
        if let Some(parent) = &self.0.parent {
            for (name, value) in parent.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in self.0.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values may refer back to this scope, so only names are shown
        let mut names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{list, sym, val};

    #[test]
    fn test_lookup_through_parents() {
        let root = Environment::new();
        root.set("x", val(1));
        root.set("y", val(2));

        let child = Environment::with_parent(&root);
        child.set("x", val(10));

        assert_eq!(child.get("x").unwrap(), val(10));
        assert_eq!(child.get("y").unwrap(), val(2));
        assert_eq!(root.get("x").unwrap(), val(1));
        assert_eq!(
            child.get("missing").unwrap_err(),
            Error::UnboundSymbol("missing".to_owned())
        );

        assert!(child.find("x").unwrap().ptr_eq(&child));
        assert!(child.find("y").unwrap().ptr_eq(&root));
        assert!(child.find("missing").is_none());
    }

    #[test]
    fn test_shared_scope_mutation() {
        let root = Environment::new();
        let alias = root.clone();
        let child = Environment::with_parent(&root);
        alias.set("late", val(5));
        assert_eq!(child.get("late").unwrap(), val(5));
    }

    #[test]
    fn test_with_bindings() {
        let root = Environment::new();

        let fixed = Params::parse(&list([sym("a"), sym("b")])).unwrap();
        let env = Environment::with_bindings(&root, &fixed, vec![val(1), val(2)]).unwrap();
        assert_eq!(env.get("a").unwrap(), val(1));
        assert_eq!(env.get("b").unwrap(), val(2));

        let err = Environment::with_bindings(&root, &fixed, vec![val(1)]).unwrap_err();
        assert!(matches!(err, Error::ArityError { expected: 2, got: 1, .. }));

        let variadic = Params::parse(&list([sym("a"), sym("&"), sym("more")])).unwrap();
        let env =
            Environment::with_bindings(&root, &variadic, vec![val(1), val(2), val(3)]).unwrap();
        assert_eq!(env.get("a").unwrap(), val(1));
        assert_eq!(env.get("more").unwrap(), val([2, 3]));

        let env = Environment::with_bindings(&root, &variadic, vec![val(1)]).unwrap();
        assert_eq!(env.get("more").unwrap(), list([]));

        assert!(Environment::with_bindings(&root, &variadic, vec![]).is_err());
    }

    #[test]
    fn test_get_all_bindings_shadowing() {
        let root = Environment::new();
        root.set("a", val(1));
        root.set("b", val(2));
        let child = Environment::with_parent(&root);
        child.set("a", val(3));

        let all = child.get_all_bindings();
        assert_eq!(
            all,
            vec![("a".to_owned(), val(3)), ("b".to_owned(), val(2))]
        );
    }
}
