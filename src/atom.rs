//! Mutable reference cells.
//!
//! An [`Atom`] is the only mutable value in the language. Clones share the
//! same cell, and two atoms are equal only when they are the same cell.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::Value;
use crate::printer::print_atom_contents;

#[derive(Clone)]
pub struct Atom(Rc<RefCell<Value>>);

impl Atom {
    pub fn new(value: Value) -> Self {
        Atom(Rc::new(RefCell::new(value)))
    }

    /// Current value of the cell
    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    /// Replace the value, returning the new value
    pub fn reset(&self, value: Value) -> Value {
        *self.0.borrow_mut() = value.clone();
        value
    }

    /// Replace the value with `f(current)`, returning the new value.
    ///
    /// The cell is not borrowed while `f` runs, so `f` may read or reset the
    /// same atom. If `f` fails the cell keeps its previous value.
    pub fn swap<F>(&self, f: F) -> Result<Value, Error>
    where
        F: FnOnce(Value) -> Result<Value, Error>,
    {
        let updated = f(self.get())?;
        Ok(self.reset(updated))
    }

    pub fn ptr_eq(&self, other: &Atom) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({})", print_atom_contents(self))
    }
}

/// Releases nested atoms and the lists inside them with a work list, so a
/// long chain of atoms does not recurse once per link
impl Drop for Atom {
    fn drop(&mut self) {
        if Rc::strong_count(&self.0) != 1 {
            return;
        }
        let mut pending = vec![self.0.take()];
        while let Some(value) = pending.pop() {
            match value {
                Value::Atom(inner) if Rc::strong_count(&inner.0) == 1 => {
                    pending.push(inner.0.take());
                }
                Value::List(mut items) => pending.extend(items.take_unique().unwrap_or_default()),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    #[test]
    fn test_atom_operations() {
        let atom = Atom::new(val(1));
        assert_eq!(atom.get(), val(1));
        assert_eq!(atom.reset(val(5)), val(5));
        assert_eq!(atom.get(), val(5));

        let doubled = atom
            .swap(|current| {
                let n = f64::try_from(&current)?;
                Ok(val(n * 2.0))
            })
            .unwrap();
        assert_eq!(doubled, val(10));
        assert_eq!(atom.get(), val(10));
    }

    #[test]
    fn test_failed_swap_keeps_value() {
        let atom = Atom::new(val("text"));
        let result = atom.swap(|current| f64::try_from(&current).map(Value::Number));
        assert!(matches!(result, Err(Error::TypeError(_))));
        assert_eq!(atom.get(), val("text"));
    }

    #[test]
    fn test_swap_may_touch_same_atom() {
        let atom = Atom::new(val(1));
        let inner = atom.clone();
        let result = atom
            .swap(|current| {
                assert_eq!(inner.get(), current);
                inner.reset(val(100));
                Ok(val(2))
            })
            .unwrap();
        assert_eq!(result, val(2));
        assert_eq!(atom.get(), val(2));
    }

    #[test]
    fn test_clones_share_cell() {
        let atom = Atom::new(val(0));
        let alias = atom.clone();
        alias.reset(val(9));
        assert_eq!(atom.get(), val(9));
        assert!(atom.ptr_eq(&alias));
        assert!(!atom.ptr_eq(&Atom::new(val(9))));
    }

    #[test]
    fn test_long_chain_drops_without_recursion() {
        let mut value = val(0);
        for i in 0..200_000 {
            value = if i % 2 == 0 {
                Value::Atom(Atom::new(value))
            } else {
                crate::ast::list([value])
            };
        }
        drop(value);

        let shared = Atom::new(val(1));
        let holder = Atom::new(Value::Atom(shared.clone()));
        drop(holder);
        assert_eq!(shared.get(), val(1));
    }
}
