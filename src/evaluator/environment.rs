use crate::Error;
use crate::ast::{Params, Value};
use crate::symbol::Symbol;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// One lexical scope.
///
/// Parameters bound by a procedure call live in positional slots, in parameter
/// order; names introduced later by `define` go to a hash table. Lookup checks the
/// slots first, then the table, then the enclosing scope.
#[derive(Default)]
pub struct Environment {
    slots: RefCell<SmallVec<[(Symbol, Value); 4]>>,
    names: RefCell<HashMap<Symbol, Value>>,
    outer: Option<Rc<Environment>>,
}

impl Environment {
    /// A scope with no enclosing scope (the global environment)
    pub fn new() -> Rc<Self> {
        Rc::new(Environment::default())
    }

    /// A new scope binding `params` to `args`, enclosed by `outer`.
    ///
    /// A variadic parameter binds the full argument list; a fixed parameter list
    /// requires exactly one argument per parameter.
    pub fn bind(
        params: &Params,
        args: Vec<Value>,
        outer: Rc<Environment>,
    ) -> Result<Rc<Self>, Error> {
        let slots = match params {
            Params::Variadic(name) => SmallVec::from_elem((*name, Value::list(args)), 1),
            Params::Fixed(names) => {
                if names.len() != args.len() {
                    return Err(Error::arity_error(names.len(), args.len()));
                }
                names.iter().copied().zip(args).collect()
            }
        };

        Ok(Rc::new(Environment {
            slots: RefCell::new(slots),
            names: RefCell::new(HashMap::new()),
            outer: Some(outer),
        }))
    }

    /// The enclosing scope; `None` for the global environment
    pub fn outer(&self) -> Option<&Rc<Environment>> {
        self.outer.as_ref()
    }

    fn contains_local(&self, name: Symbol) -> bool {
        self.slots.borrow().iter().any(|(s, _)| *s == name) || self.names.borrow().contains_key(&name)
    }

    fn get_local(&self, name: Symbol) -> Option<Value> {
        if let Some((_, value)) = self.slots.borrow().iter().find(|(s, _)| *s == name) {
            return Some(value.clone());
        }
        self.names.borrow().get(&name).cloned()
    }

    fn set_local(&self, name: Symbol, value: Value) {
        if let Some(slot) = self.slots.borrow_mut().iter_mut().find(|(s, _)| *s == name) {
            slot.1 = value;
            return;
        }
        self.names.borrow_mut().insert(name, value);
    }

    /// The nearest scope, starting with this one, that binds `name`
    pub fn find(&self, name: Symbol) -> Option<&Environment> {
        let mut env = self;
        loop {
            if env.contains_local(name) {
                return Some(env);
            }
            env = env.outer().map(Rc::as_ref)?;
        }
    }

    /// Value bound to `name` in the nearest scope that binds it
    pub fn lookup(&self, name: Symbol) -> Option<Value> {
        self.find(name).and_then(|env| env.get_local(name))
    }

    /// Bind `name` in this scope, shadowing any outer binding
    pub fn define(&self, name: Symbol, value: Value) {
        self.set_local(name, value);
    }

    /// Overwrite the binding found by [`Environment::find`]. Returns false when
    /// `name` is unbound.
    pub fn assign(&self, name: Symbol, value: Value) -> bool {
        match self.find(name) {
            Some(env) => {
                env.set_local(name, value);
                true
            }
            None => false,
        }
    }

    /// Bindings local to this scope, parameters first
    pub fn local_bindings(&self) -> Vec<(Symbol, Value)> {
        let mut bindings: Vec<_> = self.slots.borrow().iter().cloned().collect();
        bindings.extend(
            self.names
                .borrow()
                .iter()
                .map(|(name, value)| (*name, value.clone())),
        );
        bindings
    }
}
