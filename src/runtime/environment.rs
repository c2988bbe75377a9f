use crate::runtime::{error::RuntimeError, node::NodeRef};
use std::collections::HashMap;

/// A narrowed declared type recorded by `is`, undone when the scope closes.
#[derive(Clone)]
struct Cast {
    node: NodeRef,
    previous: Option<NodeRef>,
}

#[derive(Clone, Default)]
struct Scope {
    symbols: HashMap<String, NodeRef>,
    cast_types: Vec<Cast>,
}

/// Stack of lexical scopes. Index 0 is the global scope; lookups walk from
/// the innermost scope outwards.
#[derive(Clone)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            if let Some(scope) = self.scopes.pop() {
                revert_casts(scope);
            }
        }
    }

    /// Pops scopes until `depth` remain; used to restore the caller's
    /// scopes after an error unwound through pushed scopes.
    pub fn truncate(&mut self, depth: usize) {
        while self.scopes.len() > depth.max(1) {
            self.pop_scope();
        }
    }

    /// Inserts or overwrites `name` in the innermost scope.
    pub fn define(&mut self, name: &str, value: NodeRef) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.symbols.insert(name.to_string(), value);
        }
    }

    pub fn define_global(&mut self, name: &str, value: NodeRef) {
        self.scopes[0].symbols.insert(name.to_string(), value);
    }

    /// Removes `name` from the innermost scope only.
    pub fn remove(&mut self, name: &str) -> Option<NodeRef> {
        self.scopes
            .last_mut()
            .and_then(|scope| scope.symbols.remove(name))
    }

    pub fn lookup_local(&self, name: &str) -> Option<NodeRef> {
        self.scopes
            .last()
            .and_then(|scope| scope.symbols.get(name).cloned())
    }

    pub fn get(&self, name: &str) -> Option<NodeRef> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name).cloned())
    }

    pub fn lookup(&self, name: &str) -> Result<NodeRef, RuntimeError> {
        self.get(name)
            .ok_or_else(|| RuntimeError::undefined("variable", name))
    }

    /// Points the innermost binding of `name` at a different node.
    pub fn rebind(&mut self, name: &str, value: NodeRef) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.symbols.get_mut(name) {
                *slot = value;
                return true;
            }
        }
        false
    }

    /// All visible bindings, inner scopes shadowing outer ones.
    pub fn flatten(&self) -> HashMap<String, NodeRef> {
        let mut symbols = HashMap::new();
        for scope in &self.scopes {
            for (name, value) in &scope.symbols {
                symbols.insert(name.clone(), value.clone());
            }
        }
        symbols
    }

    pub fn globals(&self) -> &HashMap<String, NodeRef> {
        &self.scopes[0].symbols
    }

    /// Temporarily narrows the declared type of `node` for the rest of the
    /// innermost scope.
    pub fn cast(&mut self, node: &NodeRef, ty: NodeRef) {
        let previous = node.borrow_mut().ty.ty.replace(ty);
        if let Some(scope) = self.scopes.last_mut() {
            scope.cast_types.push(Cast {
                node: node.clone(),
                previous,
            });
        }
    }
}

fn revert_casts(scope: Scope) {
    for cast in scope.cast_types.into_iter().rev() {
        cast.node.borrow_mut().ty.ty = cast.previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scope_shadows_and_restores() {
        let mut env = Environment::new();
        env.define("x", NodeRef::number(1.0));
        env.push_scope();
        env.define("x", NodeRef::number(2.0));
        assert_eq!(env.lookup("x").ok().and_then(|x| x.as_number()), Some(2.0));
        env.pop_scope();
        assert_eq!(env.lookup("x").ok().and_then(|x| x.as_number()), Some(1.0));
    }

    #[test]
    fn local_lookup_does_not_walk_parents() {
        let mut env = Environment::new();
        env.define("x", NodeRef::number(1.0));
        env.push_scope();
        assert!(env.lookup_local("x").is_none());
        assert!(env.remove("x").is_none());
        assert!(env.get("x").is_some());
    }

    #[test]
    fn undefined_lookup_names_the_symbol() {
        let env = Environment::new();
        let err = env.lookup("foo").expect_err("should be undefined");
        assert_eq!(err.to_string(), "undefined variable 'foo'");
    }

    #[test]
    fn casts_revert_on_scope_exit() {
        let mut env = Environment::new();
        let value = NodeRef::number(1.0);
        env.push_scope();
        env.cast(&value, NodeRef::any());
        assert!(value.declared_type().is_some());
        env.truncate(1);
        assert!(value.declared_type().is_none());
    }
}
