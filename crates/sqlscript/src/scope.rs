/*
 * scope.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Parent-linked variable scopes.
//!
//! Scopes live in a [`ScopeTree`] arena and refer to their parent by
//! [`ScopeId`]. Lookups walk outward to the root; writes go to the scope they
//! are addressed to. Retired scopes are cleared, detached and kept in a free
//! list so that loops and scoped branches do not allocate a fresh map on
//! every entry.

use crate::value::{Arguments, Value};
use std::collections::HashMap;

/// Read access to variable bindings, as seen by an expression evaluator.
pub trait Variables {
    /// Look up `name`, returning `None` if it is not bound anywhere visible.
    fn get(&self, name: &str) -> Option<&Value>;
}

impl Variables for Arguments {
    fn get(&self, name: &str) -> Option<&Value> {
        indexmap::IndexMap::get(self, name)
    }
}

impl Variables for HashMap<String, Value> {
    fn get(&self, name: &str) -> Option<&Value> {
        HashMap::get(self, name)
    }
}

/// Handle to a scope inside a [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// A single scope: its own bindings plus a link to its parent.
#[derive(Debug, Default)]
struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<ScopeId>,
}

/// Arena of scopes for one render call.
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    /// Retired scopes, cleared and detached, ready for reuse.
    pool: Vec<ScopeId>,
}

impl ScopeTree {
    /// Create a tree holding a single, empty root scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            pool: Vec::new(),
        }
    }

    /// Create a tree whose root scope is seeded with `arguments`.
    pub fn with_arguments(arguments: &Arguments) -> Self {
        let mut tree = Self::new();
        tree.scopes[0].vars.extend(
            arguments
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        tree
    }

    /// The root scope, which has no parent.
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.scopes[id.0].parent
    }

    /// Look up `name` in `id`, then in each ancestor up to the root.
    pub fn get(&self, id: ScopeId, name: &str) -> Option<&Value> {
        let mut current = Some(id);
        while let Some(scope_id) = current {
            let scope = &self.scopes[scope_id.0];
            if let Some(value) = scope.vars.get(name) {
                return Some(value);
            }
            current = scope.parent;
        }
        None
    }

    /// True if `name` is bound in `id` itself (ancestors are not consulted).
    pub fn contains_local(&self, id: ScopeId, name: &str) -> bool {
        self.scopes[id.0].vars.contains_key(name)
    }

    /// Bind `name` in `id` only, shadowing any ancestor binding.
    ///
    /// Returns the value previously bound in `id` itself.
    pub fn put(&mut self, id: ScopeId, name: impl Into<String>, value: Value) -> Option<Value> {
        self.scopes[id.0].vars.insert(name.into(), value)
    }

    /// Remove `name` from `id`, or if `id` does not own it, from the nearest
    /// ancestor that does.
    pub fn remove(&mut self, id: ScopeId, name: &str) -> Option<Value> {
        let owner = self.find_owner(id, name)?;
        self.scopes[owner.0].vars.remove(name)
    }

    /// Remove `name` from `id` itself, never reaching into ancestors.
    pub fn remove_local(&mut self, id: ScopeId, name: &str) -> Option<Value> {
        self.scopes[id.0].vars.remove(name)
    }

    /// Overwrite `name` in the nearest scope (starting at `id`) that already
    /// owns it, returning the old value.
    ///
    /// If no scope in the chain owns `name`, it is bound in `id` and `None`
    /// is returned.
    pub fn rebind_existing(
        &mut self,
        id: ScopeId,
        name: impl Into<String>,
        value: Value,
    ) -> Option<Value> {
        let name = name.into();
        match self.find_owner(id, &name) {
            Some(owner) => self.scopes[owner.0].vars.insert(name, value),
            None => {
                self.scopes[id.0].vars.insert(name, value);
                None
            }
        }
    }

    /// Take a scope from the pool (or allocate one) and attach it to `parent`.
    pub fn acquire(&mut self, parent: ScopeId) -> ScopeId {
        match self.pool.pop() {
            Some(id) => {
                tracing::trace!(scope = id.0, "Reusing pooled scope");
                let scope = &mut self.scopes[id.0];
                debug_assert!(scope.vars.is_empty() && scope.parent.is_none());
                scope.parent = Some(parent);
                id
            }
            None => {
                self.scopes.push(Scope {
                    vars: HashMap::new(),
                    parent: Some(parent),
                });
                ScopeId(self.scopes.len() - 1)
            }
        }
    }

    /// Clear and detach `id`, return it to the pool, and hand back its parent.
    ///
    /// The root scope is never retired; releasing it returns `None` and
    /// leaves it untouched.
    pub fn release(&mut self, id: ScopeId) -> Option<ScopeId> {
        let scope = &mut self.scopes[id.0];
        let parent = scope.parent.take()?;
        scope.vars.clear();
        self.pool.push(id);
        Some(parent)
    }

    /// Number of scopes waiting in the pool.
    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    /// A read-only view of the chain starting at `id`.
    pub fn view(&self, id: ScopeId) -> ScopeView<'_> {
        ScopeView { tree: self, id }
    }

    fn find_owner(&self, id: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(id);
        while let Some(scope_id) = current {
            let scope = &self.scopes[scope_id.0];
            if scope.vars.contains_key(name) {
                return Some(scope_id);
            }
            current = scope.parent;
        }
        None
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed view of one scope chain, handed to expression evaluators.
#[derive(Debug, Clone, Copy)]
pub struct ScopeView<'a> {
    tree: &'a ScopeTree,
    id: ScopeId,
}

impl Variables for ScopeView<'_> {
    fn get(&self, name: &str) -> Option<&Value> {
        self.tree.get(self.id, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Value {
        Value::from(s)
    }

    #[test]
    fn test_get_walks_to_root() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.put(root, "x", v("root"));
        let child = tree.acquire(root);
        let grandchild = tree.acquire(child);

        assert_eq!(tree.get(grandchild, "x"), Some(&v("root")));
        assert_eq!(tree.get(grandchild, "missing"), None);
    }

    #[test]
    fn test_shadowing_survives_pop() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.put(root, "x", v("outer"));

        let child = tree.acquire(root);
        tree.put(child, "x", v("inner"));
        assert_eq!(tree.get(child, "x"), Some(&v("inner")));
        // The ancestor binding is hidden, not deleted
        assert_eq!(tree.get(root, "x"), Some(&v("outer")));

        assert_eq!(tree.release(child), Some(root));
        assert_eq!(tree.get(root, "x"), Some(&v("outer")));
    }

    #[test]
    fn test_remove_reaches_through_chain() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.put(root, "x", v("root"));
        let middle = tree.acquire(root);
        tree.put(middle, "x", v("middle"));
        let leaf = tree.acquire(middle);

        // leaf does not own x, so the nearest owner (middle) loses it
        assert_eq!(tree.remove(leaf, "x"), Some(v("middle")));
        assert_eq!(tree.get(leaf, "x"), Some(&v("root")));

        assert_eq!(tree.remove(leaf, "x"), Some(v("root")));
        assert_eq!(tree.get(leaf, "x"), None);
        assert_eq!(tree.remove(leaf, "x"), None);
    }

    #[test]
    fn test_remove_local_does_not_delegate() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.put(root, "x", v("root"));
        let child = tree.acquire(root);

        assert_eq!(tree.remove_local(child, "x"), None);
        assert_eq!(tree.get(child, "x"), Some(&v("root")));
    }

    #[test]
    fn test_rebind_existing_overwrites_owner() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.put(root, "total", Value::Int(1));
        let child = tree.acquire(root);

        assert_eq!(tree.rebind_existing(child, "total", Value::Int(2)), Some(Value::Int(1)));
        assert!(!tree.contains_local(child, "total"));
        assert_eq!(tree.get(root, "total"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_rebind_existing_binds_locally_when_missing() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let child = tree.acquire(root);

        assert_eq!(tree.rebind_existing(child, "fresh", Value::Int(5)), None);
        assert!(tree.contains_local(child, "fresh"));
        assert_eq!(tree.get(root, "fresh"), None);
    }

    #[test]
    fn test_released_scope_is_cleared_and_reparented() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let a = tree.acquire(root);
        tree.put(a, "leak", v("value"));
        tree.release(a);
        assert_eq!(tree.pooled(), 1);

        let b = tree.acquire(root);
        let c = tree.acquire(b);
        // The pooled slot was recycled with no stale bindings
        assert_eq!(b, a);
        assert_eq!(tree.get(c, "leak"), None);
        assert_eq!(tree.parent(c), Some(b));
        assert_eq!(tree.pooled(), 0);
    }

    #[test]
    fn test_root_is_never_released() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.put(root, "x", Value::Int(1));
        assert_eq!(tree.release(root), None);
        assert_eq!(tree.get(root, "x"), Some(&Value::Int(1)));
        assert_eq!(tree.pooled(), 0);
    }

    #[test]
    fn test_with_arguments_seeds_root() {
        let mut args = Arguments::new();
        args.insert("id".to_string(), Value::Int(3));
        let tree = ScopeTree::with_arguments(&args);
        assert_eq!(tree.view(tree.root()).get("id"), Some(&Value::Int(3)));
    }
}
