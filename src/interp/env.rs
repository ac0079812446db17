//! Environments: chained bindings on the heap
//!
//! A lexical scope is a chain of `Binding` objects read from a head
//! pointer up to `None`. The heap keeps one head per active scope on its
//! scope stack, which doubles as the collector's primary root set. Scope
//! introduction is literally "save the head, extend it, restore on exit":
//! `push_scope` copies a parent's head, `define` prepends a binding, and
//! `pop_scope` discards the top head.

use super::heap::{BindingObj, Heap, Obj, ObjRef};
use super::value::Value;

/// Handle to an active scope (an index into the heap's scope stack)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvHandle(pub(crate) usize);

impl Heap {
    /// The global scope, always at the bottom of the stack
    pub fn global_scope(&self) -> EnvHandle {
        EnvHandle(0)
    }

    /// Open a scope whose chain starts at the parent's current head
    pub fn push_scope(&mut self, parent: Option<EnvHandle>) -> EnvHandle {
        let head = parent.and_then(|p| self.scopes[p.0]);
        self.scopes.push(head);
        EnvHandle(self.scopes.len() - 1)
    }

    /// Open a scope at an explicit chain head (a function's captured env)
    pub fn push_scope_at(&mut self, head: Option<ObjRef>) -> EnvHandle {
        self.scopes.push(head);
        EnvHandle(self.scopes.len() - 1)
    }

    /// Close a scope, restoring the chain to whatever the parent holds
    pub fn pop_scope(&mut self, handle: EnvHandle) {
        debug_assert_eq!(handle.0, self.scopes.len() - 1, "scope stack imbalance");
        self.scopes.pop();
    }

    /// The binding-chain head of a scope
    pub fn scope_head(&self, handle: EnvHandle) -> Option<ObjRef> {
        self.scopes[handle.0]
    }

    /// Bind a name in a scope, shadowing any outer binding of the name
    pub fn define(&mut self, scope: EnvHandle, name: &str, value: Value) {
        // the value must survive a collection triggered by this allocation
        self.push_root(value.clone());
        let next = self.scopes[scope.0];
        let binding = self.alloc(Obj::Binding(BindingObj {
            name: name.to_string(),
            value,
            next,
        }));
        self.pop_root();
        self.scopes[scope.0] = Some(binding);
    }

    fn chain_find(&self, head: Option<ObjRef>, name: &str) -> Option<ObjRef> {
        let mut cur = head;
        while let Some(r) = cur {
            let binding = self.binding(r);
            if binding.name == name {
                return Some(r);
            }
            cur = binding.next;
        }
        None
    }

    /// Look a name up in a scope's chain, then in the global chain
    pub fn lookup(&self, scope: EnvHandle, name: &str) -> Option<Value> {
        if let Some(r) = self.chain_find(self.scopes[scope.0], name) {
            return Some(self.binding(r).value.clone());
        }
        if scope.0 != 0 {
            if let Some(r) = self.chain_find(self.scopes[0], name) {
                return Some(self.binding(r).value.clone());
            }
        }
        None
    }

    /// Overwrite an existing binding; false when the name is unbound
    pub fn assign(&mut self, scope: EnvHandle, name: &str, value: Value) -> bool {
        let target = self
            .chain_find(self.scopes[scope.0], name)
            .or_else(|| {
                if scope.0 != 0 {
                    self.chain_find(self.scopes[0], name)
                } else {
                    None
                }
            });
        match target {
            Some(r) => {
                self.binding_mut(r).value = value;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_lookup() {
        let mut heap = Heap::new();
        let global = heap.global_scope();
        heap.define(global, "x", Value::Int(42));
        assert_eq!(heap.lookup(global, "x"), Some(Value::Int(42)));
        assert_eq!(heap.lookup(global, "y"), None);
    }

    #[test]
    fn test_scope_chain() {
        let mut heap = Heap::new();
        let global = heap.global_scope();
        heap.define(global, "x", Value::Int(1));

        let child = heap.push_scope(Some(global));
        heap.define(child, "y", Value::Int(2));

        // child sees both; global only its own
        assert_eq!(heap.lookup(child, "x"), Some(Value::Int(1)));
        assert_eq!(heap.lookup(child, "y"), Some(Value::Int(2)));
        heap.pop_scope(child);
        assert_eq!(heap.lookup(global, "y"), None);
    }

    #[test]
    fn test_shadowing() {
        let mut heap = Heap::new();
        let global = heap.global_scope();
        heap.define(global, "x", Value::Int(1));

        let child = heap.push_scope(Some(global));
        heap.define(child, "x", Value::Int(2));
        assert_eq!(heap.lookup(child, "x"), Some(Value::Int(2)));
        heap.pop_scope(child);
        assert_eq!(heap.lookup(global, "x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_pop_restores_head() {
        let mut heap = Heap::new();
        let global = heap.global_scope();
        heap.define(global, "a", Value::Int(1));
        let saved = heap.scope_head(global);

        let inner = heap.push_scope(Some(global));
        heap.define(inner, "b", Value::Int(2));
        heap.pop_scope(inner);

        // the outer head is untouched by the inner scope's bindings
        assert_eq!(heap.scope_head(global), saved);
    }

    #[test]
    fn test_assign_existing() {
        let mut heap = Heap::new();
        let global = heap.global_scope();
        heap.define(global, "x", Value::Int(1));
        assert!(heap.assign(global, "x", Value::Int(9)));
        assert_eq!(heap.lookup(global, "x"), Some(Value::Int(9)));
    }

    #[test]
    fn test_assign_missing_fails() {
        let mut heap = Heap::new();
        let global = heap.global_scope();
        assert!(!heap.assign(global, "nope", Value::Int(1)));
    }

    #[test]
    fn test_assign_through_child_hits_outer() {
        let mut heap = Heap::new();
        let global = heap.global_scope();
        heap.define(global, "x", Value::Int(1));
        let child = heap.push_scope(Some(global));
        assert!(heap.assign(child, "x", Value::Int(7)));
        heap.pop_scope(child);
        assert_eq!(heap.lookup(global, "x"), Some(Value::Int(7)));
    }

    #[test]
    fn test_assign_prefers_innermost() {
        let mut heap = Heap::new();
        let global = heap.global_scope();
        heap.define(global, "x", Value::Int(1));
        let child = heap.push_scope(Some(global));
        heap.define(child, "x", Value::Int(10));
        heap.assign(child, "x", Value::Int(20));
        assert_eq!(heap.lookup(child, "x"), Some(Value::Int(20)));
        heap.pop_scope(child);
        assert_eq!(heap.lookup(global, "x"), Some(Value::Int(1)));
    }

    #[test]
    fn test_global_fallback_from_detached_scope() {
        // function call scopes start from a captured head, not the caller's,
        // yet still see globals defined after capture
        let mut heap = Heap::new();
        let global = heap.global_scope();
        let call = heap.push_scope_at(None);
        heap.define(global, "g", Value::Int(5));
        assert_eq!(heap.lookup(call, "g"), Some(Value::Int(5)));
        heap.pop_scope(call);
    }

    #[test]
    fn test_redefine_shadows_in_same_scope() {
        let mut heap = Heap::new();
        let global = heap.global_scope();
        heap.define(global, "x", Value::Int(1));
        heap.define(global, "x", Value::Int(2));
        // the newer binding wins on lookup
        assert_eq!(heap.lookup(global, "x"), Some(Value::Int(2)));
    }

    #[test]
    fn test_chain_is_prefix_extension() {
        let mut heap = Heap::new();
        let global = heap.global_scope();
        heap.define(global, "a", Value::Int(1));
        let old_head = heap.scope_head(global);
        heap.define(global, "b", Value::Int(2));
        let new_head = heap.scope_head(global).unwrap();
        // the previous chain hangs unchanged off the new head
        assert_eq!(heap.binding(new_head).next, old_head);
    }
}
