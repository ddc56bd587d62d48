//! Lexical scope tree built during name resolution.
//!
//! Scopes live in an arena and point at their parent. Binding a non-leaf
//! name (a definition, a derived property, a named function) opens a child
//! scope that the binder's subtree is resolved in; leaf bindings (simple
//! properties, parameters) do not.

use rustc_hash::FxHashMap;

use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    /// The binding site.
    pub node: NodeId,
    /// The scope opened by a non-leaf binding.
    pub scope: Option<ScopeId>,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    symbols: FxHashMap<String, Symbol>,
}

impl Scope {
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// `name` is already bound in the target scope.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateName {
    pub name: String,
    pub existing: NodeId,
}

#[derive(Debug, Clone)]
pub struct Scopes {
    scopes: Vec<Scope>,
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopes {
    /// A tree holding only the root scope.
    pub fn new() -> Self {
        Scopes {
            scopes: vec![Scope::default()],
        }
    }

    /// The scope holding top-level tables and assignments.
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    /// The enclosing scope. `None` only for the root.
    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.get(id).parent
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Opens an anonymous child scope.
    pub fn nested(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(parent),
            symbols: FxHashMap::default(),
        });
        id
    }

    /// Binds `name` in `scope`. Returns the scope the binder's subtree is
    /// resolved in: a fresh child scope for non-leaf bindings, `scope` itself
    /// for leaves.
    pub fn bind(
        &mut self,
        scope: ScopeId,
        name: &str,
        node: NodeId,
        leaf: bool,
    ) -> Result<ScopeId, DuplicateName> {
        if let Some(existing) = self.get(scope).get(name) {
            return Err(DuplicateName {
                name: name.to_string(),
                existing: existing.node,
            });
        }
        let child = if leaf {
            None
        } else {
            Some(self.nested(scope))
        };
        self.scopes[scope.index()].symbols.insert(
            name.to_string(),
            Symbol {
                node,
                scope: child,
            },
        );
        Ok(child.unwrap_or(scope))
    }

    /// Looks `name` up from `scope` outward.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<Symbol> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.get(id);
            if let Some(sym) = s.get(name) {
                return Some(*sym);
            }
            current = s.parent;
        }
        None
    }

    /// Like [`lookup`](Self::lookup) but starting from the parent of `scope`.
    pub fn lookup_outer(&self, scope: ScopeId, name: &str) -> Option<Symbol> {
        self.parent(scope).and_then(|p| self.lookup(p, name))
    }

    /// Names bound directly in `scope`, sorted.
    pub fn names(&self, scope: ScopeId) -> Vec<&str> {
        let mut names: Vec<&str> = self.get(scope).symbols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// The scope that was active when each node was entered.
#[derive(Debug, Clone, Default)]
pub struct ScopeMap {
    per_node: Vec<Option<ScopeId>>,
}

impl ScopeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node: NodeId, scope: ScopeId) {
        let i = node.index();
        if self.per_node.len() <= i {
            self.per_node.resize(i + 1, None);
        }
        self.per_node[i] = Some(scope);
    }

    pub fn get(&self, node: NodeId) -> Option<ScopeId> {
        self.per_node.get(node.index()).copied().flatten()
    }

    /// The recorded scope of `node`, or of its nearest recorded ancestor.
    pub fn nearest(&self, node: NodeId, ancestors: impl IntoIterator<Item = NodeId>) -> Option<ScopeId> {
        self.get(node)
            .or_else(|| ancestors.into_iter().find_map(|id| self.get(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_bindings_stay_in_scope() {
        let mut scopes = Scopes::new();
        let root = scopes.root();
        let inner = scopes.bind(root, "amount", NodeId(1), true).unwrap();
        assert_eq!(inner, root);
        assert_eq!(scopes.len(), 1);
    }

    #[test]
    fn non_leaf_bindings_open_child_scope() {
        let mut scopes = Scopes::new();
        let root = scopes.root();
        let def = scopes.bind(root, "Transaction", NodeId(1), false).unwrap();
        assert_ne!(def, root);
        scopes.bind(def, "amount", NodeId(2), true).unwrap();

        assert_eq!(scopes.lookup(def, "amount").map(|s| s.node), Some(NodeId(2)));
        assert_eq!(
            scopes.lookup(def, "Transaction"),
            Some(Symbol {
                node: NodeId(1),
                scope: Some(def)
            })
        );
        assert_eq!(scopes.lookup(root, "amount"), None);
    }

    #[test]
    fn duplicate_in_same_scope_is_rejected() {
        let mut scopes = Scopes::new();
        let root = scopes.root();
        scopes.bind(root, "x", NodeId(1), true).unwrap();
        let err = scopes.bind(root, "x", NodeId(2), true).unwrap_err();
        assert_eq!(err.existing, NodeId(1));
    }

    #[test]
    fn shadowing_in_nested_scope_is_allowed() {
        let mut scopes = Scopes::new();
        let root = scopes.root();
        scopes.bind(root, "x", NodeId(1), true).unwrap();
        let inner = scopes.nested(root);
        scopes.bind(inner, "x", NodeId(2), true).unwrap();
        assert_eq!(scopes.lookup(inner, "x").map(|s| s.node), Some(NodeId(2)));
        assert_eq!(scopes.lookup_outer(inner, "x").map(|s| s.node), Some(NodeId(1)));
    }

    #[test]
    fn scope_map_falls_back_to_ancestors() {
        let mut map = ScopeMap::new();
        map.record(NodeId(3), ScopeId(2));
        assert_eq!(map.get(NodeId(3)), Some(ScopeId(2)));
        assert_eq!(map.get(NodeId(10)), None);
        assert_eq!(map.nearest(NodeId(10), [NodeId(7), NodeId(3)]), Some(ScopeId(2)));
    }
}
