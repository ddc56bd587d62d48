use rustc_hash::FxHashMap;
use tally_rdt::scope::DuplicateName;
use tally_rdt::{walk, Before, Lineage, NodeId, NodeKind, Rdt, ScopeId, ScopeMap, Scopes, Symbol, Visitor};
use tracing::{debug, trace};

use crate::cleanup::remove_redundant_references;
use crate::error::ResolveError;

/// Output of name resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The root after cleanup; the id may differ from the input root.
    pub root: NodeId,
    pub scopes: Scopes,
    /// The scope active when each node was entered.
    pub scope_map: ScopeMap,
}

/// Resolves names and then removes redundant references.
pub fn resolve(rdt: &mut Rdt, root: NodeId) -> Result<Resolution, ResolveError> {
    let resolution = resolve_names(rdt, root)?;
    let root = remove_redundant_references(rdt, resolution.root)?;
    Ok(Resolution {
        root,
        ..resolution
    })
}

/// Binds names into a scope tree and rewrites identifiers into references.
pub fn resolve_names(rdt: &mut Rdt, root: NodeId) -> Result<Resolution, ResolveError> {
    let mut resolver = Resolver {
        scopes: Scopes::new(),
        scope_map: ScopeMap::new(),
        declared: FxHashMap::default(),
        references: 0,
    };
    let start = resolver.scopes.root();
    let root = walk(rdt, root, &mut resolver, start)?;
    debug!(
        scopes = resolver.scopes.len(),
        references = resolver.references,
        "resolved names"
    );
    Ok(Resolution {
        root,
        scopes: resolver.scopes,
        scope_map: resolver.scope_map,
    })
}

struct Resolver {
    scopes: Scopes,
    scope_map: ScopeMap,
    // Hoisted bindings: node -> scope its subtree resolves in.
    declared: FxHashMap<NodeId, ScopeId>,
    references: usize,
}

impl Resolver {
    /// Binds `node` ahead of its traversal so that earlier siblings can
    /// refer to it. Tables, top-level assignments and columns are hoisted.
    fn declare(&mut self, rdt: &Rdt, scope: ScopeId, node: NodeId) -> Result<(), ResolveError> {
        let (name, leaf) = match rdt.kind(node) {
            NodeKind::Definition { name, .. }
            | NodeKind::Assignment { name, .. }
            | NodeKind::DerivedProperty { name, .. } => (name.clone(), false),
            NodeKind::SimpleProperty { name, .. } => (name.clone(), true),
            _ => return Ok(()),
        };
        let inner = self.bind(scope, &name, node, leaf)?;
        self.declared.insert(node, inner);
        Ok(())
    }

    fn bind(
        &mut self,
        scope: ScopeId,
        name: &str,
        node: NodeId,
        leaf: bool,
    ) -> Result<ScopeId, ResolveError> {
        self.scopes
            .bind(scope, name, node, leaf)
            .map_err(|DuplicateName { name, existing }| ResolveError::DuplicateBinding {
                name,
                node,
                existing,
            })
    }

    fn bind_params(&mut self, rdt: &Rdt, scope: ScopeId, params: &[NodeId]) -> Result<(), ResolveError> {
        for &param in params {
            if let NodeKind::Param { name, .. } = rdt.kind(param) {
                self.bind(scope, name, param, true)?;
            }
        }
        Ok(())
    }

    /// Looks `name` up from `scope`, skipping any `let` whose own value the
    /// identifier sits in so that `let x = x + 1` sees the outer `x`.
    fn lookup(
        &self,
        rdt: &Rdt,
        scope: ScopeId,
        name: &str,
        node: NodeId,
        lineage: Lineage<'_>,
    ) -> Option<Symbol> {
        let path: Vec<NodeId> = std::iter::once(node).chain(lineage.iter()).collect();
        let mut found = self.scopes.lookup(scope, name);
        while let Some(symbol) = found {
            if !in_own_value(rdt, symbol.node, &path) {
                return Some(symbol);
            }
            let bound_in = symbol.scope.and_then(|s| self.scopes.parent(s))?;
            found = self.scopes.lookup_outer(bound_in, name);
        }
        None
    }
}

/// Whether `path` (a node followed by its ancestors) runs through the value
/// slot of the `let` at `binding`.
fn in_own_value(rdt: &Rdt, binding: NodeId, path: &[NodeId]) -> bool {
    let NodeKind::Let { value, .. } = rdt.kind(binding) else {
        return false;
    };
    path.windows(2).any(|w| w[1] == binding && w[0] == *value)
}

impl Visitor for Resolver {
    type State = ScopeId;
    type Error = ResolveError;

    fn before(
        &mut self,
        rdt: &mut Rdt,
        node: NodeId,
        _lineage: Lineage<'_>,
        scope: &ScopeId,
    ) -> Result<Before<ScopeId>, ResolveError> {
        let scope = *scope;
        self.scope_map.record(node, scope);

        if let NodeKind::Root {
            definitions,
            assignments,
            ..
        } = rdt.kind(node)
        {
            for &item in definitions.clone().iter().chain(assignments.clone().iter()) {
                self.declare(rdt, scope, item)?;
            }
            return Ok(Before::keep());
        }

        if let Some(&inner) = self.declared.get(&node) {
            if let NodeKind::Definition { properties, .. } = rdt.kind(node) {
                for &prop in properties.clone().iter() {
                    self.declare(rdt, inner, prop)?;
                }
            }
            return Ok(Before::with_state(inner));
        }

        let inner = match rdt.kind(node) {
            NodeKind::Definition { name, .. }
            | NodeKind::DerivedProperty { name, .. }
            | NodeKind::Assignment { name, .. } => {
                let name = name.clone();
                self.bind(scope, &name, node, false)?
            }
            NodeKind::Let { name, .. } => {
                let name = name.clone();
                // Each let holds its own scope so branches may reuse a name and
                // a let may shadow a parameter.
                let holder = self.scopes.nested(scope);
                self.bind(holder, &name, node, false)?
            }
            NodeKind::SimpleProperty { name, .. } => {
                let name = name.clone();
                self.bind(scope, &name, node, true)?
            }
            NodeKind::Function { name, params, .. } => {
                let (name, params) = (name.clone(), params.clone());
                let inner = match name {
                    Some(name) => self.bind(scope, &name, node, false)?,
                    None => self.scopes.nested(scope),
                };
                self.bind_params(rdt, inner, &params)?;
                inner
            }
            _ => return Ok(Before::keep()),
        };
        Ok(Before::with_state(inner))
    }

    fn after(
        &mut self,
        rdt: &mut Rdt,
        node: NodeId,
        lineage: Lineage<'_>,
        scope: &ScopeId,
    ) -> Result<Option<NodeId>, ResolveError> {
        let NodeKind::Identifier(name) = rdt.kind(node) else {
            return Ok(None);
        };
        if rdt.is_property_name(node, lineage.parent()) {
            return Ok(None);
        }
        let name = name.clone();
        let symbol = self
            .lookup(rdt, *scope, &name, node, lineage)
            .ok_or_else(|| ResolveError::UnresolvedName {
                name: name.clone(),
                node,
            })?;
        trace!(%node, target = %symbol.node, %name, "resolved identifier");
        rdt.node_mut(node).kind = NodeKind::Reference {
            target: symbol.node,
            name,
        };
        self.references += 1;
        Ok(None)
    }
}
