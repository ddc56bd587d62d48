//! Table lookup and structural type comparison.

use tally_rdt::{Lineage, NodeId, NodeKind, Rdt, ScopeId, ScopeMap, Scopes, TypeDef};

/// Outcome of comparing two possibly incomplete types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Equal,
    Different,
    /// Some part is still unknown; ask again on a later pass.
    Undecided,
}

impl Compare {
    fn and(self, other: Compare) -> Compare {
        match (self, other) {
            (Compare::Different, _) | (_, Compare::Different) => Compare::Different,
            (Compare::Undecided, _) | (_, Compare::Undecided) => Compare::Undecided,
            _ => Compare::Equal,
        }
    }

    fn from_bool(equal: bool) -> Compare {
        if equal {
            Compare::Equal
        } else {
            Compare::Different
        }
    }
}

// Bounds expansion of named tables inside each other.
const MAX_DEPTH: usize = 16;

/// The scope information the type engine reads from name resolution.
#[derive(Debug, Clone, Copy)]
pub struct TypeEnv<'a> {
    pub scopes: &'a Scopes,
    pub scope_map: &'a ScopeMap,
}

impl<'a> TypeEnv<'a> {
    pub fn new(scopes: &'a Scopes, scope_map: &'a ScopeMap) -> Self {
        TypeEnv { scopes, scope_map }
    }

    /// The scope `node` was resolved in, falling back to its ancestors and
    /// finally the root scope for nodes created after resolution.
    pub fn scope_at(&self, node: NodeId, lineage: Lineage<'_>) -> ScopeId {
        self.scope_map
            .nearest(node, lineage.iter())
            .unwrap_or_else(|| self.scopes.root())
    }

    /// The table definition `name` refers to from `scope`.
    pub fn definition(&self, rdt: &Rdt, name: &str, scope: ScopeId) -> Option<NodeId> {
        let symbol = self.scopes.lookup(scope, name)?;
        matches!(rdt.kind(symbol.node), NodeKind::Definition { .. }).then_some(symbol.node)
    }

    /// The property node named `field` on the table `definition`.
    pub fn column(&self, rdt: &Rdt, definition: NodeId, field: &str) -> Option<NodeId> {
        let NodeKind::Definition { properties, .. } = rdt.kind(definition) else {
            return None;
        };
        properties.iter().copied().find(|p| match rdt.kind(*p) {
            NodeKind::SimpleProperty { name, .. } | NodeKind::DerivedProperty { name, .. } => {
                name == field
            }
            _ => false,
        })
    }

    /// Structural comparison. Named tables compare by name with each other
    /// and are expanded when compared against an object type.
    pub fn compare(&self, rdt: &Rdt, a: &TypeDef, b: &TypeDef, scope: ScopeId) -> Compare {
        self.compare_at(rdt, a.effective(), b.effective(), scope, 0)
    }

    fn compare_at(
        &self,
        rdt: &Rdt,
        a: &TypeDef,
        b: &TypeDef,
        scope: ScopeId,
        depth: usize,
    ) -> Compare {
        if depth > MAX_DEPTH {
            return Compare::Undecided;
        }
        let recurse = |x: &TypeDef, y: &TypeDef| {
            self.compare_at(rdt, x.effective(), y.effective(), scope, depth + 1)
        };
        match (a, b) {
            (TypeDef::Unknown, _) | (_, TypeDef::Unknown) => Compare::Undecided,
            (TypeDef::Primitive(x), TypeDef::Primitive(y)) => Compare::from_bool(x == y),
            (TypeDef::Named(x), TypeDef::Named(y)) => Compare::from_bool(x == y),
            (TypeDef::Context(x), TypeDef::Context(y)) => Compare::from_bool(x == y),
            (TypeDef::None, TypeDef::None) => Compare::Equal,
            (TypeDef::Named(name), object @ TypeDef::Object(_))
            | (object @ TypeDef::Object(_), TypeDef::Named(name)) => {
                let Some(def) = self.definition(rdt, name, scope) else {
                    return Compare::Different;
                };
                match rdt.ty(def) {
                    Some(expanded @ TypeDef::Object(_)) => recurse(expanded, object),
                    _ => Compare::Undecided,
                }
            }
            (TypeDef::Object(x), TypeDef::Object(y)) => {
                if x.len() != y.len() || x.keys().zip(y.keys()).any(|(k1, k2)| k1 != k2) {
                    return Compare::Different;
                }
                x.values()
                    .zip(y.values())
                    .fold(Compare::Equal, |acc, (t1, t2)| acc.and(recurse(t1, t2)))
            }
            (TypeDef::Array(x), TypeDef::Array(y)) => recurse(x, y),
            (
                TypeDef::Function {
                    params: p1,
                    returns: r1,
                },
                TypeDef::Function {
                    params: p2,
                    returns: r2,
                },
            ) => {
                if p1.len() != p2.len() {
                    return Compare::Different;
                }
                p1.iter()
                    .zip(p2)
                    .fold(recurse(r1, r2), |acc, ((_, t1), (_, t2))| acc.and(recurse(t1, t2)))
            }
            _ => Compare::Different,
        }
    }
}
