//! Removal of `let` bindings that merely alias another binding.

use rustc_hash::FxHashMap;
use tally_rdt::{walk, Before, Lineage, NodeId, NodeKind, Rdt, Visitor};
use tracing::debug;

use crate::error::ResolveError;

/// Replaces every `let a = b; rest` whose value is a reference with `rest`,
/// and points references to `a` at `b`'s target. Reference ids are kept.
pub fn remove_redundant_references(rdt: &mut Rdt, root: NodeId) -> Result<NodeId, ResolveError> {
    let mut cleanup = Cleanup {
        aliases: FxHashMap::default(),
    };
    let root = walk(rdt, root, &mut cleanup, ())?;
    debug!(removed = cleanup.aliases.len(), "removed redundant bindings");
    Ok(root)
}

struct Cleanup {
    // let binding -> (target, name) it aliases
    aliases: FxHashMap<NodeId, (NodeId, String)>,
}

impl Visitor for Cleanup {
    type State = ();
    type Error = ResolveError;

    fn before(
        &mut self,
        rdt: &mut Rdt,
        node: NodeId,
        _lineage: Lineage<'_>,
        _state: &(),
    ) -> Result<Before<()>, ResolveError> {
        match rdt.kind(node).clone() {
            NodeKind::Let { value, next, .. } => {
                let NodeKind::Reference { target, name } = rdt.kind(value).clone() else {
                    return Ok(Before::keep());
                };
                let alias = self.aliases.get(&target).cloned().unwrap_or((target, name));
                self.aliases.insert(node, alias);
                Ok(Before::replace(next))
            }
            NodeKind::Reference { target, .. } => {
                if let Some((target, name)) = self.aliases.get(&target).cloned() {
                    rdt.node_mut(node).kind = NodeKind::Reference { target, name };
                }
                Ok(Before::keep())
            }
            _ => Ok(Before::keep()),
        }
    }
}
