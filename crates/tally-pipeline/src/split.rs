//! Read/write split of derived properties.
//!
//! Anything a derivation computes without a runtime argument can be
//! computed when the row is written and stored. Those subtrees are hoisted
//! into named intermediates; what remains is evaluated on read.
//!
//! ```text
//! doubleAmount = (rand: number) => $row.amount * 2 + rand
//!   write doubleAmount_int_0 = $row.amount * 2
//!   read  (rand: number) => doubleAmount_int_0 + rand
//! ```

use rustc_hash::FxHashSet;
use tally_rdt::{NodeId, NodeKind, Rdt};
use tracing::{debug, trace};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitSummary {
    pub properties: usize,
    pub writes: usize,
}

/// Splits every derived property under `root`. Properties that are
/// already split are left alone.
pub fn split_read_write(rdt: &mut Rdt, root: NodeId) -> Result<SplitSummary, PipelineError> {
    let mut summary = SplitSummary::default();
    let properties: Vec<(NodeId, String, NodeId)> = rdt
        .descendants(root)
        .into_iter()
        .filter_map(|id| match rdt.kind(id) {
            NodeKind::DerivedProperty { name, derivation }
                if !matches!(rdt.kind(*derivation), NodeKind::ReadWrite { .. }) =>
            {
                Some((id, name.clone(), *derivation))
            }
            _ => None,
        })
        .collect();

    for (property, name, derivation) in properties {
        let mut splitter = Splitter {
            rdt: &mut *rdt,
            property: &name,
            tainted: FxHashSet::default(),
            writes: Vec::new(),
        };
        splitter.mark(derivation);
        let read = if splitter.tainted.contains(&derivation) {
            splitter.hoist_children(derivation);
            derivation
        } else {
            splitter.hoist(derivation)
        };
        let writes = splitter.writes;
        trace!(%property, writes = writes.len(), "split derived property");
        summary.properties += 1;
        summary.writes += writes.len();

        let ty = rdt.ty(read).cloned();
        let split = rdt.alloc(NodeKind::ReadWrite { read, writes });
        if let Some(ty) = ty {
            rdt.set_ty(split, ty);
        }
        rdt.node_mut(property).kind = NodeKind::DerivedProperty {
            name,
            derivation: split,
        };
    }

    debug!(
        properties = summary.properties,
        writes = summary.writes,
        "split derived properties"
    );
    Ok(summary)
}

struct Splitter<'a> {
    rdt: &'a mut Rdt,
    property: &'a str,
    tainted: FxHashSet<NodeId>,
    writes: Vec<(String, NodeId)>,
}

impl Splitter<'_> {
    /// Marks nodes that depend on a runtime argument. Functions count as
    /// runtime; dataset pipelines and reduces never do.
    ///
    /// A `let` stays on the read side once anything names it, so references
    /// to let bindings count as runtime alongside parameters. The bound value
    /// itself may still be hoisted.
    fn mark(&mut self, id: NodeId) -> bool {
        let tainted = match self.rdt.kind(id) {
            NodeKind::Dataset { .. }
            | NodeKind::Pipeline { .. }
            | NodeKind::Filter { .. }
            | NodeKind::Reduce { .. } => false,
            NodeKind::Reference { target, .. } => matches!(
                self.rdt.kind(*target),
                NodeKind::Param { .. } | NodeKind::Let { .. }
            ),
            kind => {
                let mut tainted = matches!(kind, NodeKind::Function { .. });
                let children = kind.children();
                for child in children {
                    tainted |= self.mark(child);
                }
                tainted
            }
        };
        if tainted {
            self.tainted.insert(id);
        }
        tainted
    }

    /// Whether an untainted node is worth storing.
    fn hoistable(&self, id: NodeId) -> bool {
        !matches!(
            self.rdt.kind(id),
            NodeKind::Param { .. }
                | NodeKind::StringLiteral(_)
                | NodeKind::NumberLiteral(_)
                | NodeKind::BooleanLiteral(_)
                | NodeKind::Identifier(_)
                | NodeKind::Function { .. }
                | NodeKind::Reference { .. }
                | NodeKind::Context { .. }
                | NodeKind::Null
        )
    }

    /// Stores `id` as a write and returns the reference that replaces it.
    fn hoist(&mut self, id: NodeId) -> NodeId {
        let name = format!("{}_int_{}", self.property, self.writes.len());
        self.writes.push((name.clone(), id));
        let kind = NodeKind::Reference { target: id, name };
        match self.rdt.ty(id).cloned() {
            Some(ty) => self.rdt.alloc_typed(kind, ty),
            None => self.rdt.alloc(kind),
        }
    }

    /// Visits the children of a tainted node, hoisting every untainted one.
    fn hoist_children(&mut self, id: NodeId) {
        let mut kind = self.rdt.kind(id).clone();
        let mut changed = false;
        for slot in kind.children_mut() {
            let child = *slot;
            if self.tainted.contains(&child) {
                self.hoist_children(child);
            } else if self.hoistable(child) && !self.rdt.is_property_name(child, Some(id)) {
                *slot = self.hoist(child);
                changed = true;
            }
        }
        if changed {
            self.rdt.node_mut(id).kind = kind;
        }
    }
}
