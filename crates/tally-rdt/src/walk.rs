//! Depth-first traversal with rewrite hooks.
//!
//! [`walk`] visits every node reachable through owned child slots. For each
//! node it calls [`Visitor::before`], walks the children, then calls
//! [`Visitor::after`]:
//!
//! - `before` may hand back a replacement node and/or a new state for the
//!   subtree. A replacement with a *different* id is walked from the start
//!   in place of the original, so its own `before` fires. Returning the same
//!   id means the node was rewritten in place and traversal continues into
//!   its (possibly new) children.
//! - Children are walked left to right in the order of
//!   [`NodeKind::children`]. A child that comes back with a different id is
//!   written into the parent's slot.
//! - `after` may return a replacement which is substituted as-is; it is not
//!   traversed again.
//!
//! Hooks receive the [`Lineage`] of the node: its ancestors, nearest first.
//! Hooks must only rewrite the node they were handed; the parent's slots are
//! owned by the walker while its children are in flight.

use crate::error::StructuralError;
use crate::node::{NodeId, NodeKind, Rdt};

/// Ancestors of the node being visited.
#[derive(Debug, Clone, Copy)]
pub struct Lineage<'a> {
    // Root first; iteration reverses it.
    stack: &'a [NodeId],
}

impl<'a> Lineage<'a> {
    /// Wraps a root-first stack of ancestors.
    pub fn new(stack: &'a [NodeId]) -> Self {
        Lineage { stack }
    }

    /// The nearest ancestor. `None` at the root of the walk.
    pub fn parent(&self) -> Option<NodeId> {
        self.stack.last().copied()
    }

    /// Ancestors nearest first.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + 'a {
        self.stack.iter().rev().copied()
    }

    /// The `n`th ancestor, 0 being the parent.
    pub fn nth(&self, n: usize) -> Option<NodeId> {
        self.stack.len().checked_sub(n + 1).map(|i| self.stack[i])
    }

    /// Depth of the node being visited.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Ancestors nearest first, collected.
    pub fn to_vec(&self) -> Vec<NodeId> {
        self.iter().collect()
    }
}

/// Result of a `before` hook.
#[derive(Debug)]
pub struct Before<S> {
    pub replacement: Option<NodeId>,
    pub state: Option<S>,
}

impl<S> Before<S> {
    /// Leave the node and state as they are.
    pub fn keep() -> Self {
        Before {
            replacement: None,
            state: None,
        }
    }

    /// Stand `id` in place of the node. A different id is walked from the
    /// start; the node's own id means it was rewritten in place.
    pub fn replace(id: NodeId) -> Self {
        Before {
            replacement: Some(id),
            state: None,
        }
    }

    /// Walk the subtree under `state`.
    pub fn with_state(state: S) -> Self {
        Before {
            replacement: None,
            state: Some(state),
        }
    }
}

pub trait Visitor {
    /// Inherited, top-down state. Each subtree sees the state its nearest
    /// ancestor's `before` produced.
    type State: Clone;
    type Error: From<StructuralError>;

    fn before(
        &mut self,
        _rdt: &mut Rdt,
        _node: NodeId,
        _lineage: Lineage<'_>,
        _state: &Self::State,
    ) -> Result<Before<Self::State>, Self::Error> {
        Ok(Before::keep())
    }

    fn after(
        &mut self,
        _rdt: &mut Rdt,
        _node: NodeId,
        _lineage: Lineage<'_>,
        _state: &Self::State,
    ) -> Result<Option<NodeId>, Self::Error> {
        Ok(None)
    }
}

/// Walks the tree at `root` and returns the id that now stands in its place.
pub fn walk<V: Visitor>(
    rdt: &mut Rdt,
    root: NodeId,
    visitor: &mut V,
    state: V::State,
) -> Result<NodeId, V::Error> {
    let mut walker = Walker {
        rdt,
        visitor,
        lineage: Vec::new(),
    };
    walker.visit(root, &state)
}

struct Walker<'a, V: Visitor> {
    rdt: &'a mut Rdt,
    visitor: &'a mut V,
    lineage: Vec<NodeId>,
}

impl<V: Visitor> Walker<'_, V> {
    fn visit(&mut self, id: NodeId, state: &V::State) -> Result<NodeId, V::Error> {
        self.rdt.try_node(id)?;
        let outcome = self
            .visitor
            .before(self.rdt, id, Lineage::new(&self.lineage), state)?;

        let inherited;
        let state = match outcome.state {
            Some(s) => {
                inherited = s;
                &inherited
            }
            None => state,
        };

        if let Some(replacement) = outcome.replacement {
            if replacement != id {
                return self.visit(replacement, state);
            }
        }

        self.lineage.push(id);
        let children = self.visit_children(id, state);
        self.lineage.pop();
        children?;

        let replacement = self
            .visitor
            .after(self.rdt, id, Lineage::new(&self.lineage), state)?;
        Ok(replacement.unwrap_or(id))
    }

    fn slot(
        &mut self,
        child: &mut NodeId,
        state: &V::State,
        changed: &mut bool,
    ) -> Result<(), V::Error> {
        let next = self.visit(*child, state)?;
        if next != *child {
            *child = next;
            *changed = true;
        }
        Ok(())
    }

    fn slots(
        &mut self,
        children: &mut [NodeId],
        state: &V::State,
        changed: &mut bool,
    ) -> Result<(), V::Error> {
        for child in children {
            self.slot(child, state, changed)?;
        }
        Ok(())
    }

    fn visit_children(&mut self, id: NodeId, state: &V::State) -> Result<(), V::Error> {
        let mut kind = self.rdt.node(id).kind.clone();
        let mut changed = false;
        let c = &mut changed;

        match &mut kind {
            NodeKind::Root {
                definitions,
                assignments,
                expressions,
            } => {
                self.slots(definitions, state, c)?;
                self.slots(assignments, state, c)?;
                self.slot(expressions, state, c)?;
            }
            NodeKind::Definition { properties, .. } => self.slots(properties, state, c)?,
            NodeKind::DerivedProperty { derivation, .. } => self.slot(derivation, state, c)?,
            NodeKind::ReadWrite { read, writes } => {
                for (_, write) in writes.iter_mut() {
                    self.slot(write, state, c)?;
                }
                self.slot(read, state, c)?;
            }
            NodeKind::Assignment { value, .. } => self.slot(value, state, c)?,
            NodeKind::BinaryOp { lhs, rhs, .. } => {
                self.slot(lhs, state, c)?;
                self.slot(rhs, state, c)?;
            }
            NodeKind::PropertyAccess { source, property } => {
                self.slot(source, state, c)?;
                self.slot(property, state, c)?;
            }
            NodeKind::Function { params, body, .. } => {
                self.slots(params, state, c)?;
                self.slot(body, state, c)?;
            }
            NodeKind::Invoke { callee, args } => {
                self.slot(callee, state, c)?;
                self.slots(args, state, c)?;
            }
            NodeKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                self.slot(condition, state, c)?;
                self.slot(then_branch, state, c)?;
                self.slot(else_branch, state, c)?;
            }
            NodeKind::Let { value, next, .. } => {
                self.slot(value, state, c)?;
                self.slot(next, state, c)?;
            }
            NodeKind::SideEffect { expr, next } => {
                self.slot(expr, state, c)?;
                self.slot(next, state, c)?;
            }
            NodeKind::ArrayMarker { operand } => self.slot(operand, state, c)?,
            NodeKind::Filter { predicate } => self.slot(predicate, state, c)?,
            NodeKind::Pipeline { source, stages } => {
                self.slot(source, state, c)?;
                self.slots(stages, state, c)?;
            }
            NodeKind::Intent { source, .. } => self.slot(source, state, c)?,
            NodeKind::Reduce {
                source,
                initial,
                forward,
                inverse,
                view,
            } => {
                self.slot(source, state, c)?;
                self.slot(initial, state, c)?;
                self.slot(forward, state, c)?;
                self.slot(inverse, state, c)?;
                self.slot(view, state, c)?;
            }
            NodeKind::SimpleProperty { .. }
            | NodeKind::StringLiteral(_)
            | NodeKind::NumberLiteral(_)
            | NodeKind::BooleanLiteral(_)
            | NodeKind::Identifier(_)
            | NodeKind::Context { .. }
            | NodeKind::Param { .. }
            | NodeKind::Null
            | NodeKind::Reference { .. }
            | NodeKind::Dataset { .. } => {}
        }

        if changed {
            self.rdt.node_mut(id).kind = kind;
        }
        Ok(())
    }
}
