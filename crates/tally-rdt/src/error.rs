use std::fmt;

use tally_common::Span;

use crate::node::NodeId;

/// A malformed tree: something no well-formed program lowers to.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralError {
    /// A child or reference id that does not exist in the arena.
    DanglingNode(NodeId),
    /// `return` appeared before the end of its block.
    ReturnNotLast { span: Option<Span> },
    /// `let` used outside of a block.
    LetOutsideBlock { span: Option<Span> },
    /// A context type such as `$row` used as a column annotation.
    ContextTypeOnProperty { name: String, span: Option<Span> },
    /// A node of the wrong variant where a specific shape is required.
    UnexpectedNode {
        node: NodeId,
        expected: &'static str,
        found: &'static str,
    },
}

impl StructuralError {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            StructuralError::DanglingNode(id) => Some(*id),
            StructuralError::UnexpectedNode { node, .. } => Some(*node),
            StructuralError::ReturnNotLast { .. }
            | StructuralError::LetOutsideBlock { .. }
            | StructuralError::ContextTypeOnProperty { .. } => None,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            StructuralError::ReturnNotLast { span }
            | StructuralError::LetOutsideBlock { span }
            | StructuralError::ContextTypeOnProperty { span, .. } => *span,
            StructuralError::DanglingNode(_) | StructuralError::UnexpectedNode { .. } => None,
        }
    }
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::DanglingNode(id) => write!(f, "node {} does not exist", id),
            StructuralError::ReturnNotLast { .. } => {
                write!(f, "`return` must be the last expression in its block")
            }
            StructuralError::LetOutsideBlock { .. } => {
                write!(f, "`let` is only allowed inside a block")
            }
            StructuralError::ContextTypeOnProperty { name, .. } => {
                write!(f, "property `{}` cannot be annotated with a context type", name)
            }
            StructuralError::UnexpectedNode {
                node,
                expected,
                found,
            } => write!(f, "expected {} at {}, found {}", expected, node, found),
        }
    }
}

impl std::error::Error for StructuralError {}
