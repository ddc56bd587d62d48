use std::fmt;

use tally_common::Span;
use tally_rdt::{NodeId, Rdt, StructuralError};

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    Structural(StructuralError),
    /// An identifier with no binding in any enclosing scope.
    UnresolvedName { name: String, node: NodeId },
    /// A name bound twice in the same scope.
    DuplicateBinding {
        name: String,
        node: NodeId,
        existing: NodeId,
    },
}

impl ResolveError {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            ResolveError::Structural(err) => err.node(),
            ResolveError::UnresolvedName { node, .. }
            | ResolveError::DuplicateBinding { node, .. } => Some(*node),
        }
    }

    pub fn span(&self, rdt: &Rdt) -> Option<Span> {
        match self {
            ResolveError::Structural(err) => err
                .span()
                .or_else(|| err.node().filter(|n| rdt.contains(*n)).and_then(|n| rdt.span(n))),
            _ => self.node().and_then(|n| rdt.span(n)),
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Structural(err) => write!(f, "{}", err),
            ResolveError::UnresolvedName { name, .. } => {
                write!(f, "cannot find `{}` in this scope", name)
            }
            ResolveError::DuplicateBinding { name, .. } => {
                write!(f, "`{}` is already defined in this scope", name)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<StructuralError> for ResolveError {
    fn from(err: StructuralError) -> Self {
        ResolveError::Structural(err)
    }
}
