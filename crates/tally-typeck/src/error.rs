use std::fmt;

use tally_common::Span;
use tally_rdt::{BinOp, NodeId, Rdt, StructuralError, TypeDef};

#[derive(Debug, Clone, PartialEq)]
pub enum TypeError {
    Structural(StructuralError),
    /// Both operands of `==`/`!=` must have the same type.
    OperandMismatch {
        node: NodeId,
        op: BinOp,
        lhs: TypeDef,
        rhs: TypeDef,
    },
    /// An operand of the wrong primitive type, e.g. `true + 1`.
    InvalidOperand {
        node: NodeId,
        op: BinOp,
        expected: &'static str,
        found: TypeDef,
    },
    ConditionNotBoolean { node: NodeId, found: TypeDef },
    BranchMismatch {
        node: NodeId,
        then_ty: TypeDef,
        else_ty: TypeDef,
    },
    UnknownField {
        node: NodeId,
        field: String,
        ty: TypeDef,
    },
    NotAnObject { node: NodeId, ty: TypeDef },
    NotAFunction { node: NodeId, ty: TypeDef },
    ArityMismatch {
        node: NodeId,
        expected: usize,
        found: usize,
    },
    ArgumentMismatch {
        node: NodeId,
        index: usize,
        expected: TypeDef,
        found: TypeDef,
    },
    /// An annotation names a table that does not exist.
    UnknownType { node: NodeId, name: String },
    /// `$row` used outside of any table definition.
    ContextOutsideDefinition { node: NodeId },
    UnknownContext { node: NodeId, name: String },
    /// `[]` applied to something that is not a table.
    NotATable { node: NodeId },
    /// An identifier survived name resolution.
    UnresolvedIdentifier { node: NodeId, name: String },
    NoFixedPoint { passes: usize },
    /// A node whose type never became fully known.
    Unresolved {
        node: NodeId,
        kind: &'static str,
        partial: Option<TypeDef>,
    },
}

impl TypeError {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            TypeError::Structural(err) => err.node(),
            TypeError::NoFixedPoint { .. } => None,
            TypeError::OperandMismatch { node, .. }
            | TypeError::InvalidOperand { node, .. }
            | TypeError::ConditionNotBoolean { node, .. }
            | TypeError::BranchMismatch { node, .. }
            | TypeError::UnknownField { node, .. }
            | TypeError::NotAnObject { node, .. }
            | TypeError::NotAFunction { node, .. }
            | TypeError::ArityMismatch { node, .. }
            | TypeError::ArgumentMismatch { node, .. }
            | TypeError::UnknownType { node, .. }
            | TypeError::ContextOutsideDefinition { node }
            | TypeError::UnknownContext { node, .. }
            | TypeError::NotATable { node }
            | TypeError::UnresolvedIdentifier { node, .. }
            | TypeError::Unresolved { node, .. } => Some(*node),
        }
    }

    pub fn span(&self, rdt: &Rdt) -> Option<Span> {
        if let TypeError::Structural(err) = self {
            if let Some(span) = err.span() {
                return Some(span);
            }
        }
        self.node()
            .filter(|n| rdt.contains(*n))
            .and_then(|n| rdt.span(n))
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::Structural(err) => write!(f, "{}", err),
            TypeError::OperandMismatch { op, lhs, rhs, .. } => {
                write!(f, "cannot compare {} with {} using `{}`", lhs, rhs, op)
            }
            TypeError::InvalidOperand {
                op,
                expected,
                found,
                ..
            } => write!(f, "`{}` expects {} operands, found {}", op, expected, found),
            TypeError::ConditionNotBoolean { found, .. } => {
                write!(f, "condition must be boolean, found {}", found)
            }
            TypeError::BranchMismatch {
                then_ty, else_ty, ..
            } => write!(
                f,
                "branches have different types: {} and {}",
                then_ty, else_ty
            ),
            TypeError::UnknownField { field, ty, .. } => {
                write!(f, "no field `{}` on type {}", field, ty)
            }
            TypeError::NotAnObject { ty, .. } => {
                write!(f, "type {} has no fields", ty)
            }
            TypeError::NotAFunction { ty, .. } => {
                write!(f, "type {} is not a function", ty)
            }
            TypeError::ArityMismatch {
                expected, found, ..
            } => write!(
                f,
                "expected {} argument(s), found {}",
                expected, found
            ),
            TypeError::ArgumentMismatch {
                index,
                expected,
                found,
                ..
            } => write!(
                f,
                "argument {} expected {}, found {}",
                index + 1,
                expected,
                found
            ),
            TypeError::UnknownType { name, .. } => write!(f, "unknown type `{}`", name),
            TypeError::ContextOutsideDefinition { .. } => {
                write!(f, "`$row` used outside of a table definition")
            }
            TypeError::UnknownContext { name, .. } => {
                write!(f, "unknown context value `${}`", name)
            }
            TypeError::NotATable { .. } => write!(f, "`[]` can only be applied to a table"),
            TypeError::UnresolvedIdentifier { name, .. } => {
                write!(f, "`{}` was never resolved", name)
            }
            TypeError::NoFixedPoint { passes } => {
                write!(f, "types did not settle after {} passes", passes)
            }
            TypeError::Unresolved { kind, partial, .. } => match partial {
                Some(ty) => write!(f, "could not infer the type of this {} (got {})", kind, ty),
                None => write!(f, "could not infer the type of this {}", kind),
            },
        }
    }
}

impl std::error::Error for TypeError {}

impl From<StructuralError> for TypeError {
    fn from(err: StructuralError) -> Self {
        TypeError::Structural(err)
    }
}
