use std::fmt;

use tally_common::Span;
use tally_rdt::{NodeId, PipelineOp, Rdt, StructuralError, TypeDef};

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    Structural(StructuralError),
    /// `x[]` where `x` is not a table.
    DatasetOfNonTable { node: NodeId },
    /// A member other than `filter`, `include` or `reduce` on a dataset.
    UnsupportedMember { node: NodeId, name: String },
    /// `reduce` ends a pipeline; nothing may be chained after it.
    ChainAfterReduce { node: NodeId },
    ArgumentCount {
        node: NodeId,
        op: PipelineOp,
        expected: usize,
        found: usize,
    },
    /// The argument in `position` is not a lambda of the right shape.
    ArgumentShape {
        node: NodeId,
        op: PipelineOp,
        position: usize,
        expected: &'static str,
    },
    ReducerParameterCount { node: NodeId, found: usize },
    /// The reducer ignores its accumulator, so nothing can be maintained.
    AccumulatorUnused { node: NodeId },
    AccumulatorReused { node: NodeId, count: usize },
    /// Something other than an invertible operator sits between the
    /// accumulator and the result.
    NonInvertibleOperator { node: NodeId, found: String },
    UnsupportedReturnType { node: NodeId, ty: Option<TypeDef> },
    /// A boolean reducer that returns its accumulator unchanged.
    BooleanWithoutOperator { node: NodeId },
    /// Both `&&` and `||` on the accumulator path.
    MixedBooleanChain { node: NodeId },
    /// A pipeline member accessed but never called.
    DanglingIntent { node: NodeId, op: PipelineOp },
}

impl PipelineError {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            PipelineError::Structural(err) => err.node(),
            PipelineError::DatasetOfNonTable { node }
            | PipelineError::UnsupportedMember { node, .. }
            | PipelineError::ChainAfterReduce { node }
            | PipelineError::ArgumentCount { node, .. }
            | PipelineError::ArgumentShape { node, .. }
            | PipelineError::ReducerParameterCount { node, .. }
            | PipelineError::AccumulatorUnused { node }
            | PipelineError::AccumulatorReused { node, .. }
            | PipelineError::NonInvertibleOperator { node, .. }
            | PipelineError::UnsupportedReturnType { node, .. }
            | PipelineError::BooleanWithoutOperator { node }
            | PipelineError::MixedBooleanChain { node }
            | PipelineError::DanglingIntent { node, .. } => Some(*node),
        }
    }

    pub fn span(&self, rdt: &Rdt) -> Option<Span> {
        if let PipelineError::Structural(err) = self {
            if let Some(span) = err.span() {
                return Some(span);
            }
        }
        self.node()
            .filter(|n| rdt.contains(*n))
            .and_then(|n| rdt.span(n))
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Structural(err) => write!(f, "{}", err),
            PipelineError::DatasetOfNonTable { .. } => {
                write!(f, "`[]` can only be applied to a table")
            }
            PipelineError::UnsupportedMember { name, .. } => write!(
                f,
                "`{}` is not a dataset operation; expected filter, include or reduce",
                name
            ),
            PipelineError::ChainAfterReduce { .. } => {
                write!(f, "nothing can be chained after `reduce`")
            }
            PipelineError::ArgumentCount {
                op,
                expected,
                found,
                ..
            } => write!(
                f,
                "`{}` takes {} argument(s), found {}",
                op.name(),
                expected,
                found
            ),
            PipelineError::ArgumentShape {
                op,
                position,
                expected,
                ..
            } => write!(
                f,
                "argument {} of `{}` must be {}",
                position + 1,
                op.name(),
                expected
            ),
            PipelineError::ReducerParameterCount { found, .. } => write!(
                f,
                "a reducer takes an accumulator and a row, found {} parameter(s)",
                found
            ),
            PipelineError::AccumulatorUnused { .. } => write!(
                f,
                "reducer never uses its accumulator; information reducing folds are not supported"
            ),
            PipelineError::AccumulatorReused { count, .. } => write!(
                f,
                "reducer uses its accumulator {} times; it must be used exactly once",
                count
            ),
            PipelineError::NonInvertibleOperator { found, .. } => {
                write!(f, "cannot invert the reducer through {}", found)
            }
            PipelineError::UnsupportedReturnType { ty, .. } => match ty {
                Some(ty) => write!(f, "cannot maintain a reducer returning {}", ty),
                None => write!(f, "cannot maintain a reducer of unknown type"),
            },
            PipelineError::BooleanWithoutOperator { .. } => write!(
                f,
                "a boolean reducer must combine its accumulator with `||` or `&&`"
            ),
            PipelineError::MixedBooleanChain { .. } => write!(
                f,
                "a boolean reducer may use only `||` or only `&&` on its accumulator"
            ),
            PipelineError::DanglingIntent { op, .. } => {
                write!(f, "`{}` must be called", op.name())
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<StructuralError> for PipelineError {
    fn from(err: StructuralError) -> Self {
        PipelineError::Structural(err)
    }
}
