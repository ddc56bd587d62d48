//! The error type of a compilation, one variant per phase.

use std::fmt;

use tally_common::{LineIndex, Span};
use tally_pipeline::PipelineError;
use tally_rdt::{Rdt, StructuralError};
use tally_resolve::ResolveError;
use tally_typeck::diagnostics::{error_code, render_report};
use tally_typeck::TypeError;

/// A failed compilation. Phase errors name nodes of an arena the caller
/// never sees, so the driver resolves each error's span while the arena is
/// still alive.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    Structural(StructuralError),
    Resolve {
        error: ResolveError,
        span: Option<Span>,
    },
    Type {
        error: TypeError,
        span: Option<Span>,
    },
    Pipeline {
        error: PipelineError,
        span: Option<Span>,
    },
}

impl CompileError {
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Structural(err) => err.span(),
            CompileError::Resolve { span, .. }
            | CompileError::Type { span, .. }
            | CompileError::Pipeline { span, .. } => *span,
        }
    }

    /// Stable error code for the variant.
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::Structural(_) => "E0001",
            CompileError::Resolve { error, .. } => match error {
                ResolveError::Structural(_) => "E0001",
                ResolveError::UnresolvedName { .. } => "E0201",
                ResolveError::DuplicateBinding { .. } => "E0202",
            },
            CompileError::Type { error, .. } => error_code(error),
            CompileError::Pipeline { error, .. } => pipeline_code(error),
        }
    }

    /// Renders the error as an ariadne report against `source`.
    pub fn render(&self, source: &str, filename: &str) -> String {
        render_report(
            self.code(),
            &self.to_string(),
            self.span(),
            None,
            source,
            filename,
        )
    }

    /// One-line `file:line:col: error[code]: message` form.
    pub fn short(&self, source: &str, filename: &str) -> String {
        match self.span() {
            Some(span) => {
                let (line, col) = LineIndex::new(source).line_col(span.start);
                format!("{}:{}:{}: error[{}]: {}", filename, line, col, self.code(), self)
            }
            None => format!("{}: error[{}]: {}", filename, self.code(), self),
        }
    }
}

fn pipeline_code(err: &PipelineError) -> &'static str {
    match err {
        PipelineError::Structural(_) => "E0001",
        PipelineError::DatasetOfNonTable { .. } => "E0301",
        PipelineError::UnsupportedMember { .. } => "E0302",
        PipelineError::ChainAfterReduce { .. } => "E0303",
        PipelineError::ArgumentCount { .. } | PipelineError::ArgumentShape { .. } => "E0304",
        PipelineError::ReducerParameterCount { .. } => "E0305",
        PipelineError::AccumulatorUnused { .. } => "E0306",
        PipelineError::AccumulatorReused { .. } => "E0307",
        PipelineError::NonInvertibleOperator { .. } => "E0308",
        PipelineError::UnsupportedReturnType { .. } => "E0309",
        PipelineError::BooleanWithoutOperator { .. } | PipelineError::MixedBooleanChain { .. } => {
            "E0310"
        }
        PipelineError::DanglingIntent { .. } => "E0311",
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Structural(err) => write!(f, "{}", err),
            CompileError::Resolve { error, .. } => write!(f, "{}", error),
            CompileError::Type { error, .. } => write!(f, "{}", error),
            CompileError::Pipeline { error, .. } => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Structural(err) => Some(err),
            CompileError::Resolve { error, .. } => Some(error),
            CompileError::Type { error, .. } => Some(error),
            CompileError::Pipeline { error, .. } => Some(error),
        }
    }
}

impl From<StructuralError> for CompileError {
    fn from(err: StructuralError) -> Self {
        CompileError::Structural(err)
    }
}

/// A phase error whose span can be looked up in the arena it refers to.
pub(crate) trait PhaseError: Sized {
    fn locate(self, rdt: &Rdt) -> CompileError;
}

impl PhaseError for ResolveError {
    fn locate(self, rdt: &Rdt) -> CompileError {
        let span = self.span(rdt);
        CompileError::Resolve { error: self, span }
    }
}

impl PhaseError for TypeError {
    fn locate(self, rdt: &Rdt) -> CompileError {
        let span = self.span(rdt);
        CompileError::Type { error: self, span }
    }
}

impl PhaseError for PipelineError {
    fn locate(self, rdt: &Rdt) -> CompileError {
        let span = self.span(rdt);
        CompileError::Pipeline { error: self, span }
    }
}
