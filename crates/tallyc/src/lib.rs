//! The Tally compilation session.
//!
//! [`compile`] drives a parsed program through the phases in order and
//! stops after the stage named by the options:
//!
//! ```text
//! lower -> resolve -> type -> recognize pipelines -> split read/write
//! ```
//!
//! Each stage leaves a complete tree behind, so a [`Compilation`] stopped
//! early is as usable as a finished one.

pub mod error;
pub mod options;

use std::fmt;

use serde::{Deserialize, Serialize};
use tally_ast::Program;
use tally_pipeline::{recognize_pipelines, split_read_write, PipelineSummary, SplitSummary};
use tally_rdt::lower::lower_program;
use tally_rdt::pretty::render_root;
use tally_rdt::{NodeId, NodeKind, Rdt, ScopeMap, Scopes};
use tally_resolve::resolve;
use tally_typeck::{resolve_types, TypeEnv};
use tracing::{debug, info_span};

pub use error::CompileError;
pub use options::CompileOptions;

use error::PhaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Lowered,
    Resolved,
    Typed,
    Pipelines,
    Split,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Lowered => "lowered",
            Stage::Resolved => "resolved",
            Stage::Typed => "typed",
            Stage::Pipelines => "pipelines",
            Stage::Split => "split",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The state of a program after the last stage that ran.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub rdt: Rdt,
    pub root: NodeId,
    /// Empty until the program is resolved.
    pub scopes: Scopes,
    pub scope_map: ScopeMap,
    pub stage: Stage,
    pub type_passes: Option<usize>,
    pub pipelines: Option<PipelineSummary>,
    pub split: Option<SplitSummary>,
}

/// Compiles `program` up to `options.last_stage()`.
pub fn compile(program: &Program, options: &CompileOptions) -> Result<Compilation, CompileError> {
    let _span = info_span!("compile", target = %options.target).entered();
    let lowered = lower_program(program)?;
    let mut compilation = Compilation {
        rdt: lowered.rdt,
        root: lowered.root,
        scopes: Scopes::new(),
        scope_map: ScopeMap::new(),
        stage: Stage::Lowered,
        type_passes: None,
        pipelines: None,
        split: None,
    };
    let last = options.last_stage();
    while compilation.stage < last {
        compilation.advance(options)?;
        debug!(stage = %compilation.stage, nodes = compilation.rdt.len(), "stage complete");
    }
    Ok(compilation)
}

impl Compilation {
    /// Runs the stage after the current one.
    fn advance(&mut self, options: &CompileOptions) -> Result<(), CompileError> {
        self.stage = match self.stage {
            Stage::Lowered => {
                let resolution = resolve(&mut self.rdt, self.root).map_err(|e| e.locate(&self.rdt))?;
                self.root = resolution.root;
                self.scopes = resolution.scopes;
                self.scope_map = resolution.scope_map;
                Stage::Resolved
            }
            Stage::Resolved => {
                let env = TypeEnv::new(&self.scopes, &self.scope_map);
                let summary = resolve_types(&mut self.rdt, self.root, &env, options.max_type_iterations)
                    .map_err(|e| e.locate(&self.rdt))?;
                self.type_passes = Some(summary.passes);
                Stage::Typed
            }
            Stage::Typed => {
                let summary =
                    recognize_pipelines(&mut self.rdt, self.root).map_err(|e| e.locate(&self.rdt))?;
                self.pipelines = Some(summary);
                Stage::Pipelines
            }
            Stage::Pipelines => {
                let summary =
                    split_read_write(&mut self.rdt, self.root).map_err(|e| e.locate(&self.rdt))?;
                self.split = Some(summary);
                Stage::Split
            }
            Stage::Split => Stage::Split,
        };
        Ok(())
    }

    /// The tree rendered one top-level item per line.
    pub fn render(&self) -> String {
        render_root(&self.rdt, self.root)
    }

    /// Finds `table.property`, a simple or derived property of a definition.
    pub fn property(&self, table: &str, property: &str) -> Option<NodeId> {
        let NodeKind::Root { definitions, .. } = self.rdt.kind(self.root) else {
            return None;
        };
        let properties = definitions.iter().find_map(|&def| match self.rdt.kind(def) {
            NodeKind::Definition { name, properties } if name == table => Some(properties),
            _ => None,
        })?;
        properties.iter().copied().find(|&id| match self.rdt.kind(id) {
            NodeKind::SimpleProperty { name, .. } | NodeKind::DerivedProperty { name, .. } => {
                name == property
            }
            _ => false,
        })
    }

    /// The derivation of a derived property, after whatever stage ran.
    pub fn derivation(&self, table: &str, property: &str) -> Option<NodeId> {
        match self.rdt.kind(self.property(table, property)?) {
            NodeKind::DerivedProperty { derivation, .. } => Some(*derivation),
            _ => None,
        }
    }
}
