//! Recognition of dataset pipelines in a typed tree.
//!
//! ```text
//! Transaction[]                     -> Dataset
//! <dataset or pipeline>.filter      -> Intent(filter)
//! Intent(filter)(row => ...)        -> Pipeline { source, stages + Filter }
//! Intent(reduce)((acc, row) => ...) -> Reduce (via inversion)
//! Intent(include)(row => ...)       -> Reduce of (acc, row) => acc || ...
//! ```

use rustc_hash::FxHashMap;
use tally_rdt::{
    walk, BinOp, Lineage, NodeId, NodeKind, PipelineOp, Rdt, Retarget, TypeDef, Visitor,
};
use tracing::{debug, trace};

use crate::error::PipelineError;
use crate::invert::invert_reduce;

/// Counts of what [`recognize_pipelines`] built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub datasets: usize,
    pub filters: usize,
    pub reduces: usize,
}

/// Rewrites every dataset expression under `root` into dataset, pipeline
/// and reduce nodes. The tree must be typed.
pub fn recognize_pipelines(rdt: &mut Rdt, root: NodeId) -> Result<PipelineSummary, PipelineError> {
    let mut recognizer = Recognizer {
        summary: PipelineSummary::default(),
    };
    let root = walk(rdt, root, &mut recognizer, ())?;

    let dangling = rdt
        .descendants(root)
        .into_iter()
        .find_map(|id| match rdt.kind(id) {
            NodeKind::Intent { op, .. } => Some((id, *op)),
            _ => None,
        });
    if let Some((node, op)) = dangling {
        return Err(PipelineError::DanglingIntent { node, op });
    }

    let summary = recognizer.summary;
    debug!(
        datasets = summary.datasets,
        filters = summary.filters,
        reduces = summary.reduces,
        "recognized pipelines"
    );
    Ok(summary)
}

struct Recognizer {
    summary: PipelineSummary,
}

impl Visitor for Recognizer {
    type State = ();
    type Error = PipelineError;

    fn after(
        &mut self,
        rdt: &mut Rdt,
        node: NodeId,
        _lineage: Lineage<'_>,
        _state: &(),
    ) -> Result<Option<NodeId>, PipelineError> {
        match rdt.kind(node).clone() {
            NodeKind::ArrayMarker { operand } => self.dataset(rdt, node, operand).map(Some),
            NodeKind::PropertyAccess { source, property } => {
                Self::intent(rdt, node, source, property)
            }
            NodeKind::Invoke { callee, args } => match rdt.kind(callee).clone() {
                NodeKind::Intent { op, source } => {
                    self.invoke(rdt, node, op, source, &args).map(Some)
                }
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }
}

impl Recognizer {
    fn dataset(&mut self, rdt: &mut Rdt, node: NodeId, operand: NodeId) -> Result<NodeId, PipelineError> {
        let definition = match rdt.kind(operand) {
            NodeKind::Reference { target, .. } => *target,
            _ => return Err(PipelineError::DatasetOfNonTable { node }),
        };
        let NodeKind::Definition { name, .. } = rdt.kind(definition) else {
            return Err(PipelineError::DatasetOfNonTable { node });
        };
        let kind = NodeKind::Dataset {
            name: name.clone(),
            definition,
        };
        let span = rdt.span(node);
        let dataset = retyped(rdt, kind, node);
        rdt.node_mut(dataset).span = span;
        self.summary.datasets += 1;
        trace!(%dataset, table = %definition, "recognized dataset");
        Ok(dataset)
    }

    fn intent(
        rdt: &mut Rdt,
        node: NodeId,
        source: NodeId,
        property: NodeId,
    ) -> Result<Option<NodeId>, PipelineError> {
        match rdt.kind(source) {
            NodeKind::Dataset { .. } | NodeKind::Pipeline { .. } => {}
            NodeKind::Reduce { .. } => return Err(PipelineError::ChainAfterReduce { node }),
            _ => return Ok(None),
        }
        let name = rdt.identifier(property).unwrap_or_default().to_string();
        let op = PipelineOp::from_member(&name)
            .ok_or(PipelineError::UnsupportedMember { node, name })?;
        let span = rdt.span(node);
        let intent = rdt.alloc_spanned(NodeKind::Intent { op, source }, span);
        Ok(Some(intent))
    }

    fn invoke(
        &mut self,
        rdt: &mut Rdt,
        node: NodeId,
        op: PipelineOp,
        source: NodeId,
        args: &[NodeId],
    ) -> Result<NodeId, PipelineError> {
        let expected = match op {
            PipelineOp::Filter | PipelineOp::Include => 1,
            PipelineOp::Reduce => 2,
        };
        if args.len() != expected {
            return Err(PipelineError::ArgumentCount {
                node,
                op,
                expected,
                found: args.len(),
            });
        }
        let function = args[0];
        let params = match rdt.kind(function) {
            NodeKind::Function { params, .. } => params.clone(),
            _ => {
                return Err(PipelineError::ArgumentShape {
                    node: function,
                    op,
                    position: 0,
                    expected: "a lambda",
                })
            }
        };

        let result = match op {
            PipelineOp::Filter => {
                require_predicate(op, function, &params)?;
                self.filter(rdt, node, source, function)
            }
            PipelineOp::Include => {
                require_predicate(op, function, &params)?;
                let fold = any_row_fold(rdt, function, params[0]);
                let initial = rdt.alloc_typed(NodeKind::BooleanLiteral(false), TypeDef::boolean());
                self.summary.reduces += 1;
                invert_reduce(rdt, fold, source, initial)?
            }
            PipelineOp::Reduce => {
                if params.len() != 2 {
                    return Err(PipelineError::ReducerParameterCount {
                        node: function,
                        found: params.len(),
                    });
                }
                self.summary.reduces += 1;
                invert_reduce(rdt, function, source, args[1])?
            }
        };
        if rdt.span(result).is_none() {
            let span = rdt.span(node);
            rdt.node_mut(result).span = span;
        }
        Ok(result)
    }

    /// Appends a filter stage, starting a pipeline on a bare dataset.
    fn filter(&mut self, rdt: &mut Rdt, node: NodeId, source: NodeId, predicate: NodeId) -> NodeId {
        let stage = rdt.alloc(NodeKind::Filter { predicate });
        if let Some(ty) = rdt.ty(predicate).cloned() {
            rdt.set_ty(stage, ty);
        }
        let (source, mut stages) = match rdt.kind(source) {
            NodeKind::Pipeline { source, stages } => (*source, stages.clone()),
            _ => (source, Vec::new()),
        };
        stages.push(stage);
        self.summary.filters += 1;
        retyped(rdt, NodeKind::Pipeline { source, stages }, node)
    }
}

fn require_predicate(op: PipelineOp, function: NodeId, params: &[NodeId]) -> Result<(), PipelineError> {
    if params.len() == 1 {
        return Ok(());
    }
    Err(PipelineError::ArgumentShape {
        node: function,
        op,
        position: 0,
        expected: "a lambda of one row",
    })
}

/// Allocates `kind` carrying the type of `like`.
fn retyped(rdt: &mut Rdt, kind: NodeKind, like: NodeId) -> NodeId {
    match rdt.ty(like).cloned() {
        Some(ty) => rdt.alloc_typed(kind, ty),
        None => rdt.alloc(kind),
    }
}

/// `row => p` becomes `(acc: boolean, row) => acc || p`.
fn any_row_fold(rdt: &mut Rdt, predicate: NodeId, param: NodeId) -> NodeId {
    let row_ty = rdt.ty(param).cloned().unwrap_or(TypeDef::Unknown);
    let boolean = TypeDef::boolean();

    let acc = rdt.alloc_typed(
        NodeKind::Param {
            name: "acc".into(),
            annotation: Some(boolean.clone()),
        },
        boolean.clone(),
    );
    let row = rdt.alloc_typed(
        NodeKind::Param {
            name: "row".into(),
            annotation: Some(row_ty.clone()),
        },
        row_ty.clone(),
    );

    let body = match rdt.kind(predicate) {
        NodeKind::Function { body, .. } => *body,
        _ => predicate,
    };
    let mut retarget = FxHashMap::default();
    retarget.insert(
        param,
        Retarget {
            target: row,
            name: "row".into(),
        },
    );
    let matched = rdt.deep_copy(body, &retarget);
    let acc_ref = rdt.alloc_typed(
        NodeKind::Reference {
            target: acc,
            name: "acc".into(),
        },
        boolean.clone(),
    );
    let fold_body = rdt.alloc_typed(
        NodeKind::BinaryOp {
            op: BinOp::Or,
            lhs: acc_ref,
            rhs: matched,
        },
        boolean.clone(),
    );
    let signature = vec![("acc".to_string(), boolean.clone()), ("row".to_string(), row_ty)];
    let fold = rdt.alloc_typed(
        NodeKind::Function {
            name: None,
            params: vec![acc, row],
            body: fold_body,
        },
        TypeDef::function(signature, boolean),
    );
    let span = rdt.span(predicate);
    rdt.node_mut(fold).span = span;
    fold
}
