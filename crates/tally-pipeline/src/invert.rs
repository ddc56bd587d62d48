//! Reducer inversion.
//!
//! A fold `(acc, row) => body` is turned into three functions that share
//! one accumulator representation:
//!
//! ```text
//! forward(accCur, newRow)  -> accNext    fold a row in
//! inverse(accNext, oldRow) -> accCur     take a row back out
//! view(accCur)             -> value      what readers see
//! ```
//!
//! The accumulator must appear exactly once in the body and every node on
//! the path from the body down to it must be an invertible operator. For
//! numeric folds the inverse is solved operator by operator, outermost
//! first. Boolean folds over a pure `||` or `&&` chain are maintained as a
//! count of matching (or failing) rows.

use rustc_hash::FxHashMap;
use tally_rdt::{BinOp, NodeId, NodeKind, Primitive, Rdt, Retarget, StructuralError, TypeDef};
use tracing::trace;

use crate::error::PipelineError;

/// Replaces `fold` with a [`NodeKind::Reduce`] over `source` starting
/// from `initial`. Returns the new reduce node.
pub fn invert_reduce(
    rdt: &mut Rdt,
    fold: NodeId,
    source: NodeId,
    initial: NodeId,
) -> Result<NodeId, PipelineError> {
    let (acc, row, body) = match rdt.kind(fold) {
        NodeKind::Function { params, body, .. } if params.len() == 2 => {
            (params[0], params[1], *body)
        }
        NodeKind::Function { params, .. } => {
            return Err(PipelineError::ReducerParameterCount {
                node: fold,
                found: params.len(),
            })
        }
        other => {
            return Err(StructuralError::UnexpectedNode {
                node: fold,
                expected: "function",
                found: other.name(),
            }
            .into())
        }
    };

    let path = accumulator_path(rdt, fold, acc, body)?;
    let fold_span = rdt.span(fold);
    let returns = rdt.ty(body).map(TypeDef::effective).cloned();

    let mut synth = Synth { rdt };
    let fold = Fold {
        node: fold,
        acc,
        row,
        body,
        path,
    };
    let reduce = match returns {
        Some(ty) if ty.is_primitive(Primitive::Number) => {
            synth.numeric(&fold, source, initial)?
        }
        Some(ty) if ty.is_primitive(Primitive::Boolean) => {
            synth.boolean(&fold, source, initial)?
        }
        other => {
            return Err(PipelineError::UnsupportedReturnType {
                node: fold.node,
                ty: other,
            })
        }
    };
    synth.rdt.node_mut(reduce).span = fold_span;
    Ok(reduce)
}

struct Fold {
    node: NodeId,
    acc: NodeId,
    row: NodeId,
    body: NodeId,
    /// From the body down to the single accumulator reference.
    path: Vec<NodeId>,
}

impl Fold {
    fn ancestors(&self) -> &[NodeId] {
        &self.path[..self.path.len() - 1]
    }
}

/// The path from `body` to the only reference to `acc`, checked to run
/// through operators alone.
fn accumulator_path(
    rdt: &Rdt,
    fold: NodeId,
    acc: NodeId,
    body: NodeId,
) -> Result<Vec<NodeId>, PipelineError> {
    let mut paths = Vec::new();
    collect_paths(rdt, body, acc, &mut Vec::new(), &mut paths);
    let path = match paths.as_slice() {
        [] => return Err(PipelineError::AccumulatorUnused { node: fold }),
        [path] => path.clone(),
        more => {
            return Err(PipelineError::AccumulatorReused {
                node: fold,
                count: more.len(),
            })
        }
    };
    for &ancestor in &path[..path.len() - 1] {
        match rdt.kind(ancestor) {
            NodeKind::BinaryOp { op, .. } if op.is_arithmetic() || op.is_logical() => {}
            NodeKind::BinaryOp { op, .. } => {
                return Err(PipelineError::NonInvertibleOperator {
                    node: ancestor,
                    found: format!("`{}`", op),
                })
            }
            other => {
                return Err(PipelineError::NonInvertibleOperator {
                    node: ancestor,
                    found: format!("a {}", other.name()),
                })
            }
        }
    }
    Ok(path)
}

fn collect_paths(
    rdt: &Rdt,
    id: NodeId,
    acc: NodeId,
    stack: &mut Vec<NodeId>,
    out: &mut Vec<Vec<NodeId>>,
) {
    stack.push(id);
    if matches!(rdt.kind(id), NodeKind::Reference { target, .. } if *target == acc) {
        out.push(stack.clone());
    }
    for child in rdt.kind(id).children() {
        collect_paths(rdt, child, acc, stack, out);
    }
    stack.pop();
}

/// Allocates typed nodes for the synthesized functions.
struct Synth<'r> {
    rdt: &'r mut Rdt,
}

impl Synth<'_> {
    fn param(&mut self, name: &str, ty: TypeDef) -> NodeId {
        self.rdt.alloc_typed(
            NodeKind::Param {
                name: name.to_string(),
                annotation: Some(ty.clone()),
            },
            ty,
        )
    }

    fn reference(&mut self, param: NodeId) -> NodeId {
        let name = match self.rdt.kind(param) {
            NodeKind::Param { name, .. } => name.clone(),
            other => other.name().to_string(),
        };
        let kind = NodeKind::Reference {
            target: param,
            name,
        };
        match self.rdt.ty(param).cloned() {
            Some(ty) => self.rdt.alloc_typed(kind, ty),
            None => self.rdt.alloc(kind),
        }
    }

    fn number(&mut self, value: f64) -> NodeId {
        self.rdt
            .alloc_typed(NodeKind::NumberLiteral(value), TypeDef::number())
    }

    fn binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId, ty: TypeDef) -> NodeId {
        self.rdt
            .alloc_typed(NodeKind::BinaryOp { op, lhs, rhs }, ty)
    }

    /// `if condition then hit else miss`
    fn select(&mut self, condition: NodeId, hit: f64, miss: f64) -> NodeId {
        let then_branch = self.number(hit);
        let else_branch = self.number(miss);
        self.rdt.alloc_typed(
            NodeKind::Conditional {
                condition,
                then_branch,
                else_branch,
            },
            TypeDef::number(),
        )
    }

    fn function(&mut self, name: &str, params: Vec<NodeId>, body: NodeId) -> NodeId {
        let signature = params
            .iter()
            .map(|&p| {
                let name = match self.rdt.kind(p) {
                    NodeKind::Param { name, .. } => name.clone(),
                    other => other.name().to_string(),
                };
                (name, self.rdt.ty(p).cloned().unwrap_or(TypeDef::Unknown))
            })
            .collect();
        let returns = self.rdt.ty(body).cloned().unwrap_or(TypeDef::Unknown);
        self.rdt.alloc_typed(
            NodeKind::Function {
                name: Some(name.to_string()),
                params,
                body,
            },
            TypeDef::function(signature, returns),
        )
    }

    /// Copies `id` with references to each `from` parameter pointed at `to`.
    fn copy(&mut self, id: NodeId, renames: &[(NodeId, NodeId)]) -> NodeId {
        let mut retarget = FxHashMap::default();
        for &(from, to) in renames {
            let name = match self.rdt.kind(to) {
                NodeKind::Param { name, .. } => name.clone(),
                other => other.name().to_string(),
            };
            retarget.insert(from, Retarget { target: to, name });
        }
        self.rdt.deep_copy(id, &retarget)
    }

    fn row_type(&self, fold: &Fold) -> TypeDef {
        self.rdt.ty(fold.row).cloned().unwrap_or(TypeDef::Unknown)
    }

    fn reduce(
        &mut self,
        source: NodeId,
        initial: NodeId,
        forward: NodeId,
        inverse: NodeId,
        view: NodeId,
    ) -> NodeId {
        let kind = NodeKind::Reduce {
            source,
            initial,
            forward,
            inverse,
            view,
        };
        match self.rdt.ty(view) {
            Some(TypeDef::Function { returns, .. }) => {
                let ty = (**returns).clone();
                self.rdt.alloc_typed(kind, ty)
            }
            _ => self.rdt.alloc(kind),
        }
    }

    fn numeric(
        &mut self,
        fold: &Fold,
        source: NodeId,
        initial: NodeId,
    ) -> Result<NodeId, PipelineError> {
        for &ancestor in fold.ancestors() {
            if let NodeKind::BinaryOp { op, .. } = self.rdt.kind(ancestor) {
                if !op.is_arithmetic() {
                    return Err(PipelineError::NonInvertibleOperator {
                        node: ancestor,
                        found: format!("`{}`", op),
                    });
                }
            }
        }
        let number = TypeDef::number();
        let row_ty = self.row_type(fold);

        let acc_cur = self.param("accCur", number.clone());
        let new_row = self.param("newRow", row_ty.clone());
        let forward_body = self.copy(fold.body, &[(fold.acc, acc_cur), (fold.row, new_row)]);
        let forward = self.function("forward", vec![acc_cur, new_row], forward_body);

        // Undo the outermost operator first: each step recovers the value
        // its accumulator-side operand had before the row was folded in.
        let acc_next = self.param("accNext", number.clone());
        let old_row = self.param("oldRow", row_ty);
        let mut result = self.reference(acc_next);
        for step in fold.path.windows(2) {
            let (ancestor, inner) = (step[0], step[1]);
            let NodeKind::BinaryOp { op, lhs, rhs } = self.rdt.kind(ancestor).clone() else {
                return Err(StructuralError::UnexpectedNode {
                    node: ancestor,
                    expected: "binary operator",
                    found: self.rdt.kind(ancestor).name(),
                }
                .into());
            };
            let non_invertible = || PipelineError::NonInvertibleOperator {
                node: ancestor,
                found: format!("`{}`", op),
            };
            result = if lhs == inner {
                // next = x OP rhs  =>  x = next INV rhs
                let rhs = self.copy(rhs, &[(fold.row, old_row)]);
                let inverse = op.inverse().ok_or_else(non_invertible)?;
                self.binary(inverse, result, rhs, number.clone())
            } else {
                let lhs = self.copy(lhs, &[(fold.row, old_row)]);
                match op {
                    // next = lhs - x  =>  x = lhs - next
                    BinOp::Sub | BinOp::Div => self.binary(op, lhs, result, number.clone()),
                    // next = lhs + x  =>  x = next - lhs
                    BinOp::Add => self.binary(BinOp::Sub, result, lhs, number.clone()),
                    BinOp::Mul => self.binary(BinOp::Div, result, lhs, number.clone()),
                    _ => return Err(non_invertible()),
                }
            };
        }
        let inverse = self.function("inverse", vec![acc_next, old_row], result);

        let value = self.param("accCur", number);
        let view_body = self.reference(value);
        let view = self.function("view", vec![value], view_body);

        let reduce = self.reduce(source, initial, forward, inverse, view);
        trace!(%reduce, fold = %fold.node, depth = fold.path.len(), "inverted numeric reducer");
        Ok(reduce)
    }

    fn boolean(
        &mut self,
        fold: &Fold,
        source: NodeId,
        initial: NodeId,
    ) -> Result<NodeId, PipelineError> {
        let root_op = match self.rdt.kind(fold.body) {
            _ if fold.path.len() == 1 => {
                return Err(PipelineError::BooleanWithoutOperator { node: fold.node })
            }
            NodeKind::BinaryOp { op, .. } if op.is_logical() => *op,
            NodeKind::BinaryOp { op, .. } => {
                return Err(PipelineError::NonInvertibleOperator {
                    node: fold.body,
                    found: format!("`{}`", op),
                })
            }
            other => {
                return Err(PipelineError::NonInvertibleOperator {
                    node: fold.body,
                    found: format!("a {}", other.name()),
                })
            }
        };
        for &ancestor in fold.ancestors() {
            match self.rdt.kind(ancestor) {
                NodeKind::BinaryOp { op, .. } if *op == root_op => {}
                NodeKind::BinaryOp { op, .. } if op.is_logical() => {
                    return Err(PipelineError::MixedBooleanChain { node: ancestor })
                }
                other => {
                    return Err(PipelineError::NonInvertibleOperator {
                        node: ancestor,
                        found: other.name().to_string(),
                    })
                }
            }
        }

        // `||` counts rows that match, `&&` counts rows that fail.
        let (hit, miss) = match root_op {
            BinOp::Or => (1.0, 0.0),
            _ => (0.0, 1.0),
        };
        let number = TypeDef::number();
        let row_ty = self.row_type(fold);

        let acc_cur = self.param("accCur", number.clone());
        let new_row = self.param("newRow", row_ty.clone());
        let matched = self.predicate(&fold.path, fold.row, new_row)?;
        let delta = self.select(matched, hit, miss);
        let counter = self.reference(acc_cur);
        let forward_body = self.binary(BinOp::Add, counter, delta, number.clone());
        let forward = self.function("forward", vec![acc_cur, new_row], forward_body);

        let acc_next = self.param("accNext", number.clone());
        let old_row = self.param("oldRow", row_ty);
        let matched = self.predicate(&fold.path, fold.row, old_row)?;
        let delta = self.select(matched, hit, miss);
        let counter = self.reference(acc_next);
        let inverse_body = self.binary(BinOp::Sub, counter, delta, number.clone());
        let inverse = self.function("inverse", vec![acc_next, old_row], inverse_body);

        let value = self.param("accCur", number);
        let counter = self.reference(value);
        let zero = self.number(0.0);
        let test = match root_op {
            BinOp::Or => BinOp::NotEq,
            _ => BinOp::Eq,
        };
        let view_body = self.binary(test, counter, zero, TypeDef::boolean());
        let view = self.function("view", vec![value], view_body);

        // The initial boolean counts as one row of its own.
        let counter_initial = self.select(initial, hit, miss);

        let reduce = self.reduce(source, counter_initial, forward, inverse, view);
        trace!(%reduce, fold = %fold.node, op = %root_op, "inverted boolean reducer");
        Ok(reduce)
    }

    /// The per-row condition: the chain on `path` with the accumulator
    /// dropped and `row` renamed to `renamed`.
    fn predicate(
        &mut self,
        path: &[NodeId],
        row: NodeId,
        renamed: NodeId,
    ) -> Result<NodeId, PipelineError> {
        let (ancestor, inner) = match path {
            [ancestor, inner, ..] => (*ancestor, *inner),
            _ => {
                let node = path.first().copied().unwrap_or(row);
                return Err(PipelineError::BooleanWithoutOperator { node });
            }
        };
        let NodeKind::BinaryOp { op, lhs, rhs } = self.rdt.kind(ancestor).clone() else {
            return Err(StructuralError::UnexpectedNode {
                node: ancestor,
                expected: "binary operator",
                found: self.rdt.kind(ancestor).name(),
            }
            .into());
        };
        let acc_on_left = lhs == inner;
        let other = self.copy(if acc_on_left { rhs } else { lhs }, &[(row, renamed)]);
        if path.len() == 2 {
            return Ok(other);
        }
        let rest = self.predicate(&path[1..], row, renamed)?;
        let (lhs, rhs) = if acc_on_left { (rest, other) } else { (other, rest) };
        Ok(self.binary(op, lhs, rhs, TypeDef::boolean()))
    }
}
