//! Lowering from the parser's syntax tree to an RDT.
//!
//! Expression blocks become right-nested continuation chains: each
//! statement holds the rest of the block as its `next`. A `let` scopes over
//! the remainder, an `if` without `else` continues into the remainder on
//! its false branch, and an `if` with an `else` binds the remainder to a
//! generated `$system_N` name that both branches fall through to.

use tally_ast::{Definition, Expr, ExprKind, Member, Param, Program, Statement, TypeExpr};
use tally_common::Span;
use tracing::{debug, trace};

use crate::error::StructuralError;
use crate::node::{NodeId, NodeKind, Rdt};
use crate::ty::TypeDef;
use crate::walk::{walk, Before, Lineage, Visitor};

/// A freshly lowered tree.
#[derive(Debug, Clone)]
pub struct Lowered {
    pub rdt: Rdt,
    pub root: NodeId,
}

pub fn lower_program(program: &Program) -> Result<Lowered, StructuralError> {
    let mut lowerer = Lowerer {
        rdt: Rdt::new(),
        system_bindings: 0,
    };
    let root = lowerer.program(program)?;
    debug!(
        nodes = lowerer.rdt.len(),
        system_bindings = lowerer.system_bindings,
        "lowered program"
    );
    Ok(Lowered {
        rdt: lowerer.rdt,
        root,
    })
}

/// Lowers a single expression into `rdt`.
pub fn lower_expr(rdt: &mut Rdt, expr: &Expr) -> Result<NodeId, StructuralError> {
    let mut lowerer = Lowerer {
        rdt: std::mem::take(rdt),
        system_bindings: 0,
    };
    let result = lowerer.expr(expr);
    *rdt = lowerer.rdt;
    result
}

struct Lowerer {
    rdt: Rdt,
    // Per-compilation counter for `$system_N` names.
    system_bindings: u32,
}

impl Lowerer {
    fn program(&mut self, program: &Program) -> Result<NodeId, StructuralError> {
        let mut definitions = Vec::new();
        let mut assignments = Vec::new();
        let mut exprs = Vec::new();

        for statement in &program.statements {
            match statement {
                Statement::Definition(def) => definitions.push(self.definition(def)?),
                Statement::Assignment { name, value, span } => {
                    let value = self.expr(value)?;
                    let node = self.rdt.alloc_spanned(
                        NodeKind::Assignment {
                            name: name.clone(),
                            value,
                        },
                        *span,
                    );
                    assignments.push(node);
                }
                Statement::Expression { expr } => exprs.push(expr),
            }
        }

        let expressions = self.sequence(&exprs)?;
        Ok(self.rdt.alloc(NodeKind::Root {
            definitions,
            assignments,
            expressions,
        }))
    }

    fn definition(&mut self, def: &Definition) -> Result<NodeId, StructuralError> {
        let mut properties = Vec::with_capacity(def.members.len());
        for member in &def.members {
            let node = match member {
                Member::Property { name, ty, span } => {
                    let annotation = match ty {
                        TypeExpr::Named { base, array } => TypeDef::from_annotation(base, *array),
                        TypeExpr::Context { .. } => {
                            return Err(StructuralError::ContextTypeOnProperty {
                                name: name.clone(),
                                span: *span,
                            })
                        }
                    };
                    self.rdt.alloc_spanned(
                        NodeKind::SimpleProperty {
                            name: name.clone(),
                            annotation,
                        },
                        *span,
                    )
                }
                Member::Derived { name, expr, span } => {
                    let derivation = self.expr(expr)?;
                    self.rdt.alloc_spanned(
                        NodeKind::DerivedProperty {
                            name: name.clone(),
                            derivation,
                        },
                        *span,
                    )
                }
                Member::Function {
                    name,
                    params,
                    body,
                    span,
                } => {
                    let params = self.params(params);
                    let body = self.expr(body)?;
                    let function = self.rdt.alloc_spanned(
                        NodeKind::Function {
                            name: Some(name.clone()),
                            params,
                            body,
                        },
                        *span,
                    );
                    self.rdt.alloc_spanned(
                        NodeKind::DerivedProperty {
                            name: name.clone(),
                            derivation: function,
                        },
                        *span,
                    )
                }
            };
            properties.push(node);
        }
        Ok(self.rdt.alloc_spanned(
            NodeKind::Definition {
                name: def.name.clone(),
                properties,
            },
            def.span,
        ))
    }

    fn params(&mut self, params: &[Param]) -> Vec<NodeId> {
        params
            .iter()
            .map(|p| {
                self.rdt.alloc_spanned(
                    NodeKind::Param {
                        name: p.name.clone(),
                        annotation: p.ty.as_ref().map(annotation),
                    },
                    p.span,
                )
            })
            .collect()
    }

    /// Lowers a block body. A trailing `return` supplies the value the
    /// chain ends in; otherwise it ends in null.
    fn sequence(&mut self, exprs: &[&Expr]) -> Result<NodeId, StructuralError> {
        let (body, mut rest) = match exprs.split_last() {
            Some((last, init)) => match &last.kind {
                ExprKind::Return { value } => (init, self.expr(value)?),
                _ => (exprs, self.rdt.alloc(NodeKind::Null)),
            },
            None => (exprs, self.rdt.alloc(NodeKind::Null)),
        };
        for expr in body.iter().rev() {
            rest = self.statement(expr, rest)?;
        }
        Ok(rest)
    }

    fn statement(&mut self, expr: &Expr, rest: NodeId) -> Result<NodeId, StructuralError> {
        let span = expr.span;
        let kind = match &expr.kind {
            ExprKind::Return { .. } => return Err(StructuralError::ReturnNotLast { span }),
            ExprKind::Let { name, value } => NodeKind::Let {
                name: name.clone(),
                value: self.expr(value)?,
                next: rest,
            },
            ExprKind::If {
                condition,
                then_branch,
                else_branch: None,
            } => NodeKind::Conditional {
                condition: self.expr(condition)?,
                then_branch: self.expr(then_branch)?,
                else_branch: rest,
            },
            ExprKind::If {
                condition,
                then_branch,
                else_branch: Some(else_branch),
            } => return self.branch_with_continuation(condition, then_branch, else_branch, rest, span),
            _ => NodeKind::SideEffect {
                expr: self.expr(expr)?,
                next: rest,
            },
        };
        Ok(self.rdt.alloc_spanned(kind, span))
    }

    /// `if c { a } else { b }; rest` becomes
    /// `let $system_N = rest; if c { a; $system_N } else { b; $system_N }`.
    fn branch_with_continuation(
        &mut self,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
        rest: NodeId,
        span: Option<Span>,
    ) -> Result<NodeId, StructuralError> {
        let name = format!("$system_{}", self.system_bindings);
        self.system_bindings += 1;

        // Allocated first so the branches can refer to it.
        let binding = self.rdt.alloc_spanned(NodeKind::Null, span);

        let condition = self.expr(condition)?;
        let then_branch = self.expr(then_branch)?;
        let else_branch = self.expr(else_branch)?;
        let conditional = self.rdt.alloc_spanned(
            NodeKind::Conditional {
                condition,
                then_branch,
                else_branch,
            },
            span,
        );

        let mut fall_through = FallThrough {
            binding,
            name: name.clone(),
        };
        let conditional = walk(&mut self.rdt, conditional, &mut fall_through, false)?;

        trace!(%binding, %name, "bound block continuation");
        self.rdt.node_mut(binding).kind = NodeKind::Let {
            name,
            value: rest,
            next: conditional,
        };
        Ok(binding)
    }

    fn expr(&mut self, expr: &Expr) -> Result<NodeId, StructuralError> {
        let kind = match &expr.kind {
            ExprKind::String { value } => NodeKind::StringLiteral(value.clone()),
            ExprKind::Number { value } => NodeKind::NumberLiteral(*value),
            ExprKind::Boolean { value } => NodeKind::BooleanLiteral(*value),
            ExprKind::Identifier { name } => NodeKind::Identifier(name.clone()),
            ExprKind::Context { name } => NodeKind::Context { name: name.clone() },
            ExprKind::Binary { op, lhs, rhs } => NodeKind::BinaryOp {
                op: (*op).into(),
                lhs: self.expr(lhs)?,
                rhs: self.expr(rhs)?,
            },
            ExprKind::Member { object, property } => {
                let source = self.expr(object)?;
                let property = self.rdt.alloc(NodeKind::Identifier(property.clone()));
                NodeKind::PropertyAccess { source, property }
            }
            ExprKind::Lambda { params, body } => NodeKind::Function {
                name: None,
                params: self.params(params),
                body: self.expr(body)?,
            },
            ExprKind::Call { callee, args } => {
                let callee = self.expr(callee)?;
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                NodeKind::Invoke { callee, args }
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.expr(condition)?;
                let then_branch = self.expr(then_branch)?;
                let else_branch = match else_branch {
                    Some(e) => self.expr(e)?,
                    None => self.rdt.alloc(NodeKind::Null),
                };
                NodeKind::Conditional {
                    condition,
                    then_branch,
                    else_branch,
                }
            }
            ExprKind::Let { .. } => return Err(StructuralError::LetOutsideBlock { span: expr.span }),
            ExprKind::Block { exprs } => {
                let exprs: Vec<&Expr> = exprs.iter().collect();
                return self.sequence(&exprs);
            }
            ExprKind::Return { value } => return self.expr(value),
            ExprKind::Paren { inner } => return self.expr(inner),
            ExprKind::Postfix { operand } => NodeKind::ArrayMarker {
                operand: self.expr(operand)?,
            },
        };
        Ok(self.rdt.alloc_spanned(kind, expr.span))
    }
}

fn annotation(ty: &TypeExpr) -> TypeDef {
    match ty {
        TypeExpr::Named { base, array } => TypeDef::from_annotation(base, *array),
        TypeExpr::Context { name } => TypeDef::Context(name.clone()),
    }
}

/// Points every dangling tail of a branch at the block continuation.
/// The state is `true` inside nested functions, whose bodies are left alone.
struct FallThrough {
    binding: NodeId,
    name: String,
}

impl Visitor for FallThrough {
    type State = bool;
    type Error = StructuralError;

    fn before(
        &mut self,
        rdt: &mut Rdt,
        node: NodeId,
        _lineage: Lineage<'_>,
        _in_function: &bool,
    ) -> Result<Before<bool>, StructuralError> {
        if matches!(rdt.kind(node), NodeKind::Function { .. }) {
            return Ok(Before::with_state(true));
        }
        Ok(Before::keep())
    }

    fn after(
        &mut self,
        rdt: &mut Rdt,
        node: NodeId,
        lineage: Lineage<'_>,
        in_function: &bool,
    ) -> Result<Option<NodeId>, StructuralError> {
        if *in_function || !matches!(rdt.kind(node), NodeKind::Null) {
            return Ok(None);
        }
        let is_tail = match lineage.parent().map(|p| rdt.kind(p)) {
            Some(NodeKind::Conditional { else_branch, .. }) => *else_branch == node,
            Some(NodeKind::SideEffect { next, .. }) | Some(NodeKind::Let { next, .. }) => {
                *next == node
            }
            _ => false,
        };
        if !is_tail {
            return Ok(None);
        }
        let reference = rdt.alloc(NodeKind::Reference {
            target: self.binding,
            name: self.name.clone(),
        });
        Ok(Some(reference))
    }
}
