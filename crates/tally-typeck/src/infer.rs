//! The fixed-point type engine.

use std::collections::BTreeMap;

use tally_rdt::{
    walk, BinOp, Lineage, NodeId, NodeKind, Primitive, Rdt, ScopeId, StructuralError, TypeDef,
    Visitor,
};
use tracing::{debug, trace};

use crate::builtins::{array_member, ArrayMember};
use crate::env::{Compare, TypeEnv};
use crate::error::TypeError;

pub const DEFAULT_MAX_PASSES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSummary {
    /// Passes run, including the final one that changed nothing.
    pub passes: usize,
}

/// Annotates every node under `root` with its type.
///
/// Passes repeat until one changes nothing. More than `max_passes` passes
/// is an error, as is any node left without a complete type afterwards.
/// Running this again on an already typed tree takes a single pass.
pub fn resolve_types(
    rdt: &mut Rdt,
    root: NodeId,
    env: &TypeEnv<'_>,
    max_passes: usize,
) -> Result<TypeSummary, TypeError> {
    let mut engine = Engine {
        env,
        changed: false,
    };
    let mut passes = 0;
    loop {
        engine.changed = false;
        walk(rdt, root, &mut engine, ())?;
        passes += 1;
        trace!(pass = passes, changed = engine.changed, "type pass");
        if !engine.changed {
            break;
        }
        if passes >= max_passes {
            return Err(TypeError::NoFixedPoint { passes });
        }
    }
    walk(rdt, root, &mut Completeness, ())?;
    debug!(passes, "types reached a fixed point");
    Ok(TypeSummary { passes })
}

struct Engine<'e, 'a> {
    env: &'e TypeEnv<'a>,
    changed: bool,
}

impl Visitor for Engine<'_, '_> {
    type State = ();
    type Error = TypeError;

    fn after(
        &mut self,
        rdt: &mut Rdt,
        node: NodeId,
        lineage: Lineage<'_>,
        _state: &(),
    ) -> Result<Option<NodeId>, TypeError> {
        if let Some(ty) = self.infer(rdt, node, lineage)? {
            if rdt.set_ty(node, ty) {
                self.changed = true;
            }
        }
        Ok(None)
    }
}

/// The expression type of `id` if it has one that is not `Unknown`.
fn known(rdt: &Rdt, id: NodeId) -> Option<TypeDef> {
    rdt.ty(id)
        .map(TypeDef::effective)
        .filter(|t| !t.is_unknown())
        .cloned()
}

/// Like [`known`], but only if nothing inside is unknown either.
fn complete(rdt: &Rdt, id: NodeId) -> Option<TypeDef> {
    known(rdt, id).filter(TypeDef::is_complete)
}

fn or_unknown(ty: Option<TypeDef>) -> TypeDef {
    ty.unwrap_or(TypeDef::Unknown)
}

impl Engine<'_, '_> {
    /// The type `node` should have given the current state of the tree, or
    /// `None` if it cannot be decided yet.
    fn infer(
        &self,
        rdt: &Rdt,
        node: NodeId,
        lineage: Lineage<'_>,
    ) -> Result<Option<TypeDef>, TypeError> {
        let ty = match rdt.kind(node) {
            NodeKind::Root { .. } | NodeKind::Null => TypeDef::None,
            NodeKind::StringLiteral(_) => TypeDef::string(),
            NodeKind::NumberLiteral(_) => TypeDef::number(),
            NodeKind::BooleanLiteral(_) => TypeDef::boolean(),
            NodeKind::Identifier(name) => {
                if rdt.is_property_name(node, lineage.parent()) {
                    TypeDef::None
                } else {
                    return Err(TypeError::UnresolvedIdentifier {
                        node,
                        name: name.clone(),
                    });
                }
            }
            NodeKind::Context { name } => return self.context(rdt, node, name, lineage),
            NodeKind::Param { annotation, .. } => {
                return match annotation {
                    Some(annotation) => self.annotated_param(rdt, node, annotation, lineage),
                    None => Ok(contextual_param(rdt, node, lineage)),
                }
            }
            NodeKind::SimpleProperty { annotation, .. } => {
                let scope = self.env.scope_at(node, lineage);
                self.check_annotation(rdt, node, annotation, scope)?;
                annotation.clone()
            }
            NodeKind::DerivedProperty { derivation, .. } => return Ok(known(rdt, *derivation)),
            NodeKind::ReadWrite { read, .. } => return Ok(known(rdt, *read)),
            NodeKind::Assignment { value, .. } => return Ok(known(rdt, *value)),
            NodeKind::SideEffect { next, .. } => return Ok(known(rdt, *next)),
            NodeKind::Filter { predicate } => return Ok(known(rdt, *predicate)),
            NodeKind::Pipeline { source, .. } => return Ok(known(rdt, *source)),
            NodeKind::Intent { .. } => return Ok(None),
            NodeKind::Definition { properties, .. } => {
                let mut fields = BTreeMap::new();
                for &prop in properties {
                    let name = match rdt.kind(prop) {
                        NodeKind::SimpleProperty { name, .. }
                        | NodeKind::DerivedProperty { name, .. } => name.clone(),
                        other => {
                            return Err(StructuralError::UnexpectedNode {
                                node: prop,
                                expected: "property",
                                found: other.name(),
                            }
                            .into())
                        }
                    };
                    fields.insert(name, or_unknown(known(rdt, prop)));
                }
                TypeDef::Object(fields)
            }
            NodeKind::Function { params, body, .. } => {
                let params = params
                    .iter()
                    .map(|&p| {
                        let name = match rdt.kind(p) {
                            NodeKind::Param { name, .. } => name.clone(),
                            other => other.name().to_string(),
                        };
                        (name, or_unknown(known(rdt, p)))
                    })
                    .collect();
                TypeDef::function(params, or_unknown(known(rdt, *body)))
            }
            NodeKind::Let { value, next, .. } => TypeDef::Binding {
                value: Box::new(or_unknown(known(rdt, *value))),
                next: Box::new(or_unknown(known(rdt, *next))),
            },
            NodeKind::Reference { target, .. } => {
                return Ok(rdt
                    .ty(*target)
                    .map(TypeDef::bound_value)
                    .filter(|t| !t.is_unknown())
                    .cloned())
            }
            NodeKind::ArrayMarker { operand } => match rdt.kind(*operand) {
                NodeKind::Reference { target, .. } => match rdt.kind(*target) {
                    NodeKind::Definition { name, .. } => {
                        TypeDef::array(TypeDef::Named(name.clone()))
                    }
                    _ => return Err(TypeError::NotATable { node }),
                },
                _ => return Err(TypeError::NotATable { node }),
            },
            NodeKind::Dataset { name, .. } => TypeDef::array(TypeDef::Named(name.clone())),
            NodeKind::Reduce { view, .. } => match rdt.ty(*view) {
                Some(TypeDef::Function { returns, .. }) if !returns.is_unknown() => {
                    (**returns).clone()
                }
                _ => return Ok(None),
            },
            NodeKind::BinaryOp { op, lhs, rhs } => return self.binary(rdt, node, *op, *lhs, *rhs, lineage),
            NodeKind::PropertyAccess { source, property } => {
                return self.property_access(rdt, node, *source, *property, lineage)
            }
            NodeKind::Invoke { callee, args } => {
                return self.invoke(rdt, node, *callee, args, lineage)
            }
            NodeKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => return self.conditional(rdt, node, *condition, *then_branch, *else_branch, lineage),
        };
        Ok(Some(ty))
    }

    fn check_annotation(
        &self,
        rdt: &Rdt,
        node: NodeId,
        annotation: &TypeDef,
        scope: ScopeId,
    ) -> Result<(), TypeError> {
        for name in annotation.named_tables() {
            if self.env.definition(rdt, name, scope).is_none() {
                return Err(TypeError::UnknownType {
                    node,
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// `$row` is the object type of the nearest enclosing table.
    fn context(
        &self,
        rdt: &Rdt,
        node: NodeId,
        name: &str,
        lineage: Lineage<'_>,
    ) -> Result<Option<TypeDef>, TypeError> {
        if name != "row" {
            return Err(TypeError::UnknownContext {
                node,
                name: name.to_string(),
            });
        }
        let definition = lineage
            .iter()
            .find(|id| matches!(rdt.kind(*id), NodeKind::Definition { .. }))
            .ok_or(TypeError::ContextOutsideDefinition { node })?;
        Ok(known(rdt, definition))
    }

    fn annotated_param(
        &self,
        rdt: &Rdt,
        node: NodeId,
        annotation: &TypeDef,
        lineage: Lineage<'_>,
    ) -> Result<Option<TypeDef>, TypeError> {
        if let TypeDef::Context(name) = annotation {
            return self.context(rdt, node, name, lineage);
        }
        let scope = self.env.scope_at(node, lineage);
        self.check_annotation(rdt, node, annotation, scope)?;
        Ok(Some(annotation.clone()))
    }

    fn binary(
        &self,
        rdt: &Rdt,
        node: NodeId,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
        lineage: Lineage<'_>,
    ) -> Result<Option<TypeDef>, TypeError> {
        let (Some(l), Some(r)) = (complete(rdt, lhs), complete(rdt, rhs)) else {
            return Ok(None);
        };

        let require = |expected: Primitive, name: &'static str| -> Result<(), TypeError> {
            for ty in [&l, &r] {
                if !ty.is_primitive(expected) {
                    return Err(TypeError::InvalidOperand {
                        node,
                        op,
                        expected: name,
                        found: ty.clone(),
                    });
                }
            }
            Ok(())
        };

        if op.is_arithmetic() {
            require(Primitive::Number, "number")?;
            return Ok(Some(TypeDef::number()));
        }
        if op.is_ordering() {
            require(Primitive::Number, "number")?;
            return Ok(Some(TypeDef::boolean()));
        }
        if op.is_logical() {
            require(Primitive::Boolean, "boolean")?;
            return Ok(Some(TypeDef::boolean()));
        }

        let scope = self.env.scope_at(node, lineage);
        match self.env.compare(rdt, &l, &r, scope) {
            Compare::Equal => Ok(Some(TypeDef::boolean())),
            Compare::Undecided => Ok(None),
            Compare::Different => Err(TypeError::OperandMismatch {
                node,
                op,
                lhs: l,
                rhs: r,
            }),
        }
    }

    fn property_access(
        &self,
        rdt: &Rdt,
        node: NodeId,
        source: NodeId,
        property: NodeId,
        lineage: Lineage<'_>,
    ) -> Result<Option<TypeDef>, TypeError> {
        let field = rdt
            .identifier(property)
            .ok_or_else(|| StructuralError::UnexpectedNode {
                node: property,
                expected: "member name",
                found: rdt.kind(property).name(),
            })?;
        let Some(source_ty) = known(rdt, source) else {
            return Ok(None);
        };

        let unknown_field = |ty: &TypeDef| TypeError::UnknownField {
            node,
            field: field.to_string(),
            ty: ty.clone(),
        };

        match &source_ty {
            TypeDef::Object(fields) => {
                let ty = fields.get(field).ok_or_else(|| unknown_field(&source_ty))?;
                Ok(Some(ty.clone()).filter(|t| !t.is_unknown()))
            }
            TypeDef::Named(table) => {
                let scope = self.env.scope_at(node, lineage);
                let definition = self.env.definition(rdt, table, scope).ok_or_else(|| {
                    TypeError::UnknownType {
                        node,
                        name: table.clone(),
                    }
                })?;
                let column = self
                    .env
                    .column(rdt, definition, field)
                    .ok_or_else(|| unknown_field(&source_ty))?;
                Ok(known(rdt, column))
            }
            TypeDef::Array(elem) => {
                let accumulator = if field == "reduce" {
                    reduce_accumulator(rdt, node, lineage)
                } else {
                    None
                };
                match array_member(elem, field, accumulator) {
                    ArrayMember::Known(ty) => Ok(Some(ty)),
                    ArrayMember::Pending => Ok(None),
                    ArrayMember::Missing => Err(unknown_field(&source_ty)),
                }
            }
            other => Err(TypeError::NotAnObject {
                node,
                ty: other.clone(),
            }),
        }
    }

    fn invoke(
        &self,
        rdt: &Rdt,
        node: NodeId,
        callee: NodeId,
        args: &[NodeId],
        lineage: Lineage<'_>,
    ) -> Result<Option<TypeDef>, TypeError> {
        let Some(callee_ty) = known(rdt, callee) else {
            return Ok(None);
        };
        let TypeDef::Function { params, returns } = callee_ty else {
            return Err(TypeError::NotAFunction {
                node: callee,
                ty: callee_ty,
            });
        };
        if params.len() != args.len() {
            return Err(TypeError::ArityMismatch {
                node,
                expected: params.len(),
                found: args.len(),
            });
        }

        let scope = self.env.scope_at(node, lineage);
        let mut pending = false;
        for (index, (&arg, (_, expected))) in args.iter().zip(&params).enumerate() {
            let Some(found) = known(rdt, arg) else {
                pending = true;
                continue;
            };
            match self.env.compare(rdt, &found, expected, scope) {
                Compare::Equal => {}
                Compare::Undecided => pending = true,
                Compare::Different => {
                    return Err(TypeError::ArgumentMismatch {
                        node: arg,
                        index,
                        expected: expected.clone(),
                        found,
                    })
                }
            }
        }
        if pending || returns.is_unknown() {
            return Ok(None);
        }
        Ok(Some(*returns))
    }

    fn conditional(
        &self,
        rdt: &Rdt,
        node: NodeId,
        condition: NodeId,
        then_branch: NodeId,
        else_branch: NodeId,
        lineage: Lineage<'_>,
    ) -> Result<Option<TypeDef>, TypeError> {
        let Some(cond) = complete(rdt, condition) else {
            return Ok(None);
        };
        if !cond.is_primitive(Primitive::Boolean) {
            return Err(TypeError::ConditionNotBoolean {
                node: condition,
                found: cond,
            });
        }
        let (Some(then_ty), Some(else_ty)) = (known(rdt, then_branch), known(rdt, else_branch))
        else {
            return Ok(None);
        };
        let scope = self.env.scope_at(node, lineage);
        match self.env.compare(rdt, &then_ty, &else_ty, scope) {
            Compare::Equal => Ok(Some(then_ty)),
            Compare::Undecided => Ok(None),
            Compare::Different => Err(TypeError::BranchMismatch {
                node,
                then_ty,
                else_ty,
            }),
        }
    }
}

/// An unannotated lambda parameter takes its type from the signature of
/// the function the lambda is passed to.
fn contextual_param(rdt: &Rdt, param: NodeId, lineage: Lineage<'_>) -> Option<TypeDef> {
    let function = lineage.nth(0)?;
    let invoke = lineage.nth(1)?;
    let NodeKind::Function { params, .. } = rdt.kind(function) else {
        return None;
    };
    let NodeKind::Invoke { callee, args } = rdt.kind(invoke) else {
        return None;
    };
    let position = params.iter().position(|p| *p == param)?;
    let arg_index = args.iter().position(|a| *a == function)?;
    let TypeDef::Function {
        params: expected, ..
    } = known(rdt, *callee)?
    else {
        return None;
    };
    let TypeDef::Function {
        params: lambda_params,
        ..
    } = &expected.get(arg_index)?.1
    else {
        return None;
    };
    lambda_params
        .get(position)
        .map(|(_, ty)| ty.clone())
        .filter(TypeDef::is_complete)
}

/// The accumulator type of a `reduce` call: the reducer's annotated first
/// parameter, or else the type of the initial value.
fn reduce_accumulator(rdt: &Rdt, access: NodeId, lineage: Lineage<'_>) -> Option<TypeDef> {
    let NodeKind::Invoke { callee, args } = rdt.kind(lineage.parent()?) else {
        return None;
    };
    if *callee != access {
        return None;
    }
    if let Some(&reducer) = args.first() {
        if let NodeKind::Function { params, .. } = rdt.kind(reducer) {
            if let Some(&acc) = params.first() {
                if let NodeKind::Param {
                    annotation: Some(_),
                    ..
                } = rdt.kind(acc)
                {
                    if let Some(ty) = complete(rdt, acc) {
                        return Some(ty);
                    }
                }
            }
        }
    }
    args.get(1).and_then(|&initial| complete(rdt, initial))
}

/// Fails on the first node, innermost first, left without a complete type.
struct Completeness;

impl Visitor for Completeness {
    type State = ();
    type Error = TypeError;

    fn after(
        &mut self,
        rdt: &mut Rdt,
        node: NodeId,
        _lineage: Lineage<'_>,
        _state: &(),
    ) -> Result<Option<NodeId>, TypeError> {
        let n = rdt.node(node);
        match &n.ty {
            Some(ty) if ty.is_complete() => Ok(None),
            // Intents are rewritten by the pipeline pass and carry no type.
            None if matches!(n.kind, NodeKind::Intent { .. }) => Ok(None),
            partial => Err(TypeError::Unresolved {
                node,
                kind: n.kind.name(),
                partial: partial.clone(),
            }),
        }
    }
}
