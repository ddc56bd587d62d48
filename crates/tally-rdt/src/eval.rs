//! A small interpreter for pure RDT expressions.
//!
//! Used to execute synthesized reducer functions and to check derivations
//! against sample rows. Dataset and pipeline nodes are not evaluable: they
//! describe incremental maintenance, not values.

use std::collections::BTreeMap;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::node::{BinOp, NodeId, NodeKind, Rdt};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(f64),
    Boolean(bool),
    String(String),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn object<'a>(fields: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
        Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Object(_) => "object",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", k, v)?;
                }
                write!(f, " }}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    Unbound { node: NodeId, name: String },
    Mismatch {
        node: NodeId,
        expected: &'static str,
        found: &'static str,
    },
    MissingField { node: NodeId, field: String },
    Arity {
        node: NodeId,
        expected: usize,
        found: usize,
    },
    NotEvaluable { node: NodeId, kind: &'static str },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Unbound { node, name } => write!(f, "`{}` has no value at {}", name, node),
            EvalError::Mismatch {
                node,
                expected,
                found,
            } => write!(f, "expected {} at {}, found {}", expected, node, found),
            EvalError::MissingField { node, field } => {
                write!(f, "no field `{}` at {}", field, node)
            }
            EvalError::Arity {
                node,
                expected,
                found,
            } => write!(
                f,
                "function {} takes {} argument(s), {} given",
                node, expected, found
            ),
            EvalError::NotEvaluable { node, kind } => {
                write!(f, "{} at {} cannot be evaluated", kind, node)
            }
        }
    }
}

impl std::error::Error for EvalError {}

pub struct Evaluator<'a> {
    rdt: &'a Rdt,
    env: FxHashMap<NodeId, Value>,
    context: FxHashMap<String, Value>,
}

impl<'a> Evaluator<'a> {
    pub fn new(rdt: &'a Rdt) -> Self {
        Evaluator {
            rdt,
            env: FxHashMap::default(),
            context: FxHashMap::default(),
        }
    }

    /// Supplies a context value such as `$row`. Bare references to the
    /// columns of the enclosing table read from the `row` context as well.
    pub fn with_context(mut self, name: &str, value: Value) -> Self {
        self.context.insert(name.to_string(), value);
        self
    }

    /// Calls `function` with positional `args`. Anything that names a
    /// function may be passed: a function node, a reference to one, or a
    /// derived property, whose write-time intermediates are evaluated first.
    pub fn call(&mut self, function: NodeId, args: Vec<Value>) -> Result<Value, EvalError> {
        let function = self.callee(function)?;
        let (params, body) = match self.rdt.kind(function) {
            NodeKind::Function { params, body, .. } => (params.clone(), *body),
            other => {
                return Err(EvalError::Mismatch {
                    node: function,
                    expected: "function",
                    found: other.name(),
                })
            }
        };
        if params.len() != args.len() {
            return Err(EvalError::Arity {
                node: function,
                expected: params.len(),
                found: args.len(),
            });
        }
        for (param, arg) in params.into_iter().zip(args) {
            self.env.insert(param, arg);
        }
        self.eval(body)
    }

    pub fn eval(&mut self, id: NodeId) -> Result<Value, EvalError> {
        let rdt = self.rdt;
        match rdt.kind(id) {
            NodeKind::StringLiteral(s) => Ok(Value::String(s.clone())),
            NodeKind::NumberLiteral(n) => Ok(Value::Number(*n)),
            NodeKind::BooleanLiteral(b) => Ok(Value::Boolean(*b)),
            NodeKind::Null => Ok(Value::Null),
            NodeKind::BinaryOp { op, lhs, rhs } => self.binary(*op, *lhs, *rhs),
            NodeKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let (then_branch, else_branch) = (*then_branch, *else_branch);
                if self.boolean(*condition)? {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
            NodeKind::Let { value, next, .. } => {
                let next = *next;
                let value = self.eval(*value)?;
                self.env.insert(id, value);
                self.eval(next)
            }
            NodeKind::SideEffect { expr, next } => {
                let next = *next;
                self.eval(*expr)?;
                self.eval(next)
            }
            NodeKind::PropertyAccess { source, property } => {
                let field = match self.rdt.kind(*property) {
                    NodeKind::Identifier(name) => name.clone(),
                    other => {
                        return Err(EvalError::Mismatch {
                            node: *property,
                            expected: "identifier",
                            found: other.name(),
                        })
                    }
                };
                match self.eval(*source)? {
                    Value::Object(mut fields) => fields
                        .remove(&field)
                        .ok_or(EvalError::MissingField { node: id, field }),
                    other => Err(EvalError::Mismatch {
                        node: id,
                        expected: "object",
                        found: other.type_name(),
                    }),
                }
            }
            NodeKind::Context { name } => {
                self.context
                    .get(name)
                    .cloned()
                    .ok_or_else(|| EvalError::Unbound {
                        node: id,
                        name: format!("${}", name),
                    })
            }
            NodeKind::Reference { target, name } => self.reference(id, *target, name),
            NodeKind::Invoke { callee, args } => {
                let (callee, args) = (*callee, args.clone());
                let values = args
                    .into_iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, values)
            }
            NodeKind::Assignment { value, .. } => self.eval(*value),
            NodeKind::DerivedProperty { derivation, .. } => self.eval(*derivation),
            NodeKind::ReadWrite { read, writes } => {
                let read = *read;
                for (_, write) in writes.clone() {
                    let value = self.eval(write)?;
                    self.env.insert(write, value);
                }
                self.eval(read)
            }
            NodeKind::Param { name, .. } => {
                self.env.get(&id).cloned().ok_or_else(|| EvalError::Unbound {
                    node: id,
                    name: name.clone(),
                })
            }
            other @ (NodeKind::Root { .. }
            | NodeKind::Definition { .. }
            | NodeKind::SimpleProperty { .. }
            | NodeKind::Identifier(_)
            | NodeKind::Function { .. }
            | NodeKind::ArrayMarker { .. }
            | NodeKind::Dataset { .. }
            | NodeKind::Filter { .. }
            | NodeKind::Pipeline { .. }
            | NodeKind::Intent { .. }
            | NodeKind::Reduce { .. }) => Err(EvalError::NotEvaluable {
                node: id,
                kind: other.name(),
            }),
        }
    }

    fn reference(&mut self, id: NodeId, target: NodeId, name: &str) -> Result<Value, EvalError> {
        if let Some(value) = self.env.get(&target) {
            return Ok(value.clone());
        }
        let rdt = self.rdt;
        match rdt.kind(target) {
            NodeKind::SimpleProperty { name: column, .. } => {
                match self.context.get("row") {
                    Some(Value::Object(fields)) => {
                        fields
                            .get(column)
                            .cloned()
                            .ok_or_else(|| EvalError::MissingField {
                                node: id,
                                field: column.clone(),
                            })
                    }
                    _ => Err(EvalError::Unbound {
                        node: id,
                        name: name.to_string(),
                    }),
                }
            }
            NodeKind::DerivedProperty { derivation, .. }
            | NodeKind::Assignment {
                value: derivation, ..
            } => self.eval(*derivation),
            _ => Err(EvalError::Unbound {
                node: id,
                name: name.to_string(),
            }),
        }
    }

    /// Resolves a callee expression to the function node it names.
    fn callee(&mut self, callee: NodeId) -> Result<NodeId, EvalError> {
        let rdt = self.rdt;
        let mut current = callee;
        loop {
            match rdt.kind(current) {
                NodeKind::Function { .. } => return Ok(current),
                NodeKind::Reference { target, .. } => current = *target,
                NodeKind::DerivedProperty { derivation, .. } => current = *derivation,
                NodeKind::Assignment { value, .. } | NodeKind::Let { value, .. } => current = *value,
                NodeKind::ReadWrite { read, writes } => {
                    for (_, write) in writes {
                        let value = self.eval(*write)?;
                        self.env.insert(*write, value);
                    }
                    current = *read;
                }
                other => {
                    return Err(EvalError::Mismatch {
                        node: callee,
                        expected: "function",
                        found: other.name(),
                    })
                }
            }
        }
    }

    fn number(&mut self, id: NodeId) -> Result<f64, EvalError> {
        match self.eval(id)? {
            Value::Number(n) => Ok(n),
            other => Err(EvalError::Mismatch {
                node: id,
                expected: "number",
                found: other.type_name(),
            }),
        }
    }

    fn boolean(&mut self, id: NodeId) -> Result<bool, EvalError> {
        match self.eval(id)? {
            Value::Boolean(b) => Ok(b),
            other => Err(EvalError::Mismatch {
                node: id,
                expected: "boolean",
                found: other.type_name(),
            }),
        }
    }

    fn binary(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) -> Result<Value, EvalError> {
        let value = match op {
            BinOp::And => Value::Boolean(self.boolean(lhs)? && self.boolean(rhs)?),
            BinOp::Or => Value::Boolean(self.boolean(lhs)? || self.boolean(rhs)?),
            BinOp::Eq => Value::Boolean(self.eval(lhs)? == self.eval(rhs)?),
            BinOp::NotEq => Value::Boolean(self.eval(lhs)? != self.eval(rhs)?),
            BinOp::Lt => Value::Boolean(self.number(lhs)? < self.number(rhs)?),
            BinOp::Gt => Value::Boolean(self.number(lhs)? > self.number(rhs)?),
            BinOp::Add => Value::Number(self.number(lhs)? + self.number(rhs)?),
            BinOp::Sub => Value::Number(self.number(lhs)? - self.number(rhs)?),
            BinOp::Mul => Value::Number(self.number(lhs)? * self.number(rhs)?),
            BinOp::Div => Value::Number(self.number(lhs)? / self.number(rhs)?),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeDef;

    fn param(rdt: &mut Rdt, name: &str) -> NodeId {
        rdt.alloc(NodeKind::Param {
            name: name.to_string(),
            annotation: Some(TypeDef::number()),
        })
    }

    fn reference(rdt: &mut Rdt, target: NodeId, name: &str) -> NodeId {
        rdt.alloc(NodeKind::Reference {
            target,
            name: name.to_string(),
        })
    }

    #[test]
    fn calls_function_with_arguments() {
        // (a, b) => a - b * 2
        let mut rdt = Rdt::new();
        let a = param(&mut rdt, "a");
        let b = param(&mut rdt, "b");
        let ra = reference(&mut rdt, a, "a");
        let rb = reference(&mut rdt, b, "b");
        let two = rdt.alloc(NodeKind::NumberLiteral(2.0));
        let product = rdt.alloc(NodeKind::BinaryOp {
            op: BinOp::Mul,
            lhs: rb,
            rhs: two,
        });
        let body = rdt.alloc(NodeKind::BinaryOp {
            op: BinOp::Sub,
            lhs: ra,
            rhs: product,
        });
        let function = rdt.alloc(NodeKind::Function {
            name: None,
            params: vec![a, b],
            body,
        });

        let mut eval = Evaluator::new(&rdt);
        let result = eval
            .call(function, vec![Value::Number(10.0), Value::Number(3.0)])
            .unwrap();
        assert_eq!(result, Value::Number(4.0));

        let err = eval.call(function, vec![Value::Number(1.0)]).unwrap_err();
        assert!(
            matches!(err, EvalError::Arity { expected: 2, found: 1, .. }),
            "expected arity error, got: {:?}",
            err
        );
    }

    #[test]
    fn row_context_feeds_property_access() {
        let mut rdt = Rdt::new();
        let row = rdt.alloc(NodeKind::Context { name: "row".into() });
        let field = rdt.alloc(NodeKind::Identifier("amount".into()));
        let access = rdt.alloc(NodeKind::PropertyAccess {
            source: row,
            property: field,
        });

        let mut eval = Evaluator::new(&rdt)
            .with_context("row", Value::object([("amount", Value::Number(7.0))]));
        assert_eq!(eval.eval(access).unwrap(), Value::Number(7.0));
    }

    #[test]
    fn conditional_requires_boolean() {
        let mut rdt = Rdt::new();
        let one = rdt.alloc(NodeKind::NumberLiteral(1.0));
        let two = rdt.alloc(NodeKind::NumberLiteral(2.0));
        let three = rdt.alloc(NodeKind::NumberLiteral(3.0));
        let cond = rdt.alloc(NodeKind::Conditional {
            condition: one,
            then_branch: two,
            else_branch: three,
        });
        let err = Evaluator::new(&rdt).eval(cond).unwrap_err();
        assert_eq!(
            err,
            EvalError::Mismatch {
                node: one,
                expected: "boolean",
                found: "number"
            }
        );
    }

    #[test]
    fn let_binding_is_visible_through_references() {
        let mut rdt = Rdt::new();
        let five = rdt.alloc(NodeKind::NumberLiteral(5.0));
        let null = rdt.alloc(NodeKind::Null);
        let binding = rdt.alloc(NodeKind::Let {
            name: "x".into(),
            value: five,
            next: null,
        });
        let x = reference(&mut rdt, binding, "x");
        let sum = rdt.alloc(NodeKind::BinaryOp {
            op: BinOp::Add,
            lhs: x,
            rhs: x,
        });
        rdt.node_mut(binding).kind = NodeKind::Let {
            name: "x".into(),
            value: five,
            next: sum,
        };
        assert_eq!(Evaluator::new(&rdt).eval(binding).unwrap(), Value::Number(10.0));
    }
}
