//! Syntax tree handed to the compiler by the parser.
//!
//! The parser lives outside this workspace and emits this tree as JSON;
//! every type here derives `Deserialize` with an internal `"type"` tag so
//! the parser output can be loaded with `serde_json` directly. Expressions
//! may carry a [`Span`] which is threaded through lowering for diagnostics.
//!
//! The [`build`] module offers terse constructors for assembling trees by
//! hand in tests and tools.

pub mod build;

use serde::{Deserialize, Serialize};
use tally_common::Span;

/// A parsed source unit: top-level statements in source order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Statement {
    /// `Name { member, member, ... }`
    Definition(Definition),
    /// `name = expr` at the top level.
    Assignment {
        name: String,
        value: Expr,
        #[serde(default)]
        span: Option<Span>,
    },
    /// A bare expression statement.
    Expression { expr: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub members: Vec<Member>,
    #[serde(default)]
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Member {
    /// `name: type` -- a stored column.
    Property {
        name: String,
        ty: TypeExpr,
        #[serde(default)]
        span: Option<Span>,
    },
    /// `name: expr` -- a value derived from other columns.
    Derived {
        name: String,
        expr: Expr,
        #[serde(default)]
        span: Option<Span>,
    },
    /// `name(params) => body`
    Function {
        name: String,
        params: Vec<Param>,
        body: Expr,
        #[serde(default)]
        span: Option<Span>,
    },
}

impl Member {
    pub fn name(&self) -> &str {
        match self {
            Member::Property { name, .. }
            | Member::Derived { name, .. }
            | Member::Function { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub ty: Option<TypeExpr>,
    #[serde(default)]
    pub span: Option<Span>,
}

/// A type annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TypeExpr {
    /// `number`, `Transaction`, `string[]`, ...
    Named {
        base: String,
        #[serde(default)]
        array: bool,
    },
    /// `$row`
    Context { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    #[serde(flatten)]
    pub kind: ExprKind,
    #[serde(default)]
    pub span: Option<Span>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr { kind, span: None }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExprKind {
    String { value: String },
    Number { value: f64 },
    Boolean { value: bool },
    Identifier { name: String },
    /// `$row`
    Context { name: String },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `object.property`
    Member { object: Box<Expr>, property: String },
    Lambda { params: Vec<Param>, body: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        #[serde(default)]
        else_branch: Option<Box<Expr>>,
    },
    /// `let name = value`; only meaningful as a block statement.
    Let { name: String, value: Box<Expr> },
    /// `{ expr; expr; return expr }`
    Block { exprs: Vec<Expr> },
    Return { value: Box<Expr> },
    /// Postfix `[]`: `Transaction[]` names every row of a table.
    Postfix { operand: Box<Expr> },
    Paren { inner: Box<Expr> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_definition_with_derived_function() {
        let json = r#"{
            "statements": [{
                "type": "Definition",
                "name": "Transaction",
                "members": [
                    { "type": "Property", "name": "amount",
                      "ty": { "type": "Named", "base": "number" } },
                    { "type": "Derived", "name": "doubleAmount",
                      "expr": {
                        "type": "Lambda",
                        "params": [{ "name": "rand",
                                     "ty": { "type": "Named", "base": "number" } }],
                        "body": {
                            "type": "Binary", "op": "*",
                            "lhs": { "type": "Member", "property": "amount",
                                     "object": { "type": "Context", "name": "row" } },
                            "rhs": { "type": "Number", "value": 2.0,
                                     "span": { "start": 40, "end": 41 } }
                        }
                      } }
                ]
            }]
        }"#;
        let program: Program = serde_json::from_str(json).unwrap();
        let Statement::Definition(def) = &program.statements[0] else {
            panic!("expected a definition, got {:?}", program.statements[0]);
        };
        assert_eq!(def.name, "Transaction");
        assert_eq!(def.members.len(), 2);
        assert_eq!(def.members[1].name(), "doubleAmount");

        let Member::Derived { expr, .. } = &def.members[1] else {
            panic!("expected a derived member");
        };
        let ExprKind::Lambda { params, body } = &expr.kind else {
            panic!("expected a lambda");
        };
        assert_eq!(params[0].name, "rand");
        let ExprKind::Binary { op, rhs, .. } = &body.kind else {
            panic!("expected a binary operator");
        };
        assert_eq!(*op, BinaryOp::Mul);
        assert_eq!(rhs.span, Some(Span::new(40, 41)));
    }

    #[test]
    fn builder_output_round_trips_through_json() {
        use crate::build::*;

        let program = program(vec![
            definition("Account", vec![property("id", "string")]),
            assign(
                "total",
                call(
                    member(table("Account"), "reduce"),
                    vec![
                        lambda(
                            vec![param("acc", "number"), param("row", "Account")],
                            add(ident("acc"), num(1.0)),
                        ),
                        num(0.0),
                    ],
                ),
            ),
        ]);
        let json = serde_json::to_string(&program).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back, program);
    }
}
