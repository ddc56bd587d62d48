//! Terse constructors for assembling syntax trees by hand.

use crate::{BinaryOp, Definition, Expr, ExprKind, Member, Param, Program, Statement, TypeExpr};

pub fn program(statements: Vec<Statement>) -> Program {
    Program { statements }
}

pub fn definition(name: &str, members: Vec<Member>) -> Statement {
    Statement::Definition(Definition {
        name: name.to_string(),
        members,
        span: None,
    })
}

pub fn assign(name: &str, value: Expr) -> Statement {
    Statement::Assignment {
        name: name.to_string(),
        value,
        span: None,
    }
}

pub fn statement(expr: Expr) -> Statement {
    Statement::Expression { expr }
}

/// `name: type`; a trailing `[]` on `ty` marks an array column.
pub fn property(name: &str, ty: &str) -> Member {
    Member::Property {
        name: name.to_string(),
        ty: type_expr(ty),
        span: None,
    }
}

pub fn derived(name: &str, expr: Expr) -> Member {
    Member::Derived {
        name: name.to_string(),
        expr,
        span: None,
    }
}

pub fn method(name: &str, params: Vec<Param>, body: Expr) -> Member {
    Member::Function {
        name: name.to_string(),
        params,
        body,
        span: None,
    }
}

/// Parses the annotation shorthand used by the other builders:
/// `$row` is a context type and `T[]` an array of `T`.
pub fn type_expr(ty: &str) -> TypeExpr {
    if let Some(name) = ty.strip_prefix('$') {
        return TypeExpr::Context {
            name: name.to_string(),
        };
    }
    match ty.strip_suffix("[]") {
        Some(base) => TypeExpr::Named {
            base: base.to_string(),
            array: true,
        },
        None => TypeExpr::Named {
            base: ty.to_string(),
            array: false,
        },
    }
}

pub fn param(name: &str, ty: &str) -> Param {
    Param {
        name: name.to_string(),
        ty: Some(type_expr(ty)),
        span: None,
    }
}

pub fn untyped_param(name: &str) -> Param {
    Param {
        name: name.to_string(),
        ty: None,
        span: None,
    }
}

pub fn num(value: f64) -> Expr {
    Expr::new(ExprKind::Number { value })
}

pub fn boolean(value: bool) -> Expr {
    Expr::new(ExprKind::Boolean { value })
}

pub fn string(value: &str) -> Expr {
    Expr::new(ExprKind::String {
        value: value.to_string(),
    })
}

pub fn ident(name: &str) -> Expr {
    Expr::new(ExprKind::Identifier {
        name: name.to_string(),
    })
}

/// `$row`
pub fn row() -> Expr {
    Expr::new(ExprKind::Context {
        name: "row".to_string(),
    })
}

pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Add, lhs, rhs)
}

pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Sub, lhs, rhs)
}

pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Mul, lhs, rhs)
}

pub fn div(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Div, lhs, rhs)
}

pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Eq, lhs, rhs)
}

pub fn or(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Or, lhs, rhs)
}

pub fn and(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::And, lhs, rhs)
}

pub fn member(object: Expr, property: &str) -> Expr {
    Expr::new(ExprKind::Member {
        object: Box::new(object),
        property: property.to_string(),
    })
}

pub fn lambda(params: Vec<Param>, body: Expr) -> Expr {
    Expr::new(ExprKind::Lambda {
        params,
        body: Box::new(body),
    })
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Call {
        callee: Box::new(callee),
        args,
    })
}

pub fn if_else(condition: Expr, then_branch: Expr, else_branch: Option<Expr>) -> Expr {
    Expr::new(ExprKind::If {
        condition: Box::new(condition),
        then_branch: Box::new(then_branch),
        else_branch: else_branch.map(Box::new),
    })
}

pub fn let_(name: &str, value: Expr) -> Expr {
    Expr::new(ExprKind::Let {
        name: name.to_string(),
        value: Box::new(value),
    })
}

pub fn block(exprs: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Block { exprs })
}

pub fn ret(value: Expr) -> Expr {
    Expr::new(ExprKind::Return {
        value: Box::new(value),
    })
}

/// `Name[]`: every row of the named table.
pub fn table(name: &str) -> Expr {
    Expr::new(ExprKind::Postfix {
        operand: Box::new(ident(name)),
    })
}

pub fn paren(inner: Expr) -> Expr {
    Expr::new(ExprKind::Paren {
        inner: Box::new(inner),
    })
}
