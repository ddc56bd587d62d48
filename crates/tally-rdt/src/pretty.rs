//! Single-line rendering of RDT subtrees for debugging and snapshots.

use std::fmt::Write;

use crate::node::{NodeId, NodeKind, Rdt};

/// Renders the subtree at `id`.
pub fn render(rdt: &Rdt, id: NodeId) -> String {
    let mut out = String::new();
    Printer { rdt, out: &mut out }.node(id);
    out
}

/// Renders a root node with one top-level item per line.
pub fn render_root(rdt: &Rdt, root: NodeId) -> String {
    let NodeKind::Root {
        definitions,
        assignments,
        expressions,
    } = rdt.kind(root)
    else {
        return render(rdt, root);
    };
    let mut lines: Vec<String> = definitions
        .iter()
        .chain(assignments)
        .map(|id| render(rdt, *id))
        .collect();
    if !matches!(rdt.kind(*expressions), NodeKind::Null) {
        lines.push(render(rdt, *expressions));
    }
    lines.join("\n")
}

struct Printer<'a> {
    rdt: &'a Rdt,
    out: &'a mut String,
}

impl Printer<'_> {
    fn list(&mut self, ids: &[NodeId], sep: &str) {
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                self.out.push_str(sep);
            }
            self.node(*id);
        }
    }

    /// Operands that are themselves operators are parenthesized.
    fn operand(&mut self, id: NodeId) {
        let wrap = matches!(
            self.rdt.kind(id),
            NodeKind::BinaryOp { .. } | NodeKind::Conditional { .. }
        );
        if wrap {
            self.out.push('(');
        }
        self.node(id);
        if wrap {
            self.out.push(')');
        }
    }

    fn node(&mut self, id: NodeId) {
        let Ok(node) = self.rdt.try_node(id) else {
            let _ = write!(self.out, "<dangling {}>", id);
            return;
        };
        match &node.kind {
            NodeKind::Root {
                definitions,
                assignments,
                expressions,
            } => {
                self.list(definitions, "; ");
                if !assignments.is_empty() {
                    self.out.push_str("; ");
                    self.list(assignments, "; ");
                }
                self.out.push_str("; ");
                self.node(*expressions);
            }
            NodeKind::Definition { name, properties } => {
                let _ = write!(self.out, "{} {{ ", name);
                self.list(properties, ", ");
                self.out.push_str(" }");
            }
            NodeKind::SimpleProperty { name, annotation } => {
                let _ = write!(self.out, "{}: {}", name, annotation);
            }
            NodeKind::DerivedProperty { name, derivation } => {
                let _ = write!(self.out, "{} = ", name);
                self.node(*derivation);
            }
            NodeKind::ReadWrite { read, writes } => {
                self.out.push_str("{ ");
                for (name, write) in writes {
                    let _ = write!(self.out, "write {} = ", name);
                    self.node(*write);
                    self.out.push_str("; ");
                }
                self.out.push_str("read ");
                self.node(*read);
                self.out.push_str(" }");
            }
            NodeKind::Assignment { name, value } => {
                let _ = write!(self.out, "{} = ", name);
                self.node(*value);
            }
            NodeKind::StringLiteral(s) => {
                let _ = write!(self.out, "{:?}", s);
            }
            NodeKind::NumberLiteral(n) => {
                let _ = write!(self.out, "{}", n);
            }
            NodeKind::BooleanLiteral(b) => {
                let _ = write!(self.out, "{}", b);
            }
            NodeKind::Identifier(name) => self.out.push_str(name),
            NodeKind::BinaryOp { op, lhs, rhs } => {
                self.operand(*lhs);
                let _ = write!(self.out, " {} ", op);
                self.operand(*rhs);
            }
            NodeKind::PropertyAccess { source, property } => {
                self.operand(*source);
                self.out.push('.');
                self.node(*property);
            }
            NodeKind::Function { name, params, body } => {
                if let Some(name) = name {
                    self.out.push_str(name);
                }
                self.out.push('(');
                self.list(params, ", ");
                self.out.push_str(") => ");
                self.node(*body);
            }
            NodeKind::Invoke { callee, args } => {
                self.operand(*callee);
                self.out.push('(');
                self.list(args, ", ");
                self.out.push(')');
            }
            NodeKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                self.out.push_str("if ");
                self.node(*condition);
                self.out.push_str(" then ");
                self.node(*then_branch);
                self.out.push_str(" else ");
                self.node(*else_branch);
            }
            NodeKind::Let { name, value, next } => {
                let _ = write!(self.out, "let {} = ", name);
                self.node(*value);
                self.out.push_str("; ");
                self.node(*next);
            }
            NodeKind::SideEffect { expr, next } => {
                self.node(*expr);
                self.out.push_str("; ");
                self.node(*next);
            }
            NodeKind::ArrayMarker { operand } => {
                self.node(*operand);
                self.out.push_str("[]");
            }
            NodeKind::Context { name } => {
                let _ = write!(self.out, "${}", name);
            }
            NodeKind::Param { name, annotation } => {
                self.out.push_str(name);
                if let Some(ty) = annotation {
                    let _ = write!(self.out, ": {}", ty);
                }
            }
            NodeKind::Null => self.out.push_str("null"),
            NodeKind::Reference { name, .. } => self.out.push_str(name),
            NodeKind::Dataset { name, .. } => {
                let _ = write!(self.out, "$dataset({})", name);
            }
            NodeKind::Filter { predicate } => {
                self.out.push_str("filter(");
                self.node(*predicate);
                self.out.push(')');
            }
            NodeKind::Pipeline { source, stages } => {
                self.node(*source);
                for stage in stages {
                    self.out.push('.');
                    self.node(*stage);
                }
            }
            NodeKind::Intent { op, source } => {
                self.node(*source);
                let _ = write!(self.out, ".{}", op.name());
            }
            NodeKind::Reduce {
                source,
                initial,
                forward,
                inverse,
                view,
            } => {
                self.out.push_str("reduce { source: ");
                self.node(*source);
                self.out.push_str(", initial: ");
                self.node(*initial);
                self.out.push_str(", forward: ");
                self.node(*forward);
                self.out.push_str(", inverse: ");
                self.node(*inverse);
                self.out.push_str(", view: ");
                self.node(*view);
                self.out.push_str(" }");
            }
        }
    }
}
