//! Node arena and the closed set of node variants.

use std::fmt;

use rustc_hash::FxHashMap;
use tally_common::Span;

use crate::error::StructuralError;
use crate::ty::TypeDef;

/// Index of a node in an [`Rdt`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position in the arena's backing vector.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    Gt,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    /// `<` and `>`: numeric comparison.
    pub fn is_ordering(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Gt)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::NotEq)
    }

    /// The operator that undoes this one: `+`/`-` and `*`/`/`.
    pub fn inverse(self) -> Option<BinOp> {
        match self {
            BinOp::Add => Some(BinOp::Sub),
            BinOp::Sub => Some(BinOp::Add),
            BinOp::Mul => Some(BinOp::Div),
            BinOp::Div => Some(BinOp::Mul),
            _ => None,
        }
    }
}

impl From<tally_ast::BinaryOp> for BinOp {
    fn from(op: tally_ast::BinaryOp) -> Self {
        use tally_ast::BinaryOp as Ast;
        match op {
            Ast::Add => BinOp::Add,
            Ast::Sub => BinOp::Sub,
            Ast::Mul => BinOp::Mul,
            Ast::Div => BinOp::Div,
            Ast::Eq => BinOp::Eq,
            Ast::NotEq => BinOp::NotEq,
            Ast::Lt => BinOp::Lt,
            Ast::Gt => BinOp::Gt,
            Ast::And => BinOp::And,
            Ast::Or => BinOp::Or,
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The member of a dataset or pipeline that was accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineOp {
    Filter,
    Include,
    Reduce,
}

impl PipelineOp {
    pub fn from_member(name: &str) -> Option<PipelineOp> {
        match name {
            "filter" => Some(PipelineOp::Filter),
            "include" => Some(PipelineOp::Include),
            "reduce" => Some(PipelineOp::Reduce),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PipelineOp::Filter => "filter",
            PipelineOp::Include => "include",
            PipelineOp::Reduce => "reduce",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root {
        definitions: Vec<NodeId>,
        assignments: Vec<NodeId>,
        expressions: NodeId,
    },
    Definition {
        name: String,
        properties: Vec<NodeId>,
    },
    SimpleProperty {
        name: String,
        annotation: TypeDef,
    },
    DerivedProperty {
        name: String,
        derivation: NodeId,
    },
    /// Derivation split into write-time intermediates and a read-time expression.
    ReadWrite {
        read: NodeId,
        writes: Vec<(String, NodeId)>,
    },
    Assignment {
        name: String,
        value: NodeId,
    },
    StringLiteral(String),
    NumberLiteral(f64),
    BooleanLiteral(bool),
    Identifier(String),
    BinaryOp {
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    /// `property` is always an [`NodeKind::Identifier`] naming the member.
    PropertyAccess {
        source: NodeId,
        property: NodeId,
    },
    Function {
        name: Option<String>,
        params: Vec<NodeId>,
        body: NodeId,
    },
    Invoke {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Conditional {
        condition: NodeId,
        then_branch: NodeId,
        else_branch: NodeId,
    },
    /// `let name = value` scoped over `next`.
    Let {
        name: String,
        value: NodeId,
        next: NodeId,
    },
    /// Evaluate `expr`, discard it, continue with `next`.
    SideEffect {
        expr: NodeId,
        next: NodeId,
    },
    /// Postfix `[]` on a table reference.
    ArrayMarker {
        operand: NodeId,
    },
    /// An implicit value such as `$row`.
    Context {
        name: String,
    },
    Param {
        name: String,
        annotation: Option<TypeDef>,
    },
    Null,
    /// Non-owning link to a binding site.
    Reference {
        target: NodeId,
        name: String,
    },
    /// Every row of a table. `definition` is a non-owning link.
    Dataset {
        name: String,
        definition: NodeId,
    },
    Filter {
        predicate: NodeId,
    },
    Pipeline {
        source: NodeId,
        stages: Vec<NodeId>,
    },
    /// A pipeline member that has been accessed but not yet invoked.
    Intent {
        op: PipelineOp,
        source: NodeId,
    },
    /// An incrementally maintainable aggregate.
    Reduce {
        source: NodeId,
        initial: NodeId,
        forward: NodeId,
        inverse: NodeId,
        view: NodeId,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Root { .. } => "root",
            NodeKind::Definition { .. } => "definition",
            NodeKind::SimpleProperty { .. } => "simple property",
            NodeKind::DerivedProperty { .. } => "derived property",
            NodeKind::ReadWrite { .. } => "read/write split",
            NodeKind::Assignment { .. } => "assignment",
            NodeKind::StringLiteral(_) => "string literal",
            NodeKind::NumberLiteral(_) => "number literal",
            NodeKind::BooleanLiteral(_) => "boolean literal",
            NodeKind::Identifier(_) => "identifier",
            NodeKind::BinaryOp { .. } => "binary operator",
            NodeKind::PropertyAccess { .. } => "property access",
            NodeKind::Function { .. } => "function",
            NodeKind::Invoke { .. } => "invocation",
            NodeKind::Conditional { .. } => "conditional",
            NodeKind::Let { .. } => "let binding",
            NodeKind::SideEffect { .. } => "side effect",
            NodeKind::ArrayMarker { .. } => "array marker",
            NodeKind::Context { .. } => "context value",
            NodeKind::Param { .. } => "parameter",
            NodeKind::Null => "null",
            NodeKind::Reference { .. } => "reference",
            NodeKind::Dataset { .. } => "dataset",
            NodeKind::Filter { .. } => "filter",
            NodeKind::Pipeline { .. } => "pipeline",
            NodeKind::Intent { .. } => "pipeline intent",
            NodeKind::Reduce { .. } => "reduce",
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            NodeKind::StringLiteral(_) | NodeKind::NumberLiteral(_) | NodeKind::BooleanLiteral(_)
        )
    }

    /// Owned children in traversal order. Non-owning links are excluded.
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        match self {
            NodeKind::Root {
                definitions,
                assignments,
                expressions,
            } => {
                out.extend(definitions);
                out.extend(assignments);
                out.push(*expressions);
            }
            NodeKind::Definition { properties, .. } => out.extend(properties),
            NodeKind::DerivedProperty { derivation, .. } => out.push(*derivation),
            NodeKind::ReadWrite { read, writes } => {
                out.extend(writes.iter().map(|(_, id)| *id));
                out.push(*read);
            }
            NodeKind::Assignment { value, .. } => out.push(*value),
            NodeKind::BinaryOp { lhs, rhs, .. } => out.extend([*lhs, *rhs]),
            NodeKind::PropertyAccess { source, property } => out.extend([*source, *property]),
            NodeKind::Function { params, body, .. } => {
                out.extend(params);
                out.push(*body);
            }
            NodeKind::Invoke { callee, args } => {
                out.push(*callee);
                out.extend(args);
            }
            NodeKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => out.extend([*condition, *then_branch, *else_branch]),
            NodeKind::Let { value, next, .. } => out.extend([*value, *next]),
            NodeKind::SideEffect { expr, next } => out.extend([*expr, *next]),
            NodeKind::ArrayMarker { operand } => out.push(*operand),
            NodeKind::Filter { predicate } => out.push(*predicate),
            NodeKind::Pipeline { source, stages } => {
                out.push(*source);
                out.extend(stages);
            }
            NodeKind::Intent { source, .. } => out.push(*source),
            NodeKind::Reduce {
                source,
                initial,
                forward,
                inverse,
                view,
            } => out.extend([*source, *initial, *forward, *inverse, *view]),
            NodeKind::SimpleProperty { .. }
            | NodeKind::StringLiteral(_)
            | NodeKind::NumberLiteral(_)
            | NodeKind::BooleanLiteral(_)
            | NodeKind::Identifier(_)
            | NodeKind::Context { .. }
            | NodeKind::Param { .. }
            | NodeKind::Null
            | NodeKind::Reference { .. }
            | NodeKind::Dataset { .. } => {}
        }
        out
    }

    /// Mutable access to the owned child slots, in the order of [`children`](Self::children).
    pub fn children_mut(&mut self) -> Vec<&mut NodeId> {
        let mut out: Vec<&mut NodeId> = Vec::new();
        match self {
            NodeKind::Root {
                definitions,
                assignments,
                expressions,
            } => {
                out.extend(definitions.iter_mut());
                out.extend(assignments.iter_mut());
                out.push(expressions);
            }
            NodeKind::Definition { properties, .. } => out.extend(properties.iter_mut()),
            NodeKind::DerivedProperty { derivation, .. } => out.push(derivation),
            NodeKind::ReadWrite { read, writes } => {
                out.extend(writes.iter_mut().map(|(_, id)| id));
                out.push(read);
            }
            NodeKind::Assignment { value, .. } => out.push(value),
            NodeKind::BinaryOp { lhs, rhs, .. } => {
                out.push(lhs);
                out.push(rhs);
            }
            NodeKind::PropertyAccess { source, property } => {
                out.push(source);
                out.push(property);
            }
            NodeKind::Function { params, body, .. } => {
                out.extend(params.iter_mut());
                out.push(body);
            }
            NodeKind::Invoke { callee, args } => {
                out.push(callee);
                out.extend(args.iter_mut());
            }
            NodeKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                out.push(condition);
                out.push(then_branch);
                out.push(else_branch);
            }
            NodeKind::Let { value, next, .. } => {
                out.push(value);
                out.push(next);
            }
            NodeKind::SideEffect { expr, next } => {
                out.push(expr);
                out.push(next);
            }
            NodeKind::ArrayMarker { operand } => out.push(operand),
            NodeKind::Filter { predicate } => out.push(predicate),
            NodeKind::Pipeline { source, stages } => {
                out.push(source);
                out.extend(stages.iter_mut());
            }
            NodeKind::Intent { source, .. } => out.push(source),
            NodeKind::Reduce {
                source,
                initial,
                forward,
                inverse,
                view,
            } => {
                out.push(source);
                out.push(initial);
                out.push(forward);
                out.push(inverse);
                out.push(view);
            }
            NodeKind::SimpleProperty { .. }
            | NodeKind::StringLiteral(_)
            | NodeKind::NumberLiteral(_)
            | NodeKind::BooleanLiteral(_)
            | NodeKind::Identifier(_)
            | NodeKind::Context { .. }
            | NodeKind::Param { .. }
            | NodeKind::Null
            | NodeKind::Reference { .. }
            | NodeKind::Dataset { .. } => {}
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Filled in by the type engine.
    pub ty: Option<TypeDef>,
    pub span: Option<Span>,
}

/// Redirect for references during [`Rdt::deep_copy`].
#[derive(Debug, Clone, PartialEq)]
pub struct Retarget {
    pub target: NodeId,
    pub name: String,
}

/// Arena of RDT nodes.
#[derive(Debug, Clone, Default)]
pub struct Rdt {
    nodes: Vec<Node>,
}

impl Rdt {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Rdt { nodes: Vec::new() }
    }

    /// Number of nodes ever allocated, live or detached.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocates an untyped node with no source span.
    pub fn alloc(&mut self, kind: NodeKind) -> NodeId {
        self.push(Node {
            kind,
            ty: None,
            span: None,
        })
    }

    /// Allocates a node carrying the span it was lowered from.
    pub fn alloc_spanned(&mut self, kind: NodeKind, span: Option<Span>) -> NodeId {
        self.push(Node {
            kind,
            ty: None,
            span,
        })
    }

    /// Allocates a node whose type is already known.
    pub fn alloc_typed(&mut self, kind: NodeKind, ty: TypeDef) -> NodeId {
        self.push(Node {
            kind,
            ty: Some(ty),
            span: None,
        })
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Whether `id` was allocated by this arena.
    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Like [`node`](Self::node), reporting a dangling id instead of panicking.
    pub fn try_node(&self, id: NodeId) -> Result<&Node, StructuralError> {
        self.nodes
            .get(id.index())
            .ok_or(StructuralError::DanglingNode(id))
    }

    /// Panics if `id` was not allocated by this arena.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Panics if `id` was not allocated by this arena.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    /// The inferred type, if the type engine has assigned one.
    pub fn ty(&self, id: NodeId) -> Option<&TypeDef> {
        self.node(id).ty.as_ref()
    }

    /// Replaces the type of `id`, returning whether it changed.
    pub fn set_ty(&mut self, id: NodeId, ty: TypeDef) -> bool {
        let node = self.node_mut(id);
        if node.ty.as_ref() == Some(&ty) {
            return false;
        }
        node.ty = Some(ty);
        true
    }

    /// Source span. `None` for nodes synthesized after lowering.
    pub fn span(&self, id: NodeId) -> Option<Span> {
        self.node(id).span
    }

    /// Name of an identifier node.
    pub fn identifier(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// Whether `id` is the member-name identifier of `parent`.
    pub fn is_property_name(&self, id: NodeId, parent: Option<NodeId>) -> bool {
        match parent.map(|p| self.kind(p)) {
            Some(NodeKind::PropertyAccess { property, .. }) => *property == id,
            _ => false,
        }
    }

    /// Every node reachable from `root` through owned child slots, in pre-order.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let children = self.kind(id).children();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Copies the subtree at `root` into fresh nodes.
    ///
    /// References into the copied region are redirected to the copies.
    /// References whose target appears in `retarget` are redirected there
    /// instead; everything else keeps pointing at the original target.
    pub fn deep_copy(&mut self, root: NodeId, retarget: &FxHashMap<NodeId, Retarget>) -> NodeId {
        let mut copies = FxHashMap::default();
        let new_root = self.copy_subtree(root, &mut copies);
        for &copy in copies.values() {
            if let NodeKind::Reference { target, name } = &mut self.nodes[copy.index()].kind {
                let original = *target;
                if let Some(redirect) = retarget.get(&original) {
                    *target = redirect.target;
                    *name = redirect.name.clone();
                } else if let Some(&inner) = copies.get(&original) {
                    *target = inner;
                }
            }
        }
        new_root
    }

    fn copy_subtree(&mut self, id: NodeId, copies: &mut FxHashMap<NodeId, NodeId>) -> NodeId {
        let mut node = self.node(id).clone();
        for slot in node.kind.children_mut() {
            *slot = self.copy_subtree(*slot, copies);
        }
        let copy = self.push(node);
        copies.insert(id, copy);
        copy
    }

    /// Structural equality of two subtrees, ignoring ids, types and spans.
    /// References are equal when they point at the same target.
    pub fn same_shape(&self, a: NodeId, b: NodeId) -> bool {
        let (ka, kb) = (self.kind(a), self.kind(b));
        if std::mem::discriminant(ka) != std::mem::discriminant(kb) {
            return false;
        }
        let leaf_equal = match (ka, kb) {
            (NodeKind::Definition { name: x, .. }, NodeKind::Definition { name: y, .. })
            | (NodeKind::DerivedProperty { name: x, .. }, NodeKind::DerivedProperty { name: y, .. })
            | (NodeKind::Assignment { name: x, .. }, NodeKind::Assignment { name: y, .. })
            | (NodeKind::Let { name: x, .. }, NodeKind::Let { name: y, .. })
            | (NodeKind::Context { name: x }, NodeKind::Context { name: y })
            | (NodeKind::Dataset { name: x, .. }, NodeKind::Dataset { name: y, .. })
            | (NodeKind::StringLiteral(x), NodeKind::StringLiteral(y))
            | (NodeKind::Identifier(x), NodeKind::Identifier(y)) => x == y,
            (
                NodeKind::SimpleProperty {
                    name: x,
                    annotation: tx,
                },
                NodeKind::SimpleProperty {
                    name: y,
                    annotation: ty,
                },
            ) => x == y && tx == ty,
            (
                NodeKind::Param {
                    name: x,
                    annotation: tx,
                },
                NodeKind::Param {
                    name: y,
                    annotation: ty,
                },
            ) => x == y && tx == ty,
            (NodeKind::NumberLiteral(x), NodeKind::NumberLiteral(y)) => x == y,
            (NodeKind::BooleanLiteral(x), NodeKind::BooleanLiteral(y)) => x == y,
            (NodeKind::BinaryOp { op: x, .. }, NodeKind::BinaryOp { op: y, .. }) => x == y,
            (NodeKind::Function { name: x, .. }, NodeKind::Function { name: y, .. }) => x == y,
            (NodeKind::Intent { op: x, .. }, NodeKind::Intent { op: y, .. }) => x == y,
            (NodeKind::Reference { target: x, .. }, NodeKind::Reference { target: y, .. }) => {
                x == y
            }
            (NodeKind::ReadWrite { writes: x, .. }, NodeKind::ReadWrite { writes: y, .. }) => {
                x.len() == y.len() && x.iter().zip(y).all(|((nx, _), (ny, _))| nx == ny)
            }
            _ => true,
        };
        if !leaf_equal {
            return false;
        }
        let (ca, cb) = (ka.children(), kb.children());
        ca.len() == cb.len() && ca.iter().zip(&cb).all(|(x, y)| self.same_shape(*x, *y))
    }
}
