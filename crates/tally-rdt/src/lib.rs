//! The reactive derivation tree (RDT).
//!
//! Every compiler phase after parsing operates on an [`Rdt`]: an arena of
//! [`Node`]s addressed by [`NodeId`]. Nodes own their children by id and
//! non-owning links (references, dataset definitions) are plain ids into
//! the same arena, so rewriting a subtree never invalidates a link.
//!
//! - [`walk`] is the depth-first traversal with before/after rewrite hooks
//!   that the resolver, type engine and pipeline passes are written against.
//! - [`scope`] holds the lexical scope tree built during name resolution.
//! - [`lower`] turns the parser's syntax tree into an initial RDT.
//! - [`pretty`] renders expressions for debugging and test snapshots.
//! - [`eval`] interprets pure expressions and synthesized reducer functions.

pub mod error;
pub mod eval;
pub mod lower;
pub mod node;
pub mod pretty;
pub mod scope;
pub mod ty;
pub mod walk;

pub use error::StructuralError;
pub use node::{BinOp, Node, NodeId, NodeKind, PipelineOp, Rdt, Retarget};
pub use scope::{ScopeId, ScopeMap, Scopes, Symbol};
pub use ty::{Primitive, TypeDef};
pub use walk::{walk, Before, Lineage, Visitor};
