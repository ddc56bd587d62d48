//! Type resolution for the Tally compiler.
//!
//! Types are computed bottom-up by repeated passes over the tree until a
//! pass changes nothing. Each node's type depends only on its children and
//! on the types of the binding sites its references point at, so
//! information flows both down the tree (through references) and up (from
//! children) across passes.
//!
//! - [`infer`] runs the fixed point and the final completeness check
//! - [`env`] resolves table names and compares types structurally
//! - [`builtins`] holds the signatures of the array members
//! - [`diagnostics`] renders [`TypeError`]s with ariadne

pub mod builtins;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod infer;

pub use env::{Compare, TypeEnv};
pub use error::TypeError;
pub use infer::{resolve_types, TypeSummary, DEFAULT_MAX_PASSES};
