//! Name resolution for the Tally compiler.
//!
//! [`resolve`] binds every definition, column, assignment, function,
//! parameter and `let` into a scope tree and rewrites identifiers into
//! references to their binding sites. It then drops `let` bindings whose
//! value is just another reference, pointing their uses straight at the
//! underlying target.

pub mod cleanup;
pub mod error;
pub mod resolve;

pub use cleanup::remove_redundant_references;
pub use error::ResolveError;
pub use resolve::{resolve, resolve_names, Resolution};
