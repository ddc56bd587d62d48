//! Shared types for the Tally compiler.
//!
//! Everything here is phase-agnostic: the AST, the RDT arena and the
//! diagnostics renderer all speak in terms of [`Span`].

pub mod span;

pub use span::{LineIndex, Span};
