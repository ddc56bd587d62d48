//! Dataset pipelines for the Tally compiler.
//!
//! Runs on a typed tree. [`recognize_pipelines`] turns `Table[]` chains
//! into dataset, pipeline and reduce nodes, inverting each reducer with
//! [`invert_reduce`] so it can be maintained row by row.
//! [`split_read_write`] then separates what each derived property can
//! store at write time from what it must compute on read.

pub mod error;
pub mod invert;
pub mod recognize;
pub mod split;

pub use error::PipelineError;
pub use invert::invert_reduce;
pub use recognize::{recognize_pipelines, PipelineSummary};
pub use split::{split_read_write, SplitSummary};
