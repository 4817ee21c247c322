//! Continuous evaluation and prompt self-improvement for the Edgar document
//! assistant.
//!
//! Benchmarks are versioned QA sets, runs are append-only graded logs, and the
//! improvement loop turns the worst-performing slice of a run into a tested
//! prompt addition.

pub mod config;
pub mod docs;
pub mod error;
pub mod eval;
pub mod llm;
pub mod mining;
pub mod parse;
pub mod services;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::{DataLayout, EvalConfig};
pub use error::{EvalError, Result};
