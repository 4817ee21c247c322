//! The evaluation and self-improvement loop.

pub mod dimensions;
pub mod history;
pub mod improve;
pub mod judge;
pub mod runner;

pub use dimensions::{analyze, Dimension, DimensionAnalysis, WorstDimension};
pub use history::{render_history, History, HistoryEntry, HistoryTracker};
pub use improve::{Improvement, ImproveProgress, PromptImprover};
pub use judge::{JudgeResult, JudgeTrainer};
pub use runner::{EvalRunner, PairEvaluator, RunOptions};
