//! Fatal and precondition errors for the eval pipeline.
//!
//! Per-pair failures never show up here: they become failing result entries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("benchmark not found: {0}")]
    BenchmarkNotFound(String),

    #[error("corpus is empty: add documents before running an eval")]
    EmptyCorpus,

    #[error("no failures to improve from in run {0}")]
    NoFailures(String),

    #[error("need at least {required} graded examples to train a judge, found {found}")]
    InsufficientExamples { required: usize, found: usize },

    #[error("judge training needs both passing and failing examples ({pass} pass, {fail} fail)")]
    SingleClass { pass: usize, fail: usize },

    #[error("proposed delta is not an addition: {delta_len} chars vs {prompt_len} char prompt")]
    NonAdditiveDelta { delta_len: usize, prompt_len: usize },

    #[error("eval run not found: {0}")]
    RunNotFound(String),

    #[error("malformed run log {path}: {detail}")]
    MalformedRun { path: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Service(String),
}

pub type Result<T> = std::result::Result<T, EvalError>;

impl From<anyhow::Error> for EvalError {
    fn from(err: anyhow::Error) -> Self {
        EvalError::Service(format!("{:#}", err))
    }
}
