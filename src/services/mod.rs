//! Collaborator seams the eval loop depends on.
//!
//! The core only ever talks to these traits. Concrete implementations backed
//! by the LLM client and the corpus directory live in the submodules.

pub mod answer;
pub mod generator;
pub mod judgment;
pub mod prompt_store;
pub mod prompts;

use anyhow::Result;
use async_trait::async_trait;

use crate::docs::types::DocMeta;
use crate::eval::dimensions::WorstDimension;
use crate::types::{EvalResultEntry, Verdict};

pub use answer::RetrievalAnswerer;
pub use generator::QaGenerator;
pub use judgment::LlmJudgment;
pub use prompt_store::{FilePromptStore, MemoryPromptStore};

#[async_trait]
pub trait CorpusProvider: Send + Sync {
    async fn list_documents(&self) -> Result<Vec<DocMeta>>;
}

/// Per-call options for answer generation.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// Start from an empty conversation; no state from earlier calls.
    pub fresh_context: bool,
    /// Effective system prompt for this call.
    pub system_prompt: String,
}

impl AskOptions {
    pub fn fresh(system_prompt: impl Into<String>) -> Self {
        Self {
            fresh_context: true,
            system_prompt: system_prompt.into(),
        }
    }
}

#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn ask(&self, question: &str, opts: &AskOptions) -> Result<String>;
}

#[async_trait]
pub trait JudgmentService: Send + Sync {
    /// Grade an actual answer against the expected one.
    async fn compare(&self, question: &str, expected: &str, actual: &str) -> Result<Verdict>;

    /// Root-cause patterns across a set of failures (3-5 bullets).
    async fn reflect(&self, failures: &[EvalResultEntry]) -> Result<String>;

    /// An addition to `current_prompt` addressing `reflections`. Never a rewrite.
    async fn curate(
        &self,
        current_prompt: &str,
        reflections: &str,
        worst: &WorstDimension,
    ) -> Result<String>;

    /// A standalone grading prompt built from labeled examples.
    async fn synthesize_judge_prompt(&self, train: &[EvalResultEntry]) -> Result<String>;

    /// Grade with a synthesized judge prompt, without the expected answer.
    async fn run_judge(&self, judge_prompt: &str, question: &str, answer: &str) -> Result<Verdict>;
}

/// The single "current effective system prompt".
#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn load(&self) -> Result<String>;
    async fn save(&self, prompt: &str) -> Result<()>;
}
