use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::prompts;
use super::JudgmentService;
use crate::eval::dimensions::WorstDimension;
use crate::llm::LlmClient;
use crate::parse::{parse_verdict, strip_code_fence, truncate};
use crate::types::{EvalResultEntry, Verdict};

/// Caps per-example text fed into reflection and judge synthesis.
const EXAMPLE_CHARS: usize = 600;

/// Judgment calls answered by the judge model.
pub struct LlmJudgment {
    llm: Arc<LlmClient>,
}

impl LlmJudgment {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl JudgmentService for LlmJudgment {
    async fn compare(&self, question: &str, expected: &str, actual: &str) -> Result<Verdict> {
        let user = format!(
            "QUESTION:\n{}\n\nEXPECTED:\n{}\n\nACTUAL:\n{}",
            question, expected, actual
        );
        let reply = self.llm.judge(prompts::COMPARE_SYSTEM, &user).await?;
        Ok(parse_verdict(&reply))
    }

    async fn reflect(&self, failures: &[EvalResultEntry]) -> Result<String> {
        let cases = failures
            .iter()
            .enumerate()
            .map(|(i, f)| {
                format!(
                    "--- Failure {} ---\nQuestion: {}\nExpected: {}\nActual: {}\nGrader: {}",
                    i + 1,
                    f.question,
                    truncate(&f.expected_answer, EXAMPLE_CHARS),
                    truncate(&f.actual_answer, EXAMPLE_CHARS),
                    f.reason
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let reply = self.llm.judge(prompts::REFLECT_SYSTEM, &cases).await?;
        Ok(reply.trim().to_string())
    }

    async fn curate(
        &self,
        current_prompt: &str,
        reflections: &str,
        worst: &WorstDimension,
    ) -> Result<String> {
        let user = format!(
            "CURRENT PROMPT:\n{}\n\nROOT CAUSES:\n{}\n\nFAILING CATEGORY: {} = {} ({:.0}% accuracy over {} questions)",
            current_prompt,
            reflections,
            worst.dimension,
            worst.value,
            worst.accuracy * 100.0,
            worst.total
        );
        let reply = self.llm.judge(prompts::CURATE_SYSTEM, &user).await?;
        Ok(strip_code_fence(&reply).to_string())
    }

    async fn synthesize_judge_prompt(&self, train: &[EvalResultEntry]) -> Result<String> {
        let examples = train
            .iter()
            .map(|e| {
                format!(
                    "QUESTION: {}\nANSWER: {}\nLABEL: {}\nREASON: {}",
                    e.question,
                    truncate(&e.actual_answer, EXAMPLE_CHARS),
                    if e.pass { "PASS" } else { "FAIL" },
                    e.reason
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let reply = self.llm.judge(prompts::SYNTHESIZE_SYSTEM, &examples).await?;
        let mut judge_prompt = strip_code_fence(&reply).to_string();
        if !(judge_prompt.contains("PASS:") && judge_prompt.contains("FAIL:")) {
            debug!("synthesized judge lacks output contract; appending");
            judge_prompt.push_str("\n\n");
            judge_prompt.push_str(prompts::JUDGE_OUTPUT_CONTRACT);
        }
        Ok(judge_prompt)
    }

    async fn run_judge(&self, judge_prompt: &str, question: &str, answer: &str) -> Result<Verdict> {
        let user = format!("QUESTION:\n{}\n\nANSWER:\n{}", question, answer);
        let reply = self.llm.judge(judge_prompt, &user).await?;
        Ok(parse_verdict(&reply))
    }
}
