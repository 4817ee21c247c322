//! Synthesizing a standalone grading judge from a graded run.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EvalError, Result};
use crate::services::JudgmentService;
use crate::store::write_json_atomic;
use crate::types::{accuracy, EvalResultEntry, EvalRun, Verdict};

const TRAIN_FRACTION: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeTestDetail {
    pub id: u32,
    pub question: String,
    pub ground_truth: bool,
    pub verdict: bool,
    pub agree: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeResult {
    pub judge_prompt: String,
    pub train_count: usize,
    pub test_count: usize,
    pub agreement: f64,
    pub test_details: Vec<JudgeTestDetail>,
}

/// The single current judge, overwritten on each successful creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeArtifact {
    pub judge_prompt: String,
    pub created_at: DateTime<Utc>,
    pub run_id: String,
    pub train_count: usize,
    pub test_count: usize,
    pub agreement: f64,
}

pub struct JudgeTrainer {
    judgment: Arc<dyn JudgmentService>,
    artifact_path: PathBuf,
    concurrency: usize,
    seed: Option<u64>,
}

impl JudgeTrainer {
    pub fn new(
        judgment: Arc<dyn JudgmentService>,
        artifact_path: impl Into<PathBuf>,
        concurrency: usize,
    ) -> Self {
        Self {
            judgment,
            artifact_path: artifact_path.into(),
            concurrency: concurrency.max(1),
            seed: None,
        }
    }

    /// Fix the shuffle for reproducible splits.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub async fn create_judge(&self, run: &EvalRun, min_examples: usize) -> Result<JudgeResult> {
        let found = run.results.len();
        if found < min_examples {
            return Err(EvalError::InsufficientExamples {
                required: min_examples,
                found,
            });
        }
        let pass = run.passes().count();
        let fail = found - pass;
        if pass == 0 || fail == 0 {
            return Err(EvalError::SingleClass { pass, fail });
        }

        let mut examples = run.results.clone();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        examples.shuffle(&mut rng);
        let (train, test) = split_examples(examples);
        info!(
            run_id = %run.id,
            train = train.len(),
            test = test.len(),
            "synthesizing judge"
        );

        let judge_prompt = self.judgment.synthesize_judge_prompt(&train).await?;

        let judge_prompt_ref = judge_prompt.as_str();
        let judgment = &self.judgment;
        let test_details: Vec<JudgeTestDetail> = stream::iter(test.iter())
            .map(|example| async move {
                let verdict = judgment
                    .run_judge(judge_prompt_ref, &example.question, &example.actual_answer)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(pair_id = example.id, error = %e, "judge call failed");
                        Verdict::fail(format!("Error: {:#}", e))
                    });
                JudgeTestDetail {
                    id: example.id,
                    question: example.question.clone(),
                    ground_truth: example.pass,
                    verdict: verdict.pass,
                    agree: verdict.pass == example.pass,
                    reason: verdict.reason,
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let agree = test_details.iter().filter(|d| d.agree).count();
        let result = JudgeResult {
            judge_prompt,
            train_count: train.len(),
            test_count: test_details.len(),
            agreement: accuracy(agree, test_details.len()),
            test_details,
        };

        let artifact = JudgeArtifact {
            judge_prompt: result.judge_prompt.clone(),
            created_at: Utc::now(),
            run_id: run.id.clone(),
            train_count: result.train_count,
            test_count: result.test_count,
            agreement: result.agreement,
        };
        write_json_atomic(&self.artifact_path, &artifact).await?;
        info!(
            run_id = %run.id,
            agreement = result.agreement,
            path = %self.artifact_path.display(),
            "judge saved"
        );
        Ok(result)
    }

    pub async fn current(&self) -> Result<Option<JudgeArtifact>> {
        match tokio::fs::read(&self.artifact_path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// 80/20 by count; the test side always gets at least one example.
fn split_examples(
    mut examples: Vec<EvalResultEntry>,
) -> (Vec<EvalResultEntry>, Vec<EvalResultEntry>) {
    let len = examples.len();
    let mut train_idx = (len as f64 * TRAIN_FRACTION).floor() as usize;
    if len - train_idx == 0 && train_idx > 0 {
        train_idx -= 1;
    }
    let test = examples.split_off(train_idx);
    (examples, test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dimensions;

    fn entries(n: usize) -> Vec<EvalResultEntry> {
        (0..n)
            .map(|i| EvalResultEntry {
                id: i as u32 + 1,
                question: format!("q{}", i),
                expected_answer: "e".into(),
                actual_answer: "a".into(),
                pass: i % 2 == 0,
                reason: String::new(),
                elapsed_ms: 0,
                dimensions: Dimensions::default(),
            })
            .collect()
    }

    #[test]
    fn split_is_eighty_twenty() {
        let (train, test) = split_examples(entries(10));
        assert_eq!((train.len(), test.len()), (8, 2));
        let (train, test) = split_examples(entries(12));
        assert_eq!((train.len(), test.len()), (9, 3));
    }

    #[test]
    fn split_always_leaves_a_test_example() {
        for n in 1..30 {
            let (train, test) = split_examples(entries(n));
            assert!(!test.is_empty(), "n = {}", n);
            assert_eq!(train.len() + test.len(), n);
        }
    }
}
