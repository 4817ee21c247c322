//! Reflect, curate, test, regression-check: turning the worst slice's failures
//! into a validated prompt addition.
//!
//! Each stage is its own type and consumes the previous one, so a stage can
//! only run on the finished output of the stage before it:
//! `Located -> Reflected -> Curated -> Tested -> Checked -> Improvement`.

use std::sync::Arc;

use chrono::Utc;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::dimensions::{analyze, Dimension, WorstDimension};
use super::runner::PairEvaluator;
use crate::error::{EvalError, Result};
use crate::services::{JudgmentService, PromptStore};
use crate::store::ImprovementLedger;
use crate::types::{accuracy, prompt_hash, EvalResultEntry, EvalRun, ImprovementLog};

/// Stage boundaries reported while `suggest` runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ImproveProgress {
    Located {
        dimension: Dimension,
        value: String,
        failures: usize,
    },
    Reflected,
    Curated {
        delta_chars: usize,
    },
    Tested {
        done: usize,
        total: usize,
    },
    Checked {
        done: usize,
        total: usize,
    },
}

pub type ImproveProgressFn = Box<dyn FnMut(&ImproveProgress) + Send>;

/// A previously passing pair that fails under the augmented prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Regression {
    pub id: u32,
    pub question: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Improvement {
    pub target_dimension: Dimension,
    pub target_value: String,
    pub reflections: String,
    pub proposed_delta: String,
    /// Hash of the prompt the delta was tested against.
    pub base_prompt_hash: String,
    pub before_accuracy: f64,
    pub after_accuracy: f64,
    pub failures_before: usize,
    pub failures_after: usize,
    pub regressions: Vec<Regression>,
    pub pass_test_results: Vec<EvalResultEntry>,
    pub fail_test_results: Vec<EvalResultEntry>,
}

pub struct Located {
    run_id: String,
    worst: WorstDimension,
    /// Previously passing results in run order.
    passing: Vec<EvalResultEntry>,
}

pub struct Reflected {
    located: Located,
    reflections: String,
}

pub struct Curated {
    reflected: Reflected,
    base_prompt: String,
    delta: String,
}

pub struct Tested {
    curated: Curated,
    fail_results: Vec<EvalResultEntry>,
}

pub struct Checked {
    tested: Tested,
    pass_results: Vec<EvalResultEntry>,
}

impl Checked {
    fn into_improvement(self) -> Improvement {
        let Checked {
            tested,
            pass_results,
        } = self;
        let Tested {
            curated,
            fail_results,
        } = tested;
        let Curated {
            reflected,
            base_prompt,
            delta,
        } = curated;
        let Reflected {
            located,
            reflections,
        } = reflected;
        let worst = located.worst;

        let fixed = fail_results.iter().filter(|r| r.pass).count();
        let regressions = pass_results
            .iter()
            .filter(|r| !r.pass)
            .map(|r| Regression {
                id: r.id,
                question: r.question.clone(),
                reason: r.reason.clone(),
            })
            .collect();

        Improvement {
            target_dimension: worst.dimension,
            target_value: worst.value,
            reflections,
            proposed_delta: delta,
            base_prompt_hash: prompt_hash(&base_prompt),
            before_accuracy: worst.accuracy,
            after_accuracy: accuracy(fixed, fail_results.len()),
            failures_before: fail_results.len(),
            failures_after: fail_results.len() - fixed,
            regressions,
            pass_test_results: pass_results,
            fail_test_results: fail_results,
        }
    }
}

/// `current + "\n\n" + delta`, the prompt a delta is tested and applied as.
pub fn augment(current: &str, delta: &str) -> String {
    format!("{}\n\n{}", current, delta)
}

/// Reduce a curator reply to a pure addition. A reply that echoes the whole
/// current prompt first is cut down to what follows it.
pub fn additive_delta(current: &str, reply: &str) -> Result<String> {
    let reply = reply.trim();
    let current_trimmed = current.trim();
    let delta = if current_trimmed.is_empty() {
        reply
    } else {
        reply
            .strip_prefix(current_trimmed)
            .map(str::trim)
            .unwrap_or(reply)
    };

    if delta.is_empty() || delta.len() >= current.len() {
        return Err(EvalError::NonAdditiveDelta {
            delta_len: delta.len(),
            prompt_len: current.len(),
        });
    }
    Ok(delta.to_string())
}

pub struct PromptImprover {
    judgment: Arc<dyn JudgmentService>,
    evaluator: PairEvaluator,
    prompts: Arc<dyn PromptStore>,
    ledger: Arc<ImprovementLedger>,
    regression_sample: usize,
    concurrency: usize,
}

impl PromptImprover {
    pub fn new(
        judgment: Arc<dyn JudgmentService>,
        evaluator: PairEvaluator,
        prompts: Arc<dyn PromptStore>,
        ledger: Arc<ImprovementLedger>,
        regression_sample: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            judgment,
            evaluator,
            prompts,
            ledger,
            regression_sample,
            concurrency: concurrency.max(1),
        }
    }

    /// Propose and validate a prompt addition. Nothing persistent changes.
    pub async fn suggest(
        &self,
        run: &EvalRun,
        mut on_progress: Option<ImproveProgressFn>,
    ) -> Result<Improvement> {
        let mut report = |p: ImproveProgress| {
            if let Some(callback) = on_progress.as_mut() {
                callback(&p);
            }
        };

        let located = self.locate(run)?;
        report(ImproveProgress::Located {
            dimension: located.worst.dimension,
            value: located.worst.value.clone(),
            failures: located.worst.failures.len(),
        });

        let reflected = self.reflect(located).await?;
        report(ImproveProgress::Reflected);

        let curated = self.curate(reflected).await?;
        report(ImproveProgress::Curated {
            delta_chars: curated.delta.len(),
        });

        let tested = self.test(curated, &mut report).await;
        let checked = self.check(tested, &mut report).await;
        let improvement = checked.into_improvement();

        info!(
            run_id = %run.id,
            dimension = %improvement.target_dimension,
            value = %improvement.target_value,
            before = improvement.before_accuracy,
            after = improvement.after_accuracy,
            regressions = improvement.regressions.len(),
            "improvement proposed"
        );
        Ok(improvement)
    }

    fn locate(&self, run: &EvalRun) -> Result<Located> {
        if run.failures().next().is_none() {
            return Err(EvalError::NoFailures(run.id.clone()));
        }
        let worst = analyze(run)
            .worst
            .filter(|w| !w.failures.is_empty())
            .ok_or_else(|| EvalError::NoFailures(run.id.clone()))?;
        info!(
            run_id = %run.id,
            dimension = %worst.dimension,
            value = %worst.value,
            accuracy = worst.accuracy,
            failures = worst.failures.len(),
            "worst dimension located"
        );

        Ok(Located {
            run_id: run.id.clone(),
            worst,
            passing: run.passes().cloned().collect(),
        })
    }

    async fn reflect(&self, located: Located) -> Result<Reflected> {
        let reflections = self.judgment.reflect(&located.worst.failures).await?;
        info!(run_id = %located.run_id, chars = reflections.len(), "reflection done");
        Ok(Reflected {
            located,
            reflections,
        })
    }

    async fn curate(&self, reflected: Reflected) -> Result<Curated> {
        let base_prompt = self.prompts.load().await?;
        let reply = self
            .judgment
            .curate(&base_prompt, &reflected.reflections, &reflected.located.worst)
            .await?;
        let delta = additive_delta(&base_prompt, &reply)?;
        info!(
            run_id = %reflected.located.run_id,
            delta_chars = delta.len(),
            prompt_chars = base_prompt.len(),
            "delta curated"
        );
        Ok(Curated {
            reflected,
            base_prompt,
            delta,
        })
    }

    async fn test(&self, curated: Curated, report: &mut impl FnMut(ImproveProgress)) -> Tested {
        let prompt = augment(&curated.base_prompt, &curated.delta);
        let targets = curated.reflected.located.worst.failures.clone();
        let fail_results = self
            .rerun(&targets, &prompt, |done, total| {
                report(ImproveProgress::Tested { done, total })
            })
            .await;
        Tested {
            curated,
            fail_results,
        }
    }

    async fn check(&self, tested: Tested, report: &mut impl FnMut(ImproveProgress)) -> Checked {
        let curated = &tested.curated;
        let prompt = augment(&curated.base_prompt, &curated.delta);
        let sample: Vec<EvalResultEntry> = curated
            .reflected
            .located
            .passing
            .iter()
            .take(self.regression_sample)
            .cloned()
            .collect();
        let pass_results = self
            .rerun(&sample, &prompt, |done, total| {
                report(ImproveProgress::Checked { done, total })
            })
            .await;

        let regressed = pass_results.iter().filter(|r| !r.pass).count();
        if regressed > 0 {
            warn!(regressed, sampled = pass_results.len(), "delta regresses passing pairs");
        }
        Checked {
            tested,
            pass_results,
        }
    }

    /// Fresh answer + grade for each entry under `prompt`, results in input order.
    async fn rerun(
        &self,
        entries: &[EvalResultEntry],
        prompt: &str,
        mut progress: impl FnMut(usize, usize),
    ) -> Vec<EvalResultEntry> {
        let total = entries.len();
        let evaluator = &self.evaluator;
        let mut results = Vec::with_capacity(total);
        let mut outcomes = stream::iter(entries.iter())
            .map(|entry| async move {
                evaluator
                    .evaluate(
                        entry.id,
                        &entry.question,
                        &entry.expected_answer,
                        &entry.dimensions,
                        prompt,
                    )
                    .await
            })
            .buffered(self.concurrency);
        while let Some(result) = outcomes.next().await {
            results.push(result);
            progress(results.len(), total);
        }
        results
    }

    /// Make the delta part of the effective prompt and record it in the ledger.
    /// Re-applying a delta the prompt already carries leaves the prompt as is.
    pub async fn apply(&self, improvement: &Improvement, run_id: &str) -> Result<ImprovementLog> {
        let current = self.prompts.load().await?;
        if prompt_hash(&current) != improvement.base_prompt_hash {
            warn!(run_id, "prompt changed since this improvement was tested");
        }

        if current.contains(improvement.proposed_delta.as_str()) {
            info!(run_id, "delta already present in the prompt");
        } else {
            self.prompts
                .save(&augment(&current, &improvement.proposed_delta))
                .await?;
        }

        let entry = ImprovementLog {
            timestamp: Utc::now(),
            run_id: run_id.to_string(),
            target_dimension: improvement.target_dimension.to_string(),
            target_value: improvement.target_value.clone(),
            delta: improvement.proposed_delta.clone(),
            before_accuracy: improvement.before_accuracy,
            after_accuracy: improvement.after_accuracy,
            regressions: improvement.regressions.len(),
            applied: true,
        };
        self.ledger.append(&entry).await?;
        info!(
            run_id,
            dimension = %entry.target_dimension,
            value = %entry.target_value,
            "improvement applied"
        );
        Ok(entry)
    }
}
