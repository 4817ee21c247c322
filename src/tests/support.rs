//! In-memory collaborators and a temp-dir harness for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use crate::docs::types::DocMeta;
use crate::eval::dimensions::WorstDimension;
use crate::eval::{EvalRunner, JudgeTrainer, PairEvaluator, PromptImprover};
use crate::services::prompts::DEFAULT_SYSTEM_PROMPT;
use crate::services::{
    AnswerService, AskOptions, CorpusProvider, JudgmentService, MemoryPromptStore, PromptStore,
};
use crate::store::{BenchmarkStore, ImprovementLedger, RunLog};
use crate::types::{Dimensions, EvalResultEntry, PairStatus, QaPair, Verdict};

pub const DEFAULT_DELTA: &str = "For calculations, show the arithmetic before the final figure.";

pub struct StaticCorpus {
    docs: usize,
}

impl StaticCorpus {
    pub fn new(docs: usize) -> Self {
        Self { docs }
    }
}

#[async_trait]
impl CorpusProvider for StaticCorpus {
    async fn list_documents(&self) -> Result<Vec<DocMeta>> {
        Ok((0..self.docs)
            .map(|i| DocMeta {
                id: format!("doc{}", i),
                name: format!("doc{}.pdf.txt", i),
                source: format!("corpus/doc{}.pdf.txt", i),
                format: "pdf".into(),
                size: 1024,
                pages: 3,
            })
            .collect())
    }
}

/// Answers looked up by question. A variant overrides the base answer when
/// the system prompt contains its marker.
#[derive(Default)]
pub struct FakeAnswers {
    answers: HashMap<String, String>,
    variants: HashMap<String, (String, String)>,
    errors: HashSet<String>,
    hangs: HashSet<String>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub stale_context: AtomicBool,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, question: &str, answer: &str) -> Self {
        self.answers.insert(question.into(), answer.into());
        self
    }

    pub fn with_marker(mut self, question: &str, marker: &str, answer: &str) -> Self {
        self.variants
            .insert(question.into(), (marker.into(), answer.into()));
        self
    }

    pub fn error(mut self, question: &str) -> Self {
        self.errors.insert(question.into());
        self
    }

    pub fn hang(mut self, question: &str) -> Self {
        self.hangs.insert(question.into());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl AnswerService for FakeAnswers {
    async fn ask(&self, question: &str, opts: &AskOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !opts.fresh_context {
            self.stale_context.store(true, Ordering::SeqCst);
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.hangs.contains(question) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.errors.contains(question) {
            bail!("connection reset by peer");
        }
        if let Some((marker, answer)) = self.variants.get(question) {
            if opts.system_prompt.contains(marker.as_str()) {
                return Ok(answer.clone());
            }
        }
        Ok(self
            .answers
            .get(question)
            .cloned()
            .unwrap_or_else(|| "I don't know.".to_string()))
    }
}

fn squash(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Grades by containment of the expected answer.
pub struct FakeJudgment {
    delta: Mutex<String>,
    pub judge_fails: AtomicBool,
    pub reflect_calls: AtomicUsize,
    pub synthesized_from: Mutex<Option<usize>>,
    pub curated_against: Mutex<Option<String>>,
}

impl Default for FakeJudgment {
    fn default() -> Self {
        Self {
            delta: Mutex::new(DEFAULT_DELTA.to_string()),
            judge_fails: AtomicBool::new(false),
            reflect_calls: AtomicUsize::new(0),
            synthesized_from: Mutex::new(None),
            curated_against: Mutex::new(None),
        }
    }
}

impl FakeJudgment {
    pub fn set_delta(&self, delta: impl Into<String>) {
        *self.delta.lock().unwrap() = delta.into();
    }
}

#[async_trait]
impl JudgmentService for FakeJudgment {
    async fn compare(&self, _question: &str, expected: &str, actual: &str) -> Result<Verdict> {
        let expected = squash(expected);
        if !expected.is_empty() && squash(actual).contains(&expected) {
            Ok(Verdict::pass("matches expected"))
        } else {
            Ok(Verdict::fail("does not match expected"))
        }
    }

    async fn reflect(&self, failures: &[EvalResultEntry]) -> Result<String> {
        self.reflect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "- {} answers give a figure without computing it\n- Units are dropped",
            failures.len()
        ))
    }

    async fn curate(
        &self,
        current_prompt: &str,
        _reflections: &str,
        _worst: &WorstDimension,
    ) -> Result<String> {
        *self.curated_against.lock().unwrap() = Some(current_prompt.to_string());
        Ok(self.delta.lock().unwrap().clone())
    }

    async fn synthesize_judge_prompt(&self, train: &[EvalResultEntry]) -> Result<String> {
        *self.synthesized_from.lock().unwrap() = Some(train.len());
        Ok("Grade the answer.\nPASS: <reason>\nFAIL: <reason>".to_string())
    }

    async fn run_judge(&self, _judge_prompt: &str, _question: &str, answer: &str) -> Result<Verdict> {
        if self.judge_fails.load(Ordering::SeqCst) {
            bail!("judge model unavailable");
        }
        if answer.contains("don't know") {
            Ok(Verdict::fail("no answer given"))
        } else {
            Ok(Verdict::pass("answers the question"))
        }
    }
}

pub fn qa(question: &str, expected: &str, question_type: &str) -> QaPair {
    QaPair {
        id: 0,
        question: question.into(),
        expected_answer: expected.into(),
        source: "lease.pdf".into(),
        dimensions: Dimensions {
            question_type: Some(question_type.into()),
            difficulty: Some("medium".into()),
            source_format: Some("pdf".into()),
            edge_case: None,
        },
        status: PairStatus::Keep,
    }
}

/// Stores under a temp dir plus the fakes, wired the way the binary wires
/// the real services.
pub struct Harness {
    pub dir: TempDir,
    pub benchmarks: Arc<BenchmarkStore>,
    pub runs: Arc<RunLog>,
    pub ledger: Arc<ImprovementLedger>,
    pub prompts: Arc<MemoryPromptStore>,
    pub answers: Arc<FakeAnswers>,
    pub judgment: Arc<FakeJudgment>,
    pub corpus: Arc<StaticCorpus>,
    pub timeout: Duration,
}

impl Harness {
    pub fn new(answers: FakeAnswers) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            benchmarks: Arc::new(BenchmarkStore::new(dir.path().join("benchmarks"))),
            runs: Arc::new(RunLog::new(dir.path().join("runs"))),
            ledger: Arc::new(ImprovementLedger::new(dir.path().join("improvements.jsonl"))),
            prompts: Arc::new(MemoryPromptStore::new(DEFAULT_SYSTEM_PROMPT)),
            answers: Arc::new(answers),
            judgment: Arc::new(FakeJudgment::default()),
            corpus: Arc::new(StaticCorpus::new(2)),
            timeout: Duration::from_secs(5),
            dir,
        }
    }

    pub fn with_corpus(mut self, docs: usize) -> Self {
        self.corpus = Arc::new(StaticCorpus::new(docs));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn evaluator(&self) -> PairEvaluator {
        PairEvaluator::new(self.answers.clone(), self.judgment.clone(), self.timeout)
    }

    pub fn runner(&self, concurrency: usize) -> EvalRunner {
        EvalRunner::new(
            self.benchmarks.clone(),
            self.runs.clone(),
            self.corpus.clone(),
            self.prompts.clone(),
            self.evaluator(),
            concurrency,
        )
    }

    pub fn improver(&self) -> PromptImprover {
        PromptImprover::new(
            self.judgment.clone(),
            self.evaluator(),
            self.prompts.clone(),
            self.ledger.clone(),
            5,
            2,
        )
    }

    pub fn judge_trainer(&self) -> JudgeTrainer {
        JudgeTrainer::new(self.judgment.clone(), self.dir.path().join("judge.json"), 2)
            .with_seed(7)
    }

    pub async fn seed_benchmark(&self, name: &str, pairs: Vec<QaPair>) {
        let prompt = self.prompts.load().await.unwrap();
        self.benchmarks
            .save(name, pairs, 2, &crate::types::prompt_hash(&prompt))
            .await
            .unwrap();
    }
}
