use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::{future, stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EvalError, Result};
use crate::services::{AnswerService, AskOptions, CorpusProvider, JudgmentService, PromptStore};
use crate::store::{BenchmarkStore, RunLog, RunRecord, RunWriter};
use crate::types::{
    prompt_hash, Dimensions, EvalResultEntry, EvalRun, QaPair, RunMeta, RunSummary, Verdict,
};

/// Called after each result is persisted: `(done, total, entry)`.
/// `done` increases by one per call even when pairs finish out of order.
pub type ProgressFn = Box<dyn FnMut(usize, usize, &EvalResultEntry) + Send>;

#[derive(Default)]
pub struct RunOptions {
    pub limit: Option<usize>,
    pub on_progress: Option<ProgressFn>,
    /// Stops new pairs from starting; finished pairs stay persisted and the
    /// run is left unsealed unless every pair had already finished.
    pub cancel: Option<CancellationToken>,
}

/// One isolated answer + grade cycle per pair.
#[derive(Clone)]
pub struct PairEvaluator {
    answers: Arc<dyn AnswerService>,
    judgment: Arc<dyn JudgmentService>,
    timeout: Duration,
}

impl PairEvaluator {
    pub fn new(
        answers: Arc<dyn AnswerService>,
        judgment: Arc<dyn JudgmentService>,
        timeout: Duration,
    ) -> Self {
        Self {
            answers,
            judgment,
            timeout,
        }
    }

    /// Never fails: service errors and timeouts become a failing entry.
    pub async fn evaluate(
        &self,
        id: u32,
        question: &str,
        expected: &str,
        dimensions: &Dimensions,
        system_prompt: &str,
    ) -> EvalResultEntry {
        let started = Instant::now();
        let opts = AskOptions::fresh(system_prompt);
        let mut actual = String::new();

        let graded = tokio::time::timeout(self.timeout, async {
            actual = self.answers.ask(question, &opts).await?;
            let verdict = self.judgment.compare(question, expected, &actual).await?;
            Ok::<Verdict, anyhow::Error>(verdict)
        })
        .await;

        let verdict = match graded {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                warn!(pair_id = id, error = %e, "pair failed");
                Verdict::fail(format!("Error: {:#}", e))
            }
            Err(_) => {
                warn!(pair_id = id, timeout_secs = self.timeout.as_secs(), "pair timed out");
                Verdict::fail(format!("Error: timed out after {}s", self.timeout.as_secs()))
            }
        };

        EvalResultEntry {
            id,
            question: question.to_string(),
            expected_answer: expected.to_string(),
            actual_answer: actual,
            pass: verdict.pass,
            reason: verdict.reason,
            elapsed_ms: started.elapsed().as_millis() as u64,
            dimensions: dimensions.clone(),
        }
    }

    pub async fn evaluate_pair(&self, pair: &QaPair, system_prompt: &str) -> EvalResultEntry {
        self.evaluate(
            pair.id,
            &pair.question,
            &pair.expected_answer,
            &pair.dimensions,
            system_prompt,
        )
        .await
    }
}

/// Runs a benchmark version through the answer and grading services.
pub struct EvalRunner {
    benchmarks: Arc<BenchmarkStore>,
    runs: Arc<RunLog>,
    corpus: Arc<dyn CorpusProvider>,
    prompts: Arc<dyn PromptStore>,
    evaluator: PairEvaluator,
    concurrency: usize,
}

impl EvalRunner {
    pub fn new(
        benchmarks: Arc<BenchmarkStore>,
        runs: Arc<RunLog>,
        corpus: Arc<dyn CorpusProvider>,
        prompts: Arc<dyn PromptStore>,
        evaluator: PairEvaluator,
        concurrency: usize,
    ) -> Self {
        Self {
            benchmarks,
            runs,
            corpus,
            prompts,
            evaluator,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(
        &self,
        benchmark: &str,
        version: Option<&str>,
        opts: RunOptions,
    ) -> Result<EvalRun> {
        let snapshot = self.benchmarks.load(benchmark, version).await?;
        let mut pairs = snapshot.pairs;
        if let Some(limit) = opts.limit {
            pairs.truncate(limit);
        }
        self.ensure_corpus().await?;

        let system_prompt = self.prompts.load().await?;
        let start_time = Utc::now();
        let run_id = RunLog::new_run_id(benchmark, &snapshot.version, start_time);
        let meta = RunMeta {
            benchmark: benchmark.to_string(),
            version: snapshot.version.clone(),
            start_time,
            prompt_hash: prompt_hash(&system_prompt),
            pair_count: pairs.len(),
        };
        let writer = self.runs.create(&run_id, &meta).await?;
        info!(
            run_id = %run_id,
            benchmark,
            version = %snapshot.version,
            pairs = pairs.len(),
            concurrency = self.concurrency,
            "eval run started"
        );

        self.execute(run_id, meta, writer, pairs, Vec::new(), system_prompt, opts)
            .await
    }

    /// Finish an unsealed run: evaluate only pairs without a persisted result.
    pub async fn resume(&self, run_id: &str, opts: RunOptions) -> Result<EvalRun> {
        let run = self.runs.read(run_id).await?;
        if run.is_sealed() {
            info!(run_id, "run already sealed; nothing to resume");
            return Ok(run);
        }

        let snapshot = self
            .benchmarks
            .load(&run.meta.benchmark, Some(&run.meta.version))
            .await?;
        let done: std::collections::HashSet<u32> = run.results.iter().map(|r| r.id).collect();
        let pairs: Vec<QaPair> = snapshot
            .pairs
            .into_iter()
            .take(run.meta.pair_count)
            .filter(|p| !done.contains(&p.id))
            .collect();
        self.ensure_corpus().await?;

        // Callers read the prompt fresh per run; a resumed run uses today's prompt
        let system_prompt = self.prompts.load().await?;
        if prompt_hash(&system_prompt) != run.meta.prompt_hash {
            warn!(run_id, "system prompt changed since this run started");
        }

        let writer = self.runs.reopen(run_id).await?;
        info!(run_id, remaining = pairs.len(), completed = run.results.len(), "eval run resumed");
        self.execute(
            run.id,
            run.meta,
            writer,
            pairs,
            run.results,
            system_prompt,
            opts,
        )
        .await
    }

    async fn ensure_corpus(&self) -> Result<()> {
        if self.corpus.list_documents().await?.is_empty() {
            return Err(EvalError::EmptyCorpus);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        run_id: String,
        meta: RunMeta,
        writer: RunWriter,
        pairs: Vec<QaPair>,
        prior: Vec<EvalResultEntry>,
        system_prompt: String,
        opts: RunOptions,
    ) -> Result<EvalRun> {
        let started = Instant::now();
        let total = meta.pair_count;
        let cancel = opts.cancel.unwrap_or_default();

        // The writer task is the only thing that touches the log from here on
        let (tx, rx) = mpsc::channel::<EvalResultEntry>(self.concurrency * 2);
        let writer_task = tokio::spawn(persist_results(
            writer,
            rx,
            prior.len(),
            total,
            opts.on_progress,
        ));

        let evaluator = &self.evaluator;
        let system_prompt = system_prompt.as_str();
        stream::iter(pairs)
            .take_while(|_| future::ready(!cancel.is_cancelled() && !tx.is_closed()))
            .map(|pair| async move { evaluator.evaluate_pair(&pair, system_prompt).await })
            .buffer_unordered(self.concurrency)
            .for_each(|entry| {
                let tx = tx.clone();
                async move {
                    if tx.send(entry).await.is_err() {
                        warn!("run writer stopped; dropping result");
                    }
                }
            })
            .await;
        drop(tx);

        let (writer, fresh) = writer_task
            .await
            .map_err(|e| EvalError::Service(format!("run writer task failed: {}", e)))??;

        let prior_elapsed: u64 = prior.iter().map(|r| r.elapsed_ms).sum();
        let mut results = prior;
        results.extend(fresh);

        // A complete run is sealed even when the interrupt came after the last pair
        if cancel.is_cancelled() && results.len() < total {
            warn!(
                run_id = %run_id,
                completed = results.len(),
                total,
                "eval run cancelled; left unsealed"
            );
            return Ok(EvalRun {
                id: run_id,
                meta,
                results,
                summary: None,
            });
        }

        // A resumed run counts the per-pair time it already spent, not the downtime
        let elapsed_ms = prior_elapsed + started.elapsed().as_millis() as u64;
        let summary = RunSummary::from_results(&results, elapsed_ms);
        writer.seal(&summary).await?;
        info!(
            run_id = %run_id,
            total = summary.total,
            pass = summary.pass,
            accuracy = summary.accuracy,
            elapsed_ms,
            "eval run sealed"
        );

        Ok(EvalRun {
            id: run_id,
            meta,
            results,
            summary: Some(summary),
        })
    }
}

/// Single-writer loop: append each entry, then report progress.
async fn persist_results(
    mut writer: RunWriter,
    mut rx: mpsc::Receiver<EvalResultEntry>,
    mut done: usize,
    total: usize,
    mut on_progress: Option<ProgressFn>,
) -> Result<(RunWriter, Vec<EvalResultEntry>)> {
    let mut results = Vec::new();
    while let Some(entry) = rx.recv().await {
        writer.append(&RunRecord::Result(entry.clone())).await?;
        done += 1;
        debug!(pair_id = entry.id, pass = entry.pass, done, total, "result persisted");
        if let Some(callback) = on_progress.as_mut() {
            callback(done, total, &entry);
        }
        results.push(entry);
    }
    Ok((writer, results))
}
