use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use edgar_eval::docs::DocumentStore;
use edgar_eval::eval::{EvalRunner, HistoryTracker, JudgeTrainer, PairEvaluator, PromptImprover};
use edgar_eval::llm::LlmClient;
use edgar_eval::mining::ChatMiner;
use edgar_eval::services::{
    AnswerService, FilePromptStore, JudgmentService, LlmJudgment, PromptStore, QaGenerator,
    RetrievalAnswerer,
};
use edgar_eval::store::{BenchmarkStore, ImprovementLedger, RunLog};
use edgar_eval::{DataLayout, EvalConfig};

/// Everything a command needs, wired once from config.
pub struct AppState {
    pub config: EvalConfig,
    pub layout: DataLayout,
    pub store: Arc<DocumentStore>,
    pub llm: Arc<LlmClient>,
    pub benchmarks: Arc<BenchmarkStore>,
    pub runs: Arc<RunLog>,
    pub ledger: Arc<ImprovementLedger>,
    pub prompts: Arc<dyn PromptStore>,
    pub answers: Arc<dyn AnswerService>,
    pub judgment: Arc<dyn JudgmentService>,
}

impl AppState {
    pub async fn init(config: EvalConfig) -> Result<Self> {
        let layout = config.layout();

        let store = Arc::new(DocumentStore::open(&config.corpus_dir).await?);
        info!(
            documents = store.documents().len(),
            dir = %config.corpus_dir.display(),
            "corpus loaded"
        );

        let llm = Arc::new(LlmClient::from_env()?);
        let answers: Arc<dyn AnswerService> =
            Arc::new(RetrievalAnswerer::new(llm.clone(), store.clone()));
        let judgment: Arc<dyn JudgmentService> = Arc::new(LlmJudgment::new(llm.clone()));

        Ok(Self {
            store,
            llm,
            benchmarks: Arc::new(BenchmarkStore::new(&layout.benchmarks_dir)),
            runs: Arc::new(RunLog::new(&layout.runs_dir)),
            ledger: Arc::new(ImprovementLedger::new(&layout.ledger_path)),
            prompts: Arc::new(FilePromptStore::new(&layout.prompt_path)),
            answers,
            judgment,
            layout,
            config,
        })
    }

    pub fn evaluator(&self) -> PairEvaluator {
        PairEvaluator::new(
            self.answers.clone(),
            self.judgment.clone(),
            self.config.pair_timeout,
        )
    }

    pub fn runner(&self) -> EvalRunner {
        EvalRunner::new(
            self.benchmarks.clone(),
            self.runs.clone(),
            self.store.clone(),
            self.prompts.clone(),
            self.evaluator(),
            self.config.concurrency,
        )
    }

    pub fn improver(&self) -> PromptImprover {
        PromptImprover::new(
            self.judgment.clone(),
            self.evaluator(),
            self.prompts.clone(),
            self.ledger.clone(),
            self.config.regression_sample,
            self.config.concurrency,
        )
    }

    pub fn judge_trainer(&self) -> JudgeTrainer {
        JudgeTrainer::new(
            self.judgment.clone(),
            &self.layout.judge_path,
            self.config.concurrency,
        )
    }

    pub fn history(&self) -> HistoryTracker {
        HistoryTracker::new(
            self.runs.clone(),
            self.ledger.clone(),
            self.config.improvement_window_hours,
        )
    }

    pub fn miner(&self) -> ChatMiner {
        ChatMiner::new(&self.layout.chat_logs_dir)
    }

    pub fn generator(&self) -> QaGenerator {
        QaGenerator::new(self.llm.clone())
    }

    /// Document count and prompt hash stamped onto a new benchmark version.
    pub async fn version_stamp(&self) -> Result<(usize, String)> {
        let prompt = self.prompts.load().await?;
        Ok((
            self.store.documents().len(),
            edgar_eval::types::prompt_hash(&prompt),
        ))
    }
}
