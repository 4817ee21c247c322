use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime knobs for the eval loop. Every field can be set from the environment.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub data_dir: PathBuf,
    pub corpus_dir: PathBuf,
    /// Worker pool width for per-pair evaluation.
    pub concurrency: usize,
    pub pair_timeout: Duration,
    /// How far back an applied improvement may sit before a run and still annotate it.
    pub improvement_window_hours: i64,
    pub regression_sample: usize,
    pub min_judge_examples: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            corpus_dir: PathBuf::from("./data/corpus"),
            concurrency: 4,
            pair_timeout: Duration::from_secs(180),
            improvement_window_hours: 24,
            regression_sample: 5,
            min_judge_examples: 10,
        }
    }
}

impl EvalConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let data_dir = dotenv::var("EVAL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let corpus_dir = dotenv::var("EVAL_CORPUS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("corpus"));

        Self {
            data_dir,
            corpus_dir,
            concurrency: env_parse("EVAL_CONCURRENCY", defaults.concurrency).max(1),
            pair_timeout: Duration::from_secs(env_parse(
                "EVAL_PAIR_TIMEOUT_SECS",
                defaults.pair_timeout.as_secs(),
            )),
            improvement_window_hours: env_parse(
                "EVAL_IMPROVEMENT_WINDOW_HOURS",
                defaults.improvement_window_hours,
            ),
            regression_sample: env_parse("EVAL_REGRESSION_SAMPLE", defaults.regression_sample),
            min_judge_examples: env_parse("EVAL_MIN_JUDGE_EXAMPLES", defaults.min_judge_examples),
        }
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    dotenv::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Where every persisted artifact lives under the data dir.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub benchmarks_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub prompt_path: PathBuf,
    pub judge_path: PathBuf,
    pub chat_logs_dir: PathBuf,
}

impl DataLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            benchmarks_dir: root.join("benchmarks"),
            runs_dir: root.join("runs"),
            ledger_path: root.join("improvements.jsonl"),
            prompt_path: root.join("system_prompt.md"),
            judge_path: root.join("judge.json"),
            chat_logs_dir: root.join("chat_logs"),
        }
    }
}
