use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use edgar_eval::EvalConfig;

#[derive(Parser, Debug)]
#[command(
    name = "edgar-eval",
    version,
    about = "Benchmark, grade and improve the Edgar document assistant"
)]
pub struct Cli {
    /// Root for benchmarks, runs, the prompt and the ledger
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub corpus_dir: Option<PathBuf>,

    /// Pairs evaluated at once
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Per-pair limit for answering plus grading
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Flags win over the environment.
    pub fn apply(&self, config: &mut EvalConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
            if self.corpus_dir.is_none() {
                config.corpus_dir = dir.join("corpus");
            }
        }
        if let Some(dir) = &self.corpus_dir {
            config.corpus_dir = dir.clone();
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n.max(1);
        }
        if let Some(secs) = self.timeout_secs {
            config.pair_timeout = Duration::from_secs(secs);
        }
        if let Commands::History(args) = &self.command {
            if let Some(hours) = args.window_hours {
                config.improvement_window_hours = hours;
            }
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(subcommand)]
    Benchmark(BenchmarkCommand),
    /// Run a benchmark version through the assistant and grade it
    Eval(EvalArgs),
    /// Finish an interrupted run
    Resume(ResumeArgs),
    /// Accuracy by dimension and the worst slice
    Analyze(RunRefArgs),
    /// Train a standalone grading judge from a run
    Judge(JudgeArgs),
    /// Propose, test and optionally apply a prompt addition
    Improve(ImproveArgs),
    /// The accuracy curve across runs
    History(HistoryArgs),
    /// Mine chat transcripts for benchmark candidates
    Mine(MineArgs),
    #[command(subcommand)]
    Prompt(PromptCommand),
}

#[derive(Subcommand, Debug)]
pub enum BenchmarkCommand {
    /// Import reviewed rows as a new version
    Import(ImportArgs),
    /// List benchmarks, or the versions of one
    List(ListArgs),
    /// Draft candidate pairs from a corpus document into a review file
    Generate(GenerateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    pub name: String,
    /// JSON array of rows
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    pub name: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Document name or id
    pub doc: String,

    #[arg(long, default_value_t = 10)]
    pub count: usize,

    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct EvalArgs {
    pub benchmark: String,

    #[arg(long)]
    pub version: Option<String>,

    /// Only the first N pairs
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ResumeArgs {
    pub run_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct RunRefArgs {
    /// Run id, or "latest"
    #[arg(default_value = "latest")]
    pub run: String,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct JudgeArgs {
    #[arg(default_value = "latest")]
    pub run: String,

    #[arg(long)]
    pub min_examples: Option<usize>,

    /// Fix the train/test shuffle
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ImproveArgs {
    #[arg(default_value = "latest")]
    pub run: String,

    /// Write the delta into the prompt and the ledger
    #[arg(long, default_value_t = false)]
    pub apply: bool,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    #[arg(long)]
    pub benchmark: Option<String>,

    #[arg(long)]
    pub window_hours: Option<i64>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MineArgs {
    /// Transcript directory, defaults to <data-dir>/chat_logs
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Write detected signals back into unannotated transcripts
    #[arg(long, default_value_t = false)]
    pub annotate: bool,

    /// Save new pairs as a version of this benchmark
    #[arg(long)]
    pub promote: Option<String>,

    /// Write mined pairs as JSON
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum PromptCommand {
    /// Print the effective system prompt
    Show,
    /// Print the prompt hash stamped on runs
    Hash,
}
