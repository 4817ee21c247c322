mod cli;
mod commands;
mod state;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use edgar_eval::EvalConfig;

use crate::cli::{Cli, Commands};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = EvalConfig::from_env();
    cli.apply(&mut config);
    let state = AppState::init(config).await?;

    match cli.command {
        Commands::Benchmark(command) => commands::benchmark::run(&state, command).await,
        Commands::Eval(args) => commands::eval::run(&state, args).await,
        Commands::Resume(args) => commands::eval::resume(&state, args).await,
        Commands::Analyze(args) => commands::analyze::run(&state, args).await,
        Commands::Judge(args) => commands::judge::run(&state, args).await,
        Commands::Improve(args) => commands::improve::run(&state, args).await,
        Commands::History(args) => commands::history::run(&state, args).await,
        Commands::Mine(args) => commands::mine::run(&state, args).await,
        Commands::Prompt(command) => commands::prompt::run(&state, command).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
