use anyhow::Result;

use edgar_eval::eval::RunOptions;
use edgar_eval::parse::truncate;
use edgar_eval::types::{EvalResultEntry, EvalRun};

use super::{interrupt_token, pct};
use crate::cli::{EvalArgs, ResumeArgs};
use crate::state::AppState;

pub async fn run(state: &AppState, args: EvalArgs) -> Result<()> {
    let opts = RunOptions {
        limit: args.limit,
        on_progress: Some(Box::new(print_progress)),
        cancel: Some(interrupt_token()),
    };
    let run = state
        .runner()
        .run(&args.benchmark, args.version.as_deref(), opts)
        .await?;
    print_outcome(&run);
    Ok(())
}

pub async fn resume(state: &AppState, args: ResumeArgs) -> Result<()> {
    let opts = RunOptions {
        limit: None,
        on_progress: Some(Box::new(print_progress)),
        cancel: Some(interrupt_token()),
    };
    let run = state.runner().resume(&args.run_id, opts).await?;
    print_outcome(&run);
    Ok(())
}

fn print_progress(done: usize, total: usize, entry: &EvalResultEntry) {
    eprintln!(
        "[{}/{}] {} #{} {}",
        done,
        total,
        if entry.pass { "PASS" } else { "FAIL" },
        entry.id,
        truncate(&entry.question, 70)
    );
}

fn print_outcome(run: &EvalRun) {
    match &run.summary {
        Some(summary) => {
            println!("Run {}", run.id);
            println!(
                "  {}@{}: {}/{} passed ({}) in {:.1}s",
                run.meta.benchmark,
                run.meta.version,
                summary.pass,
                summary.total,
                pct(summary.accuracy),
                summary.elapsed_ms as f64 / 1000.0
            );
            if summary.fail > 0 {
                println!("  Next: edgar-eval analyze {}", run.id);
            }
        }
        None => {
            println!(
                "Run {} stopped after {} of {} pairs.",
                run.id,
                run.results.len(),
                run.meta.pair_count
            );
            println!("  Resume with: edgar-eval resume {}", run.id);
        }
    }
}
