use anyhow::Result;
use tracing::warn;

use edgar_eval::eval::ImproveProgress;

use super::{load_run, pct};
use crate::cli::ImproveArgs;
use crate::state::AppState;

pub async fn run(state: &AppState, args: ImproveArgs) -> Result<()> {
    let run = load_run(state, &args.run).await?;
    if !run.is_sealed() {
        warn!(run_id = %run.id, "improving from an unfinished run");
    }

    let improver = state.improver();
    let improvement = improver
        .suggest(&run, Some(Box::new(print_stage)))
        .await?;

    println!(
        "\nTarget: {}={} ({} failures)",
        improvement.target_dimension, improvement.target_value, improvement.failures_before
    );
    println!("\nRoot causes:\n{}", improvement.reflections);
    println!("\nProposed addition:\n{}", improvement.proposed_delta);
    println!(
        "\nSlice accuracy: {} → {} ({} of {} still failing)",
        pct(improvement.before_accuracy),
        pct(improvement.after_accuracy),
        improvement.failures_after,
        improvement.failures_before
    );
    if improvement.regressions.is_empty() {
        println!(
            "Regressions: none in {} sampled passing pairs",
            improvement.pass_test_results.len()
        );
    } else {
        println!("Regressions: {}", improvement.regressions.len());
        for regression in &improvement.regressions {
            println!("  #{} {}\n      {}", regression.id, regression.question, regression.reason);
        }
    }

    if args.apply {
        improver.apply(&improvement, &run.id).await?;
        println!("\nApplied to {}", state.layout.prompt_path.display());
    } else {
        println!("\nRe-run with --apply to keep it.");
    }
    Ok(())
}

fn print_stage(progress: &ImproveProgress) {
    match progress {
        ImproveProgress::Located {
            dimension,
            value,
            failures,
        } => eprintln!("located {}={} ({} failures)", dimension, value, failures),
        ImproveProgress::Reflected => eprintln!("reflected"),
        ImproveProgress::Curated { delta_chars } => eprintln!("curated ({} chars)", delta_chars),
        ImproveProgress::Tested { done, total } => eprintln!("testing failures [{}/{}]", done, total),
        ImproveProgress::Checked { done, total } => {
            eprintln!("checking regressions [{}/{}]", done, total)
        }
    }
}
