use anyhow::Result;

use edgar_eval::eval::analyze;

use super::{load_run, pct};
use crate::cli::RunRefArgs;
use crate::state::AppState;

pub async fn run(state: &AppState, args: RunRefArgs) -> Result<()> {
    let run = load_run(state, &args.run).await?;
    let analysis = analyze(&run);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    let status = if run.is_sealed() { "" } else { " (in progress)" };
    println!("Run {}{}", run.id, status);
    println!(
        "Overall: {}/{} ({})\n",
        analysis.pass,
        analysis.total,
        pct(analysis.accuracy)
    );

    for breakdown in &analysis.breakdowns {
        println!("{}", breakdown.dimension);
        for (value, slice) in &breakdown.slices {
            println!(
                "  {:<24} {:>4}/{:<4} {:>5}",
                value,
                slice.pass,
                slice.total,
                pct(slice.accuracy)
            );
        }
        println!();
    }

    match &analysis.worst {
        Some(worst) => {
            println!(
                "Worst: {}={} at {} ({} failures)",
                worst.dimension,
                worst.value,
                pct(worst.accuracy),
                worst.failures.len()
            );
            for failure in worst.failures.iter().take(5) {
                println!("  #{} {}\n      {}", failure.id, failure.question, failure.reason);
            }
        }
        None => println!("No tagged results; nothing to rank."),
    }
    Ok(())
}
