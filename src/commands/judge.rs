use anyhow::Result;

use super::{load_run, pct};
use crate::cli::JudgeArgs;
use crate::state::AppState;

pub async fn run(state: &AppState, args: JudgeArgs) -> Result<()> {
    let run = load_run(state, &args.run).await?;
    let min_examples = args.min_examples.unwrap_or(state.config.min_judge_examples);

    let mut trainer = state.judge_trainer();
    if let Some(seed) = args.seed {
        trainer = trainer.with_seed(seed);
    }
    let result = trainer.create_judge(&run, min_examples).await?;

    println!(
        "Judge trained on {} examples, tested on {}: {} agreement",
        result.train_count,
        result.test_count,
        pct(result.agreement)
    );
    for detail in result.test_details.iter().filter(|d| !d.agree) {
        println!(
            "  disagree #{}: truth {} judge {} ({})",
            detail.id,
            if detail.ground_truth { "PASS" } else { "FAIL" },
            if detail.verdict { "PASS" } else { "FAIL" },
            detail.reason
        );
    }
    println!("Saved to {}", state.layout.judge_path.display());
    Ok(())
}
