use anyhow::{Context, Result};

use edgar_eval::mining::{mined_pairs_to_qa, ChatMiner, MinedSource};
use edgar_eval::EvalError;

use crate::cli::MineArgs;
use crate::state::AppState;

pub async fn run(state: &AppState, args: MineArgs) -> Result<()> {
    let miner = match &args.dir {
        Some(dir) => ChatMiner::new(dir),
        None => state.miner(),
    };

    if args.annotate {
        let annotated = miner.annotate().await?;
        println!("Annotated {} transcript(s)", annotated);
    }

    let result = miner.mine().await?;
    println!(
        "{} sessions, {} turns, {} candidate pairs",
        result.sessions,
        result.turns,
        result.pairs.len()
    );
    println!(
        "  corrections {}  satisfied {}  plain {}",
        result.count(MinedSource::ChatCorrection),
        result.count(MinedSource::ChatSatisfied),
        result.count(MinedSource::ChatQa)
    );
    for (signal, count) in &result.signal_counts {
        println!("  signal {}: {}", signal, count);
    }

    if let Some(out) = &args.out {
        let data = serde_json::to_vec_pretty(&result.pairs)?;
        tokio::fs::write(out, data)
            .await
            .with_context(|| format!("failed to write {}", out.display()))?;
        println!("Wrote mined pairs to {}", out.display());
    }

    if let Some(name) = &args.promote {
        let existing = match state.benchmarks.load(name, None).await {
            Ok(latest) => latest.pairs,
            Err(EvalError::BenchmarkNotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let promoted = mined_pairs_to_qa(&result.pairs, &existing);
        if promoted.is_empty() {
            println!("No new pairs for {}", name);
            return Ok(());
        }

        let added = promoted.len();
        let mut pairs = existing;
        pairs.extend(promoted);
        let (doc_count, hash) = state.version_stamp().await?;
        let version = state.benchmarks.save(name, pairs, doc_count, &hash).await?;
        println!(
            "Promoted {} pair(s) into {}@{} ({} total)",
            added, name, version.version, version.pair_count
        );
    }
    Ok(())
}
