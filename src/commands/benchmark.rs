use anyhow::{anyhow, Context, Result};

use edgar_eval::store::benchmark::ImportRow;

use crate::cli::{BenchmarkCommand, GenerateArgs, ImportArgs, ListArgs};
use crate::state::AppState;

pub async fn run(state: &AppState, command: BenchmarkCommand) -> Result<()> {
    match command {
        BenchmarkCommand::Import(args) => import(state, args).await,
        BenchmarkCommand::List(args) => list(state, args).await,
        BenchmarkCommand::Generate(args) => generate(state, args).await,
    }
}

async fn import(state: &AppState, args: ImportArgs) -> Result<()> {
    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let rows: Vec<ImportRow> = serde_json::from_slice(&data)
        .with_context(|| format!("{} is not a JSON array of rows", args.file.display()))?;

    let (doc_count, hash) = state.version_stamp().await?;
    let report = state
        .benchmarks
        .import(&args.name, rows, doc_count, &hash)
        .await?;

    for warning in &report.warnings {
        println!("  skipped {}", warning);
    }
    match &report.version {
        Some(version) => println!(
            "Imported {} pair(s) ({} discarded) into {}@{} ({} total)",
            report.accepted, report.discarded, args.name, version.version, version.pair_count
        ),
        None => println!("No rows accepted; no version created."),
    }
    Ok(())
}

async fn list(state: &AppState, args: ListArgs) -> Result<()> {
    let Some(name) = args.name else {
        let names = state.benchmarks.names().await?;
        if names.is_empty() {
            println!("No benchmarks yet. Use `edgar-eval benchmark import` to add one.");
        }
        for name in names {
            let manifest = state.benchmarks.manifest(&name).await?;
            println!(
                "{}  latest {}  ({} versions)",
                name,
                manifest.latest.as_deref().unwrap_or("-"),
                manifest.versions.len()
            );
        }
        return Ok(());
    };

    let manifest = state.benchmarks.manifest(&name).await?;
    if manifest.versions.is_empty() {
        println!("No versions of {}", name);
    }
    for version in &manifest.versions {
        let snapshot = state.benchmarks.load(&name, Some(version)).await?;
        let marker = if manifest.latest.as_ref() == Some(version) { " (latest)" } else { "" };
        println!(
            "{}{}  {} pairs  {} docs  prompt {}  {}",
            snapshot.version,
            marker,
            snapshot.pair_count,
            snapshot.corpus_doc_count,
            snapshot.prompt_hash,
            snapshot.timestamp.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn generate(state: &AppState, args: GenerateArgs) -> Result<()> {
    let doc = state
        .store
        .find(&args.doc)
        .cloned()
        .ok_or_else(|| anyhow!("no corpus document named {}", args.doc))?;
    let text = state.store.get_content(&doc.id).await?;

    let rows = state.generator().generate(&doc, &text, args.count).await?;
    let data = serde_json::to_vec_pretty(&rows)?;
    tokio::fs::write(&args.out, data)
        .await
        .with_context(|| format!("failed to write {}", args.out.display()))?;

    println!(
        "Wrote {} candidate pair(s) to {}. Mark rejects as \"discard\", then run `edgar-eval benchmark import <name> {}`",
        rows.len(),
        args.out.display(),
        args.out.display()
    );
    Ok(())
}
