//! File-backed persistence: versioned benchmarks, append-only run logs, and
//! the improvement ledger.

pub mod benchmark;
pub mod ledger;
pub mod runlog;

use std::path::Path;

use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::Result;

pub use benchmark::BenchmarkStore;
pub use ledger::ImprovementLedger;
pub use runlog::{RunLog, RunRecord, RunWriter};

/// Replace `path` whole: write a sibling temp file, then rename over the target.
pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut data = serde_json::to_vec_pretty(value)?;
    data.push(b'\n');

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, &data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Append one JSON line to `path`, creating it if needed.
pub(crate) async fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}
