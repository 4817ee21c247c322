use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{EvalError, Result};
use crate::types::{EvalResultEntry, EvalRun, RunMeta, RunSummary};

/// One line of a run log. Order on disk: `Meta`, zero or more `Result`, then `Summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunRecord {
    Meta(RunMeta),
    Result(EvalResultEntry),
    Summary(RunSummary),
}

/// Directory of append-only `<run_id>.jsonl` logs.
pub struct RunLog {
    dir: PathBuf,
}

impl RunLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", run_id))
    }

    /// Run ids lead with a UTC timestamp so lexical order is chronological.
    pub fn new_run_id(benchmark: &str, version: &str, at: DateTime<Utc>) -> String {
        format!("{}_{}_{}", at.format("%Y%m%dT%H%M%S%3fZ"), benchmark, version)
    }

    /// Create a new log and persist its meta record before anything else runs.
    pub async fn create(&self, run_id: &str, meta: &RunMeta) -> Result<RunWriter> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path(run_id);
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        let mut writer = RunWriter { file, path };
        writer.append(&RunRecord::Meta(meta.clone())).await?;
        Ok(writer)
    }

    /// Reopen an unsealed log for more results.
    ///
    /// A torn final record is cut back to the last complete line first, so the
    /// next append starts on a fresh line.
    pub async fn reopen(&self, run_id: &str) -> Result<RunWriter> {
        let path = self.path(run_id);
        let not_found = |e: std::io::Error| match e.kind() {
            std::io::ErrorKind::NotFound => EvalError::RunNotFound(run_id.to_string()),
            _ => e.into(),
        };
        let bytes = tokio::fs::read(&path).await.map_err(not_found)?;
        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(not_found)?;

        let complete = complete_prefix_len(&bytes);
        if complete < bytes.len() {
            warn!(
                run_id,
                dropped_bytes = bytes.len() - complete,
                "truncating torn record at end of run log"
            );
            file.set_len(complete as u64).await?;
        }
        Ok(RunWriter { file, path })
    }

    pub async fn read(&self, run_id: &str) -> Result<EvalRun> {
        let path = self.path(run_id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EvalError::RunNotFound(run_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        parse_run(run_id, &path, &text)
    }

    /// All run ids, oldest first.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".jsonl")) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Resolve `"latest"` to the newest run id; anything else passes through.
    pub async fn resolve(&self, run_ref: &str) -> Result<String> {
        if run_ref != "latest" {
            return Ok(run_ref.to_string());
        }
        self.list()
            .await?
            .pop()
            .ok_or_else(|| EvalError::RunNotFound("latest".to_string()))
    }
}

/// Sole writer of one run log.
pub struct RunWriter {
    file: tokio::fs::File,
    path: PathBuf,
}

impl RunWriter {
    pub async fn append(&mut self, record: &RunRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line).await?;
        self.file.flush().await?;
        Ok(())
    }

    /// Write the terminal summary record. The log is read-only afterwards.
    pub async fn seal(mut self, summary: &RunSummary) -> Result<()> {
        self.append(&RunRecord::Summary(summary.clone())).await?;
        self.file.sync_all().await?;
        debug!(path = %self.path.display(), "run log sealed");
        Ok(())
    }
}

/// Length of `bytes` up to and including the last newline.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1)
}

/// Rebuild a run from its log. A missing summary means the run is still in
/// progress; unparseable lines (e.g. a torn final write) are skipped.
fn parse_run(run_id: &str, path: &Path, text: &str) -> Result<EvalRun> {
    let mut meta = None;
    let mut results = Vec::new();
    let mut summary = None;

    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RunRecord>(line) {
            Ok(RunRecord::Meta(m)) if meta.is_none() => meta = Some(m),
            Ok(RunRecord::Meta(_)) => warn!(run_id, line = i + 1, "duplicate meta record ignored"),
            Ok(RunRecord::Result(r)) => results.push(r),
            Ok(RunRecord::Summary(s)) => summary = Some(s),
            Err(e) => warn!(run_id, line = i + 1, error = %e, "skipping unreadable run record"),
        }
    }

    let meta = meta.ok_or_else(|| EvalError::MalformedRun {
        path: path.display().to_string(),
        detail: "no meta record".to_string(),
    })?;

    Ok(EvalRun {
        id: run_id.to_string(),
        meta,
        results,
        summary,
    })
}
