use std::path::PathBuf;

use tracing::warn;

use super::append_json_line;
use crate::error::Result;
use crate::types::ImprovementLog;

/// Append-only ledger of applied improvements, one JSON line each.
pub struct ImprovementLedger {
    path: PathBuf,
}

impl ImprovementLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn append(&self, entry: &ImprovementLog) -> Result<()> {
        append_json_line(&self.path, entry).await
    }

    /// Every entry in file order. A missing ledger is empty.
    pub async fn read_all(&self) -> Result<Vec<ImprovementLog>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = i + 1, error = %e, "skipping unreadable ledger line"),
            }
        }
        Ok(entries)
    }
}
