//! Chat transcript logs: one JSONL file per session.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::signals::Signal;
use crate::error::Result;
use crate::store::append_json_line;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptRecord {
    #[serde(rename_all = "camelCase")]
    SessionStart {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    Turn {
        role: Role,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    SessionEnd {
        timestamp: DateTime<Utc>,
    },
    Signal(Signal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One session as read back from its log.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    /// File name, used for provenance.
    pub file: String,
    pub session_id: Option<String>,
    pub turns: Vec<Turn>,
    /// Signal records already written into the log.
    pub signals: Vec<Signal>,
    /// False while the session has no end record.
    pub ended: bool,
}

impl Transcript {
    /// Unreadable lines are skipped.
    pub fn parse(file: &str, text: &str) -> Self {
        let mut transcript = Transcript {
            file: file.to_string(),
            ..Default::default()
        };
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TranscriptRecord>(line) {
                Ok(TranscriptRecord::SessionStart { session_id, .. }) => {
                    transcript.session_id = Some(session_id)
                }
                Ok(TranscriptRecord::Turn { role, content, .. }) => {
                    transcript.turns.push(Turn { role, content })
                }
                Ok(TranscriptRecord::SessionEnd { .. }) => transcript.ended = true,
                Ok(TranscriptRecord::Signal(signal)) => transcript.signals.push(signal),
                Err(e) => warn!(file, line = i + 1, error = %e, "skipping unreadable transcript line"),
            }
        }
        transcript
    }
}

pub async fn read_transcript(path: &Path) -> Result<Transcript> {
    let text = tokio::fs::read_to_string(path).await?;
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Transcript::parse(&file, &text))
}

/// `*.jsonl` files in `dir`, sorted by name. A missing dir has none.
pub async fn list_transcripts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(paths),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "jsonl") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

pub async fn append_signals(path: &Path, signals: &[Signal]) -> Result<()> {
    for signal in signals {
        append_json_line(path, &TranscriptRecord::Signal(signal.clone())).await?;
    }
    Ok(())
}
