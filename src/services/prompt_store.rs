use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::prompts::DEFAULT_SYSTEM_PROMPT;
use super::PromptStore;

/// Prompt kept in one file, overwritten whole on save. Callers re-read it per run.
pub struct FilePromptStore {
    path: PathBuf,
}

impl FilePromptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PromptStore for FilePromptStore {
    async fn load(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if !text.trim().is_empty() => Ok(text),
            Ok(_) => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(DEFAULT_SYSTEM_PROMPT.to_string())
            }
            Err(e) => Err(e).with_context(|| format!("failed to read {}", self.path.display())),
        }
    }

    async fn save(&self, prompt: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Last writer wins; rename keeps readers from seeing a half-written prompt
        let tmp = self.path.with_extension("md.tmp");
        tokio::fs::write(&tmp, prompt)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), len = prompt.len(), "system prompt saved");
        Ok(())
    }
}

pub struct MemoryPromptStore {
    prompt: RwLock<String>,
}

impl MemoryPromptStore {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: RwLock::new(prompt.into()),
        }
    }
}

#[async_trait]
impl PromptStore for MemoryPromptStore {
    async fn load(&self) -> Result<String> {
        Ok(self.prompt.read().await.clone())
    }

    async fn save(&self, prompt: &str) -> Result<()> {
        *self.prompt.write().await = prompt.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_defaults_then_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePromptStore::new(dir.path().join("system_prompt.md"));

        assert_eq!(store.load().await.unwrap(), DEFAULT_SYSTEM_PROMPT);

        store.save("first").await.unwrap();
        store.save("second").await.unwrap();
        assert_eq!(store.load().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryPromptStore::new("base");
        store.save("base\n\nextra").await.unwrap();
        assert_eq!(store.load().await.unwrap(), "base\n\nextra");
    }
}
