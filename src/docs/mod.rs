pub mod types;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::services::CorpusProvider;
use types::{DocExcerpt, DocMeta};

/// Extensions of parsed text the store will load.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "csv"];
const PAGE_MARKER: &str = "--- PAGE ";

/// Read-only view over a directory of pre-parsed documents.
pub struct DocumentStore {
    metas: Vec<DocMeta>,
    paths: HashMap<String, PathBuf>,
    /// Cache document content in memory after first read.
    content_cache: RwLock<HashMap<String, String>>,
}

impl DocumentStore {
    /// Scan `dir` for text documents. A missing directory is an empty corpus.
    pub async fn open(dir: &Path) -> Result<Self> {
        let mut metas = Vec::new();
        let mut paths = HashMap::new();

        if !dir.exists() {
            warn!(dir = %dir.display(), "corpus directory does not exist");
            return Ok(Self::from_parts(metas, paths));
        }

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("failed to read corpus dir {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                continue;
            }
            let content = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let text = String::from_utf8_lossy(&content);
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            let meta = DocMeta {
                id: blake3::hash(&content).to_hex().to_string(),
                format: original_format(&name),
                pages: text.matches(PAGE_MARKER).count(),
                source: path.display().to_string(),
                size: content.len(),
                name,
            };
            paths.insert(meta.id.clone(), path);
            metas.push(meta);
        }

        metas.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = metas.len(), dir = %dir.display(), "corpus scanned");
        Ok(Self::from_parts(metas, paths))
    }

    fn from_parts(metas: Vec<DocMeta>, paths: HashMap<String, PathBuf>) -> Self {
        Self {
            metas,
            paths,
            content_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn documents(&self) -> &[DocMeta] {
        &self.metas
    }

    pub fn find(&self, name_or_id: &str) -> Option<&DocMeta> {
        self.metas
            .iter()
            .find(|m| m.id == name_or_id || m.name == name_or_id)
    }

    pub async fn get_content(&self, doc_id: &str) -> Result<String> {
        {
            let cache = self.content_cache.read().await;
            if let Some(content) = cache.get(doc_id) {
                return Ok(content.clone());
            }
        }

        let path = self
            .paths
            .get(doc_id)
            .ok_or_else(|| anyhow::anyhow!("document not found: {}", doc_id))?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let content = String::from_utf8_lossy(&bytes).to_string();

        let mut cache = self.content_cache.write().await;
        cache.insert(doc_id.to_string(), content.clone());
        Ok(content)
    }

    /// Keyword search within a document. Matches ANY keyword (OR logic) and
    /// returns excerpts with a context window around each match.
    pub async fn search(
        &self,
        doc_id: &str,
        keywords: &[String],
        max_results: usize,
    ) -> Result<Vec<DocExcerpt>> {
        let content = self.get_content(doc_id).await?;
        let doc_name = self
            .metas
            .iter()
            .find(|m| m.id == doc_id)
            .map(|m| m.name.clone())
            .unwrap_or_default();
        Ok(search_text(doc_id, &doc_name, &content, keywords, max_results))
    }

    /// Search every document and keep the best excerpts overall.
    pub async fn search_all(&self, keywords: &[String], max_results: usize) -> Result<Vec<DocExcerpt>> {
        let mut all = Vec::new();
        for meta in &self.metas {
            all.extend(self.search(&meta.id, keywords, max_results).await?);
        }
        all.sort_by(|a, b| b.match_count.cmp(&a.match_count));
        all.truncate(max_results);
        Ok(all)
    }
}

#[async_trait]
impl CorpusProvider for DocumentStore {
    async fn list_documents(&self) -> Result<Vec<DocMeta>> {
        Ok(self.metas.clone())
    }
}

/// `lease.pdf.txt` was parsed from a PDF; `notes.md` is markdown.
fn original_format(name: &str) -> String {
    let parts: Vec<&str> = name.rsplitn(3, '.').collect();
    match parts.as_slice() {
        [ext, inner, _] if ext.eq_ignore_ascii_case("txt") => inner.to_lowercase(),
        [ext, _, ..] => ext.to_lowercase(),
        _ => "txt".to_string(),
    }
}

fn search_text(
    doc_id: &str,
    doc_name: &str,
    text: &str,
    keywords: &[String],
    max_results: usize,
) -> Vec<DocExcerpt> {
    if keywords.is_empty() {
        return vec![];
    }

    let text_lower = text.to_lowercase();
    let chars: Vec<char> = text.chars().collect();
    let context_window = 300; // chars of context around match
    let mut results = Vec::new();
    let mut seen_offsets: Vec<usize> = Vec::new();

    for keyword in keywords {
        let mut search_from = 0;
        while results.len() < max_results * 2 {
            let Some(byte_pos) = text_lower[search_from..].find(keyword.as_str()) else {
                break;
            };
            let abs_byte_pos = search_from + byte_pos;
            let char_pos = text_lower[..abs_byte_pos].chars().count();

            // Skip if we already have a match near this offset
            let nearby = seen_offsets
                .iter()
                .any(|&o| char_pos.abs_diff(o) < context_window);
            if !nearby && char_pos < chars.len() {
                seen_offsets.push(char_pos);
                let start = char_pos.saturating_sub(context_window);
                let end = (char_pos + keyword.chars().count() + context_window).min(chars.len());
                let excerpt: String = chars[start..end].iter().collect();

                let excerpt_lower = excerpt.to_lowercase();
                let match_count = keywords
                    .iter()
                    .filter(|k| excerpt_lower.contains(k.as_str()))
                    .count();

                results.push(DocExcerpt {
                    doc_id: doc_id.to_string(),
                    doc_name: doc_name.to_string(),
                    offset: char_pos,
                    content: excerpt,
                    match_count,
                });
            }

            search_from = abs_byte_pos + keyword.len().max(1);
            if search_from >= text_lower.len() {
                break;
            }
        }
    }

    // Excerpts matching more keywords first
    results.sort_by(|a, b| b.match_count.cmp(&a.match_count));
    results.truncate(max_results);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_double_extension() {
        assert_eq!(original_format("lease.pdf.txt"), "pdf");
        assert_eq!(original_format("budget.xlsx.txt"), "xlsx");
        assert_eq!(original_format("notes.md"), "md");
        assert_eq!(original_format("plain.txt"), "txt");
    }

    #[test]
    fn search_ranks_by_keyword_overlap() {
        let filler = "lorem ipsum ".repeat(60);
        let text = format!(
            "The lessee pays rent.{}Monthly rent for the lessee is $420 under the lease.",
            filler
        );
        let keywords = vec!["rent".to_string(), "lease".to_string(), "420".to_string()];
        let hits = search_text("d1", "lease.pdf.txt", &text, &keywords, 2);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].content.contains("$420"));
        assert!(hits[0].match_count >= hits[1].match_count);
    }

    #[tokio::test]
    async fn open_scans_text_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("lease.pdf.txt"),
            "--- PAGE 1 ---\nParties\n\n--- PAGE 2 ---\nRent is $420",
        )
        .unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let store = DocumentStore::open(dir.path()).await.unwrap();
        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].format, "pdf");
        assert_eq!(docs[0].pages, 2);

        let hits = store
            .search_all(&["rent".to_string()], 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_name, "lease.pdf.txt");
    }

    #[tokio::test]
    async fn missing_dir_is_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(&dir.path().join("nope")).await.unwrap();
        assert!(store.list_documents().await.unwrap().is_empty());
    }
}
