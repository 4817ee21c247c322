use serde::{Deserialize, Serialize};

/// Content-addressed document ID (blake3 hex hash).
pub type DocId = String;

/// Metadata for one pre-parsed corpus document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    pub id: DocId,
    pub name: String,
    /// Path the text was loaded from.
    pub source: String,
    /// Original format before parsing, e.g. "pdf" for `lease.pdf.txt`.
    pub format: String,
    pub size: usize,
    /// Count of `--- PAGE N ---` markers left by the PDF parser (0 if none).
    #[serde(default)]
    pub pages: usize,
}

/// A search result excerpt from a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocExcerpt {
    pub doc_id: DocId,
    pub doc_name: String,
    pub offset: usize,
    pub content: String,
    pub match_count: usize,
}
