use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{AnswerService, AskOptions};
use crate::docs::DocumentStore;
use crate::llm::{LlmClient, Message};

/// Patterns that indicate the LLM refused to engage or produced a non-answer.
const BROKEN_ANSWER_PATTERNS: &[&str] = &[
    "i don't have the ability",
    "i cannot access",
    "i apologize",
    "i'm unable to",
    "unable to directly",
    "i can't access",
    "don't have access",
    "cannot directly read",
    "provide the content or specific sections",
    "if you provide the content",
];

const STOP_WORDS: &[&str] = &[
    "what", "which", "where", "when", "does", "have", "with", "that", "this", "from", "about",
    "some", "there", "their", "they", "your", "been", "were", "how", "could", "would", "should",
    "shall", "will", "into", "also", "just", "like", "make", "using", "used", "need", "want",
    "find", "know", "tell", "many", "much", "very", "really", "please", "help", "more", "most",
    "only", "the", "and", "for", "are", "was", "did",
];

const MAX_KEYWORDS: usize = 8;
const MAX_EXCERPTS: usize = 6;

/// One-shot answerer: keyword retrieval over the corpus, then a single chat call.
///
/// Each call builds its message list from scratch, so no pair can see another
/// pair's question or answer.
pub struct RetrievalAnswerer {
    llm: Arc<LlmClient>,
    store: Arc<DocumentStore>,
}

impl RetrievalAnswerer {
    pub fn new(llm: Arc<LlmClient>, store: Arc<DocumentStore>) -> Self {
        Self { llm, store }
    }

    /// Extract search terms from a question: hyphenated phrases kept, stop words dropped.
    pub fn extract_keywords(question: &str) -> Vec<String> {
        let mut keywords = Vec::new();

        for word in question.split_whitespace() {
            let clean: String = word
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
                .collect();
            if clean.is_empty() {
                continue;
            }
            let lower = clean.to_lowercase();

            // Keep hyphenated terms as-is (e.g., "sub-lease") plus their parts
            if clean.contains('-') || clean.contains('_') {
                keywords.push(lower.clone());
                for part in lower.split(|c: char| c == '-' || c == '_') {
                    if part.len() > 2 && !STOP_WORDS.contains(&part) {
                        keywords.push(part.to_string());
                    }
                }
            } else if (lower.len() > 2 || lower.chars().all(|c| c.is_ascii_digit()))
                && !STOP_WORDS.contains(&lower.as_str())
            {
                keywords.push(lower);
            }
        }

        let mut seen = HashSet::new();
        keywords.retain(|k| seen.insert(k.clone()));
        keywords.truncate(MAX_KEYWORDS);
        keywords
    }

    fn is_broken(answer: &str) -> bool {
        let lower = answer.to_lowercase();
        answer.trim().is_empty() || BROKEN_ANSWER_PATTERNS.iter().any(|p| lower.contains(p))
    }
}

#[async_trait]
impl AnswerService for RetrievalAnswerer {
    async fn ask(&self, question: &str, opts: &AskOptions) -> Result<String> {
        let keywords = Self::extract_keywords(question);
        let excerpts = self.store.search_all(&keywords, MAX_EXCERPTS).await?;
        debug!(
            keywords = ?keywords,
            excerpt_count = excerpts.len(),
            fresh = opts.fresh_context,
            "retrieved excerpts"
        );

        let evidence = if excerpts.is_empty() {
            "(no matching excerpts)".to_string()
        } else {
            excerpts
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    format!(
                        "--- Excerpt {} [{} @ {}] ---\n{}",
                        i + 1,
                        e.doc_name,
                        e.offset,
                        e.content
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let messages = vec![
            Message::system(opts.system_prompt.clone()),
            Message::user(format!(
                "Document excerpts:\n\n{}\n\nQuestion: {}",
                evidence, question
            )),
        ];
        let answer = self.llm.chat(&messages, None, 0.3).await?;
        if !Self::is_broken(&answer) {
            return Ok(answer.trim().to_string());
        }

        warn!(answer_len = answer.len(), "answer looks like a refusal; retrying once");
        let rescue = vec![
            messages[0].clone(),
            messages[1].clone(),
            Message {
                role: "assistant".to_string(),
                content: answer,
            },
            Message::user(
                "The excerpts above are the document content. Answer from them directly, \
                quoting the relevant text, or say \"Not found in the documents.\"",
            ),
        ];
        let retry = self.llm.chat(&rescue, None, 0.3).await?;
        Ok(retry.trim().to_string())
    }
}
