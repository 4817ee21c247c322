use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{info, warn};

use super::prompts::GENERATE_SYSTEM;
use crate::docs::types::DocMeta;
use crate::llm::{LlmClient, Message};
use crate::parse::extract_json_array;
use crate::store::benchmark::ImportRow;
use crate::types::{Dimensions, PairStatus};

/// Characters of document text sent for generation.
const DOC_CHARS: usize = 24_000;

/// Drafts candidate QA pairs from one corpus document for human review.
pub struct QaGenerator {
    llm: Arc<LlmClient>,
}

impl QaGenerator {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn generate(&self, doc: &DocMeta, text: &str, count: usize) -> Result<Vec<ImportRow>> {
        let body: String = text.chars().take(DOC_CHARS).collect();
        let messages = [
            Message::system(GENERATE_SYSTEM),
            Message::user(format!(
                "Write {} pairs.\n\nDOCUMENT ({}):\n{}",
                count, doc.name, body
            )),
        ];
        let reply = self.llm.chat(&messages, None, 0.7).await?;
        let items = extract_json_array(&reply);
        if items.is_empty() {
            warn!(doc = %doc.name, "generator reply contained no JSON pairs");
        }

        let rows: Vec<ImportRow> = items
            .iter()
            .filter_map(|item| row_from_value(item, doc))
            .take(count)
            .collect();
        info!(doc = %doc.name, generated = rows.len(), "candidate pairs generated");
        Ok(rows)
    }
}

fn str_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn row_from_value(item: &Value, doc: &DocMeta) -> Option<ImportRow> {
    let question = str_field(item, &["question", "q"])?;
    Some(ImportRow {
        question,
        expected_answer: str_field(item, &["expectedAnswer", "expected_answer", "answer"])
            .unwrap_or_default(),
        source: doc.name.clone(),
        dimensions: Dimensions {
            question_type: str_field(item, &["questionType", "question_type"]),
            difficulty: str_field(item, &["difficulty"]),
            source_format: Some(doc.format.clone()),
            edge_case: str_field(item, &["edgeCase", "edge_case"]),
        },
        // Reviewers mark rejects as discard before import
        status: PairStatus::Keep,
    })
}
