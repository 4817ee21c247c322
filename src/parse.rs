//! Parsers for free-text LLM replies.
//!
//! Every entry point resolves to a value: the last stage of each chain is a
//! deterministic default, never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::types::Verdict;

const REASON_LIMIT: usize = 200;

static VERDICT_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(pass|fail)\b").unwrap());
static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)```").unwrap());
static FLAT_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{[^{}]*\}").unwrap());

/// Parse a grader reply into a verdict.
pub fn parse_verdict(text: &str) -> Verdict {
    verdict_line(text)
        .or_else(|| verdict_word(text))
        .unwrap_or_else(|| default_verdict(text))
}

/// A line beginning `PASS:` or `FAIL:`, ignoring leading markdown decoration.
fn verdict_line(text: &str) -> Option<Verdict> {
    for line in text.lines() {
        let clean = line
            .trim()
            .trim_start_matches(|c: char| matches!(c, '*' | '#' | '-' | '>' | '`') || c.is_whitespace());
        let upper = clean.to_ascii_uppercase();
        for (marker, pass) in [("PASS", true), ("FAIL", false)] {
            let Some(rest) = upper.strip_prefix(marker) else {
                continue;
            };
            // Allow "**PASS**:" once the leading stars are gone
            let rest = rest.trim_start_matches('*');
            if !rest.starts_with(':') {
                continue;
            }
            let offset = clean.len() - rest.len() + 1;
            let reason = clean[offset..].trim().trim_start_matches('*').trim();
            return Some(Verdict {
                pass,
                reason: truncate(reason, REASON_LIMIT),
            });
        }
    }
    None
}

/// First standalone "pass"/"fail" word in the text.
fn verdict_word(text: &str) -> Option<Verdict> {
    let m = VERDICT_WORD.find(text)?;
    Some(Verdict {
        pass: m.as_str().eq_ignore_ascii_case("pass"),
        reason: truncate(text.trim(), REASON_LIMIT),
    })
}

fn default_verdict(text: &str) -> Verdict {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Verdict::fail("Empty response")
    } else {
        Verdict::fail(truncate(trimmed, REASON_LIMIT))
    }
}

/// Extract a JSON array of values from mixed text.
pub fn extract_json_array(text: &str) -> Vec<Value> {
    whole_array(text)
        .or_else(|| fenced_array(text))
        .or_else(|| bracket_span(text))
        .unwrap_or_else(|| scan_objects(text))
}

fn whole_array(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

fn fenced_array(text: &str) -> Option<Vec<Value>> {
    JSON_FENCE
        .captures_iter(text)
        .find_map(|caps| whole_array(caps.get(1)?.as_str()))
}

/// Largest span from the first `[` to the last `]`.
fn bracket_span(text: &str) -> Option<Vec<Value>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    whole_array(&text[start..=end])
}

/// Last resort: every flat `{...}` object that parses on its own.
fn scan_objects(text: &str) -> Vec<Value> {
    FLAT_OBJECT
        .find_iter(text)
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .filter(Value::is_object)
        .collect()
}

/// Truncate on a char boundary, marking the cut with an ellipsis.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Strip a surrounding markdown code fence, if the whole reply is fenced.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language tag line
    match body.find('\n') {
        Some(i) => body[i + 1..].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_line_pass() {
        let v = parse_verdict("PASS: matches the expected figure");
        assert!(v.pass);
        assert_eq!(v.reason, "matches the expected figure");
    }

    #[test]
    fn test_verdict_line_after_preamble() {
        let v = parse_verdict("Let me compare.\nThe numbers differ.\nFAIL: $350 vs $420");
        assert!(!v.pass);
        assert_eq!(v.reason, "$350 vs $420");
    }

    #[test]
    fn test_verdict_line_markdown_bold() {
        let v = parse_verdict("**PASS**: same date");
        assert!(v.pass);
        assert_eq!(v.reason, "same date");
    }

    #[test]
    fn test_verdict_line_lowercase_marker() {
        let v = parse_verdict("- fail: missing the second clause");
        assert!(!v.pass);
    }

    #[test]
    fn test_verdict_word_fallback() {
        let v = parse_verdict("I would say this is a pass overall.");
        assert!(v.pass);
        let v = parse_verdict("Verdict - Fail, wrong unit");
        assert!(!v.pass);
    }

    #[test]
    fn test_verdict_word_ignores_substrings() {
        // "passenger" and "failure" are not standalone verdict words
        let v = parse_verdict("The passenger count shows a failure mode");
        assert!(!v.pass);
        assert!(v.reason.starts_with("The passenger"));
    }

    #[test]
    fn test_verdict_default_truncates() {
        let long = "x".repeat(500);
        let v = parse_verdict(&long);
        assert!(!v.pass);
        assert_eq!(v.reason.chars().count(), REASON_LIMIT + 1);
    }

    #[test]
    fn test_verdict_empty() {
        let v = parse_verdict("   ");
        assert_eq!(v, Verdict::fail("Empty response"));
    }

    #[test]
    fn test_json_whole_array() {
        let items = extract_json_array(r#"[{"q": "a"}, {"q": "b"}]"#);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_json_fenced_block() {
        let text = "Here you go:\n```json\n[{\"q\": \"a\"}]\n```\nDone.";
        assert_eq!(extract_json_array(text).len(), 1);
    }

    #[test]
    fn test_json_bracket_span() {
        let text = "Pairs follow [ {\"q\": \"a\"}, {\"q\": \"b\"} ] end";
        assert_eq!(extract_json_array(text).len(), 2);
    }

    #[test]
    fn test_json_object_scan() {
        let text = "first {\"q\": \"a\"} then broken [ {\"q\": \"b\"} and {oops}";
        let items = extract_json_array(text);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["q"], "b");
    }

    #[test]
    fn test_json_nothing() {
        assert!(extract_json_array("no json here").is_empty());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```markdown\nAlways cite.\n```"), "Always cite.");
        assert_eq!(strip_code_fence("Always cite."), "Always cite.");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("€€€", 2), "€€…");
        assert_eq!(truncate("ab", 5), "ab");
    }
}
