use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel bucket for results whose dimension tag is missing.
pub const UNKNOWN: &str = "unknown";

/// Review status of a QA pair. Only `Keep` and `Edit` survive into a version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    #[default]
    Keep,
    Discard,
    Edit,
}

/// Categorical tags used to slice results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_case: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaPair {
    pub id: u32,
    pub question: String,
    pub expected_answer: String,
    pub source: String,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub status: PairStatus,
}

/// Immutable snapshot of a benchmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkVersion {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub pair_count: usize,
    pub corpus_doc_count: usize,
    pub prompt_hash: String,
    pub pairs: Vec<QaPair>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkManifest {
    pub latest: Option<String>,
    pub versions: Vec<String>,
}

/// One graded pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalResultEntry {
    pub id: u32,
    pub question: String,
    pub expected_answer: String,
    pub actual_answer: String,
    pub pass: bool,
    pub reason: String,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMeta {
    pub benchmark: String,
    pub version: String,
    pub start_time: DateTime<Utc>,
    pub prompt_hash: String,
    pub pair_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub accuracy: f64,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn from_results(results: &[EvalResultEntry], elapsed_ms: u64) -> Self {
        let total = results.len();
        let pass = results.iter().filter(|r| r.pass).count();
        Self {
            total,
            pass,
            fail: total - pass,
            accuracy: accuracy(pass, total),
            elapsed_ms,
        }
    }
}

/// `pass / total`, or 0 for an empty set.
pub fn accuracy(pass: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        pass as f64 / total as f64
    }
}

/// A run as read back from its log. `summary` is `None` while the run is in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalRun {
    pub id: String,
    pub meta: RunMeta,
    pub results: Vec<EvalResultEntry>,
    pub summary: Option<RunSummary>,
}

impl EvalRun {
    pub fn is_sealed(&self) -> bool {
        self.summary.is_some()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EvalResultEntry> {
        self.results.iter().filter(|r| !r.pass)
    }

    pub fn passes(&self) -> impl Iterator<Item = &EvalResultEntry> {
        self.results.iter().filter(|r| r.pass)
    }
}

/// Free-text grading outcome after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub pass: bool,
    pub reason: String,
}

impl Verdict {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            pass: true,
            reason: reason.into(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            pass: false,
            reason: reason.into(),
        }
    }
}

/// Durable record of an applied improvement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementLog {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub target_dimension: String,
    pub target_value: String,
    pub delta: String,
    pub before_accuracy: f64,
    pub after_accuracy: f64,
    pub regressions: usize,
    pub applied: bool,
}

/// Short content hash used to tag runs and versions with the prompt they ran under.
pub fn prompt_hash(prompt: &str) -> String {
    blake3::hash(prompt.as_bytes()).to_hex()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, pass: bool) -> EvalResultEntry {
        EvalResultEntry {
            id,
            question: format!("q{}", id),
            expected_answer: "a".into(),
            actual_answer: "a".into(),
            pass,
            reason: String::new(),
            elapsed_ms: 1,
            dimensions: Dimensions::default(),
        }
    }

    #[test]
    fn summary_two_of_five() {
        let results: Vec<_> = [true, true, false, false, false]
            .iter()
            .enumerate()
            .map(|(i, p)| entry(i as u32 + 1, *p))
            .collect();
        let s = RunSummary::from_results(&results, 10);
        assert_eq!(s.total, 5);
        assert_eq!(s.pass + s.fail, s.total);
        assert!((s.accuracy - 0.4).abs() < 1e-9);
    }

    #[test]
    fn summary_empty_is_zero() {
        let s = RunSummary::from_results(&[], 0);
        assert_eq!(s.total, 0);
        assert_eq!(s.accuracy, 0.0);
    }

    #[test]
    fn dimensions_use_camel_case_and_skip_missing() {
        let dims = Dimensions {
            question_type: Some("factual".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&dims).unwrap();
        assert_eq!(json, r#"{"questionType":"factual"}"#);
    }

    #[test]
    fn prompt_hash_is_stable() {
        assert_eq!(prompt_hash("abc"), prompt_hash("abc"));
        assert_ne!(prompt_hash("abc"), prompt_hash("abd"));
        assert_eq!(prompt_hash("abc").len(), 12);
    }
}
