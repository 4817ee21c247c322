//! Mining chat transcripts for benchmark candidates.
//!
//! Every question/answer exchange in a transcript becomes a candidate; what
//! the user did next decides how much we trust the answer.

pub mod signals;
pub mod transcript;

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::{Dimensions, PairStatus, QaPair};

pub use signals::{detect_signals, is_question, Signal, SignalKind};
pub use transcript::{Role, Transcript, TranscriptRecord, Turn};

const MIN_QUESTION_CHARS: usize = 10;

static CORRECTED_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:the (?:correct|right) answer is|should be|actually|it'?s|it is)\s*:?\s+(.+)",
    )
    .unwrap()
});
static LEADING_COPULA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:it'?s|it is)\s+").unwrap());
static CLAUSE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+not\s+|;|!|,\s|\.\s|\.$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinedSource {
    ChatCorrection,
    ChatSatisfied,
    ChatQa,
}

impl MinedSource {
    /// Provenance tier.
    pub fn confidence(self) -> f64 {
        match self {
            MinedSource::ChatCorrection => 0.9,
            MinedSource::ChatSatisfied => 0.75,
            MinedSource::ChatQa => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinedPair {
    pub question: String,
    pub answer: String,
    pub source: MinedSource,
    pub session_file: String,
    pub turn_number: usize,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_answer: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MineResult {
    pub sessions: usize,
    pub turns: usize,
    pub signal_counts: BTreeMap<String, usize>,
    pub pairs: Vec<MinedPair>,
}

impl MineResult {
    pub fn count(&self, source: MinedSource) -> usize {
        self.pairs.iter().filter(|p| p.source == source).count()
    }
}

/// The clause after "it's", "should be", "actually" or "the correct answer
/// is", cut at the next clause boundary. Falls back to the whole text.
pub fn extract_corrected_value(text: &str) -> String {
    let fallback = text.trim().to_string();
    let Some(captured) = CORRECTED_VALUE.captures(text).and_then(|c| c.get(1)) else {
        return fallback;
    };
    let clause = LEADING_COPULA.replace(captured.as_str().trim(), "");
    let value = match CLAUSE_END.find(&clause) {
        Some(end) => &clause[..end.start()],
        None => clause.as_ref(),
    };
    let value = value.trim();
    if value.is_empty() {
        fallback
    } else {
        value.to_string()
    }
}

/// Lowercased, alphanumeric-only form used for dedup.
pub fn normalize_question(question: &str) -> String {
    question
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Candidate pairs from one transcript, given its detected signals.
pub fn mine_transcript(transcript: &Transcript, signals: &[Signal]) -> Vec<MinedPair> {
    let corrections: HashSet<usize> = signals
        .iter()
        .filter(|s| s.signal == SignalKind::Correction)
        .map(|s| s.turn)
        .collect();
    let satisfied: Vec<usize> = signals
        .iter()
        .filter(|s| s.signal == SignalKind::Satisfaction)
        .map(|s| s.turn)
        .collect();

    let turns = &transcript.turns;
    let mut pairs = Vec::new();
    for (i, window) in turns.windows(2).enumerate() {
        let (question, answer) = (&window[0], &window[1]);
        if question.role != Role::User || answer.role != Role::Assistant {
            continue;
        }
        let text = question.content.trim();
        if text.chars().count() < MIN_QUESTION_CHARS || !is_question(text) {
            continue;
        }

        let next_user = turns
            .iter()
            .enumerate()
            .skip(i + 2)
            .find(|(_, t)| t.role == Role::User)
            .map(|(idx, _)| idx);

        let (source, corrected_answer) = match next_user {
            Some(j) if corrections.contains(&j) => (
                MinedSource::ChatCorrection,
                Some(extract_corrected_value(&turns[j].content)),
            ),
            _ if satisfied.iter().any(|&s| s > i) => (MinedSource::ChatSatisfied, None),
            _ => (MinedSource::ChatQa, None),
        };

        pairs.push(MinedPair {
            question: text.to_string(),
            answer: answer.content.trim().to_string(),
            source,
            session_file: transcript.file.clone(),
            turn_number: i,
            confidence: source.confidence(),
            corrected_answer,
        });
    }
    pairs
}

/// Promote mined pairs to QA pairs, dropping any whose normalized question
/// already exists in `existing` or earlier in the batch.
pub fn mined_pairs_to_qa(pairs: &[MinedPair], existing: &[QaPair]) -> Vec<QaPair> {
    let mut seen: HashSet<String> = existing
        .iter()
        .map(|p| normalize_question(&p.question))
        .collect();

    let mut promoted = Vec::new();
    for pair in pairs {
        let key = normalize_question(&pair.question);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        promoted.push(QaPair {
            id: 0,
            question: pair.question.clone(),
            expected_answer: pair
                .corrected_answer
                .clone()
                .unwrap_or_else(|| pair.answer.clone()),
            source: format!("chat:{}#{}", pair.session_file, pair.turn_number),
            dimensions: Dimensions {
                source_format: Some("chat".to_string()),
                ..Default::default()
            },
            status: PairStatus::Keep,
        });
    }
    promoted
}

/// Walks a directory of transcript logs.
pub struct ChatMiner {
    dir: PathBuf,
}

impl ChatMiner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn mine(&self) -> Result<MineResult> {
        let mut result = MineResult::default();
        for path in transcript::list_transcripts(&self.dir).await? {
            let transcript = match transcript::read_transcript(&path).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable transcript");
                    continue;
                }
            };
            let signals = detect_signals(&transcript.turns);
            for signal in &signals {
                *result
                    .signal_counts
                    .entry(signal_name(signal.signal).to_string())
                    .or_default() += 1;
            }
            let pairs = mine_transcript(&transcript, &signals);
            debug!(
                file = %transcript.file,
                turns = transcript.turns.len(),
                signals = signals.len(),
                pairs = pairs.len(),
                "transcript mined"
            );

            result.sessions += 1;
            result.turns += transcript.turns.len();
            result.pairs.extend(pairs);
        }

        info!(
            sessions = result.sessions,
            pairs = result.pairs.len(),
            corrections = result.count(MinedSource::ChatCorrection),
            satisfied = result.count(MinedSource::ChatSatisfied),
            "mining finished"
        );
        Ok(result)
    }

    /// Write detected signals into transcripts that carry none yet.
    /// Returns how many transcripts were annotated.
    pub async fn annotate(&self) -> Result<usize> {
        let mut annotated = 0;
        for path in transcript::list_transcripts(&self.dir).await? {
            let transcript = transcript::read_transcript(&path).await?;
            if !transcript.signals.is_empty() {
                continue;
            }
            let signals = detect_signals(&transcript.turns);
            if signals.is_empty() {
                continue;
            }
            transcript::append_signals(&path, &signals).await?;
            annotated += 1;
        }
        info!(annotated, "transcripts annotated");
        Ok(annotated)
    }
}

fn signal_name(kind: SignalKind) -> &'static str {
    match kind {
        SignalKind::Correction => "correction",
        SignalKind::Satisfaction => "satisfaction",
        SignalKind::Reformulation => "reformulation",
        SignalKind::FollowUpDepth => "follow_up_depth",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Transcript {
        Transcript {
            file: "s1.jsonl".into(),
            turns: vec![
                Turn::new(Role::User, "What is the monthly rent for unit 4B?"),
                Turn::new(Role::Assistant, "The monthly rent is $350."),
                Turn::new(Role::User, "That's wrong, it's $420 not $350"),
                Turn::new(Role::Assistant, "You're right, it is $420."),
                Turn::new(Role::User, "Who is the landlord on the lease?"),
                Turn::new(Role::Assistant, "Acme Holdings LLC."),
                Turn::new(Role::User, "Great, thanks"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn corrected_value_takes_the_clause() {
        assert_eq!(extract_corrected_value("That's wrong, it's $420 not $350"), "$420");
        assert_eq!(extract_corrected_value("No, it should be 12 months."), "12 months");
        assert_eq!(
            extract_corrected_value("The correct answer is $1,200 per month"),
            "$1,200 per month"
        );
        assert_eq!(extract_corrected_value("Wrong."), "Wrong.");
    }

    #[test]
    fn normalization_ignores_case_and_punctuation() {
        assert_eq!(
            normalize_question("What's the Rent?"),
            normalize_question("whats the rent")
        );
    }

    #[test]
    fn exchanges_are_classified_by_what_follows() {
        let t = session();
        let pairs = mine_transcript(&t, &detect_signals(&t.turns));
        assert_eq!(pairs.len(), 2);

        assert_eq!(pairs[0].source, MinedSource::ChatCorrection);
        assert_eq!(pairs[0].corrected_answer.as_deref(), Some("$420"));
        assert_eq!(pairs[0].confidence, 0.9);
        assert_eq!(pairs[0].turn_number, 0);

        assert_eq!(pairs[1].source, MinedSource::ChatSatisfied);
        assert_eq!(pairs[1].confidence, 0.75);
    }

    #[test]
    fn short_or_non_question_turns_are_skipped() {
        let t = Transcript {
            file: "s.jsonl".into(),
            turns: vec![
                Turn::new(Role::User, "Rent?"),
                Turn::new(Role::Assistant, "$350"),
                Turn::new(Role::User, "Here is some context for you."),
                Turn::new(Role::Assistant, "Noted."),
            ],
            ..Default::default()
        };
        assert!(mine_transcript(&t, &detect_signals(&t.turns)).is_empty());
    }

    #[test]
    fn promotion_dedups_against_benchmark_and_batch() {
        let t = session();
        let mut mined = mine_transcript(&t, &detect_signals(&t.turns));
        mined.push(mined[1].clone());

        let first = mined_pairs_to_qa(&mined, &[]);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].expected_answer, "$420");
        assert_eq!(first[0].source, "chat:s1.jsonl#0");
        assert_eq!(first[0].dimensions.source_format.as_deref(), Some("chat"));

        assert!(mined_pairs_to_qa(&mined, &first).is_empty());
    }
}
