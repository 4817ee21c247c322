//! Inferring user reactions from a conversation transcript.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::transcript::{Role, Turn};

const REFORMULATION_OVERLAP: f64 = 0.4;
const REFORMULATION_LOOKBACK: usize = 2;
const MIN_FOLLOW_UP_TURNS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Correction,
    Satisfaction,
    Reformulation,
    FollowUpDepth,
}

/// `turn` indexes the transcript's full turn list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal: SignalKind,
    pub confidence: f64,
    pub turn: usize,
    pub detail: String,
}

fn patterns(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
        .collect()
}

static CORRECTION: Lazy<Vec<Regex>> = Lazy::new(|| {
    patterns(&[
        r"\bthat'?s (?:wrong|incorrect|not right|not correct|not what)\b",
        r"\byou(?:'re| are) (?:wrong|mistaken)\b",
        r"^\s*(?:no|nope)\b[,.!]?\s+(?:actually|it'?s|it is|that'?s|the)\b",
        r"\bactually,? (?:it'?s|it is|the)\b",
        r"\bit should (?:be|say)\b",
        r"\bthe (?:correct|right|real) (?:answer|number|amount|figure) is\b",
        r"\bit'?s \$?\d[\d,.]*\s+not\b",
        r"\bnot \$?\d[\d,.]*",
        r"\bwrong (?:number|amount|answer|date|figure)\b",
    ])
});

static SATISFACTION: Lazy<Vec<Regex>> = Lazy::new(|| {
    patterns(&[
        r"\bthank(?:s| you)\b",
        r"\b(?:perfect|exactly|excellent|awesome|great)\b",
        r"\bthat'?s (?:right|correct|helpful|it|what i needed)\b",
        r"\b(?:makes sense|got it|very helpful|spot on)\b",
    ])
});

static QUESTION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:what|how|when|where|who|whom|which|why|is|are|does|do|did|can|could|should|will|would|was|were|has|have|list|show|tell|explain|summari[sz]e)\b",
    )
    .unwrap()
});

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "was", "were", "what", "when", "where", "which", "who",
        "how", "why", "does", "did", "can", "could", "should", "would", "will", "with", "from",
        "this", "that", "these", "those", "there", "their", "about", "into", "than", "then",
        "have", "has", "had", "you", "your", "our", "any", "all", "its", "not", "but", "per",
        "please", "tell", "show",
    ]
    .into_iter()
    .collect()
});

/// Question mark anywhere, or opens with an interrogative or request verb.
pub fn is_question(text: &str) -> bool {
    text.contains('?') || QUESTION_START.is_match(text)
}

/// `min(1, 0.5 + 0.15 * matches)`, or `None` without a match.
fn family_confidence(family: &[Regex], text: &str) -> Option<(f64, usize)> {
    let matches = family.iter().filter(|re| re.is_match(text)).count();
    if matches == 0 {
        return None;
    }
    Some(((0.5 + 0.15 * matches as f64).min(1.0), matches))
}

fn content_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w.as_str()))
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Run every detector over the user turns of one transcript.
pub fn detect_signals(turns: &[Turn]) -> Vec<Signal> {
    let user_turns: Vec<(usize, &Turn)> = turns
        .iter()
        .enumerate()
        .filter(|(_, t)| t.role == Role::User)
        .collect();

    let mut signals = Vec::new();
    signals.extend(detect_family(&user_turns, &CORRECTION, SignalKind::Correction));
    signals.extend(detect_family(&user_turns, &SATISFACTION, SignalKind::Satisfaction));
    signals.extend(detect_reformulations(&user_turns));
    signals.extend(detect_follow_up_depth(&user_turns));
    signals.sort_by_key(|s| (s.turn, s.signal));
    signals
}

fn detect_family(user_turns: &[(usize, &Turn)], family: &[Regex], kind: SignalKind) -> Vec<Signal> {
    user_turns
        .iter()
        .filter_map(|(idx, turn)| {
            let (confidence, matches) = family_confidence(family, &turn.content)?;
            Some(Signal {
                signal: kind,
                confidence,
                turn: *idx,
                detail: format!("{} pattern(s) matched", matches),
            })
        })
        .collect()
}

/// A question that mostly repeats one of the two questions before it.
/// The closer prior is checked first and the first qualifying one wins.
fn detect_reformulations(user_turns: &[(usize, &Turn)]) -> Vec<Signal> {
    let questions: Vec<(usize, HashSet<String>)> = user_turns
        .iter()
        .filter(|(_, t)| is_question(&t.content))
        .map(|(idx, t)| (*idx, content_words(&t.content)))
        .collect();

    let mut signals = Vec::new();
    for (pos, (idx, words)) in questions.iter().enumerate() {
        let priors = questions[pos.saturating_sub(REFORMULATION_LOOKBACK)..pos].iter().rev();
        for (prior_idx, prior_words) in priors {
            let overlap = jaccard(words, prior_words);
            if overlap >= REFORMULATION_OVERLAP {
                signals.push(Signal {
                    signal: SignalKind::Reformulation,
                    confidence: overlap.min(1.0),
                    turn: *idx,
                    detail: format!("rephrases turn {} (overlap {:.2})", prior_idx, overlap),
                });
                break;
            }
        }
    }
    signals
}

fn detect_follow_up_depth(user_turns: &[(usize, &Turn)]) -> Option<Signal> {
    let count = user_turns.len();
    if count < MIN_FOLLOW_UP_TURNS {
        return None;
    }
    let (last, _) = user_turns.last()?;
    Some(Signal {
        signal: SignalKind::FollowUpDepth,
        confidence: (count as f64 / 10.0).min(1.0),
        turn: *last,
        detail: format!("{} user turns", count),
    })
}
