//! The accuracy curve: sealed runs in order, annotated with the improvement
//! applied shortly before each one.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EvalError, Result};
use crate::store::{ImprovementLedger, RunLog};
use crate::types::{EvalRun, ImprovementLog};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub run_id: String,
    pub benchmark: String,
    pub version: String,
    pub start_time: DateTime<Utc>,
    pub accuracy: f64,
    pub pass: usize,
    pub total: usize,
    pub delta_from_previous: Option<f64>,
    /// Set only when an applied improvement preceded this run within the window.
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub entries: Vec<HistoryEntry>,
    pub first_accuracy: Option<f64>,
    pub last_accuracy: Option<f64>,
    pub delta: Option<f64>,
}

pub struct HistoryTracker {
    runs: Arc<RunLog>,
    ledger: Arc<ImprovementLedger>,
    window: Duration,
}

impl HistoryTracker {
    pub fn new(runs: Arc<RunLog>, ledger: Arc<ImprovementLedger>, window_hours: i64) -> Self {
        Self {
            runs,
            ledger,
            window: Duration::hours(window_hours),
        }
    }

    pub async fn load_history(&self, benchmark: Option<&str>) -> Result<History> {
        let mut runs = Vec::new();
        for run_id in self.runs.list().await? {
            match self.runs.read(&run_id).await {
                Ok(run) => runs.push(run),
                Err(EvalError::MalformedRun { path, detail }) => {
                    warn!(path, detail, "skipping malformed run log");
                }
                Err(e) => return Err(e),
            }
        }
        let ledger = self.ledger.read_all().await?;
        debug!(runs = runs.len(), improvements = ledger.len(), "history loaded");
        Ok(build_history(&runs, &ledger, benchmark, self.window))
    }
}

/// Join runs (already in chronological order) with the ledger.
pub fn build_history(
    runs: &[EvalRun],
    ledger: &[ImprovementLog],
    benchmark: Option<&str>,
    window: Duration,
) -> History {
    let mut entries: Vec<HistoryEntry> = Vec::new();

    for run in runs {
        if benchmark.is_some_and(|b| b != run.meta.benchmark) {
            continue;
        }
        let Some(summary) = &run.summary else {
            continue;
        };
        let delta_from_previous = entries.last().map(|prev| summary.accuracy - prev.accuracy);
        let note = preceding_improvement(ledger, run.meta.start_time, window).map(describe);

        entries.push(HistoryEntry {
            run_id: run.id.clone(),
            benchmark: run.meta.benchmark.clone(),
            version: run.meta.version.clone(),
            start_time: run.meta.start_time,
            accuracy: summary.accuracy,
            pass: summary.pass,
            total: summary.total,
            delta_from_previous,
            note,
        });
    }

    let first_accuracy = entries.first().map(|e| e.accuracy);
    let last_accuracy = entries.last().map(|e| e.accuracy);
    let delta = first_accuracy.zip(last_accuracy).map(|(first, last)| last - first);
    History {
        entries,
        first_accuracy,
        last_accuracy,
        delta,
    }
}

/// Most recent applied improvement strictly before `start` and less than
/// `window` older than it.
fn preceding_improvement(
    ledger: &[ImprovementLog],
    start: DateTime<Utc>,
    window: Duration,
) -> Option<&ImprovementLog> {
    ledger
        .iter()
        .filter(|log| log.applied && log.timestamp < start && start - log.timestamp < window)
        .max_by_key(|log| log.timestamp)
}

fn describe(log: &ImprovementLog) -> String {
    format!(
        "after {}={} fix ({:.0}% → {:.0}% on slice, {} regressions)",
        log.target_dimension,
        log.target_value,
        log.before_accuracy * 100.0,
        log.after_accuracy * 100.0,
        log.regressions
    )
}

fn pct(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

pub fn render_history(history: &History) -> String {
    if history.entries.is_empty() {
        return "No eval runs recorded yet.".to_string();
    }

    let mut out = String::new();
    for entry in &history.entries {
        let _ = write!(
            out,
            "{}  {}@{}  {}  {}/{}",
            entry.run_id,
            entry.benchmark,
            entry.version,
            pct(entry.accuracy),
            entry.pass,
            entry.total
        );
        if let Some(note) = &entry.note {
            let _ = write!(out, "  [{}]", note);
        }
        out.push('\n');
    }

    if let (Some(first), Some(last), Some(delta)) =
        (history.first_accuracy, history.last_accuracy, history.delta)
    {
        let _ = write!(
            out,
            "\nAccuracy: {} → {} ({:+.0} pts)",
            pct(first),
            pct(last),
            delta * 100.0
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunMeta, RunSummary};

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn run(id: &str, benchmark: &str, start: &str, pass: usize, total: usize) -> EvalRun {
        EvalRun {
            id: id.into(),
            meta: RunMeta {
                benchmark: benchmark.into(),
                version: "v1".into(),
                start_time: at(start),
                prompt_hash: "h".into(),
                pair_count: total,
            },
            results: Vec::new(),
            summary: Some(RunSummary {
                total,
                pass,
                fail: total - pass,
                accuracy: pass as f64 / total as f64,
                elapsed_ms: 0,
            }),
        }
    }

    fn applied(ts: &str, value: &str) -> ImprovementLog {
        ImprovementLog {
            timestamp: at(ts),
            run_id: "r".into(),
            target_dimension: "questionType".into(),
            target_value: value.into(),
            delta: "d".into(),
            before_accuracy: 0.0,
            after_accuracy: 0.67,
            regressions: 0,
            applied: true,
        }
    }

    fn three_runs() -> Vec<EvalRun> {
        vec![
            run("r1", "lease", "2026-03-01T10:00:00Z", 13, 20),
            run("r2", "lease", "2026-03-02T10:00:00Z", 78, 100),
            run("r3", "lease", "2026-03-03T10:00:00Z", 17, 20),
        ]
    }

    #[test]
    fn curve_reports_overall_delta() {
        let history = build_history(&three_runs(), &[], None, Duration::hours(24));
        assert_eq!(history.entries.len(), 3);
        assert!((history.delta.unwrap() - 0.20).abs() < 1e-9);
        let second = history.entries[1].delta_from_previous.unwrap();
        assert!((second - 0.13).abs() < 1e-9);
        assert!(history.entries[0].delta_from_previous.is_none());

        let text = render_history(&history);
        assert!(text.contains("65% → 85%"), "{}", text);
        assert!(text.contains("(+20 pts)"), "{}", text);
    }

    #[test]
    fn closest_improvement_inside_window_wins() {
        let ledger = vec![
            applied("2026-03-02T01:00:00Z", "older"),
            applied("2026-03-02T09:00:00Z", "calculation"),
            // after r2 started
            applied("2026-03-02T11:00:00Z", "later"),
        ];
        let history = build_history(&three_runs(), &ledger, None, Duration::hours(24));
        assert!(history.entries[0].note.is_none());
        let note = history.entries[1].note.as_deref().unwrap();
        assert!(note.contains("calculation"), "{}", note);
        // r3 sees the 11:00 entry, 23h earlier
        assert!(history.entries[2].note.as_deref().unwrap().contains("later"));
    }

    #[test]
    fn improvements_outside_window_or_unapplied_are_ignored() {
        let mut unapplied = applied("2026-03-02T09:00:00Z", "x");
        unapplied.applied = false;
        let ledger = vec![applied("2026-02-20T09:00:00Z", "stale"), unapplied];
        let history = build_history(&three_runs(), &ledger, None, Duration::hours(24));
        assert!(history.entries.iter().all(|e| e.note.is_none()));
    }

    #[test]
    fn filter_and_unsealed_runs() {
        let mut runs = three_runs();
        runs.push(run("r4", "other", "2026-03-04T10:00:00Z", 1, 2));
        let mut open = run("r5", "lease", "2026-03-05T10:00:00Z", 1, 2);
        open.summary = None;
        runs.push(open);

        let history = build_history(&runs, &[], Some("lease"), Duration::hours(24));
        assert_eq!(history.entries.len(), 3);
        assert_eq!(history.entries.last().unwrap().run_id, "r3");
    }

    #[test]
    fn empty_history_renders_placeholder() {
        let history = build_history(&[], &[], None, Duration::hours(24));
        assert!(history.delta.is_none());
        assert_eq!(render_history(&history), "No eval runs recorded yet.");
    }

    #[tokio::test]
    async fn tracker_reads_runs_and_ledger_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Arc::new(RunLog::new(dir.path().join("runs")));
        let ledger = Arc::new(ImprovementLedger::new(dir.path().join("improvements.jsonl")));

        for r in three_runs() {
            let writer = runs.create(&r.id, &r.meta).await.unwrap();
            writer.seal(r.summary.as_ref().unwrap()).await.unwrap();
        }
        runs.create("r9", &three_runs()[0].meta).await.unwrap();
        ledger
            .append(&applied("2026-03-02T09:00:00Z", "calculation"))
            .await
            .unwrap();

        let tracker = HistoryTracker::new(runs, ledger, 24);
        let history = tracker.load_history(None).await.unwrap();
        assert_eq!(history.entries.len(), 3);
        assert!(history.entries[1].note.is_some());
    }
}
