//! Slicing a run's results by categorical dimension.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{accuracy, Dimensions, EvalResultEntry, EvalRun, UNKNOWN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    QuestionType,
    Difficulty,
    SourceFormat,
    EdgeCase,
}

impl Dimension {
    /// Fixed analysis order. Also the tie-break order for the worst slice.
    pub const ALL: [Dimension; 4] = [
        Dimension::QuestionType,
        Dimension::Difficulty,
        Dimension::SourceFormat,
        Dimension::EdgeCase,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::QuestionType => "questionType",
            Dimension::Difficulty => "difficulty",
            Dimension::SourceFormat => "sourceFormat",
            Dimension::EdgeCase => "edgeCase",
        }
    }

    /// Tag value for this dimension, `"unknown"` when missing or blank.
    pub fn value_of(self, dims: &Dimensions) -> &str {
        let value = match self {
            Dimension::QuestionType => dims.question_type.as_deref(),
            Dimension::Difficulty => dims.difficulty.as_deref(),
            Dimension::SourceFormat => dims.source_format.as_deref(),
            Dimension::EdgeCase => dims.edge_case.as_deref(),
        };
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => UNKNOWN,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionSlice {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub accuracy: f64,
    pub failures: Vec<EvalResultEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionBreakdown {
    pub dimension: Dimension,
    /// Keyed by tag value, including `"unknown"`.
    pub slices: BTreeMap<String, DimensionSlice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstDimension {
    pub dimension: Dimension,
    pub value: String,
    pub accuracy: f64,
    pub total: usize,
    pub failures: Vec<EvalResultEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionAnalysis {
    pub total: usize,
    pub pass: usize,
    pub accuracy: f64,
    pub breakdowns: Vec<DimensionBreakdown>,
    /// `None` only when no result carries any tag.
    pub worst: Option<WorstDimension>,
}

impl DimensionAnalysis {
    pub fn breakdown(&self, dimension: Dimension) -> Option<&DimensionBreakdown> {
        self.breakdowns.iter().find(|b| b.dimension == dimension)
    }
}

pub fn analyze(run: &EvalRun) -> DimensionAnalysis {
    analyze_results(&run.results)
}

pub fn analyze_results(results: &[EvalResultEntry]) -> DimensionAnalysis {
    let breakdowns: Vec<DimensionBreakdown> = Dimension::ALL
        .iter()
        .map(|&dimension| DimensionBreakdown {
            dimension,
            slices: slice_by(dimension, results),
        })
        .collect();
    let worst = find_worst(&breakdowns);
    let pass = results.iter().filter(|r| r.pass).count();

    DimensionAnalysis {
        total: results.len(),
        pass,
        accuracy: accuracy(pass, results.len()),
        breakdowns,
        worst,
    }
}

fn slice_by(dimension: Dimension, results: &[EvalResultEntry]) -> BTreeMap<String, DimensionSlice> {
    let mut slices: BTreeMap<String, DimensionSlice> = BTreeMap::new();
    for result in results {
        let slice = slices
            .entry(dimension.value_of(&result.dimensions).to_string())
            .or_default();
        slice.total += 1;
        if result.pass {
            slice.pass += 1;
        } else {
            slice.fail += 1;
            slice.failures.push(result.clone());
        }
    }
    for slice in slices.values_mut() {
        slice.accuracy = accuracy(slice.pass, slice.total);
    }
    slices
}

/// Lowest accuracy wins; ties go to more failures, then to the first slice in
/// dimension order and value order.
fn find_worst(breakdowns: &[DimensionBreakdown]) -> Option<WorstDimension> {
    let mut worst: Option<(Dimension, &String, &DimensionSlice)> = None;
    for breakdown in breakdowns {
        for (value, slice) in &breakdown.slices {
            if value == UNKNOWN || slice.total == 0 {
                continue;
            }
            let better = match worst {
                None => true,
                Some((_, _, current)) => {
                    slice.accuracy < current.accuracy
                        || (slice.accuracy == current.accuracy
                            && slice.failures.len() > current.failures.len())
                }
            };
            if better {
                worst = Some((breakdown.dimension, value, slice));
            }
        }
    }

    worst.map(|(dimension, value, slice)| WorstDimension {
        dimension,
        value: value.clone(),
        accuracy: slice.accuracy,
        total: slice.total,
        failures: slice.failures.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, pass: bool, question_type: Option<&str>, difficulty: Option<&str>) -> EvalResultEntry {
        EvalResultEntry {
            id,
            question: format!("q{}", id),
            expected_answer: "e".into(),
            actual_answer: "a".into(),
            pass,
            reason: String::new(),
            elapsed_ms: 0,
            dimensions: Dimensions {
                question_type: question_type.map(String::from),
                difficulty: difficulty.map(String::from),
                ..Default::default()
            },
        }
    }

    #[test]
    fn calculation_slice_is_worst() {
        let results = vec![
            entry(1, false, Some("calculation"), None),
            entry(2, false, Some("calculation"), None),
            entry(3, false, Some("calculation"), None),
            entry(4, true, Some("factual"), None),
            entry(5, true, Some("factual"), None),
        ];
        let analysis = analyze_results(&results);
        let worst = analysis.worst.unwrap();
        assert_eq!(worst.dimension, Dimension::QuestionType);
        assert_eq!(worst.value, "calculation");
        assert_eq!(worst.accuracy, 0.0);
        assert_eq!(worst.failures.len(), 3);
    }

    #[test]
    fn slices_cover_every_result() {
        let results = vec![
            entry(1, true, Some("factual"), Some("easy")),
            entry(2, false, None, Some("hard")),
            entry(3, false, Some("  "), None),
            entry(4, true, Some("summary"), None),
        ];
        let analysis = analyze_results(&results);
        for breakdown in &analysis.breakdowns {
            let sum: usize = breakdown.slices.values().map(|s| s.total).sum();
            assert_eq!(sum, analysis.total, "{}", breakdown.dimension);
        }
        let qt = analysis.breakdown(Dimension::QuestionType).unwrap();
        assert_eq!(qt.slices["unknown"].total, 2);
        // edgeCase is untagged everywhere
        let edge = analysis.breakdown(Dimension::EdgeCase).unwrap();
        assert_eq!(edge.slices.len(), 1);
    }

    #[test]
    fn unknown_bucket_is_never_worst() {
        let results = vec![
            entry(1, false, None, None),
            entry(2, false, None, None),
            entry(3, true, Some("factual"), None),
        ];
        let worst = analyze_results(&results).worst.unwrap();
        assert_eq!(worst.value, "factual");
        assert_eq!(worst.accuracy, 1.0);
    }

    #[test]
    fn ties_prefer_more_failures() {
        let results = vec![
            entry(1, false, Some("factual"), Some("hard")),
            entry(2, false, Some("factual"), Some("hard")),
            entry(3, false, Some("lookup"), Some("easy")),
        ];
        let worst = analyze_results(&results).worst.unwrap();
        // factual (2 failures) beats lookup (1); questionType precedes difficulty
        assert_eq!(worst.dimension, Dimension::QuestionType);
        assert_eq!(worst.value, "factual");
    }

    #[test]
    fn all_pass_and_all_fail_still_report_worst() {
        let all_pass = vec![entry(1, true, Some("factual"), None)];
        let worst = analyze_results(&all_pass).worst.unwrap();
        assert_eq!(worst.accuracy, 1.0);
        assert!(worst.failures.is_empty());

        let all_fail = vec![entry(1, false, Some("factual"), None)];
        assert_eq!(analyze_results(&all_fail).worst.unwrap().accuracy, 0.0);
    }

    #[test]
    fn analysis_is_deterministic() {
        let results = vec![
            entry(1, false, Some("b"), Some("x")),
            entry(2, true, Some("a"), Some("y")),
            entry(3, false, Some("a"), Some("x")),
        ];
        assert_eq!(analyze_results(&results), analyze_results(&results));
    }

    #[test]
    fn no_tags_means_no_worst() {
        let results = vec![entry(1, false, None, None)];
        assert!(analyze_results(&results).worst.is_none());
        assert!(analyze_results(&[]).worst.is_none());
    }
}
