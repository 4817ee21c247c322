use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::write_json_atomic;
use crate::error::{EvalError, Result};
use crate::types::{BenchmarkManifest, BenchmarkVersion, Dimensions, PairStatus, QaPair};

/// Edge-case tag for questions whose correct answer is "not in the documents".
pub const NOT_ANSWERABLE: &str = "not_answerable";

/// One row of a benchmark import or review file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub expected_answer: String,
    #[serde(default)]
    pub source: String,
    #[serde(flatten)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub status: PairStatus,
}

#[derive(Debug)]
pub struct ImportReport {
    /// The version created, or `None` when no row was accepted.
    pub version: Option<BenchmarkVersion>,
    pub accepted: usize,
    pub discarded: usize,
    pub warnings: Vec<String>,
}

/// Versioned benchmark collections: `<root>/<name>/{manifest.json, vN.json}`.
///
/// Version files are written once and never touched again.
pub struct BenchmarkStore {
    root: PathBuf,
}

impl BenchmarkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(EvalError::Service(format!("invalid benchmark name: {:?}", name)));
        }
        Ok(self.root.join(name))
    }

    pub async fn manifest(&self, name: &str) -> Result<BenchmarkManifest> {
        let path = self.dir(name)?.join("manifest.json");
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BenchmarkManifest::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Benchmarks that have a manifest, sorted by name.
    pub async fn names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if tokio::fs::try_exists(entry.path().join("manifest.json")).await? {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn list_versions(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.manifest(name).await?.versions)
    }

    /// Load a version, or the latest when `version` is `None`.
    pub async fn load(&self, name: &str, version: Option<&str>) -> Result<BenchmarkVersion> {
        let manifest = self.manifest(name).await?;
        let version = match version {
            Some(v) if version_number(v).is_none() => {
                return Err(EvalError::Service(format!("invalid benchmark version: {:?}", v)))
            }
            Some(v) => v.to_string(),
            None => manifest
                .latest
                .ok_or_else(|| EvalError::BenchmarkNotFound(name.to_string()))?,
        };
        let path = self.dir(name)?.join(format!("{}.json", version));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                EvalError::BenchmarkNotFound(format!("{}@{}", name, version)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Freeze `pairs` into a new version and point `latest` at it.
    ///
    /// Discarded pairs are dropped and ids are re-sequenced from 1.
    pub async fn save(
        &self,
        name: &str,
        pairs: Vec<QaPair>,
        corpus_doc_count: usize,
        prompt_hash: &str,
    ) -> Result<BenchmarkVersion> {
        let dir = self.dir(name)?;
        tokio::fs::create_dir_all(&dir).await?;
        let mut manifest = self.manifest(name).await?;

        let pairs: Vec<QaPair> = pairs
            .into_iter()
            .filter(|p| p.status != PairStatus::Discard)
            .enumerate()
            .map(|(i, p)| QaPair {
                id: i as u32 + 1,
                ..p
            })
            .collect();

        // Version files left behind by an interrupted save still claim their number
        let on_disk = version_files(&dir).await?;
        let next = manifest
            .versions
            .iter()
            .chain(on_disk.iter())
            .filter_map(|v| version_number(v))
            .max()
            .unwrap_or(0)
            + 1;
        let snapshot = BenchmarkVersion {
            version: format!("v{}", next),
            timestamp: Utc::now(),
            pair_count: pairs.len(),
            corpus_doc_count,
            prompt_hash: prompt_hash.to_string(),
            pairs,
        };

        // create_new: an existing version file is never overwritten
        let path = dir.join(format!("{}.json", snapshot.version));
        let mut data = serde_json::to_vec_pretty(&snapshot)?;
        data.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(&data).await?;
        file.sync_all().await?;

        manifest.versions.push(snapshot.version.clone());
        manifest.latest = Some(snapshot.version.clone());
        write_json_atomic(&dir.join("manifest.json"), &manifest).await?;

        info!(
            benchmark = name,
            version = %snapshot.version,
            pairs = snapshot.pair_count,
            "benchmark version saved"
        );
        Ok(snapshot)
    }

    /// Validate rows and append the accepted ones to the latest version as a new version.
    pub async fn import(
        &self,
        name: &str,
        rows: Vec<ImportRow>,
        corpus_doc_count: usize,
        prompt_hash: &str,
    ) -> Result<ImportReport> {
        let (accepted, discarded, warnings) = validate_rows(rows);
        for w in &warnings {
            warn!(benchmark = name, "skipped import row: {}", w);
        }

        if accepted.is_empty() {
            return Ok(ImportReport {
                version: None,
                accepted: 0,
                discarded,
                warnings,
            });
        }

        let mut pairs = match self.load(name, None).await {
            Ok(latest) => latest.pairs,
            Err(EvalError::BenchmarkNotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let accepted_count = accepted.len();
        pairs.extend(accepted);

        let version = self
            .save(name, pairs, corpus_doc_count, prompt_hash)
            .await?;
        Ok(ImportReport {
            version: Some(version),
            accepted: accepted_count,
            discarded,
            warnings,
        })
    }
}

/// `"v12"` -> `12`; anything else is not a version label.
fn version_number(label: &str) -> Option<u32> {
    let digits = label.strip_prefix('v')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Version labels of the `vN.json` files present in `dir`.
async fn version_files(dir: &Path) -> Result<Vec<String>> {
    let mut labels = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(label) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
            if version_number(label).is_some() {
                labels.push(label.to_string());
            }
        }
    }
    Ok(labels)
}

/// Split rows into accepted pairs, a discard count, and per-row warnings.
fn validate_rows(rows: Vec<ImportRow>) -> (Vec<QaPair>, usize, Vec<String>) {
    let mut accepted = Vec::new();
    let mut discarded = 0;
    let mut warnings = Vec::new();

    for (i, row) in rows.into_iter().enumerate() {
        let row_no = i + 1;
        if row.status == PairStatus::Discard {
            discarded += 1;
            continue;
        }
        if row.question.trim().is_empty() {
            warnings.push(format!("row {}: empty question", row_no));
            continue;
        }
        let not_answerable = row.dimensions.edge_case.as_deref() == Some(NOT_ANSWERABLE);
        if row.expected_answer.trim().is_empty() && !not_answerable {
            warnings.push(format!("row {}: empty expected answer", row_no));
            continue;
        }
        if row.source.trim().is_empty() {
            warnings.push(format!("row {}: empty source", row_no));
            continue;
        }
        accepted.push(QaPair {
            id: 0,
            question: row.question.trim().to_string(),
            expected_answer: row.expected_answer.trim().to_string(),
            source: row.source.trim().to_string(),
            dimensions: row.dimensions,
            status: row.status,
        });
    }

    (accepted, discarded, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(q: &str, a: &str, src: &str) -> ImportRow {
        ImportRow {
            question: q.into(),
            expected_answer: a.into(),
            source: src.into(),
            dimensions: Dimensions::default(),
            status: PairStatus::Keep,
        }
    }

    fn pair(q: &str) -> QaPair {
        QaPair {
            id: 99,
            question: q.into(),
            expected_answer: "a".into(),
            source: "doc".into(),
            dimensions: Dimensions::default(),
            status: PairStatus::Keep,
        }
    }

    #[test]
    fn validation_skips_bad_rows_with_warnings() {
        let mut unanswerable = row("Who signed the addendum?", "", "lease.pdf");
        unanswerable.dimensions.edge_case = Some(NOT_ANSWERABLE.into());
        let mut dropped = row("Drop me", "x", "doc");
        dropped.status = PairStatus::Discard;

        let rows = vec![
            row("What is the rent?", "$420", "lease.pdf"),
            row("  ", "x", "doc"),
            row("What is the deposit?", "", "lease.pdf"),
            row("When does it end?", "2026", ""),
            unanswerable,
            dropped,
        ];
        let (accepted, discarded, warnings) = validate_rows(rows);
        assert_eq!(accepted.len(), 2);
        assert_eq!(discarded, 1);
        assert_eq!(
            warnings,
            vec![
                "row 2: empty question",
                "row 3: empty expected answer",
                "row 4: empty source"
            ]
        );
    }

    #[test]
    fn import_row_reads_flat_dimensions() {
        let json = r#"{"question":"q","expectedAnswer":"a","source":"s","questionType":"calculation","status":"edit"}"#;
        let row: ImportRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.dimensions.question_type.as_deref(), Some("calculation"));
        assert_eq!(row.status, PairStatus::Edit);
    }

    #[tokio::test]
    async fn save_never_touches_previous_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = BenchmarkStore::new(dir.path());

        let v1 = store
            .save("lease", vec![pair("a"), pair("b")], 3, "h1")
            .await
            .unwrap();
        assert_eq!(v1.version, "v1");
        assert_eq!(
            v1.pairs.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        let v1_path = dir.path().join("lease/v1.json");
        let v1_bytes = std::fs::read(&v1_path).unwrap();

        let mut discarded = pair("c");
        discarded.status = PairStatus::Discard;
        let v2 = store
            .save("lease", vec![pair("x"), discarded, pair("y"), pair("z")], 3, "h2")
            .await
            .unwrap();
        assert_eq!(v2.version, "v2");
        assert_eq!(
            v2.pairs.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        assert_eq!(std::fs::read(&v1_path).unwrap(), v1_bytes);
        let manifest = store.manifest("lease").await.unwrap();
        assert_eq!(manifest.latest.as_deref(), Some("v2"));
        assert_eq!(manifest.versions, vec!["v1", "v2"]);
        assert_eq!(store.load("lease", Some("v1")).await.unwrap().pair_count, 2);
        assert_eq!(store.load("lease", None).await.unwrap().version, "v2");
    }

    #[tokio::test]
    async fn missing_benchmark_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = BenchmarkStore::new(dir.path());
        assert!(matches!(
            store.load("nope", None).await,
            Err(EvalError::BenchmarkNotFound(_))
        ));
        store.save("real", vec![pair("a")], 1, "h").await.unwrap();
        assert!(matches!(
            store.load("real", Some("v9")).await,
            Err(EvalError::BenchmarkNotFound(_))
        ));
        assert_eq!(store.names().await.unwrap(), vec!["real"]);
    }

    #[tokio::test]
    async fn save_skips_past_orphaned_version_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = BenchmarkStore::new(dir.path());
        store.save("lease", vec![pair("a")], 1, "h").await.unwrap();

        // A save interrupted between the version file and the manifest swap
        let orphan = dir.path().join("lease/v2.json");
        std::fs::write(&orphan, "{}").unwrap();

        let next = store.save("lease", vec![pair("b")], 1, "h").await.unwrap();
        assert_eq!(next.version, "v3");
        let after = store.save("lease", vec![pair("c")], 1, "h").await.unwrap();
        assert_eq!(after.version, "v4");

        assert_eq!(std::fs::read_to_string(&orphan).unwrap(), "{}");
        let manifest = store.manifest("lease").await.unwrap();
        assert_eq!(manifest.versions, vec!["v1", "v3", "v4"]);
        assert_eq!(manifest.latest.as_deref(), Some("v4"));
    }

    #[tokio::test]
    async fn load_rejects_path_like_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = BenchmarkStore::new(dir.path().join("benchmarks"));
        store.save("lease", vec![pair("a")], 1, "h").await.unwrap();
        std::fs::write(dir.path().join("benchmarks/x.json"), "{}").unwrap();

        for bad in ["../x", "v1/../v1", "v", "1", "v-1"] {
            let err = store.load("lease", Some(bad)).await.unwrap_err();
            assert!(
                err.to_string().contains("invalid benchmark version"),
                "{}: {}",
                bad,
                err
            );
        }
        assert_eq!(store.load("lease", Some("v1")).await.unwrap().version, "v1");
    }

    #[test]
    fn version_labels_parse_strictly() {
        assert_eq!(version_number("v12"), Some(12));
        assert_eq!(version_number("v"), None);
        assert_eq!(version_number("v+1"), None);
        assert_eq!(version_number("manifest"), None);
    }

    #[tokio::test]
    async fn import_appends_to_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = BenchmarkStore::new(dir.path());

        let first = store
            .import("lease", vec![row("q1", "a1", "s")], 1, "h")
            .await
            .unwrap();
        assert_eq!(first.accepted, 1);

        let second = store
            .import("lease", vec![row("q2", "a2", "s"), row("", "a", "s")], 1, "h")
            .await
            .unwrap();
        let version = second.version.unwrap();
        assert_eq!(version.version, "v2");
        assert_eq!(version.pair_count, 2);
        assert_eq!(second.warnings.len(), 1);

        let empty = store.import("lease", vec![row("", "", "")], 1, "h").await.unwrap();
        assert!(empty.version.is_none());
        assert_eq!(store.list_versions("lease").await.unwrap().len(), 2);
    }

    #[test]
    fn rejects_path_like_names() {
        let store = BenchmarkStore::new("/tmp");
        assert!(store.dir("../etc").is_err());
        assert!(store.dir("lease_2026-q1").is_ok());
    }
}
