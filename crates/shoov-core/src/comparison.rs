//! Comparison results delivered by the diff engine.
//!
//! A batch maps a screenshot key to one or more results. The JSON shape is
//! the diff engine's own (`baselinePath`, `isWithinMisMatchTolerance`,
//! `properties.tags`, ...).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

const BASELINE_SUFFIX: &str = ".baseline.png";

/// Ordered artifact triple of one comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub baseline: PathBuf,
    pub regression: PathBuf,
    pub diff: PathBuf,
}

impl ArtifactSet {
    pub fn new(
        baseline: impl Into<PathBuf>,
        regression: impl Into<PathBuf>,
        diff: impl Into<PathBuf>,
    ) -> Self {
        Self {
            baseline: baseline.into(),
            regression: regression.into(),
            diff: diff.into(),
        }
    }

    /// Paths in fingerprint order: baseline, regression, diff.
    pub fn paths(&self) -> [&Path; 3] {
        [&self.baseline, &self.regression, &self.diff]
    }
}

/// One screenshot comparison. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub key: String,
    pub artifacts: ArtifactSet,
    pub within_tolerance: bool,
    pub mismatch_percentage: Option<f64>,
    pub tags: Vec<String>,
}

impl ComparisonResult {
    /// Human label derived from the baseline file name.
    ///
    /// `home.page.baseline.png` becomes `home page`.
    pub fn label(&self) -> String {
        let name = self
            .artifacts
            .baseline
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.key.clone());
        let stem = name.strip_suffix(BASELINE_SUFFIX).unwrap_or(&name);
        stem.replacen('.', " ", 1)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawProperties {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComparison {
    baseline_path: PathBuf,
    #[serde(default)]
    regression_path: Option<PathBuf>,
    #[serde(default)]
    diff_path: Option<PathBuf>,
    is_within_mis_match_tolerance: bool,
    #[serde(default)]
    mis_match_percentage: Option<f64>,
    #[serde(default)]
    properties: Option<RawProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(RawComparison),
    Many(Vec<RawComparison>),
}

impl RawComparison {
    fn into_result(self, key: &str) -> ComparisonResult {
        ComparisonResult {
            key: key.to_string(),
            artifacts: ArtifactSet {
                baseline: self.baseline_path,
                regression: self.regression_path.unwrap_or_default(),
                diff: self.diff_path.unwrap_or_default(),
            },
            within_tolerance: self.is_within_mis_match_tolerance,
            mismatch_percentage: self.mis_match_percentage,
            tags: self.properties.map(|p| p.tags).unwrap_or_default(),
        }
    }
}

/// Results of one delivery from the diff engine, keyed by screenshot key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultBatch {
    entries: BTreeMap<String, Vec<ComparisonResult>>,
}

impl ResultBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the diff engine's `{key: result | [result]}` JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, OneOrMany> = serde_json::from_str(json)?;
        let entries = raw
            .into_iter()
            .map(|(key, value)| {
                let results = match value {
                    OneOrMany::One(r) => vec![r.into_result(&key)],
                    OneOrMany::Many(rs) => rs.into_iter().map(|r| r.into_result(&key)).collect(),
                };
                (key, results)
            })
            .collect();
        Ok(Self { entries })
    }

    /// Add a result under its own key.
    pub fn push(&mut self, result: ComparisonResult) {
        self.entries
            .entry(result.key.clone())
            .or_default()
            .push(result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[ComparisonResult])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl FromIterator<ComparisonResult> for ResultBatch {
    fn from_iter<I: IntoIterator<Item = ComparisonResult>>(iter: I) -> Self {
        let mut batch = ResultBatch::new();
        for result in iter {
            batch.push(result);
        }
        batch
    }
}
