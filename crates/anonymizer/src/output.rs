use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anonymizer_core::{reverse, DeanonymizationStats, PlaceholderMap};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const ANONYMIZED_DIR: &str = "anonymized";
pub const MAPPINGS_DIR: &str = "mappings";

const ANONYMIZED_SUFFIX: &str = ".anonymized";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedResult {
    pub anonymized_file: PathBuf,
    pub mapping_file: PathBuf,
}

/// Contents of `<stem>.stats.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeanonymizationReport {
    pub anonymized_file: String,
    pub mapping_file: String,
    pub deanonymized_file: String,
    #[serde(flatten)]
    pub stats: DeanonymizationStats,
}

/// File stem used for every artifact of a document: the name's file stem, or
/// the whole name when it has none.
pub fn document_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(name)
        .to_string()
}

/// Claim `stem` in `used`, or the first free `stem-N` (N from 2) when it is
/// already taken.
pub fn unique_stem(stem: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = stem.to_string();
    let mut suffix = 2;
    while used.contains(&candidate) {
        candidate = format!("{stem}-{suffix}");
        suffix += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// Write `root/anonymized/<stem>.anonymized.md` and
/// `root/mappings/<stem>.mapping.json`.
pub fn save_results(
    text: &str,
    mapping: &PlaceholderMap,
    stem: &str,
    root: &Path,
) -> Result<SavedResult> {
    let anonymized_dir = root.join(ANONYMIZED_DIR);
    fs::create_dir_all(&anonymized_dir)
        .with_context(|| format!("failed to create {}", anonymized_dir.display()))?;
    let anonymized_file = anonymized_dir.join(format!("{stem}{ANONYMIZED_SUFFIX}.md"));
    fs::write(&anonymized_file, text)
        .with_context(|| format!("failed to write {}", anonymized_file.display()))?;

    let mapping_file = root.join(MAPPINGS_DIR).join(format!("{stem}.mapping.json"));
    mapping
        .save(&mapping_file)
        .with_context(|| format!("failed to write {}", mapping_file.display()))?;
    tracing::info!(
        anonymized = %anonymized_file.display(),
        mapping = %mapping_file.display(),
        entries = mapping.len(),
        "saved anonymization results"
    );
    Ok(SavedResult {
        anonymized_file,
        mapping_file,
    })
}

/// Restore an anonymized file with its mapping.
///
/// Writes `<stem>.deanonymized.md` and `<stem>.stats.json` next to the
/// anonymized file. Unresolved placeholders only show up in the report.
pub fn deanonymize_file(
    anonymized_file: &Path,
    mapping_file: &Path,
) -> Result<DeanonymizationReport> {
    let text = fs::read_to_string(anonymized_file)
        .with_context(|| format!("failed to read {}", anonymized_file.display()))?;
    let mapping = PlaceholderMap::load(mapping_file)
        .with_context(|| format!("failed to load mapping {}", mapping_file.display()))?;
    let (restored, stats) = reverse(&text, &mapping);

    let dir = anonymized_file.parent().unwrap_or_else(|| Path::new("."));
    let stem = anonymized_stem(anonymized_file);
    let deanonymized_file = dir.join(format!("{stem}.deanonymized.md"));
    fs::write(&deanonymized_file, restored)
        .with_context(|| format!("failed to write {}", deanonymized_file.display()))?;

    let report = DeanonymizationReport {
        anonymized_file: anonymized_file.display().to_string(),
        mapping_file: mapping_file.display().to_string(),
        deanonymized_file: deanonymized_file.display().to_string(),
        stats,
    };
    let stats_file = dir.join(format!("{stem}.stats.json"));
    fs::write(&stats_file, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("failed to write {}", stats_file.display()))?;
    tracing::info!(
        deanonymized = %deanonymized_file.display(),
        unused = report.stats.unused_mappings.len(),
        not_found = report.stats.not_found_mappings.len(),
        "deanonymized file"
    );
    Ok(report)
}

fn anonymized_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document");
    stem.strip_suffix(ANONYMIZED_SUFFIX).unwrap_or(stem).to_string()
}
