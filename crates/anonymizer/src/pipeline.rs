use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Instant;

use anonymizer_core::{normalize_kind, AnonymizationSession, AnonymizedText, Entity};
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::AnonymizerConfig;
use crate::oracle::{Completion, EntityOracle, OracleError};
use crate::output::{self, SavedResult};

/// Allow-list of entity types; an empty list lets everything through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
    allowed: HashSet<String>,
}

impl EntityFilter {
    pub fn new(types: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: types
                .into_iter()
                .filter(|kind| !kind.trim().is_empty())
                .map(|kind| normalize_kind(&kind))
                .collect(),
        }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn allows(&self, kind: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(kind)
    }

    pub fn apply(&self, entities: Vec<Entity>) -> Vec<Entity> {
        if self.allowed.is_empty() {
            return entities;
        }
        entities
            .into_iter()
            .filter(|entity| self.allows(&entity.kind))
            .collect()
    }
}

/// A document as handed over by ingestion: ordered text chunks (usually pages).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub name: String,
    pub chunks: Vec<String>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, chunks: Vec<String>) -> Self {
        Self {
            name: name.into(),
            chunks,
        }
    }
}

/// Anonymize one document, one chunk at a time in document order.
pub fn anonymize_document<C: Completion>(
    doc: &SourceDocument,
    oracle: &EntityOracle<C>,
    filter: &EntityFilter,
) -> Result<AnonymizedText> {
    ensure_has_chunks(doc)?;
    let started = Instant::now();
    let total = doc.chunks.len();
    let mut session = AnonymizationSession::new();
    let mut outputs = Vec::with_capacity(total);
    for (idx, chunk) in doc.chunks.iter().enumerate() {
        let chunk_started = Instant::now();
        let detected = detect(oracle, chunk);
        let anonymized = apply_chunk(&mut session, doc, idx, chunk, detected, filter)?;
        tracing::debug!(
            document = %doc.name,
            chunk = idx + 1,
            total,
            elapsed = ?chunk_started.elapsed(),
            "chunk done"
        );
        outputs.push(anonymized);
    }
    Ok(finish(session, doc, &outputs, started))
}

/// Like [`anonymize_document`], but entity detection for all chunks runs on
/// the rayon pool. Placeholder assignment and substitution still happen in
/// chunk order, so the output is identical to the sequential run.
pub fn anonymize_document_parallel<C: Completion + Sync>(
    doc: &SourceDocument,
    oracle: &EntityOracle<C>,
    filter: &EntityFilter,
) -> Result<AnonymizedText> {
    ensure_has_chunks(doc)?;
    let started = Instant::now();
    let detections: Vec<std::result::Result<Vec<Entity>, OracleError>> = doc
        .chunks
        .par_iter()
        .map(|chunk| detect(oracle, chunk))
        .collect();
    tracing::debug!(
        document = %doc.name,
        chunks = detections.len(),
        elapsed = ?started.elapsed(),
        "parallel detection finished"
    );
    let mut session = AnonymizationSession::new();
    let mut outputs = Vec::with_capacity(doc.chunks.len());
    for (idx, (chunk, detected)) in doc.chunks.iter().zip(detections).enumerate() {
        outputs.push(apply_chunk(&mut session, doc, idx, chunk, detected, filter)?);
    }
    Ok(finish(session, doc, &outputs, started))
}

fn ensure_has_chunks(doc: &SourceDocument) -> Result<()> {
    if doc.chunks.is_empty() {
        return Err(anyhow!("document {} has no text chunks", doc.name));
    }
    Ok(())
}

fn detect<C: Completion>(
    oracle: &EntityOracle<C>,
    chunk: &str,
) -> std::result::Result<Vec<Entity>, OracleError> {
    if chunk.trim().is_empty() {
        return Ok(Vec::new());
    }
    oracle.identify(chunk)
}

fn apply_chunk(
    session: &mut AnonymizationSession,
    doc: &SourceDocument,
    idx: usize,
    chunk: &str,
    detected: std::result::Result<Vec<Entity>, OracleError>,
    filter: &EntityFilter,
) -> Result<String> {
    let total = doc.chunks.len();
    let detected =
        detected.with_context(|| format!("{}: chunk {}/{}", doc.name, idx + 1, total))?;
    let found = detected.len();
    let entities = filter.apply(detected);
    let anonymized = session
        .anonymize_chunk(chunk, &entities)
        .with_context(|| {
            format!("{}: mapping conflict in chunk {}/{}", doc.name, idx + 1, total)
        })?;
    tracing::info!(
        document = %doc.name,
        chunk = idx + 1,
        total,
        found,
        kept = entities.len(),
        mapped = session.mapping().len(),
        "anonymized chunk"
    );
    Ok(anonymized)
}

fn finish(
    session: AnonymizationSession,
    doc: &SourceDocument,
    outputs: &[String],
    started: Instant,
) -> AnonymizedText {
    let result = session.finish(outputs);
    tracing::info!(
        document = %doc.name,
        chunks = outputs.len(),
        placeholders = result.mapping.len(),
        pruned = result.pruned,
        elapsed = ?started.elapsed(),
        "document anonymized"
    );
    result
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedDocument {
    pub name: String,
    pub anonymized_file: String,
    pub mapping_file: String,
    pub placeholders: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDocument {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub completed: Vec<CompletedDocument>,
    pub failed: Vec<FailedDocument>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Anonymize every document and save its results under `output_dir`.
///
/// A failing document is recorded and skipped; the rest of the batch still runs.
/// Documents whose names share a file stem get `-2`, `-3`, ... appended so no
/// result files are overwritten.
pub fn run_batch<C: Completion + Sync>(
    docs: &[SourceDocument],
    oracle: &EntityOracle<C>,
    config: &AnonymizerConfig,
    output_dir: &Path,
) -> Result<BatchReport> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let filter = config.entity_filter();
    let mut report = BatchReport::default();
    let mut stems = HashSet::new();
    for (position, doc) in docs.iter().enumerate() {
        let stem = output::unique_stem(&output::document_stem(&doc.name), &mut stems);
        tracing::info!(
            document = %doc.name,
            position = position + 1,
            total = docs.len(),
            policy = oracle.policy().as_str(),
            stem = %stem,
            "processing document"
        );
        let outcome = if config.parallel_detection {
            anonymize_document_parallel(doc, oracle, &filter)
        } else {
            anonymize_document(doc, oracle, &filter)
        }
        .and_then(|result| {
            let saved = output::save_results(
                &result.text,
                &result.mapping,
                &stem,
                output_dir,
            )?;
            Ok((result, saved))
        });
        match outcome {
            Ok((result, SavedResult { anonymized_file, mapping_file })) => {
                report.completed.push(CompletedDocument {
                    name: doc.name.clone(),
                    anonymized_file: anonymized_file.display().to_string(),
                    mapping_file: mapping_file.display().to_string(),
                    placeholders: result.mapping.len(),
                });
            }
            Err(err) => {
                let error = format!("{err:#}");
                tracing::error!(document = %doc.name, error = %error, "document failed");
                report.failed.push(FailedDocument {
                    name: doc.name.clone(),
                    error,
                });
            }
        }
    }
    tracing::info!(
        completed = report.completed.len(),
        failed = report.failed.len(),
        "batch finished"
    );
    Ok(report)
}
