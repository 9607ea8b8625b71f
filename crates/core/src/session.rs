use crate::consolidate::{ProcessingPlan, VariationConsolidator};
use crate::entity::Entity;
use crate::error::Result;
use crate::mapping::{Mapping, PlaceholderMap};
use crate::placeholder::{Placeholder, PlaceholderAllocator};
use crate::substitute::substitute;

pub const PAGE_BREAK: &str = "\n\n--- Page Break ---\n\n";

/// Final output of a document run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymizedText {
    pub text: String,
    pub mapping: PlaceholderMap,
    /// Entries dropped because their placeholder never survived into the text.
    pub pruned: usize,
}

/// State of one document run: the mapping so far, the placeholder counters
/// and the variant registry. Chunks must be fed in document order.
#[derive(Debug, Clone, Default)]
pub struct AnonymizationSession {
    mapping: Mapping,
    allocator: PlaceholderAllocator,
    consolidator: VariationConsolidator,
}

impl AnonymizationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after an existing mapping.
    pub fn resume(mapping: Mapping) -> Self {
        let mut allocator = PlaceholderAllocator::new();
        let mut consolidator = VariationConsolidator::new();
        for (_, value) in mapping.iter() {
            if let Ok(placeholder) = value.parse::<Placeholder>() {
                allocator.observe(&placeholder);
                consolidator.observe(&placeholder);
            }
        }
        Self {
            mapping,
            allocator,
            consolidator,
        }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Assign placeholders for `entities` and record them, without touching text.
    pub fn plan(&mut self, entities: &[Entity]) -> Result<ProcessingPlan> {
        let plan = self
            .consolidator
            .consolidate(entities, &self.mapping, &mut self.allocator);
        self.mapping.merge(plan.iter())?;
        Ok(plan)
    }

    pub fn anonymize_chunk(&mut self, text: &str, entities: &[Entity]) -> Result<String> {
        let plan = self.plan(entities)?;
        Ok(substitute(text, &plan))
    }

    /// Join anonymized chunks and produce the consolidated, reversible mapping.
    pub fn finish<S: AsRef<str>>(self, chunks: &[S]) -> AnonymizedText {
        let joined = chunks
            .iter()
            .map(|chunk| chunk.as_ref())
            .collect::<Vec<&str>>()
            .join(PAGE_BREAK);
        let (text, mut mapping) = self.mapping.to_placeholder_map().consolidate_duplicates(&joined);
        let pruned = mapping.retain_used(&text);
        if pruned > 0 {
            tracing::debug!(pruned, "dropped mapping entries with no surviving occurrence");
        }
        AnonymizedText {
            text,
            mapping,
            pruned,
        }
    }
}
