use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;

use crate::entity::Entity;
use crate::mapping::Mapping;
use crate::placeholder::{is_placeholder, Placeholder, PlaceholderAllocator};

/// Ordered `(surface text, placeholder)` pairs for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingPlan {
    steps: Vec<(String, String)>,
}

impl ProcessingPlan {
    pub fn push(&mut self, surface: impl Into<String>, placeholder: impl Into<String>) {
        self.steps.push((surface.into(), placeholder.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.steps.iter().map(|(s, p)| (s.as_str(), p.as_str()))
    }

    pub fn placeholder_for(&self, surface: &str) -> Option<&str> {
        self.iter().find(|(s, _)| *s == surface).map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl FromIterator<(String, String)> for ProcessingPlan {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct BaseEntry {
    kind: String,
    placeholder: Placeholder,
    /// False when the base form borrowed another entity's canonical, in
    /// which case its own surface is a variant too.
    owned: bool,
    words: BTreeSet<String>,
}

/// Groups surface variants of one entity under a shared canonical placeholder.
///
/// Holds the base-form registry and per-canonical variant counters for a
/// single document run; placeholder numbering itself comes from the
/// [`PlaceholderAllocator`] passed to [`consolidate`](Self::consolidate).
#[derive(Debug, Clone, Default)]
pub struct VariationConsolidator {
    bases: IndexMap<String, BaseEntry>,
    variant_counters: HashMap<Placeholder, u32>,
}

impl VariationConsolidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an existing variant so later variants of the same canonical
    /// continue after it.
    pub fn observe(&mut self, placeholder: &Placeholder) {
        if let Some(variant) = placeholder.variant {
            let counter = self.variant_counters.entry(placeholder.base()).or_insert(0);
            *counter = (*counter).max(variant);
        }
    }

    pub fn consolidate(
        &mut self,
        entities: &[Entity],
        mapping: &Mapping,
        allocator: &mut PlaceholderAllocator,
    ) -> ProcessingPlan {
        let mut groups: IndexMap<&str, Vec<&Entity>> = IndexMap::new();
        for entity in entities {
            if entity.text.trim().is_empty() || is_placeholder(&entity.text) {
                continue;
            }
            let base = if entity.base_form.is_empty() {
                entity.text.as_str()
            } else {
                entity.base_form.as_str()
            };
            groups.entry(base).or_default().push(entity);
        }

        let mut plan = ProcessingPlan::default();
        let mut planned: HashSet<&str> = HashSet::new();
        for (base, members) in groups {
            let kind = members[0].kind.clone();
            let mut canonical: Option<(Placeholder, bool)> = None;
            for entity in members {
                if !planned.insert(entity.text.as_str()) {
                    continue;
                }
                if let Some(existing) = mapping.get(&entity.text) {
                    plan.push(entity.text.as_str(), existing);
                    continue;
                }
                let (base_placeholder, owned) = match canonical.clone() {
                    Some(resolved) => resolved,
                    None => {
                        let resolved = self.resolve_base(base, &kind, mapping, allocator);
                        canonical = Some(resolved.clone());
                        resolved
                    }
                };
                let placeholder = if entity.text == base && owned {
                    base_placeholder
                } else {
                    self.next_variant(&base_placeholder)
                };
                tracing::trace!(surface = %entity.text, %placeholder, "planned substitution");
                plan.push(entity.text.as_str(), placeholder.to_string());
            }
        }
        plan
    }

    fn resolve_base(
        &mut self,
        base: &str,
        kind: &str,
        mapping: &Mapping,
        allocator: &mut PlaceholderAllocator,
    ) -> (Placeholder, bool) {
        if let Some(entry) = self.bases.get(base) {
            return (entry.placeholder.clone(), entry.owned);
        }
        let known = mapping
            .get(base)
            .and_then(|existing| existing.parse::<Placeholder>().ok())
            .map(|existing| (existing.base(), !existing.is_variant()));
        let (placeholder, owned) = match known {
            Some(resolved) => resolved,
            None => match self.alias_for(base, kind) {
                Some(placeholder) => (placeholder, false),
                None => (allocator.allocate(kind), true),
            },
        };
        self.bases.insert(
            base.to_string(),
            BaseEntry {
                kind: kind.to_string(),
                placeholder: placeholder.clone(),
                owned,
                words: words_of(base),
            },
        );
        (placeholder, owned)
    }

    /// A base form whose words all appear in exactly one known base form of
    /// the same kind belongs to that entity ("John" within "John Doe").
    fn alias_for(&self, base: &str, kind: &str) -> Option<Placeholder> {
        let words = words_of(base);
        if words.is_empty() {
            return None;
        }
        let matches: BTreeSet<&Placeholder> = self
            .bases
            .values()
            .filter(|entry| entry.kind == kind && words.is_subset(&entry.words))
            .map(|entry| &entry.placeholder)
            .collect();
        if matches.len() == 1 {
            matches.into_iter().next().cloned()
        } else {
            None
        }
    }

    fn next_variant(&mut self, canonical: &Placeholder) -> Placeholder {
        let counter = self.variant_counters.entry(canonical.clone()).or_insert(0);
        *counter += 1;
        canonical.with_variant(*counter)
    }
}

fn words_of(value: &str) -> BTreeSet<String> {
    value.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(text: &str, base: &str) -> Entity {
        Entity::new(text, "person", base)
    }

    fn run(entities: &[Entity]) -> (ProcessingPlan, Mapping) {
        let mut consolidator = VariationConsolidator::new();
        let mut allocator = PlaceholderAllocator::new();
        let mut mapping = Mapping::new();
        let plan = consolidator.consolidate(entities, &mapping, &mut allocator);
        mapping.merge(plan.iter()).unwrap();
        (plan, mapping)
    }

    #[test]
    fn base_form_surface_is_canonical_even_when_seen_later() {
        let (plan, _) = run(&[
            person("Mr. John Doe", "John Doe"),
            person("John Doe", "John Doe"),
            person("John's", "John"),
        ]);
        assert_eq!(plan.placeholder_for("John Doe"), Some("PERSON_1"));
        assert_eq!(plan.placeholder_for("Mr. John Doe"), Some("PERSON_1.v_1"));
        assert_eq!(plan.placeholder_for("John's"), Some("PERSON_1.v_2"));
    }

    #[test]
    fn distinct_entities_get_distinct_counters() {
        let (plan, _) = run(&[
            Entity::canonical("John Doe", "PERSON"),
            Entity::canonical("Jane Smith", "PERSON"),
            Entity::canonical("jane@example.com", "email"),
        ]);
        assert_eq!(plan.placeholder_for("John Doe"), Some("PERSON_1"));
        assert_eq!(plan.placeholder_for("Jane Smith"), Some("PERSON_2"));
        assert_eq!(plan.placeholder_for("jane@example.com"), Some("EMAIL_1"));
    }

    #[test]
    fn ambiguous_alias_allocates_a_new_canonical() {
        let (plan, _) = run(&[
            Entity::canonical("John Doe", "PERSON"),
            Entity::canonical("John Smith", "PERSON"),
            person("John", "John"),
        ]);
        assert_eq!(plan.placeholder_for("John"), Some("PERSON_3"));
    }

    #[test]
    fn aliased_base_surface_becomes_a_variant() {
        let (plan, mapping) = run(&[
            Entity::canonical("John Doe", "PERSON"),
            person("John", "John"),
            person("John's", "John"),
        ]);
        assert_eq!(plan.placeholder_for("John Doe"), Some("PERSON_1"));
        assert_eq!(plan.placeholder_for("John"), Some("PERSON_1.v_1"));
        assert_eq!(plan.placeholder_for("John's"), Some("PERSON_1.v_2"));
        assert_eq!(mapping.to_placeholder_map().len(), 3);
    }

    #[test]
    fn alias_requires_matching_kind() {
        let (plan, _) = run(&[
            Entity::canonical("Springfield Bank", "ORGANIZATION"),
            Entity::canonical("Springfield", "LOCATION"),
        ]);
        assert_eq!(plan.placeholder_for("Springfield"), Some("LOCATION_1"));
    }

    #[test]
    fn known_surfaces_are_reused_across_chunks() {
        let mut consolidator = VariationConsolidator::new();
        let mut allocator = PlaceholderAllocator::new();
        let mut mapping = Mapping::new();

        let first = consolidator.consolidate(
            &[person("Mr. John Doe", "John Doe")],
            &mapping,
            &mut allocator,
        );
        mapping.merge(first.iter()).unwrap();
        let second = consolidator.consolidate(
            &[
                person("John Doe", "John Doe"),
                person("Mr. John Doe", "John Doe"),
                person("Dr. John Doe", "John Doe"),
            ],
            &mapping,
            &mut allocator,
        );
        mapping.merge(second.iter()).unwrap();

        assert_eq!(mapping.get("Mr. John Doe"), Some("PERSON_1.v_1"));
        assert_eq!(mapping.get("John Doe"), Some("PERSON_1"));
        assert_eq!(mapping.get("Dr. John Doe"), Some("PERSON_1.v_2"));
        assert_eq!(allocator.allocated("PERSON"), 1);
    }

    #[test]
    fn placeholder_shaped_and_duplicate_surfaces_are_skipped() {
        let (plan, _) = run(&[
            Entity::canonical("PERSON_1", "PERSON"),
            Entity::canonical("Jane", "PERSON"),
            Entity::canonical("Jane", "PERSON"),
            Entity::canonical("  ", "PERSON"),
        ]);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.placeholder_for("Jane"), Some("PERSON_1"));
    }

    #[test]
    fn observed_variants_continue_numbering() {
        let mut consolidator = VariationConsolidator::new();
        let mut allocator = PlaceholderAllocator::new();
        let mut mapping = Mapping::new();
        mapping
            .merge([("John Doe", "PERSON_1"), ("J. Doe", "PERSON_1.v_4")])
            .unwrap();
        consolidator.observe(&"PERSON_1.v_4".parse().unwrap());
        allocator.observe(&"PERSON_1".parse().unwrap());
        let plan = consolidator.consolidate(
            &[person("Johnny Doe", "John Doe")],
            &mapping,
            &mut allocator,
        );
        assert_eq!(plan.placeholder_for("Johnny Doe"), Some("PERSON_1.v_5"));
    }
}
