use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{MappingError, Result};
use crate::placeholder::locate;
use crate::substitute::splice;

/// Anonymization-direction mapping: original surface text -> placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping {
    entries: IndexMap<String, String>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.entries.get(original).map(String::as_str)
    }

    pub fn contains(&self, original: &str) -> bool {
        self.entries.contains_key(original)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Insert new entries. Re-inserting an identical pair is a no-op; a key
    /// that already maps to a different placeholder rejects the whole batch.
    pub fn merge<I, K, V>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut staged: IndexMap<String, String> = IndexMap::new();
        for (key, value) in entries {
            let key = key.into();
            let value = value.into();
            let existing = self.entries.get(&key).or_else(|| staged.get(&key));
            match existing {
                Some(current) if *current == value => {}
                Some(current) => {
                    return Err(MappingError::Conflict {
                        key,
                        existing: current.clone(),
                        proposed: value,
                    })
                }
                None => {
                    staged.insert(key, value);
                }
            }
        }
        self.entries.extend(staged);
        Ok(())
    }

    /// Flip to placeholder -> original, the direction persisted on disk.
    /// Entries whose key equals their value carry no information and are dropped.
    pub fn to_placeholder_map(&self) -> PlaceholderMap {
        let entries = self
            .entries
            .iter()
            .filter(|(original, placeholder)| original != placeholder)
            .map(|(original, placeholder)| (placeholder.clone(), original.clone()))
            .collect();
        PlaceholderMap { entries }
    }
}

/// Reversal-direction mapping: placeholder -> original text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceholderMap {
    entries: IndexMap<String, String>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, placeholder: impl Into<String>, original: impl Into<String>) {
        self.entries.insert(placeholder.into(), original.into());
    }

    pub fn get(&self, placeholder: &str) -> Option<&str> {
        self.entries.get(placeholder).map(String::as_str)
    }

    pub fn contains(&self, placeholder: &str) -> bool {
        self.entries.contains_key(placeholder)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Collapse placeholders that resolve to the same original text.
    ///
    /// The first placeholder (insertion order) for a value is kept; tokens of
    /// the others are rewritten to it in `text` and their keys are dropped.
    /// A token never matches inside a longer one, so `PERSON_2` never touches
    /// `PERSON_2.v_1`.
    pub fn consolidate_duplicates(&self, text: &str) -> (String, PlaceholderMap) {
        let mut canonical_for_value: IndexMap<&str, &str> = IndexMap::new();
        let mut redirects: IndexMap<&str, &str> = IndexMap::new();
        for (placeholder, original) in &self.entries {
            match canonical_for_value.get(original.as_str()) {
                Some(canonical) => {
                    redirects.insert(placeholder.as_str(), *canonical);
                }
                None => {
                    canonical_for_value.insert(original.as_str(), placeholder.as_str());
                }
            }
        }
        if redirects.is_empty() {
            return (text.to_string(), self.clone());
        }
        tracing::debug!(
            duplicates = redirects.len(),
            "collapsing duplicate mapping values"
        );
        let spans: BTreeMap<usize, (usize, &str)> = locate(text, self.placeholders())
            .into_iter()
            .map(|(start, (end, token))| {
                (start, (end, redirects.get(token).copied().unwrap_or(token)))
            })
            .collect();
        let rewritten = splice(text, &spans);
        let entries = self
            .entries
            .iter()
            .filter(|(placeholder, _)| !redirects.contains_key(placeholder.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        (rewritten, PlaceholderMap { entries })
    }

    /// Drop entries whose placeholder no longer occurs in `text`.
    pub fn retain_used(&mut self, text: &str) -> usize {
        let present: HashSet<String> = locate(text, self.placeholders())
            .into_values()
            .map(|(_, placeholder)| placeholder.to_string())
            .collect();
        let before = self.entries.len();
        self.entries
            .retain(|placeholder, _| present.contains(placeholder.as_str()));
        before - self.entries.len()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

impl FromIterator<(String, String)> for PlaceholderMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
