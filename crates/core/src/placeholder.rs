use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::MappingError;
use crate::substitute::overlaps_claimed;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z_]+)_([0-9]+)(?:\.v_([0-9]+))?$").expect("placeholder grammar")
});

/// Unanchored form of the placeholder grammar. Only used to report unknown
/// tokens; known placeholders are found with [`locate`].
pub(crate) static PLACEHOLDER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z_]+_[0-9]+(?:\.v_[0-9]+)?\b").expect("placeholder token"));

/// Occurrences of `placeholders` in `text` as `start -> (end, placeholder)`.
///
/// Substitution is literal, so a placeholder may sit directly against letters
/// or CJK text. Longer placeholders claim first, spans never overlap, and an
/// occurrence that runs on into a longer token (`PERSON_1` inside `PERSON_12`
/// or `PERSON_1.v_2`) is not a match.
pub(crate) fn locate<'a, I>(text: &str, placeholders: I) -> BTreeMap<usize, (usize, &'a str)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut candidates: Vec<&'a str> = placeholders
        .into_iter()
        .filter(|placeholder| !placeholder.is_empty())
        .collect();
    candidates.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut claimed: BTreeMap<usize, (usize, &'a str)> = BTreeMap::new();
    for placeholder in candidates {
        for (start, _) in text.match_indices(placeholder) {
            let end = start + placeholder.len();
            if continues_token(&text[end..]) || overlaps_claimed(&claimed, start, end) {
                continue;
            }
            claimed.insert(start, (end, placeholder));
        }
    }
    claimed
}

fn continues_token(rest: &str) -> bool {
    let starts_with_digit = |value: &str| value.starts_with(|ch: char| ch.is_ascii_digit());
    starts_with_digit(rest) || rest.strip_prefix(".v_").map_or(false, starts_with_digit)
}

/// A typed placeholder token: `KIND_N` or `KIND_N.v_K`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Placeholder {
    pub kind: String,
    pub index: u32,
    pub variant: Option<u32>,
}

impl Placeholder {
    pub fn canonical(kind: impl Into<String>, index: u32) -> Self {
        Self {
            kind: kind.into(),
            index,
            variant: None,
        }
    }

    pub fn with_variant(&self, variant: u32) -> Self {
        Self {
            kind: self.kind.clone(),
            index: self.index,
            variant: Some(variant),
        }
    }

    /// The bare `KIND_N` this placeholder belongs to.
    pub fn base(&self) -> Self {
        Self::canonical(self.kind.clone(), self.index)
    }

    pub fn is_variant(&self) -> bool {
        self.variant.is_some()
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant {
            Some(variant) => write!(f, "{}_{}.v_{}", self.kind, self.index, variant),
            None => write!(f, "{}_{}", self.kind, self.index),
        }
    }
}

impl FromStr for Placeholder {
    type Err = MappingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || MappingError::InvalidPlaceholder(value.to_string());
        let caps = PLACEHOLDER.captures(value).ok_or_else(invalid)?;
        let index = caps[2].parse().map_err(|_| invalid())?;
        let variant = match caps.get(3) {
            Some(m) => Some(m.as_str().parse().map_err(|_| invalid())?),
            None => None,
        };
        Ok(Self {
            kind: caps[1].to_string(),
            index,
            variant,
        })
    }
}

pub fn is_placeholder(value: &str) -> bool {
    PLACEHOLDER.is_match(value)
}

/// Per-type counters for canonical placeholders within one document run.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderAllocator {
    counters: HashMap<String, u32>,
}

impl PlaceholderAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, kind: &str) -> Placeholder {
        let counter = self.counters.entry(kind.to_string()).or_insert(0);
        *counter += 1;
        Placeholder::canonical(kind, *counter)
    }

    /// Raise the counter for `placeholder.kind` so the next allocation is past it.
    pub fn observe(&mut self, placeholder: &Placeholder) {
        let counter = self.counters.entry(placeholder.kind.clone()).or_insert(0);
        *counter = (*counter).max(placeholder.index);
    }

    pub fn allocated(&self, kind: &str) -> u32 {
        self.counters.get(kind).copied().unwrap_or(0)
    }
}
