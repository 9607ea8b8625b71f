use serde::{Deserialize, Deserializer, Serialize};

const FALLBACK_KIND: &str = "ENTITY";

/// A single detection returned by the oracle.
///
/// `kind` is always stored in placeholder-safe form (upper-case `A-Z` and `_`),
/// so any placeholder built from it parses back through the token grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub base_form: String,
}

impl Entity {
    pub fn new(text: impl Into<String>, kind: &str, base_form: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: normalize_kind(kind),
            base_form: base_form.into(),
        }
    }

    /// Entity whose base form is its own surface text.
    pub fn canonical(text: impl Into<String>, kind: &str) -> Self {
        let text = text.into();
        let base_form = text.clone();
        Self::new(text, kind, base_form)
    }

    pub fn is_base_form(&self) -> bool {
        self.text == self.base_form
    }
}

#[derive(Deserialize)]
struct RawEntity {
    #[serde(default)]
    text: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    base_form: Option<String>,
}

impl<'de> Deserialize<'de> for Entity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawEntity::deserialize(deserializer)?;
        let base_form = match raw.base_form {
            Some(base) if !base.trim().is_empty() => base,
            _ => raw.text.clone(),
        };
        Ok(Entity::new(raw.text, &raw.kind, base_form))
    }
}

pub fn normalize_kind(raw: &str) -> String {
    let normalized: String = raw
        .trim()
        .chars()
        .map(|ch| {
            let upper = ch.to_ascii_uppercase();
            if upper.is_ascii_uppercase() {
                upper
            } else {
                '_'
            }
        })
        .collect();
    if normalized.chars().all(|ch| ch == '_') {
        FALLBACK_KIND.to_string()
    } else {
        normalized
    }
}
