use serde::Deserialize;

pub const TEXT_SLOT: &str = "{text}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Simple,
    #[default]
    Detailed,
}

impl PromptKind {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "simple" => Some(PromptKind::Simple),
            "detailed" => Some(PromptKind::Detailed),
            _ => None,
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            PromptKind::Simple => SIMPLE,
            PromptKind::Detailed => DETAILED,
        }
    }
}

/// Fill the `{text}` slot of a template. Other braces are left alone.
pub fn render(template: &str, text: &str) -> String {
    template.replace(TEXT_SLOT, text)
}

const SIMPLE: &str = r#"Identify all personally identifiable information (PII) in the text below:
names, addresses, locations, organizations, phone numbers, email addresses and identifiers.

Return a single JSON object with one key, "entities": a list of objects with
"text" (the exact substring), "type" (an upper-case category such as PERSON) and
"base_form" (the canonical form shared by all variants of the same entity).

Text to process:
---
{text}
---

Respond with ONLY the JSON object."#;

const DETAILED: &str = r#"You are an expert in identifying Personally Identifiable Information (PII).
Read the text below and identify all PII entities.

Return a single JSON object with one key: "entities". Each entity is an object with:
- "text": the PII exactly as it appears in the text
- "type": one of the entity types below
- "base_form": the canonical form of the entity; every variant of the same
  real-world entity ("Mr. John Doe", "John's") must share one base form ("John Doe")

ENTITY TYPES:
* PERSON: full names, first names, last names, middle names.
* ADDRESS: street names, house numbers, postal codes, full addresses.
* DATE: only birthdates.
* PHONE: numerical sequences resembling phone numbers.
* EMAIL: email addresses.
* ORGANIZATION: organizations, businesses, companies.
* JOB_TITLE: specific roles or positions within organizations.
* ID: account numbers or other identifiers.
* LOCATION: cities, regions or landmarks that are not full addresses.

Example:
Text: "John Doe from Acme Inc. visited our office in Springfield. Mr. Doe liked it."
Response:
{"entities": [
  {"text": "John Doe", "type": "PERSON", "base_form": "John Doe"},
  {"text": "Acme Inc.", "type": "ORGANIZATION", "base_form": "Acme Inc."},
  {"text": "Springfield", "type": "LOCATION", "base_form": "Springfield"},
  {"text": "Mr. Doe", "type": "PERSON", "base_form": "John Doe"}
]}

Text to process:
---
{text}
---

Respond with ONLY the JSON object."#;
