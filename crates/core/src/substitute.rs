use std::collections::BTreeMap;

use crate::consolidate::ProcessingPlan;

/// Replace every planned surface text in `text` with its placeholder.
///
/// Longer surfaces claim their occurrences first. Occurrences that intersect
/// an already claimed span are skipped, and replacements are assembled from
/// the original text, so a placeholder is never matched again.
pub fn substitute(text: &str, plan: &ProcessingPlan) -> String {
    let mut candidates: Vec<(&str, &str)> = plan
        .iter()
        .filter(|(surface, _)| !surface.is_empty())
        .collect();
    candidates.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    // start -> (end, replacement)
    let mut claimed: BTreeMap<usize, (usize, &str)> = BTreeMap::new();
    for (surface, placeholder) in candidates {
        for (start, _) in text.match_indices(surface) {
            let end = start + surface.len();
            if overlaps_claimed(&claimed, start, end) {
                continue;
            }
            claimed.insert(start, (end, placeholder));
        }
    }

    splice(text, &claimed)
}

/// Rebuild `text` with every claimed span replaced by its value.
pub(crate) fn splice(text: &str, spans: &BTreeMap<usize, (usize, &str)>) -> String {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for (start, (end, value)) in spans {
        output.push_str(&text[cursor..*start]);
        output.push_str(value);
        cursor = *end;
    }
    output.push_str(&text[cursor..]);
    output
}

pub(crate) fn overlaps_claimed(
    claimed: &BTreeMap<usize, (usize, &str)>,
    start: usize,
    end: usize,
) -> bool {
    if let Some((_, (prev_end, _))) = claimed.range(..=start).next_back() {
        if *prev_end > start {
            return true;
        }
    }
    claimed.range(start..end).next().is_some()
}
