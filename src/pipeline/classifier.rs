//! Key-suffix classifier.
//!
//! Decides which stage applies to an object from its key alone. Patterns are
//! checked in priority order and matched case-insensitively against the end
//! of the key. There is no leading dot: `export_csv` is tabular text too.

use crate::pipeline::types::Classification;

/// Suffix patterns in priority order.
const SUFFIX_RULES: &[(&str, Classification)] = &[
    ("csv", Classification::TabularText),
    ("cns", Classification::TabularText),
    ("zip", Classification::Archive),
    ("xls", Classification::Spreadsheet),
    ("xlsx", Classification::Spreadsheet),
];

/// Classify an object key. Total: unmatched keys are `Unrecognized`.
pub fn classify(key: &str) -> Classification {
    SUFFIX_RULES
        .iter()
        .find(|(suffix, _)| ends_with_ignore_case(key, suffix))
        .map_or(Classification::Unrecognized, |(_, class)| *class)
}

fn ends_with_ignore_case(key: &str, suffix: &str) -> bool {
    let (key, suffix) = (key.as_bytes(), suffix.as_bytes());
    key.len() >= suffix.len() && key[key.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
