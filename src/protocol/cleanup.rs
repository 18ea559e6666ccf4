//! Response text cleanup
//!
//! Compatibility shim for a backend artifact where non-streaming responses
//! arrive with the same sentence repeated as comma-separated segments. Drop
//! it once the backend stops duplicating; until then the output must stay
//! byte-for-byte stable.

use std::collections::HashSet;

const SEGMENT_JOINER: &str = "\n\n";

/// Split on commas, trim, keep the first occurrence of each segment and join
/// the survivors with paragraph breaks. Text without a comma is returned as-is.
pub fn clean_response_text(text: &str) -> String {
    if !text.contains(',') {
        return text.to_string();
    }

    let mut seen = HashSet::new();
    text.split(',')
        .map(str::trim)
        .filter(|segment| seen.insert(*segment))
        .collect::<Vec<_>>()
        .join(SEGMENT_JOINER)
}
