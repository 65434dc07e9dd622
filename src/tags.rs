use crate::model::GrooveRecord;
use std::collections::HashSet;

/// Distinct tags across `records`, in first-seen order.
pub fn compute_tags(records: &[GrooveRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .flat_map(|record| record.tags.iter())
        .filter(|tag| seen.insert(tag.as_str()))
        .cloned()
        .collect()
}
