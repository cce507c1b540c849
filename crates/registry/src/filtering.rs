//! Client-side filtering applied uniformly over every registry's raw result.

use keel_core::{LabelFilters, Manifest};

/// Keep manifests whose labels satisfy every filter. No filters keeps everything.
pub fn apply_label_filter(items: Vec<Manifest>, filters: &LabelFilters) -> Vec<Manifest> {
    if filters.is_empty() { return items; }
    items
        .into_iter()
        .filter(|m| filters.iter().all(|(k, matcher)| matcher.matches(m.object().label(k))))
        .collect()
}
