//! Filter conversion to Qdrant `Filter`.
//!
//! Source constraints map to keyword matches on the `source_id` payload field.
//! Title substrings have no Qdrant equivalent without a full-text index, so the
//! caller resolves them to source ids first and passes them in `allowed`.

use qdrant_client::qdrant::{Condition, Filter};
use tracing::debug;

use crate::record::SearchFilter;

/// Payload key holding the owning document id.
pub const SOURCE_FIELD: &str = "source_id";

/// Builds the Qdrant filter for `f`.
///
/// `allowed` is the already-intersected set of acceptable sources
/// (`None` = unrestricted). Returns `None` when nothing needs filtering.
pub fn to_qdrant_filter(f: &SearchFilter, allowed: Option<Vec<String>>) -> Option<Filter> {
    debug!(
        "filters::to_qdrant_filter allowed={:?} excluded={}",
        allowed.as_ref().map(Vec::len),
        f.exclude_source_ids.len()
    );

    let mut must = Vec::new();
    let mut must_not = Vec::new();

    if let Some(ids) = allowed {
        must.push(Condition::matches(SOURCE_FIELD, ids));
    }
    if !f.exclude_source_ids.is_empty() {
        must_not.push(Condition::matches(
            SOURCE_FIELD,
            f.exclude_source_ids.clone(),
        ));
    }

    if must.is_empty() && must_not.is_empty() {
        return None;
    }
    Some(Filter {
        must,
        must_not,
        ..Default::default()
    })
}

/// Filter selecting every point of one source.
pub fn source_filter(source_id: &str) -> Filter {
    Filter::must([Condition::matches(SOURCE_FIELD, source_id.to_string())])
}
