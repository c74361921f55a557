//! Result shaping after ranking: per-source balancing and prompt ordering.

use std::collections::HashMap;

use crate::api_types::SearchResult;

/// Candidate count for a query over `sources` documents: at least three per source.
pub fn effective_k(k: usize, sources: usize) -> usize {
    if sources > 1 { k.max(3 * sources) } else { k }
}

/// Guarantees each requested source a share of `results`.
///
/// Every source contributes its best `max(2, len / sources)` results in the
/// order of `sources`; everything left follows by descending combined score.
/// No-op for fewer than two sources.
pub fn balance_sources(results: Vec<SearchResult>, sources: &[String]) -> Vec<SearchResult> {
    if sources.len() <= 1 {
        return results;
    }
    let min_per_source = (results.len() / sources.len()).max(2);

    let mut by_source: HashMap<String, Vec<SearchResult>> = HashMap::new();
    for r in results {
        by_source
            .entry(r.metadata.source_id.clone())
            .or_default()
            .push(r);
    }

    let mut balanced = Vec::new();
    let mut rest = Vec::new();
    for s in sources {
        let Some(mut group) = by_source.remove(s) else {
            continue;
        };
        let tail = group.split_off(group.len().min(min_per_source));
        balanced.extend(group);
        rest.extend(tail);
    }
    // Results from sources that were not requested cannot occur with a
    // source filter, but keep them rather than drop silently.
    rest.extend(by_source.into_values().flatten());

    rest.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    balanced.extend(rest);
    balanced
}

/// Deterministic prompt order: `(source_id, title, chunk_index)`.
pub fn sort_contexts(results: &[SearchResult]) -> Vec<&SearchResult> {
    let mut out: Vec<&SearchResult> = results.iter().collect();
    out.sort_by(|a, b| {
        let (x, y) = (&a.metadata, &b.metadata);
        x.source_id
            .cmp(&y.source_id)
            .then_with(|| x.title.cmp(&y.title))
            .then_with(|| x.chunk_index.cmp(&y.chunk_index))
    });
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rag_store::DocumentChunk;

    pub(crate) fn result(source: &str, idx: usize, combined: f32) -> SearchResult {
        let chunk = DocumentChunk {
            id: format!("{source}#{idx}"),
            text: format!("{source} text {idx}"),
            source_id: source.into(),
            chunk_index: idx,
            total_chunks: 10,
            char_start: 0,
            char_end: 0,
            section_title: None,
            section_type: None,
            title: format!("{source} title"),
            file_type: "txt".into(),
        };
        SearchResult {
            chunk_id: chunk.id.clone(),
            text: chunk.text.clone(),
            metadata: chunk,
            similarity_score: combined,
            relevance_score: combined,
            combined_score: combined,
        }
    }

    #[test]
    fn k_grows_with_sources() {
        assert_eq!(effective_k(5, 1), 5);
        assert_eq!(effective_k(5, 3), 9);
        assert_eq!(effective_k(10, 2), 10);
    }

    #[test]
    fn weak_source_still_gets_its_share() {
        let results = vec![
            result("a", 0, 0.9),
            result("a", 1, 0.8),
            result("a", 2, 0.7),
            result("a", 3, 0.6),
            result("b", 0, 0.2),
            result("b", 1, 0.1),
        ];
        let sources = vec!["a".to_string(), "b".to_string()];
        let out = balance_sources(results, &sources);

        // min_per_source = max(2, 6 / 2) = 3
        let ids: Vec<&str> = out.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a#0", "a#1", "a#2", "b#0", "b#1", "a#3"]);
    }

    #[test]
    fn single_source_is_untouched() {
        let results = vec![result("a", 1, 0.1), result("a", 0, 0.9)];
        let out = balance_sources(results, &["a".to_string()]);
        assert_eq!(out[0].chunk_id, "a#1");
    }

    #[test]
    fn contexts_sort_by_source_then_index() {
        let results = vec![result("b", 0, 0.9), result("a", 2, 0.5), result("a", 1, 0.1)];
        let ids: Vec<&str> = sort_contexts(&results)
            .iter()
            .map(|r| r.chunk_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a#1", "a#2", "b#0"]);
    }
}
