//! Deterministic identifiers for stored chunks.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Deterministic UUIDv5 from an arbitrary string id.
pub fn stable_uuid(id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, id.as_bytes())
}

/// Id of one chunk of a document version.
///
/// Stable for the same `(source_id, chunk_index, text)` triple, so re-ingesting
/// an unchanged document yields the same ids, while an edited chunk gets a new one.
pub fn chunk_uuid(source_id: &str, chunk_index: usize, text: &str) -> Uuid {
    let mut h = Sha256::new();
    h.update(text.as_bytes());
    let digest = format!("{:x}", h.finalize());
    stable_uuid(&format!("{source_id}#{chunk_index}#{}", &digest[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_are_stable_and_content_sensitive() {
        let a = chunk_uuid("report.md", 0, "Intro paragraph.");
        let b = chunk_uuid("report.md", 0, "Intro paragraph.");
        let c = chunk_uuid("report.md", 0, "Intro paragraph, edited.");
        let d = chunk_uuid("report.md", 1, "Intro paragraph.");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
