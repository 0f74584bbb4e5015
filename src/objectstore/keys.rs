//! Object-storage key layouts (§6):
//! `images/{ontology_safe}/{source_id}.{ext}`,
//! `sources/{ontology_safe}/{hash_prefix}.{ext}`,
//! `projections/{ontology_safe}/{embedding_source}/{latest.json|{timestamp}.json}`.

use sha2::{Digest, Sha256};

/// Spaces and slashes in an ontology name are replaced with `_` before it
/// is used in a key (§6).
pub fn sanitize_ontology(ontology: &str) -> String {
    ontology.chars().map(|c| if c == ' ' || c == '/' { '_' } else { c }).collect()
}

pub fn image_key(ontology: &str, source_id: &str, ext: &str) -> String {
    format!("images/{}/{}.{}", sanitize_ontology(ontology), source_id, ext)
}

/// Content-addressed key; `hash_prefix` is the hex SHA-256 of the raw bytes
/// (§4.3). Re-ingestion of identical content resolves to the same key.
pub fn source_key(ontology: &str, bytes: &[u8], ext: &str) -> String {
    let hash = Sha256::digest(bytes);
    let hash_prefix = hex::encode(hash);
    format!("sources/{}/{}.{}", sanitize_ontology(ontology), hash_prefix, ext)
}

pub fn projection_latest_key(ontology: &str, embedding_source: &str) -> String {
    format!("projections/{}/{}/latest.json", sanitize_ontology(ontology), embedding_source)
}

pub fn projection_history_key(ontology: &str, embedding_source: &str, timestamp: &str) -> String {
    format!("projections/{}/{}/{}.json", sanitize_ontology(ontology), embedding_source, timestamp)
}

/// Minimal hex encoder so the crate doesn't need a dedicated `hex`
/// dependency for this one content-addressing call site.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_ontology_replaces_spaces_and_slashes() {
        assert_eq!(sanitize_ontology("acme corp/docs"), "acme_corp_docs");
    }

    #[test]
    fn source_key_is_stable_for_identical_bytes() {
        let a = source_key("acme", b"hello world", "txt");
        let b = source_key("acme", b"hello world", "txt");
        assert_eq!(a, b);
    }

    #[test]
    fn source_key_differs_for_different_bytes() {
        let a = source_key("acme", b"hello", "txt");
        let b = source_key("acme", b"world", "txt");
        assert_ne!(a, b);
    }

    #[test]
    fn image_key_uses_sanitized_ontology() {
        assert_eq!(image_key("my docs", "src-1", "png"), "images/my_docs/src-1.png");
    }

    #[test]
    fn projection_keys_follow_layout() {
        assert_eq!(
            projection_latest_key("acme", "nomic-v1"),
            "projections/acme/nomic-v1/latest.json"
        );
        assert_eq!(
            projection_history_key("acme", "nomic-v1", "20260101_000000"),
            "projections/acme/nomic-v1/20260101_000000.json"
        );
    }
}
