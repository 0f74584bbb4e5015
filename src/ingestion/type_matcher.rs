//! Relationship-type normalization (§4.7 step 2): "a Porter-stem + synonym
//! table" matcher. A full Porter stemmer is out of scope for matching one
//! UPPER_SNAKE token against another; this keeps the teacher's
//! `chunker::code_filter`-style hand-rolled heuristic (a small suffix table)
//! rather than reaching for a stemming crate no example in the pack uses.

const SUFFIXES: &[&str] = &["IZES", "IZED", "IZING", "ES", "ED", "ING", "S"];

/// Strip a small set of common suffixes so near-variants of the same token
/// (`ENABLES`/`ENABLED`/`ENABLING`) collapse to one stem before comparison.
fn stem(token: &str) -> &str {
    for suffix in SUFFIXES {
        if token.len() > suffix.len() + 2 {
            if let Some(stripped) = token.strip_suffix(suffix) {
                return stripped;
            }
        }
    }
    token
}

/// Upper-snake-case a raw extracted relationship type: trim, uppercase,
/// spaces/hyphens to underscores.
pub fn canonicalize(raw: &str) -> String {
    raw.trim()
        .to_uppercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Match a canonicalized type name against the active vocabulary: exact
/// match first, then a stemmed match. Returns the *existing* active name
/// when one matches, so callers reuse the registered type rather than
/// minting a near-duplicate.
pub fn resolve<'a>(raw: &str, active_types: &'a [String]) -> Option<&'a str> {
    let canonical = canonicalize(raw);
    if let Some(exact) = active_types.iter().find(|t| t.as_str() == canonical) {
        return Some(exact.as_str());
    }
    let stemmed = stem(&canonical);
    active_types.iter().map(String::as_str).find(|t| stem(t) == stemmed)
}
