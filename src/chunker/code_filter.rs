//! Defensive code-stripping blacklist (§4.6.2 step 3): a translated code
//! block's description is passed back from the extraction LLM as prose, but
//! LLMs sometimes echo syntax anyway. This strips any line that still looks
//! like code before it's allowed into a chunk's text.

use regex::Regex;
use std::sync::OnceLock;

const SQL_KEYWORDS: &[&str] = &[
    "select", "insert", "update", "delete", "create", "drop", "alter", "match", "merge", "with",
    "return", "where", "from", "call",
];

fn keyword_paren_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = SQL_KEYWORDS.join("|");
        Regex::new(&format!(r"(?i)\b({alternation})\s*\(")).unwrap()
    })
}

fn keyword_pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = SQL_KEYWORDS.join("|");
        Regex::new(&format!(r"(?i)\b({alternation})\b.*\b({alternation})\b")).unwrap()
    })
}

fn property_syntax_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\s*\w+\s*:\s*['\x22]").unwrap())
}

fn dollar_quote_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\$|\$\w+\$").unwrap())
}

/// A line is "too code-like" if more than a third of its whitespace-split
/// tokens are dominated by non-alphanumeric characters.
fn has_too_many_special_chars(line: &str) -> bool {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return false;
    }
    let special_heavy = tokens
        .iter()
        .filter(|t| {
            let special = t.chars().filter(|c| !c.is_alphanumeric()).count();
            special * 2 >= t.chars().count().max(1)
        })
        .count();
    special_heavy * 3 >= tokens.len()
}

fn looks_like_code(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.ends_with(';') {
        return true;
    }
    if trimmed.starts_with(['(', '{', '[', ';']) {
        return true;
    }
    if trimmed.contains("->") || trimmed.contains("=>") {
        return true;
    }
    if keyword_paren_regex().is_match(trimmed) {
        return true;
    }
    if keyword_pair_regex().is_match(trimmed) {
        return true;
    }
    if property_syntax_regex().is_match(trimmed) {
        return true;
    }
    if dollar_quote_regex().is_match(trimmed) {
        return true;
    }
    if has_too_many_special_chars(trimmed) {
        return true;
    }
    false
}

/// Drop every line that still looks like code, joining what remains.
pub fn strip_code_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !looks_like_code(line))
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_prose_passes_through_unchanged() {
        let prose = "This function validates a user's session token and returns a boolean.";
        assert_eq!(strip_code_lines(prose), prose);
    }

    #[test]
    fn sql_select_statement_is_stripped() {
        let text = "This describes the query.\nSELECT * FROM users WHERE id = 1;";
        let stripped = strip_code_lines(text);
        assert_eq!(stripped, "This describes the query.");
    }

    #[test]
    fn cypher_merge_clause_is_stripped() {
        let text = "Creates a node.\nMERGE (n:Concept {name: 'travel'}) RETURN n";
        let stripped = strip_code_lines(text);
        assert_eq!(stripped, "Creates a node.");
    }

    #[test]
    fn arrow_syntax_lines_are_stripped() {
        let text = "Good description here.\nfn main() -> Result<(), Error> {";
        let stripped = strip_code_lines(text);
        assert_eq!(stripped, "Good description here.");
    }

    #[test]
    fn lines_starting_with_brackets_are_stripped() {
        let text = "A description of the config.\n{ \"key\": \"value\" }";
        let stripped = strip_code_lines(text);
        assert_eq!(stripped, "A description of the config.");
    }

    #[test]
    fn dollar_quoted_strings_are_stripped() {
        let text = "Explains the trigger body.\n$$ BEGIN something END; $$";
        let stripped = strip_code_lines(text);
        assert_eq!(stripped, "Explains the trigger body.");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(strip_code_lines(""), "");
    }
}
