//! The `execute(query, params, fetch_one)` primitive named by §4.1, grounded
//! on `original_source/api/api/lib/age_client.py`'s `_execute_cypher` /
//! `_extract_column_spec` / `_parse_agtype`. Parameter escaping, return-value
//! suffix-stripping, and RETURN-clause column-spec computation are real and
//! apply to every query string this crate builds. The executed subset is the
//! `MATCH (alias:Label {prop: $p, ...}) RETURN ... [LIMIT n]` shape every
//! `age_client.py` helper actually issues; arbitrary `WHERE` boolean
//! expressions stay Rust closures (`impl Fn(&Node) -> bool`) supplied by the
//! caller rather than a parsed expression language — see DESIGN.md for the
//! scoping rationale.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

fn return_clause_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)\bRETURN\s+(.+?)(?:\s+ORDER\s+BY|\s+LIMIT|$)").unwrap())
}

fn as_alias_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s+as\s+(\w+)").unwrap())
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").unwrap())
}

fn type_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"::(vertex|edge|path)").unwrap())
}

/// §9: strings double backslashes then escape single quotes and are quoted;
/// lists/maps are JSON-encoded then the same text escaping is applied
/// (unquoted, since the JSON brackets already delimit the literal); numbers,
/// bools, and null are literalized bare.
pub fn escape_param(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", escape_text(s)),
        Value::Array(_) | Value::Object(_) => escape_text(&value.to_string()),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

fn escape_text(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Substitutes every `$key` token in `query` with its escaped literal, since
/// the declarative query language has no native parameter binding (§4.1).
pub fn substitute_params(query: &str, params: &HashMap<String, Value>) -> String {
    let mut out = query.to_string();
    for (key, value) in params {
        out = out.replace(&format!("${key}"), &escape_param(value));
    }
    out
}

/// Computes the output column names from a `RETURN` clause (§4.1, §4.16):
/// `AS alias` wins, else the last identifier token in the expression;
/// duplicate names are disambiguated with `_2`, `_3`, ... suffixes.
pub fn compute_column_spec(query: &str) -> Vec<String> {
    let Some(caps) = return_clause_re().captures(query) else {
        return vec!["result".to_string()];
    };
    let return_clause = caps.get(1).unwrap().as_str().trim();

    let mut columns = Vec::new();
    for (i, part) in return_clause.split(',').enumerate() {
        let part = part.trim();
        if let Some(c) = as_alias_re().captures(part) {
            columns.push(c.get(1).unwrap().as_str().to_string());
        } else if let Some(last) = identifier_re().find_iter(part).last() {
            columns.push(last.as_str().to_string());
        } else {
            columns.push(format!("col{i}"));
        }
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    columns
        .into_iter()
        .map(|col| {
            let count = seen.entry(col.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                col
            } else {
                format!("{col}_{count}")
            }
        })
        .collect()
}

/// Strips `::vertex`/`::edge`/`::path` suffixes (§4.1) and parses the
/// remainder as JSON; primitive values unwrap to their natural scalar type,
/// and text that still isn't valid JSON after stripping is returned as-is.
pub fn parse_return_value(raw: &str) -> Value {
    let cleaned = type_suffix_re().replace_all(raw, "");
    serde_json::from_str(&cleaned).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// §4.1 race-condition classification: these substrings mark an expected
/// concurrent-MERGE conflict (log at DEBUG); everything else is an error.
pub fn is_expected_race_condition(message: &str) -> bool {
    message.contains("already exists") || message.contains("Entity failed to be updated")
}

/// Builds a `MATCH (alias:label {prop: $param, ...}) RETURN return_clause
/// [LIMIT n]` query string. Every safe `QueryFacade` method goes through this
/// so the emitted text always names an explicit label (Testable Property 8).
pub fn build_match_query(
    alias: &str,
    label: &str,
    props: &[(&str, &str)],
    return_clause: &str,
    limit: Option<usize>,
) -> String {
    let mut query = String::from("MATCH (");
    query.push_str(alias);
    query.push(':');
    query.push_str(label);
    if !props.is_empty() {
        let pairs: Vec<String> = props.iter().map(|(k, v)| format!("{k}: ${v}")).collect();
        query.push_str(" {");
        query.push_str(&pairs.join(", "));
        query.push('}');
    }
    query.push_str(") RETURN ");
    query.push_str(return_clause);
    if let Some(limit) = limit {
        query.push_str(&format!(" LIMIT {limit}"));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escape_param_doubles_backslashes_before_quoting() {
        assert_eq!(escape_param(&json!("a\\b'c")), "'a\\\\b\\'c'");
    }

    #[test]
    fn escape_param_literalizes_numbers_bools_and_null() {
        assert_eq!(escape_param(&json!(42)), "42");
        assert_eq!(escape_param(&json!(true)), "true");
        assert_eq!(escape_param(&json!(null)), "null");
    }

    #[test]
    fn escape_param_json_encodes_lists_unquoted() {
        assert_eq!(escape_param(&json!([1, 2, 3])), "[1,2,3]");
    }

    #[test]
    fn substitute_params_replaces_every_token() {
        let mut params = HashMap::new();
        params.insert("concept_id".to_string(), json!("abc"));
        let query = substitute_params("MATCH (c:Concept {concept_id: $concept_id}) RETURN c", &params);
        assert_eq!(query, "MATCH (c:Concept {concept_id: 'abc'}) RETURN c");
    }

    #[test]
    fn column_spec_prefers_alias_over_last_token() {
        let spec = compute_column_spec("MATCH (c:Concept) RETURN c.concept_id AS concept_id, c.label");
        assert_eq!(spec, vec!["concept_id", "label"]);
    }

    #[test]
    fn column_spec_suffixes_duplicates_from_two() {
        let spec = compute_column_spec("MATCH (c:Concept) RETURN c.label, c.label, c.label");
        assert_eq!(spec, vec!["label", "label_2", "label_3"]);
    }

    #[test]
    fn column_spec_defaults_to_result_with_no_return() {
        assert_eq!(compute_column_spec("MATCH (c:Concept)"), vec!["result"]);
    }

    #[test]
    fn parse_return_value_strips_all_type_suffixes() {
        let raw = r#"[{"id":1}::vertex,{"id":2}::vertex]"#;
        let parsed = parse_return_value(raw);
        assert_eq!(parsed, json!([{"id": 1}, {"id": 2}]));
    }

    #[test]
    fn parse_return_value_unwraps_primitive_scalars() {
        assert_eq!(parse_return_value("42"), json!(42));
        assert_eq!(parse_return_value("\"hello\""), json!("hello"));
    }

    #[test]
    fn race_condition_messages_are_classified() {
        assert!(is_expected_race_condition("Entity failed to be updated"));
        assert!(is_expected_race_condition("node already exists"));
        assert!(!is_expected_race_condition("connection refused"));
    }

    #[test]
    fn build_match_query_embeds_label_and_props() {
        let query = build_match_query("c", "Concept", &[("concept_id", "concept_id")], "c", Some(10));
        assert_eq!(query, "MATCH (c:Concept {concept_id: $concept_id}) RETURN c LIMIT 10");
    }
}
