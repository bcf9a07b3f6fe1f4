//! Query text construction. Pure string functions, no service access.

use serde_json::Value;

use crate::models::Row;

/// Builds the per-metric query for templated mode, e.g.
/// `avg:cpu.user{host:i-123}by{env,region}.rollup(60)`.
pub fn build_templated_query(
    metric: &str,
    id_tag: &str,
    id_value: &str,
    tags: &[String],
    rollup: Option<&Value>,
) -> String {
    let mut query = format!("avg:{}{{{}:{}}}", metric, id_tag, id_value);

    if !tags.is_empty() {
        query.push_str(&format!("by{{{}}}", tags.join(",")));
    }

    if let Some(rollup) = rollup.filter(|v| !v.is_null()) {
        query.push_str(&format!(".rollup({})", value_to_string(rollup)));
    }

    query
}

/// Result of filling a raw query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub query: String,
    /// Placeholder names with no value in either lookup source, in order of appearance
    pub missing: Vec<String>,
}

/// Replaces each `<name>` token with the matching value from `row`, falling
/// back to `params`. Unresolved tokens are left verbatim and reported.
pub fn substitute_placeholders(template: &str, row: &Row, params: &Row) -> Substitution {
    let mut query = String::with_capacity(template.len());
    let mut missing = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('<') {
        query.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match placeholder_name(after) {
            Some(name) => {
                let token_len = name.len() + 2;
                match row.get(name).or_else(|| params.get(name)) {
                    Some(value) => query.push_str(&value_to_string(value)),
                    None => {
                        query.push_str(&rest[open..open + token_len]);
                        if !missing.iter().any(|m| m == name) {
                            missing.push(name.to_string());
                        }
                    }
                }
                rest = &rest[open + token_len..];
            }
            None => {
                query.push('<');
                rest = after;
            }
        }
    }
    query.push_str(rest);

    Substitution { query, missing }
}

/// Name of the placeholder starting right after a `<`, if the text forms one.
fn placeholder_name(text: &str) -> Option<&str> {
    let end = text.find('>')?;
    let name = &text[..end];
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    valid.then_some(name)
}

/// Renders a field value for embedding in query text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_templated_query_minimal() {
        let query = build_templated_query("metric1", "app", "i-123456", &[], None);
        assert_eq!(query, "avg:metric1{app:i-123456}");
    }

    #[test]
    fn test_templated_query_with_tags_and_rollup() {
        let tags = vec!["tag1".to_string(), "tag2".to_string()];
        let query =
            build_templated_query("metric1", "app", "i-123456", &tags, Some(&json!(60)));
        assert_eq!(query, "avg:metric1{app:i-123456}by{tag1,tag2}.rollup(60)");

        let query = build_templated_query("metric1", "app", "i-1", &[], Some(&json!("avg, 30")));
        assert_eq!(query, "avg:metric1{app:i-1}.rollup(avg, 30)");
    }

    #[test]
    fn test_templated_query_ignores_null_rollup() {
        let query = build_templated_query("m", "host", "a", &[], Some(&Value::Null));
        assert_eq!(query, "avg:m{host:a}");
    }

    #[test]
    fn test_substitute_from_row_then_config() {
        let input = row(json!({ "id": "i-123", "window": 60 }));
        let params = row(json!({ "id": "ignored", "env": "prod" }));

        let result = substitute_placeholders(
            "avg:cpu{host:<id>,env:<env>}.rollup(<window>)",
            &input,
            &params,
        );
        assert_eq!(result.query, "avg:cpu{host:i-123,env:prod}.rollup(60)");
        assert!(result.missing.is_empty());
    }

    #[test]
    fn test_substitute_keeps_missing_token() {
        let result = substitute_placeholders("avg:cpu{host:<unknown>}", &Row::new(), &Row::new());
        assert_eq!(result.query, "avg:cpu{host:<unknown>}");
        assert_eq!(result.missing, vec!["unknown".to_string()]);
    }

    #[test]
    fn test_substitute_leaves_non_placeholders_alone() {
        let input = row(json!({ "a": 1 }));
        let result = substitute_placeholders("x < 3 and <a> <> <b c>", &input, &Row::new());
        assert_eq!(result.query, "x < 3 and 1 <> <b c>");
        assert!(result.missing.is_empty());
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("abc")), "abc");
        assert_eq!(value_to_string(&json!(12.5)), "12.5");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&Value::Null), "null");
    }
}
