// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! `${NAME}` environment-variable placeholder resolution.
//!
//! Placeholders are resolved before schema validation so validated values
//! are always the literal, substituted text. An unresolved placeholder is
//! not a hard error: it is left in place and surfaced as a warning, so a
//! config that references an optional variable can still render.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigWarning;

static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern is valid"));

/// Walks `input`, substituting every `${NAME}` occurrence with the value of
/// the environment variable `NAME`. Variables that aren't set are left
/// untouched and reported as a warning keyed by the variable name.
#[must_use]
pub fn resolve(input: &str) -> (String, Vec<ConfigWarning>) {
    let mut warnings = Vec::new();
    let resolved = PLACEHOLDER_PATTERN
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match std::env::var(name) {
                Ok(value) => value,
                Err(_) => {
                    warnings.push(ConfigWarning {
                        field: name.to_string(),
                        message: format!("environment variable `{name}` is not set; left as `${{{name}}}`"),
                    });
                    caps[0].to_string()
                }
            }
        })
        .into_owned();
    (resolved, warnings)
}

/// Collects the distinct `${NAME}` variable names referenced anywhere
/// across the string leaves of `value`, without resolving them. Used by the
/// discovery preview endpoint to tell a caller which environment variables
/// a rendered-but-not-yet-applied fragment would need.
#[must_use]
pub fn required_variables(value: &serde_json::Value) -> Vec<String> {
    let mut names = std::collections::BTreeSet::new();
    collect_variable_refs(value, &mut names);
    names.into_iter().collect()
}

fn collect_variable_refs(value: &serde_json::Value, names: &mut std::collections::BTreeSet<String>) {
    match value {
        serde_json::Value::String(s) => {
            for caps in PLACEHOLDER_PATTERN.captures_iter(s) {
                names.insert(caps[1].to_string());
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_variable_refs(item, names);
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                collect_variable_refs(v, names);
            }
        }
        _ => {}
    }
}

/// Resolves placeholders across every string leaf of a parsed JSON value,
/// used to substitute inside a rendered config fragment rather than the
/// raw document text (so structural YAML/JSON is untouched and only leaf
/// strings are rewritten).
pub fn resolve_in_value(value: &mut serde_json::Value, warnings: &mut Vec<ConfigWarning>) {
    match value {
        serde_json::Value::String(s) => {
            let (resolved, mut w) = resolve(s);
            *s = resolved;
            warnings.append(&mut w);
        }
        serde_json::Value::Array(items) => {
            for item in items {
                resolve_in_value(item, warnings);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                resolve_in_value(v, warnings);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_set_variable() {
        std::env::set_var("NRDOT_TEST_PLACEHOLDER_ONE", "hello");
        let (resolved, warnings) = resolve("value: ${NRDOT_TEST_PLACEHOLDER_ONE}");
        assert_eq!(resolved, "value: hello");
        assert!(warnings.is_empty());
        std::env::remove_var("NRDOT_TEST_PLACEHOLDER_ONE");
    }

    #[test]
    fn leaves_unset_variable_and_warns() {
        std::env::remove_var("NRDOT_TEST_PLACEHOLDER_MISSING");
        let (resolved, warnings) = resolve("value: ${NRDOT_TEST_PLACEHOLDER_MISSING}");
        assert_eq!(resolved, "value: ${NRDOT_TEST_PLACEHOLDER_MISSING}");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "NRDOT_TEST_PLACEHOLDER_MISSING");
    }

    #[test]
    fn required_variables_collects_distinct_names_across_the_tree() {
        let value = serde_json::json!({
            "endpoint": "${DB_HOST}:${DB_PORT}",
            "headers": { "api-key": "${API_KEY}" },
            "list": ["${DB_HOST}", "literal"],
        });
        assert_eq!(required_variables(&value), vec!["API_KEY".to_string(), "DB_HOST".to_string(), "DB_PORT".to_string()]);
    }

    #[test]
    fn resolves_nested_in_json_value() {
        std::env::set_var("NRDOT_TEST_PLACEHOLDER_NESTED", "secret-token");
        let mut value = serde_json::json!({
            "headers": { "api-key": "${NRDOT_TEST_PLACEHOLDER_NESTED}" },
            "list": ["${NRDOT_TEST_PLACEHOLDER_NESTED}", "literal"],
        });
        let mut warnings = Vec::new();
        resolve_in_value(&mut value, &mut warnings);
        assert_eq!(value["headers"]["api-key"], "secret-token");
        assert_eq!(value["list"][0], "secret-token");
        assert_eq!(value["list"][1], "literal");
        assert!(warnings.is_empty());
        std::env::remove_var("NRDOT_TEST_PLACEHOLDER_NESTED");
    }
}
