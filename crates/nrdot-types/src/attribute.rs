// Copyright The NRDOT-HOST Authors
// SPDX-License-Identifier: Apache-2.0

//! The hierarchical attribute value model shared by every telemetry item
//! kind (resource, scope, span, event, metric data point, log record).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single attribute value. Maps and lists nest recursively so processors
/// (redaction in particular) can descend into `user.password`-shaped keys
/// inside a nested map attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// UTF-8 string value.
    Str(String),
    /// Signed 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Double(f64),
    /// Boolean.
    Bool(bool),
    /// Raw bytes (base64-encoded when serialized to JSON/YAML).
    Bytes(Vec<u8>),
    /// An ordered list of values.
    List(Vec<AttributeValue>),
    /// A nested attribute map.
    Map(AttributeMap),
}

impl AttributeValue {
    /// Borrows the value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Mutably borrows the value as a string, if it is one.
    pub fn as_str_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// `true` if this value is a nested map.
    #[must_use]
    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    /// `true` if this value is a list.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

/// A string-keyed attribute map, ordered by key so descriptor/fingerprint
/// serialization is deterministic (needed for descriptor signing).
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// Recursively visits every leaf (non-map, non-list) value in an attribute
/// map, invoking `f` with the full dotted path (e.g. `"user.password"`) and
/// a mutable reference to the leaf. Lists are walked by positional index
/// (`items.0`) but list elements that are themselves maps recurse further.
pub fn visit_leaves_mut<F>(map: &mut AttributeMap, f: &mut F)
where
    F: FnMut(&str, &mut AttributeValue),
{
    visit_map(map, String::new(), f);
}

fn visit_map<F>(map: &mut AttributeMap, prefix: String, f: &mut F)
where
    F: FnMut(&str, &mut AttributeValue),
{
    for (key, value) in map.iter_mut() {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        visit_value(value, &path, f);
    }
}

fn visit_value<F>(value: &mut AttributeValue, path: &str, f: &mut F)
where
    F: FnMut(&str, &mut AttributeValue),
{
    match value {
        AttributeValue::Map(nested) => visit_map(nested, path.to_string(), f),
        AttributeValue::List(items) => {
            for (idx, item) in items.iter_mut().enumerate() {
                let item_path = format!("{path}.{idx}");
                visit_value(item, &item_path, f);
            }
        }
        other => f(path, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visit_leaves_descends_nested_maps() {
        let mut nested = AttributeMap::new();
        nested.insert("password".into(), AttributeValue::Str("hunter2".into()));
        let mut map = AttributeMap::new();
        map.insert("user".into(), AttributeValue::Map(nested));
        map.insert("count".into(), AttributeValue::Int(3));

        let mut seen = Vec::new();
        visit_leaves_mut(&mut map, &mut |path, _value| seen.push(path.to_string()));
        seen.sort();
        assert_eq!(seen, vec!["count".to_string(), "user.password".to_string()]);
    }

    #[test]
    fn visit_leaves_descends_lists_of_maps() {
        let mut item = AttributeMap::new();
        item.insert("secret".into(), AttributeValue::Str("x".into()));
        let mut map = AttributeMap::new();
        map.insert(
            "items".into(),
            AttributeValue::List(vec![AttributeValue::Map(item)]),
        );

        let mut seen = Vec::new();
        visit_leaves_mut(&mut map, &mut |path, _| seen.push(path.to_string()));
        assert_eq!(seen, vec!["items.0.secret".to_string()]);
    }
}
