//! Ordered primary key fields addressing a record at a sink.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// A single `(key, value)` pair of a composite primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub key: String,
    pub value: String,
}

impl PrimaryKey {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered sequence of primary key fields.
///
/// Order is preserved so that composite keys render deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimaryKeys(Vec<PrimaryKey>);

impl PrimaryKeys {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push(PrimaryKey::new(key, value));
    }

    /// Value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|pk| pk.key == key)
            .map(|pk| pk.value.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PrimaryKey> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&PrimaryKey> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key -> value view. A key present more than once keeps its last value.
    pub fn as_map(&self) -> HashMap<&str, &str> {
        self.0
            .iter()
            .map(|pk| (pk.key.as_str(), pk.value.as_str()))
            .collect()
    }

    /// Render the keys into a nested JSON object, splitting keys on `.`.
    ///
    /// `[("issue.id", "1"), ("site", "x")]` becomes
    /// `{"issue": {"id": "1"}, "site": "x"}`.
    pub fn to_object(&self) -> Value {
        let mut root = Map::new();
        for pk in &self.0 {
            insert_dotted(&mut root, &pk.key, Value::String(pk.value.clone()));
        }
        Value::Object(root)
    }
}

fn insert_dotted(root: &mut Map<String, Value>, key: &str, value: Value) {
    let mut segments = key.split('.').peekable();
    let mut current = root;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_owned(), value);
            return;
        }
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
}

impl fmt::Display for PrimaryKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pk) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", pk.key, pk.value)?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PrimaryKeys {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| PrimaryKey::new(k, v))
                .collect(),
        )
    }
}

impl From<Vec<PrimaryKey>> for PrimaryKeys {
    fn from(keys: Vec<PrimaryKey>) -> Self {
        Self(keys)
    }
}

impl<'a> IntoIterator for &'a PrimaryKeys {
    type Item = &'a PrimaryKey;
    type IntoIter = std::slice::Iter<'a, PrimaryKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_is_preserved() {
        let keys: PrimaryKeys = [("b", "2"), ("a", "1")].into_iter().collect();
        let order: Vec<&str> = keys.iter().map(|pk| pk.key.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert_eq!(keys.to_string(), "b=2,a=1");
    }

    #[test]
    fn test_dotted_object_rendering() {
        let keys: PrimaryKeys = [("issue.id", "10"), ("issue.project", "OPS"), ("site", "x")]
            .into_iter()
            .collect();
        assert_eq!(
            keys.to_object(),
            json!({"issue": {"id": "10", "project": "OPS"}, "site": "x"})
        );
    }

    #[test]
    fn test_scalar_prefix_is_replaced_by_object() {
        let keys: PrimaryKeys = [("a", "1"), ("a.b", "2")].into_iter().collect();
        assert_eq!(keys.to_object(), json!({"a": {"b": "2"}}));
    }

    #[test]
    fn test_map_view_and_lookup() {
        let keys: PrimaryKeys = [("id", "1"), ("id", "2"), ("kind", "bug")]
            .into_iter()
            .collect();
        assert_eq!(keys.get("id"), Some("1"));
        let map = keys.as_map();
        assert_eq!(map.get("id"), Some(&"2"));
        assert_eq!(map.len(), 2);
        assert_eq!(keys.get("missing"), None);
    }

    #[test]
    fn test_serializes_as_list() {
        let keys: PrimaryKeys = [("id", "1")].into_iter().collect();
        assert_eq!(
            serde_json::to_value(&keys).unwrap(),
            json!([{"key": "id", "value": "1"}])
        );
    }
}
