//! Ordered pattern → value association lists.
//!
//! Redirects, MIME overrides, SCGI routes and certificate zones are all
//! "first match" or "last match" tables, so iteration order has to be the
//! order the operator wrote them in. A plain `HashMap` would make the result
//! of a request depend on hash seeds.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An insertion-ordered map with unique keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> RuleMap<V> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Insert a rule. An existing key keeps its position and takes the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge a deeper table into this one. Colliding keys are overwritten,
    /// new keys are appended after the inherited ones.
    pub fn merge(&mut self, deeper: RuleMap<V>) {
        for (key, value) in deeper.entries {
            self.insert(key, value);
        }
    }
}

impl<V> Default for RuleMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for RuleMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = RuleMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for RuleMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct RuleMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for RuleMapVisitor<V> {
    type Value = RuleMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a table of pattern = value rules")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = RuleMap::new();
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for RuleMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RuleMapVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Doc {
        rules: RuleMap<String>,
    }

    #[test]
    fn preserves_document_order() {
        let doc: Doc = toml::from_str(
            r#"
            [rules]
            "^/z" = "1"
            "^/a" = "2"
            "^/m" = "3"
            "#,
        )
        .unwrap();
        let keys: Vec<_> = doc.rules.keys().collect();
        assert_eq!(keys, vec!["^/z", "^/a", "^/m"]);
    }

    #[test]
    fn merge_overwrites_in_place_and_appends() {
        let mut base: RuleMap<u32> = [("a", 1), ("b", 2)].into_iter().collect();
        let deeper: RuleMap<u32> = [("c", 3), ("a", 10)].into_iter().collect();
        base.merge(deeper);

        let entries: Vec<_> = base.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        assert_eq!(
            entries,
            vec![("a".to_string(), 10), ("b".to_string(), 2), ("c".to_string(), 3)]
        );
    }
}
