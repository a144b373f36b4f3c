//! Ordered documents.

use crate::value::WireValue;

/// An ordered key/value document.
///
/// Documents are used both for document-store payloads and as the row type
/// returned by every driver. Keys keep insertion order; inserting an existing
/// key replaces its value in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    entries: Vec<(String, WireValue)>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty document with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<WireValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a value, replacing any previous value for `key`.
    ///
    /// Returns the previous value if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<WireValue>) -> Option<WireValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Looks up a key.
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Looks up a key mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut WireValue> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Resolves a dotted path (`address.city`) through nested documents.
    pub fn get_path(&self, path: &str) -> Option<&WireValue> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = current.as_document()?.get(part)?;
        }
        Some(current)
    }

    /// Returns true if the document holds `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<WireValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the document has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &WireValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Copies every entry of `other` into this document.
    pub fn extend(&mut self, other: Document) {
        for (k, v) in other.entries {
            self.insert(k, v);
        }
    }

    /// Keeps only the listed keys, in the listed order.
    #[must_use]
    pub fn project(&self, keys: &[String]) -> Document {
        let mut out = Document::with_capacity(keys.len());
        for key in keys {
            if let Some(v) = self.get(key) {
                out.insert(key.clone(), v.clone());
            }
        }
        out
    }
}

impl IntoIterator for Document {
    type Item = (String, WireValue);
    type IntoIter = std::vec::IntoIter<(String, WireValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<WireValue>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_in_place() {
        let mut doc = Document::new().with("a", 1i64).with("b", 2i64);
        let prev = doc.insert("a", 10i64);
        assert_eq!(prev, Some(WireValue::Integer(1)));
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(doc.get("a"), Some(&WireValue::Integer(10)));
    }

    #[test]
    fn dotted_paths() {
        let inner = Document::new().with("city", "Lima");
        let doc = Document::new().with("address", inner);
        assert_eq!(
            doc.get_path("address.city"),
            Some(&WireValue::Text("Lima".into()))
        );
        assert_eq!(doc.get_path("address.zip"), None);
        assert_eq!(doc.get_path("missing.city"), None);
    }

    #[test]
    fn project_keeps_requested_order() {
        let doc = Document::new()
            .with("a", 1i64)
            .with("b", 2i64)
            .with("c", 3i64);
        let projected = doc.project(&["c".to_string(), "a".to_string(), "z".to_string()]);
        assert_eq!(projected.keys().collect::<Vec<_>>(), vec!["c", "a"]);
    }

    #[test]
    fn remove_and_len() {
        let mut doc: Document = vec![("x", 1i64), ("y", 2i64)].into_iter().collect();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.remove("x"), Some(WireValue::Integer(1)));
        assert!(!doc.contains_key("x"));
        assert_eq!(doc.remove("x"), None);
        assert_eq!(doc.len(), 1);
    }
}
