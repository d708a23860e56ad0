//! Call metadata (headers and trailers).
//!
//! Metadata is an ordered multimap of lowercase keys to values. Keys ending
//! in `-bin` carry binary values; every other key carries ASCII text.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Suffix marking a binary-valued metadata key.
pub const BINARY_SUFFIX: &str = "-bin";

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A printable ASCII value.
    Ascii(String),
    /// A binary value, only valid for `-bin` keys.
    Binary(Vec<u8>),
}

impl MetadataValue {
    /// The value as text, if it is an ASCII value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Ascii(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    /// The raw bytes of the value.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Ascii(s) => s.as_bytes(),
            Self::Binary(b) => b,
        }
    }
}

/// One key/value entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Lowercase key.
    pub key: String,
    /// The value.
    pub value: MetadataValue,
}

impl MetadataEntry {
    /// Whether this entry is binary-valued.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.key.ends_with(BINARY_SUFFIX)
    }
}

/// Ordered collection of metadata entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: Vec<MetadataEntry>,
}

impl Metadata {
    /// Create empty metadata.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an ASCII entry. The key is normalized to lowercase.
    ///
    /// A `-bin` key given through this method stores the text's bytes as a
    /// binary value.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into().to_ascii_lowercase();
        let value = value.into();
        let value = if key.ends_with(BINARY_SUFFIX) {
            MetadataValue::Binary(value.into_bytes())
        } else {
            MetadataValue::Ascii(value)
        };
        self.entries.push(MetadataEntry { key, value });
        self
    }

    /// Append a binary entry. A `-bin` suffix is added to the key if missing.
    pub fn add_binary(&mut self, key: impl Into<String>, value: impl Into<Bytes>) -> &mut Self {
        let mut key = key.into().to_ascii_lowercase();
        if !key.ends_with(BINARY_SUFFIX) {
            key.push_str(BINARY_SUFFIX);
        }
        self.entries.push(MetadataEntry {
            key,
            value: MetadataValue::Binary(value.into().to_vec()),
        });
        self
    }

    /// Builder-style [`Metadata::add`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(key, value);
        self
    }

    /// First value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    /// First ASCII value stored under `key`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetadataValue::as_str)
    }

    /// All values stored under `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a MetadataValue> + 'a {
        let key = key.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(move |entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    /// Remove every entry stored under `key`, returning how many were removed.
    pub fn remove(&mut self, key: &str) -> usize {
        let key = key.to_ascii_lowercase();
        let before = self.entries.len();
        self.entries.retain(|entry| entry.key != key);
        before - self.entries.len()
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> std::slice::Iter<'_, MetadataEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append every entry of `other`.
    pub fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = &'a MetadataEntry;
    type IntoIter = std::slice::Iter<'a, MetadataEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for Metadata {
    type Item = MetadataEntry;
    type IntoIter = std::vec::IntoIter<MetadataEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Self::new();
        for (key, value) in iter {
            metadata.add(key, value);
        }
        metadata
    }
}
