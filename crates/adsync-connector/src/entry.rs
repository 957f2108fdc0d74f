//! Directory entry and attribute value model.
//!
//! Entries are produced fresh on every search; nothing here is cached
//! across poll cycles. The distinguished name is the join key between
//! cycles, and multi-valued attributes preserve the order the server
//! returned them in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A value for a directory attribute, single or multi-valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A single string value.
    String(String),
    /// A single integer value.
    Integer(i64),
    /// A single boolean value.
    Boolean(bool),
    /// Binary data (base64 encoded in JSON).
    Binary(Vec<u8>),
    /// Multiple values, in server order.
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Get as a string if this is a single string value.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as strings (works for both single and multi-valued).
    pub fn as_strings(&self) -> Vec<&str> {
        match self {
            AttributeValue::String(s) => vec![s.as_str()],
            AttributeValue::Array(arr) => arr.iter().filter_map(|v| v.as_string()).collect(),
            _ => vec![],
        }
    }

    /// Get as an integer if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a boolean if this is a boolean value.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as binary data if this is a binary value.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Check if this is multi-valued.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, AttributeValue::Array(_))
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        AttributeValue::Array(values.into_iter().map(AttributeValue::String).collect())
    }
}

/// A named set of attributes projected from a directory entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    #[serde(flatten)]
    attributes: HashMap<String, AttributeValue>,
}

impl AttributeSet {
    /// Create a new empty attribute set.
    pub fn new() -> Self {
        Self {
            attributes: HashMap::new(),
        }
    }

    /// Set an attribute value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Set an attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Get a single-valued string attribute.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_string())
    }

    /// Get a multi-valued string attribute.
    pub fn get_strings(&self, name: &str) -> Option<Vec<&str>> {
        self.get(name).map(|v| v.as_strings())
    }

    /// Check if an attribute exists.
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    /// Get all attribute names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(|s| s.as_str())
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.attributes.iter()
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

/// A change marker reported by the directory for an entry, e.g. an
/// Active Directory update sequence number (USN).
///
/// Markers are totally ordered; the poller's watermark is the highest
/// marker it has durably committed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChangeMarker(pub u64);

impl ChangeMarker {
    /// The raw sequence value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ChangeMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChangeMarker {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(ChangeMarker)
    }
}

impl From<u64> for ChangeMarker {
    fn from(v: u64) -> Self {
        ChangeMarker(v)
    }
}

/// A protocol-level search control passed through to the server.
///
/// Controls are applied unmodified and in configuration order; their
/// semantics (paging, tombstone visibility, ...) are the server's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchControl {
    /// Control OID, e.g. `1.2.840.113556.1.4.417` (show deleted).
    pub oid: String,
    /// Optional control value, server-specific encoding.
    #[serde(default)]
    pub value: Option<String>,
    /// Whether the server must reject the operation if the control is
    /// unsupported.
    #[serde(default, rename = "iscritical")]
    pub critical: bool,
}

impl SearchControl {
    /// Create a control with no value.
    pub fn new(oid: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            value: None,
            critical: false,
        }
    }

    /// Set the control value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Mark the control critical.
    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

/// A single entry returned by a directory search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name, unique within the directory.
    pub dn: String,
    /// Projected attributes, replaced wholesale when the entry changes.
    pub attributes: AttributeSet,
    /// The entry's update marker (e.g. uSNChanged), if the backend
    /// reports one.
    pub change_marker: Option<ChangeMarker>,
    /// The entry's creation marker (e.g. uSNCreated), if reported.
    /// Used to tell freshly created entries from updated ones during
    /// incremental sync.
    pub created_marker: Option<ChangeMarker>,
    /// Whether the directory flagged this entry as a tombstone.
    pub is_deleted: bool,
}

impl DirectoryEntry {
    /// Create an entry with the given DN and attributes.
    pub fn new(dn: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            dn: dn.into(),
            attributes,
            change_marker: None,
            created_marker: None,
            is_deleted: false,
        }
    }

    /// Set the change marker.
    #[must_use]
    pub fn with_change_marker(mut self, marker: impl Into<ChangeMarker>) -> Self {
        self.change_marker = Some(marker.into());
        self
    }

    /// Set the creation marker.
    #[must_use]
    pub fn with_created_marker(mut self, marker: impl Into<ChangeMarker>) -> Self {
        self.created_marker = Some(marker.into());
        self
    }

    /// Mark the entry as a tombstone.
    #[must_use]
    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }
}
