//! Connector capability operation types
//!
//! Types exchanged with connectors: UIDs, attribute values and sets, remote
//! objects and per-call options.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved attribute carrying the external display name of an object.
pub const NAME_ATTR: &str = "__NAME__";

/// Reserved attribute carrying the external unique identifier of an object.
pub const UID_ATTR: &str = "__UID__";

/// Reserved attribute carrying a clear-text password.
pub const PASSWORD_ATTR: &str = "__PASSWORD__";

/// Unique identifier for an object in a target system.
///
/// Different systems use different identifier schemes:
/// - LDAP: Distinguished Name (DN) or entryUUID
/// - Database: Primary key column value
/// - REST: Resource ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid {
    /// The attribute name used as the identifier (e.g., "dn", "id", "uid").
    attribute_name: String,
    /// The actual value of the identifier.
    value: String,
}

impl Uid {
    /// Create a new UID with the given attribute name and value.
    pub fn new(attribute_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            value: value.into(),
        }
    }

    /// Create a UID using the default "uid" attribute name.
    pub fn from_value(value: impl Into<String>) -> Self {
        Self::new("uid", value)
    }

    /// Get the attribute name.
    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    /// Get the value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.attribute_name, self.value)
    }
}

/// A value for an attribute, which may be single or multi-valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// No value (null).
    Null,
    /// A single string value.
    String(String),
    /// A single integer value.
    Integer(i64),
    /// A single boolean value.
    Boolean(bool),
    /// A single floating-point value.
    Float(f64),
    /// Binary data.
    Binary(Vec<u8>),
    /// Multiple values.
    Array(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

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

    /// Check if this is multi-valued.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, AttributeValue::Array(_))
    }

    /// Flatten into the list of individual values. `Null` yields nothing.
    pub fn values(&self) -> Vec<&AttributeValue> {
        match self {
            AttributeValue::Null => Vec::new(),
            AttributeValue::Array(arr) => arr.iter().flat_map(|v| v.values()).collect(),
            other => vec![other],
        }
    }

    /// Check if the value carries nothing.
    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    /// Compare two values as unordered collections.
    ///
    /// A single value equals a one-element array holding it, and `Null`
    /// equals an empty array.
    pub fn equivalent(&self, other: &AttributeValue) -> bool {
        let left = self.values();
        let right = other.values();
        if left.len() != right.len() {
            return false;
        }
        left.iter().all(|v| {
            let in_left = left.iter().filter(|x| *x == v).count();
            let in_right = right.iter().filter(|x| *x == v).count();
            in_left == in_right
        })
    }

    /// Union of two values; duplicates are kept once.
    pub fn union(&self, other: &AttributeValue) -> AttributeValue {
        let mut merged: Vec<AttributeValue> = Vec::new();
        for value in self.values().into_iter().chain(other.values()) {
            if !merged.contains(value) {
                merged.push(value.clone());
            }
        }
        AttributeValue::Array(merged)
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

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(vec: Vec<T>) -> Self {
        AttributeValue::Array(vec.into_iter().map(Into::into).collect())
    }
}

/// A set of named attributes, as sent to or read from a connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    /// Map of attribute name to attribute value(s).
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

    /// Set an attribute value, replacing any previous one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Set an attribute using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Add values to an attribute, merging with what is already there.
    pub fn merge(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        let name = name.into();
        let value = value.into();
        let merged = match self.attributes.get(&name) {
            Some(existing) => existing.union(&value),
            None => value,
        };
        self.attributes.insert(name, merged);
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

    /// Keep only the attributes whose name is also present in `other`.
    pub fn restricted_to(&self, other: &AttributeSet) -> AttributeSet {
        self.iter()
            .filter(|(name, _)| other.has(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Attributes of `self` that are absent from, or differ in `other`.
    pub fn difference(&self, other: &AttributeSet) -> AttributeSet {
        self.iter()
            .filter(|(name, value)| {
                other
                    .get(name)
                    .map_or(true, |existing| !existing.equivalent(value))
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

/// An object read from a target system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorObject {
    /// Object class of the remote object.
    pub object_class: String,
    /// Unique identifier of the remote object.
    pub uid: Uid,
    /// External display name of the remote object.
    pub name: String,
    /// Attributes returned by the connector.
    pub attributes: AttributeSet,
}

impl ConnectorObject {
    /// Create a remote object snapshot.
    pub fn new(
        object_class: impl Into<String>,
        uid: Uid,
        name: impl Into<String>,
        attributes: AttributeSet,
    ) -> Self {
        Self {
            object_class: object_class.into(),
            uid,
            name: name.into(),
            attributes,
        }
    }

    /// Attributes including the reserved `__NAME__` and `__UID__` entries.
    pub fn full_attributes(&self) -> AttributeSet {
        let mut attrs = self.attributes.clone();
        attrs.set(NAME_ATTR, self.name.clone());
        attrs.set(UID_ATTR, self.uid.value().to_string());
        attrs
    }
}

/// Options passed alongside every connector call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOptions {
    /// Attributes the connector should return when reading an object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_to_get: Option<Vec<String>>,
}

impl OperationOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the attributes returned on reads.
    pub fn with_attributes_to_get(mut self, names: Vec<String>) -> Self {
        self.attributes_to_get = Some(names);
        self
    }
}
