//! Attribute schemas and typed values.
//!
//! Plain attributes are typed by their schema; derived attributes are computed
//! from an expression; virtual attributes hold values resolved elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use xavyo_connector::operation::AttributeValue;

/// Schema violations detected when building an attribute.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Value type does not match the schema type.
    #[error("Value of type {actual} not allowed for schema '{schema}' of type {expected}")]
    TypeMismatch {
        schema: String,
        expected: SchemaType,
        actual: SchemaType,
    },

    /// More than one value for a single-valued schema.
    #[error("Schema '{schema}' is single-valued, got {count} values")]
    TooManyValues { schema: String, count: usize },

    /// Enum value outside the allowed set.
    #[error("Value '{value}' not allowed for enum schema '{schema}'")]
    EnumValueNotAllowed { schema: String, value: String },
}

/// Type of a plain schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    Boolean,
    Date,
    Double,
    Long,
    String,
    Enum,
    Binary,
}

impl SchemaType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Boolean => "boolean",
            SchemaType::Date => "date",
            SchemaType::Double => "double",
            SchemaType::Long => "long",
            SchemaType::String => "string",
            SchemaType::Enum => "enum",
            SchemaType::Binary => "binary",
        }
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Boolean(bool),
    Date(DateTime<Utc>),
    Double(f64),
    Long(i64),
    String(String),
    Enum(String),
    Binary(Vec<u8>),
}

impl AttrValue {
    /// The schema type this value belongs to.
    #[must_use]
    pub fn schema_type(&self) -> SchemaType {
        match self {
            AttrValue::Boolean(_) => SchemaType::Boolean,
            AttrValue::Date(_) => SchemaType::Date,
            AttrValue::Double(_) => SchemaType::Double,
            AttrValue::Long(_) => SchemaType::Long,
            AttrValue::String(_) => SchemaType::String,
            AttrValue::Enum(_) => SchemaType::Enum,
            AttrValue::Binary(_) => SchemaType::Binary,
        }
    }

    /// Render as text, as used by expressions.
    ///
    /// Dates use `pattern` (a `chrono` format string) when given, RFC 3339
    /// otherwise. Binary values are rendered as hex.
    #[must_use]
    pub fn as_text(&self, pattern: Option<&str>) -> String {
        match self {
            AttrValue::Boolean(b) => b.to_string(),
            AttrValue::Date(d) => match pattern {
                Some(p) => d.format(p).to_string(),
                None => d.to_rfc3339(),
            },
            AttrValue::Double(v) => v.to_string(),
            AttrValue::Long(v) => v.to_string(),
            AttrValue::String(s) | AttrValue::Enum(s) => s.clone(),
            AttrValue::Binary(bytes) => hex::encode(bytes),
        }
    }

    /// Convert to the connector value model.
    #[must_use]
    pub fn to_connector(&self, pattern: Option<&str>) -> AttributeValue {
        match self {
            AttrValue::Boolean(b) => AttributeValue::Boolean(*b),
            AttrValue::Double(v) => AttributeValue::Float(*v),
            AttrValue::Long(v) => AttributeValue::Integer(*v),
            AttrValue::Binary(bytes) => AttributeValue::Binary(bytes.clone()),
            AttrValue::Date(_) | AttrValue::String(_) | AttrValue::Enum(_) => {
                AttributeValue::String(self.as_text(pattern))
            }
        }
    }
}

/// Schema of a plain (stored) attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainSchema {
    pub name: String,
    pub schema_type: SchemaType,
    #[serde(default)]
    pub multivalue: bool,
    #[serde(default)]
    pub read_only: bool,
    /// Format used to render dates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_pattern: Option<String>,
    /// Allowed values for enum schemas; empty means unrestricted.
    #[serde(default)]
    pub enum_values: Vec<String>,
}

impl PlainSchema {
    /// Create a single-valued, writable schema.
    pub fn new(name: impl Into<String>, schema_type: SchemaType) -> Self {
        Self {
            name: name.into(),
            schema_type,
            multivalue: false,
            read_only: false,
            conversion_pattern: None,
            enum_values: Vec::new(),
        }
    }

    #[must_use]
    pub fn multivalued(mut self) -> Self {
        self.multivalue = true;
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_conversion_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.conversion_pattern = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn with_enum_values(mut self, values: Vec<String>) -> Self {
        self.enum_values = values;
        self
    }

    /// Check values against this schema.
    pub fn validate(&self, values: &[AttrValue]) -> Result<(), SchemaError> {
        if !self.multivalue && values.len() > 1 {
            return Err(SchemaError::TooManyValues {
                schema: self.name.clone(),
                count: values.len(),
            });
        }
        for value in values {
            if value.schema_type() != self.schema_type {
                return Err(SchemaError::TypeMismatch {
                    schema: self.name.clone(),
                    expected: self.schema_type,
                    actual: value.schema_type(),
                });
            }
            if let AttrValue::Enum(v) = value {
                if !self.enum_values.is_empty() && !self.enum_values.contains(v) {
                    return Err(SchemaError::EnumValueNotAllowed {
                        schema: self.name.clone(),
                        value: v.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Schema of a derived attribute, computed from an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerSchema {
    pub name: String,
    /// `${name}` template over plain and earlier derived attributes.
    pub expression: String,
}

impl DerSchema {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// Schema of a virtual attribute, resolved from an external system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirSchema {
    pub name: String,
    #[serde(default)]
    pub multivalue: bool,
    #[serde(default)]
    pub read_only: bool,
}

impl VirSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multivalue: false,
            read_only: false,
        }
    }

    #[must_use]
    pub fn multivalued(mut self) -> Self {
        self.multivalue = true;
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// A plain attribute: schema plus typed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainAttr {
    schema: PlainSchema,
    values: Vec<AttrValue>,
}

impl PlainAttr {
    /// Build an attribute, enforcing the schema's type and cardinality.
    pub fn new(schema: PlainSchema, values: Vec<AttrValue>) -> Result<Self, SchemaError> {
        schema.validate(&values)?;
        Ok(Self { schema, values })
    }

    /// Single string value shortcut.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            schema: PlainSchema::new(name, SchemaType::String),
            values: vec![AttrValue::String(value.into())],
        }
    }

    #[must_use]
    pub fn schema(&self) -> &PlainSchema {
        &self.schema
    }

    /// Values; a single-valued schema yields at most one.
    #[must_use]
    pub fn values(&self) -> &[AttrValue] {
        &self.values
    }
}

/// A derived attribute attached to a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerAttr {
    pub schema: DerSchema,
}

/// A virtual attribute attached to a subject.
///
/// `values` is `None` until the values were resolved from the external
/// system; `Some(vec![])` means resolved and empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirAttr {
    pub schema: VirSchema,
    #[serde(default)]
    pub values: Option<Vec<String>>,
}

impl VirAttr {
    pub fn resolved(schema: VirSchema, values: Vec<String>) -> Self {
        Self {
            schema,
            values: Some(values),
        }
    }

    pub fn unresolved(schema: VirSchema) -> Self {
        Self {
            schema,
            values: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_plain_attr_enforces_type() {
        let schema = PlainSchema::new("age", SchemaType::Long);
        let err = PlainAttr::new(schema.clone(), vec![AttrValue::String("x".into())]).unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { .. }));

        let attr = PlainAttr::new(schema, vec![AttrValue::Long(42)]).unwrap();
        assert_eq!(attr.values(), &[AttrValue::Long(42)]);
    }

    #[test]
    fn test_single_valued_schema_rejects_many() {
        let schema = PlainSchema::new("mail", SchemaType::String);
        let err = PlainAttr::new(
            schema,
            vec![AttrValue::String("a".into()), AttrValue::String("b".into())],
        )
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::TooManyValues {
                schema: "mail".into(),
                count: 2
            }
        );
    }

    #[test]
    fn test_multivalued_may_be_empty() {
        let schema = PlainSchema::new("phones", SchemaType::String).multivalued();
        let attr = PlainAttr::new(schema, vec![]).unwrap();
        assert!(attr.values().is_empty());
    }

    #[test]
    fn test_enum_values_restricted() {
        let schema = PlainSchema::new("level", SchemaType::Enum)
            .with_enum_values(vec!["low".into(), "high".into()]);
        assert!(PlainAttr::new(schema.clone(), vec![AttrValue::Enum("high".into())]).is_ok());
        assert!(PlainAttr::new(schema, vec![AttrValue::Enum("mid".into())]).is_err());
    }

    #[test]
    fn test_date_rendering() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let value = AttrValue::Date(date);
        assert_eq!(value.as_text(Some("%Y-%m-%d")), "2024-03-01");
        assert_eq!(
            value.to_connector(None),
            AttributeValue::String("2024-03-01T12:30:00+00:00".into())
        );
    }

    #[test]
    fn test_connector_conversion() {
        assert_eq!(AttrValue::Long(7).to_connector(None), AttributeValue::Integer(7));
        assert_eq!(
            AttrValue::Boolean(true).to_connector(None),
            AttributeValue::Boolean(true)
        );
        assert_eq!(
            AttrValue::Binary(vec![0xca, 0xfe]).as_text(None),
            "cafe"
        );
    }
}
