//! Typed attributes
//!
//! An attribute declares its type by name (`float`, `guid`, `TranslatedString`,
//! ...). The declared type decides whether the value is a literal string or a
//! localization handle resolved externally to display text.

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

/// Declared type of a localization-bound attribute
pub const TRANSLATED_STRING: &str = "TranslatedString";

/// Declared type of identifier attributes subject to cross-document remapping
pub const IDENTIFIER: &str = "guid";

/// Declared type of floating-point attributes (timestamps among them)
pub const FLOAT: &str = "float";

/// Value of an attribute: literal, or an opaque localization handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Plain string form of the value
    Literal(String),
    /// Localization handle, resolved externally; `version` is the handle
    /// format version recorded in the serialized output
    Handle { handle: String, version: u16 },
}

impl AttrValue {
    /// The raw string carried by this value (handle string for handles)
    pub fn as_str(&self) -> &str {
        match self {
            AttrValue::Literal(v) => v,
            AttrValue::Handle { handle, .. } => handle,
        }
    }
}

/// A single (name, declared type, value) attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub ty: String,
    pub value: AttrValue,
}

impl Attribute {
    /// Literal attribute with the given declared type
    pub fn new(name: impl Into<String>, ty: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            value: AttrValue::Literal(value.into()),
        }
    }

    /// Localization-bound attribute (serialized as a handle, version 1)
    pub fn translated(name: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: TRANSLATED_STRING.to_string(),
            value: AttrValue::Handle {
                handle: handle.into(),
                version: 1,
            },
        }
    }

    /// Identifier attribute (`guid` declared type)
    pub fn identifier(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, IDENTIFIER, value)
    }

    /// Float attribute rendered with the shortest round-trippable form
    pub fn float(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, FLOAT, value.to_string())
    }

    /// Raw string form of the value
    pub fn value_str(&self) -> &str {
        self.value.as_str()
    }

    /// Whether this attribute carries an identifier subject to remapping
    pub fn is_identifier(&self) -> bool {
        self.ty == IDENTIFIER
    }

    /// Whether this attribute carries a float
    pub fn is_float(&self) -> bool {
        self.ty == FLOAT
    }

    /// Parse the value as `f64`
    pub fn as_f64(&self) -> Result<f64, DocumentError> {
        self.value_str().parse::<f64>().map_err(|e| {
            DocumentError::parse(format!("attribute '{}' is not a float: {e}", self.name))
        })
    }

    /// Parse the value as `i64`
    pub fn as_i64(&self) -> Result<i64, DocumentError> {
        self.value_str().parse::<i64>().map_err(|e| {
            DocumentError::parse(format!("attribute '{}' is not an integer: {e}", self.name))
        })
    }

    /// Replace the value in place, preserving the literal/handle form
    pub fn set_value(&mut self, new_value: impl Into<String>) {
        match &mut self.value {
            AttrValue::Literal(v) => *v = new_value.into(),
            AttrValue::Handle { handle, .. } => *handle = new_value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_attribute_formatting() {
        assert_eq!(Attribute::float("Duration", 7.0).value_str(), "7");
        assert_eq!(Attribute::float("Duration", 7.25).value_str(), "7.25");
    }

    #[test]
    fn test_translated_uses_handle_form() {
        let attr = Attribute::translated("TagText", "h12345");
        assert!(matches!(attr.value, AttrValue::Handle { .. }));
        assert_eq!(attr.value_str(), "h12345");
    }

    #[test]
    fn test_identifier_detection() {
        assert!(Attribute::identifier("ID", "abc").is_identifier());
        assert!(!Attribute::new("ID", "FixedString", "abc").is_identifier());
    }

    #[test]
    fn test_as_f64_rejects_garbage() {
        let attr = Attribute::new("EndTime", FLOAT, "not-a-number");
        assert!(attr.as_f64().is_err());
    }
}
