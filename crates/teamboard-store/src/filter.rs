//! Query predicates evaluated against document fields.

use serde_json::Value;

use crate::models::Fields;

/// A filter over a collection's documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every document.
    All,
    /// `field == value`.
    Eq(String, Value),
    /// `field` is an array containing `value`.
    ArrayContains(String, Value),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn array_contains(field: &str, value: impl Into<Value>) -> Self {
        Filter::ArrayContains(field.to_string(), value.into())
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => fields.get(field) == Some(value),
            Filter::ArrayContains(field, value) => match fields.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            },
        }
    }
}
