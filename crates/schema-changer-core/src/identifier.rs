//! Schema and datasource identifiers.

use crate::error::ReconcileError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token naming a schema within a tenant.
///
/// The only structure the engine relies on is that the value can sit inside a
/// SQL string literal, a JSON string, and a `:<id>+` composite key segment
/// without escaping. [`SchemaId::parse`] enforces that.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaId(String);

impl SchemaId {
    pub fn parse(value: &str) -> Result<Self, ReconcileError> {
        let invalid = |reason| ReconcileError::InvalidSchemaId {
            value: value.to_string(),
            reason,
        };

        if value.trim().is_empty() {
            return Err(invalid("empty"));
        }
        if let Some(reason) = value.chars().find_map(reserved_reason) {
            return Err(invalid(reason));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn reserved_reason(c: char) -> Option<&'static str> {
    match c {
        '"' | '\\' => Some("contains a JSON string delimiter or escape"),
        ':' | '+' => Some("contains a composite key delimiter"),
        c if c.is_ascii_control() => Some("contains a control character"),
        _ => None,
    }
}

impl TryFrom<String> for SchemaId {
    type Error = ReconcileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SchemaId> for String {
    fn from(value: SchemaId) -> Self {
        value.0
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a datasource in the target environment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasourceId(String);

impl DatasourceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DatasourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for DatasourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
