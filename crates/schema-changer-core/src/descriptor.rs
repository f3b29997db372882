//! Target datasource descriptors produced earlier in the import pipeline.

use crate::identifier::DatasourceId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// How a bundle datasource lands in the target environment.
///
/// Serialized externally tagged, matching the pipeline's wire shape:
/// `{"assign": "ds-1"}` or `{"create": {"id": "ds-1", "schemas": ["S2"]}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasourceDescriptor {
    /// Bind to a datasource that already exists in the target environment.
    Assign(DatasourceId),
    /// Create a new datasource from the bundled definition.
    Create(DatasourceDefinition),
}

impl DatasourceDescriptor {
    pub fn assign(id: impl Into<String>) -> Self {
        Self::Assign(DatasourceId::new(id))
    }

    pub fn create(definition: DatasourceDefinition) -> Self {
        Self::Create(definition)
    }

    /// The id the bundle's mapping rows are scoped to after merge.
    pub fn datasource_id(&self) -> &DatasourceId {
        match self {
            Self::Assign(id) => id,
            Self::Create(definition) => &definition.id,
        }
    }
}

/// Definition of a datasource about to be created.
///
/// Only `id` and `schemas` are read here; everything else rides along in
/// `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasourceDefinition {
    pub id: DatasourceId,
    #[serde(default, deserialize_with = "one_or_many")]
    pub schemas: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DatasourceDefinition {
    pub fn new(id: impl Into<String>, schemas: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            id: DatasourceId::new(id),
            schemas: schemas.into_iter().map(Into::into).collect(),
            extra: Map::new(),
        }
    }
}

/// Normalize a stored schema list that may be an array, a scalar, or null.
pub fn schemas_from_json(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        other => scalar_to_string(other).into_iter().collect(),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(schemas_from_json).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assign_wire_shape() {
        let descriptor: DatasourceDescriptor =
            serde_json::from_value(json!({ "assign": "D1" })).expect("assign");
        assert_eq!(descriptor, DatasourceDescriptor::assign("D1"));
        assert_eq!(descriptor.datasource_id().as_str(), "D1");
    }

    #[test]
    fn create_keeps_unknown_fields() {
        let descriptor: DatasourceDescriptor = serde_json::from_value(json!({
            "create": { "id": "D9", "schemas": ["S2", "S3"], "name": "warehouse" }
        }))
        .expect("create");

        let DatasourceDescriptor::Create(definition) = &descriptor else {
            panic!("expected create descriptor");
        };
        assert_eq!(definition.schemas, vec!["S2", "S3"]);
        assert_eq!(definition.extra.get("name"), Some(&json!("warehouse")));
        assert_eq!(descriptor.datasource_id().as_str(), "D9");
    }

    #[test]
    fn schema_list_tolerates_scalar_and_null() {
        let scalar: DatasourceDefinition =
            serde_json::from_value(json!({ "id": "D1", "schemas": "S2" })).expect("scalar");
        assert_eq!(scalar.schemas, vec!["S2"]);

        let null: DatasourceDefinition =
            serde_json::from_value(json!({ "id": "D1", "schemas": null })).expect("null");
        assert!(null.schemas.is_empty());

        let missing: DatasourceDefinition =
            serde_json::from_value(json!({ "id": "D1" })).expect("missing");
        assert!(missing.schemas.is_empty());
    }

    #[test]
    fn stored_schema_lists_skip_nulls() {
        assert_eq!(
            schemas_from_json(&json!(["S1", null, 7])),
            vec!["S1".to_string(), "7".to_string()]
        );
        assert!(schemas_from_json(&Value::Null).is_empty());
    }
}
