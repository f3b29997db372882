//! Resolve which schema id a datasource's bundle rows use and which one the
//! target expects.
//!
//! Both lookups are first-wins. A bundle is expected to reference a single
//! schema per datasource and a target datasource to declare a single schema;
//! when either assumption is violated the extra candidates are surfaced as a
//! [`ResolutionWarning`] instead of being dropped silently.

use crate::descriptor::DatasourceDescriptor;
use crate::error::ReconcileError;
use crate::identifier::{DatasourceId, SchemaId};
use crate::session::Session;
use serde::Serialize;

/// Outcome of one lookup.
///
/// `candidates` holds every distinct non-blank value in lookup order. Only
/// `chosen` is validated; the others are carried as found so a malformed
/// leftover cannot block the merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub chosen: Option<SchemaId>,
    pub candidates: Vec<String>,
}

impl Resolution {
    fn first_wins(values: Vec<String>) -> Result<Self, ReconcileError> {
        let mut candidates: Vec<String> = Vec::with_capacity(values.len());
        for value in values {
            if value.trim().is_empty() || candidates.contains(&value) {
                continue;
            }
            candidates.push(value);
        }
        let chosen = candidates
            .first()
            .map(|value| SchemaId::parse(value))
            .transpose()?;
        Ok(Self { chosen, candidates })
    }

    pub fn is_ambiguous(&self) -> bool {
        self.candidates.len() > 1
    }
}

/// Something about a datasource's schema ids that the merge tolerated but
/// the caller should hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionWarning {
    MultipleBundleSchemas {
        datasource_id: DatasourceId,
        candidates: Vec<String>,
        chosen: SchemaId,
    },
    MultipleTargetSchemas {
        datasource_id: DatasourceId,
        candidates: Vec<String>,
        chosen: SchemaId,
    },
    /// The bundle schema id was already written or replaced by an earlier
    /// datasource in the same merge, so the rows being rewritten may not
    /// all belong to this datasource.
    BundleSchemaAlreadyRewritten {
        datasource_id: DatasourceId,
        schema_id: SchemaId,
        rewritten_by: DatasourceId,
    },
}

/// Schema id used by the bundle's mappings for `datasource_id`.
pub async fn resolve_bundle_schema_id<S>(
    session: &mut S,
    datasource_id: &DatasourceId,
) -> Result<Resolution, ReconcileError>
where
    S: Session + ?Sized,
{
    let values = session.bundle_schema_ids(datasource_id).await?;
    let resolution = Resolution::first_wins(values)?;

    if let Some(chosen) = &resolution.chosen
        && resolution.is_ambiguous()
    {
        tracing::warn!(
            datasource = %datasource_id,
            count = resolution.candidates.len(),
            chosen = %chosen,
            "bundle mappings reference several schemas; using first one"
        );
    }
    Ok(resolution)
}

/// Schema id the target datasource declares.
pub async fn resolve_target_schema_id<S>(
    session: &mut S,
    descriptor: &DatasourceDescriptor,
    tenant: &str,
) -> Result<Resolution, ReconcileError>
where
    S: Session + ?Sized,
{
    let datasource_id = descriptor.datasource_id();
    let values = match descriptor {
        DatasourceDescriptor::Assign(id) => session
            .datasource_schemas(id, tenant)
            .await?
            .unwrap_or_default(),
        DatasourceDescriptor::Create(definition) => definition.schemas.clone(),
    };
    let resolution = Resolution::first_wins(values)?;

    match &resolution.chosen {
        None => tracing::warn!(
            datasource = %datasource_id,
            "target datasource for import has no schemas; not converting"
        ),
        Some(chosen) if resolution.is_ambiguous() => tracing::warn!(
            datasource = %datasource_id,
            count = resolution.candidates.len(),
            chosen = %chosen,
            "target datasource for import has several schemas; using first one"
        ),
        Some(_) => {}
    }
    Ok(resolution)
}

pub(crate) fn bundle_warning(
    datasource_id: &DatasourceId,
    resolution: &Resolution,
) -> Option<ResolutionWarning> {
    let chosen = resolution.chosen.clone()?;
    resolution
        .is_ambiguous()
        .then(|| ResolutionWarning::MultipleBundleSchemas {
            datasource_id: datasource_id.clone(),
            candidates: resolution.candidates.clone(),
            chosen,
        })
}

pub(crate) fn target_warning(
    datasource_id: &DatasourceId,
    resolution: &Resolution,
) -> Option<ResolutionWarning> {
    let chosen = resolution.chosen.clone()?;
    resolution
        .is_ambiguous()
        .then(|| ResolutionWarning::MultipleTargetSchemas {
            datasource_id: datasource_id.clone(),
            candidates: resolution.candidates.clone(),
            chosen,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DatasourceDefinition;
    use crate::memory::MemorySession;
    use serde_json::json;

    fn session() -> MemorySession {
        let mut session = MemorySession::new();
        session.add_table("mapping", &["id", "datasourceId", "schemaId"]);
        session
    }

    #[tokio::test]
    async fn bundle_id_comes_from_mappings_of_that_datasource() {
        let mut session = session();
        session.insert("mapping", json!({ "id": "m1", "datasourceId": "D2", "schemaId": "S9" }));
        session.insert("mapping", json!({ "id": "m2", "datasourceId": "D1", "schemaId": null }));
        session.insert("mapping", json!({ "id": "m3", "datasourceId": "D1", "schemaId": "S1" }));

        let resolution = resolve_bundle_schema_id(&mut session, &"D1".into())
            .await
            .expect("resolves");
        assert_eq!(resolution.chosen.as_ref().map(SchemaId::as_str), Some("S1"));
        assert!(!resolution.is_ambiguous());
    }

    #[tokio::test]
    async fn bundle_ambiguity_is_first_wins_and_reported() {
        let mut session = session();
        session.insert("mapping", json!({ "id": "m1", "datasourceId": "D1", "schemaId": "S1" }));
        session.insert("mapping", json!({ "id": "m2", "datasourceId": "D1", "schemaId": "S7" }));
        session.insert("mapping", json!({ "id": "m3", "datasourceId": "D1", "schemaId": "S1" }));

        let datasource_id = DatasourceId::from("D1");
        let resolution = resolve_bundle_schema_id(&mut session, &datasource_id)
            .await
            .expect("resolves");
        assert_eq!(resolution.chosen.as_ref().map(SchemaId::as_str), Some("S1"));
        assert_eq!(resolution.candidates.len(), 2);

        let warning = bundle_warning(&datasource_id, &resolution).expect("warning");
        assert_eq!(
            serde_json::to_value(&warning).expect("serialize"),
            json!({
                "kind": "multiple_bundle_schemas",
                "datasource_id": "D1",
                "candidates": ["S1", "S7"],
                "chosen": "S1"
            })
        );
    }

    #[tokio::test]
    async fn missing_bundle_schema_resolves_to_none() {
        let mut session = session();
        let resolution = resolve_bundle_schema_id(&mut session, &"D1".into())
            .await
            .expect("resolves");
        assert_eq!(resolution, Resolution::default());
    }

    #[tokio::test]
    async fn assigned_target_reads_tenant_datasource() {
        let mut session = session();
        session.add_datasource("acme", "D1", &["S2", "S3"]);
        session.add_datasource("other", "D1", &["S8"]);

        let descriptor = DatasourceDescriptor::assign("D1");
        let resolution = resolve_target_schema_id(&mut session, &descriptor, "acme")
            .await
            .expect("resolves");
        assert_eq!(resolution.chosen.as_ref().map(SchemaId::as_str), Some("S2"));
        assert!(target_warning(descriptor.datasource_id(), &resolution).is_some());

        let elsewhere = resolve_target_schema_id(&mut session, &descriptor, "nobody")
            .await
            .expect("resolves");
        assert_eq!(elsewhere.chosen, None);
    }

    #[tokio::test]
    async fn created_target_reads_definition() {
        let mut session = session();
        let empty = DatasourceDescriptor::create(DatasourceDefinition::new("D5", Vec::<String>::new()));
        let resolution = resolve_target_schema_id(&mut session, &empty, "acme")
            .await
            .expect("resolves");
        assert_eq!(resolution.chosen, None);
        assert!(target_warning(empty.datasource_id(), &resolution).is_none());

        let single = DatasourceDescriptor::create(DatasourceDefinition::new("D5", ["S4"]));
        let resolution = resolve_target_schema_id(&mut session, &single, "acme")
            .await
            .expect("resolves");
        assert_eq!(resolution.chosen.as_ref().map(SchemaId::as_str), Some("S4"));
    }

    #[tokio::test]
    async fn unusable_chosen_value_is_fatal() {
        let mut session = session();
        let descriptor = DatasourceDescriptor::create(DatasourceDefinition::new("D5", ["bad:id", "S4"]));
        let err = resolve_target_schema_id(&mut session, &descriptor, "acme")
            .await
            .expect_err("invalid id");
        assert!(matches!(err, ReconcileError::InvalidSchemaId { .. }));
    }

    #[tokio::test]
    async fn only_the_chosen_value_is_validated() {
        let mut session = session();
        let descriptor =
            DatasourceDescriptor::create(DatasourceDefinition::new("D5", ["S4", "legacy:v1"]));
        let resolution = resolve_target_schema_id(&mut session, &descriptor, "acme")
            .await
            .expect("resolves");
        assert_eq!(resolution.chosen.as_ref().map(SchemaId::as_str), Some("S4"));
        assert_eq!(resolution.candidates, ["S4", "legacy:v1"]);
    }

    #[tokio::test]
    async fn blank_values_are_not_candidates() {
        let mut session = session();
        session.insert("mapping", json!({ "id": "m1", "datasourceId": "D1", "schemaId": "" }));
        session.insert("mapping", json!({ "id": "m2", "datasourceId": "D1", "schemaId": "  " }));
        let resolution = resolve_bundle_schema_id(&mut session, &"D1".into())
            .await
            .expect("resolves");
        assert_eq!(resolution, Resolution::default());

        let descriptor = DatasourceDescriptor::create(DatasourceDefinition::new("D5", ["", "S4"]));
        let resolution = resolve_target_schema_id(&mut session, &descriptor, "acme")
            .await
            .expect("resolves");
        assert_eq!(resolution.chosen.as_ref().map(SchemaId::as_str), Some("S4"));
        assert!(!resolution.is_ambiguous());
    }
}
