//! Point-in-time snapshot of the live schema.

use crate::error::ReconcileError;
use crate::session::{Session, TableColumns};
use std::collections::{BTreeMap, BTreeSet};

/// Table name → existing column names, for the current schema only.
///
/// Built once per merge. Not kept consistent with concurrent DDL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaObjects {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl SchemaObjects {
    pub fn from_rows(rows: impl IntoIterator<Item = TableColumns>) -> Self {
        let mut tables: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for row in rows {
            tables
                .entry(row.table_name)
                .or_default()
                .extend(row.columns);
        }
        Self { tables }
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|columns| columns.contains(column))
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// Introspect the session's current schema.
///
/// Failure is fatal: without a schema map no rule can be filtered safely.
pub async fn inspect<S>(session: &mut S) -> Result<SchemaObjects, ReconcileError>
where
    S: Session + ?Sized,
{
    match session.table_columns().await {
        Ok(rows) => {
            let objects = SchemaObjects::from_rows(rows);
            tracing::debug!(tables = objects.table_count(), "inspected current schema");
            Ok(objects)
        }
        Err(err) => {
            tracing::error!(error = %err, "could not inspect current schema");
            Err(err.into())
        }
    }
}
