//! In-memory [`Session`] over JSON rows.
//!
//! Applies rewrite rules through their native encoding semantics instead of
//! SQL, so reconciliation can be exercised without a database. Text columns
//! hold JSON strings, `jsonb` columns hold documents, `jsonb[]` columns hold
//! arrays of documents.

use crate::catalog::RewriteStatement;
use crate::descriptor::schemas_from_json;
use crate::error::DataAccessError;
use crate::identifier::DatasourceId;
use crate::session::{Session, TableColumns};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Map<String, Value>>,
}

/// Current schema plus tenant datasources, held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    tables: BTreeMap<String, MemoryTable>,
    datasources: BTreeMap<(String, String), Value>,
    executed: Vec<String>,
    failing_rules: BTreeSet<(String, String)>,
    fail_introspection: bool,
    fail_lookups: bool,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or extend) a table with the given columns.
    pub fn add_table(&mut self, table: &str, columns: &[&str]) -> &mut Self {
        let entry = self.tables.entry(table.to_string()).or_default();
        for column in columns {
            if !entry.columns.iter().any(|c| c == column) {
                entry.columns.push(column.to_string());
            }
        }
        self
    }

    /// Append a row. Unknown tables are created from the row's keys.
    pub fn insert(&mut self, table: &str, row: Value) -> &mut Self {
        let Value::Object(row) = row else {
            tracing::warn!(table, "ignoring non-object row");
            return self;
        };
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        if !self.tables.contains_key(table) {
            self.add_table(table, &keys);
        }
        if let Some(entry) = self.tables.get_mut(table) {
            entry.rows.push(row);
        }
        self
    }

    /// Register a target datasource for a tenant. `schemas` is stored as-is.
    pub fn add_datasource(&mut self, tenant: &str, id: &str, schemas: &[&str]) -> &mut Self {
        let schemas = Value::from(schemas.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        self.add_datasource_value(tenant, id, schemas)
    }

    /// Register a datasource with a raw stored schema list (array, scalar or null).
    pub fn add_datasource_value(&mut self, tenant: &str, id: &str, schemas: Value) -> &mut Self {
        self.datasources
            .insert((tenant.to_string(), id.to_string()), schemas);
        self
    }

    /// Make every execution of `table.column` fail.
    pub fn fail_rule(&mut self, table: &str, column: &str) -> &mut Self {
        self.failing_rules
            .insert((table.to_string(), column.to_string()));
        self
    }

    pub fn fail_introspection(&mut self) -> &mut Self {
        self.fail_introspection = true;
        self
    }

    pub fn fail_lookups(&mut self) -> &mut Self {
        self.fail_lookups = true;
        self
    }

    pub fn rows(&self, table: &str) -> &[Map<String, Value>] {
        self.tables
            .get(table)
            .map(|entry| entry.rows.as_slice())
            .unwrap_or_default()
    }

    /// SQL of every statement executed so far, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn table_columns(&mut self) -> Result<Vec<TableColumns>, DataAccessError> {
        if self.fail_introspection {
            return Err(DataAccessError::new("introspection unavailable"));
        }
        Ok(self
            .tables
            .iter()
            .map(|(name, table)| TableColumns {
                table_name: name.clone(),
                columns: table.columns.clone(),
            })
            .collect())
    }

    async fn bundle_schema_ids(
        &mut self,
        datasource_id: &DatasourceId,
    ) -> Result<Vec<String>, DataAccessError> {
        if self.fail_lookups {
            return Err(DataAccessError::new("mapping lookup unavailable"));
        }
        let mapping = self
            .tables
            .get("mapping")
            .ok_or_else(|| DataAccessError::new("relation \"mapping\" does not exist"))?;

        let mut ids: Vec<String> = Vec::new();
        for row in &mapping.rows {
            if row.get("datasourceId").and_then(Value::as_str) != Some(datasource_id.as_str()) {
                continue;
            }
            if let Some(schema_id) = row.get("schemaId").and_then(Value::as_str)
                && !ids.iter().any(|id| id == schema_id)
            {
                ids.push(schema_id.to_string());
            }
        }
        Ok(ids)
    }

    async fn datasource_schemas(
        &mut self,
        datasource_id: &DatasourceId,
        tenant: &str,
    ) -> Result<Option<Vec<String>>, DataAccessError> {
        if self.fail_lookups {
            return Err(DataAccessError::new("datasource lookup unavailable"));
        }
        Ok(self
            .datasources
            .get(&(tenant.to_string(), datasource_id.as_str().to_string()))
            .map(schemas_from_json))
    }

    async fn execute(&mut self, statement: &RewriteStatement) -> Result<u64, DataAccessError> {
        let rule = &statement.rule;
        if self
            .failing_rules
            .contains(&(rule.table.to_string(), rule.column.to_string()))
        {
            return Err(DataAccessError::new(format!(
                "statement rejected on {}.{}",
                rule.table, rule.column
            )));
        }

        let table = self.tables.get_mut(rule.table).ok_or_else(|| {
            DataAccessError::new(format!("relation \"{}\" does not exist", rule.table))
        })?;
        if !table.columns.iter().any(|c| c == rule.column) {
            return Err(DataAccessError::new(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                rule.column, rule.table
            )));
        }

        let from = statement.from.as_str();
        let to = statement.to.as_str();
        let mut changed = 0;
        for row in &mut table.rows {
            if let Some(value) = row.get_mut(rule.column)
                && rule.rewrite_value(value, from, to)
            {
                changed += 1;
            }
        }

        self.executed.push(statement.sql.clone());
        Ok(changed)
    }
}
