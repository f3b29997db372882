//! Seams to the host pipeline: the database session and the progress sink.
//!
//! The engine neither opens nor closes a session and never begins or ends a
//! transaction. Callers wrap the whole merge and roll back on `Err`.

use crate::catalog::RewriteStatement;
use crate::error::DataAccessError;
use crate::identifier::DatasourceId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One table of the current schema with its column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumns {
    pub table_name: String,
    pub columns: Vec<String>,
}

/// Database access the reconciler needs.
#[async_trait]
pub trait Session: Send {
    /// Tables and columns of the current schema.
    async fn table_columns(&mut self) -> Result<Vec<TableColumns>, DataAccessError>;

    /// Distinct non-null schema ids referenced by bundle mappings of a
    /// datasource, most relevant first.
    async fn bundle_schema_ids(
        &mut self,
        datasource_id: &DatasourceId,
    ) -> Result<Vec<String>, DataAccessError>;

    /// Declared schema list of an existing datasource, or `None` when the
    /// datasource does not exist for the tenant.
    async fn datasource_schemas(
        &mut self,
        datasource_id: &DatasourceId,
        tenant: &str,
    ) -> Result<Option<Vec<String>>, DataAccessError>;

    /// Execute one rewrite, returning the number of rows changed.
    async fn execute(&mut self, statement: &RewriteStatement) -> Result<u64, DataAccessError>;
}

/// Human-readable progress message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub primary: String,
}

pub trait ProgressSink {
    fn progress(&mut self, progress: Progress);
}

impl ProgressSink for Vec<Progress> {
    fn progress(&mut self, progress: Progress) {
        self.push(progress);
    }
}

/// Sink that drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&mut self, _progress: Progress) {}
}
