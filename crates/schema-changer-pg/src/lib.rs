//! PostgreSQL [`Session`] for schema-changer.
//!
//! Wraps any [`GenericClient`]. Pick the constructor by how the client runs
//! statements:
//!
//! - [`PgSession::in_transaction`] for the `Transaction` the import pipeline
//!   already opened. Each rewrite runs under its own savepoint, so a failing
//!   rule is rolled back alone and later rules and lookups still run.
//! - [`PgSession::new`] for an autocommit `Client`, where every statement is
//!   already its own transaction.
//!
//! ```no_run
//! # async fn run(client: &mut tokio_postgres::Client) -> Result<(), Box<dyn std::error::Error>> {
//! use schema_changer_core::{DatasourceDescriptor, MergeContext, NoProgress, SchemaChanger};
//! use schema_changer_pg::PgSession;
//!
//! let tx = client.transaction().await?;
//! let mut session = PgSession::in_transaction(tx);
//! let datasources = [DatasourceDescriptor::assign("ds-1")];
//! let report = SchemaChanger::default()
//!     .on_before_merge(MergeContext {
//!         session: &mut session,
//!         datasources: &datasources,
//!         tenant: "acme",
//!         progress: &mut NoProgress,
//!     })
//!     .await?;
//! if report.is_clean() {
//!     session.into_inner().commit().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod queries;

use async_trait::async_trait;
use schema_changer_core::{
    DataAccessError, DatasourceId, RewriteStatement, Session, TableColumns, schemas_from_json,
};
use serde_json::Value;
use tokio_postgres::GenericClient;

pub struct PgSession<C> {
    client: C,
    savepoints: bool,
}

impl<C> PgSession<C>
where
    C: GenericClient + Send + Sync,
{
    /// Session over an autocommit client. Rewrites run bare.
    pub fn new(client: C) -> Self {
        Self {
            client,
            savepoints: false,
        }
    }

    /// Session over an open transaction. Every rewrite runs under a savepoint
    /// that is rolled back when the statement fails.
    pub fn in_transaction(transaction: C) -> Self {
        Self {
            client: transaction,
            savepoints: true,
        }
    }

    pub fn uses_statement_savepoints(&self) -> bool {
        self.savepoints
    }

    pub fn into_inner(self) -> C {
        self.client
    }

    async fn execute_isolated(&self, sql: &str) -> Result<u64, tokio_postgres::Error> {
        self.client.batch_execute(queries::SAVEPOINT).await?;
        match self.client.execute(sql, &[]).await {
            Ok(rows) => {
                self.client.batch_execute(queries::RELEASE_SAVEPOINT).await?;
                Ok(rows)
            }
            Err(err) => {
                if let Err(rollback) = self
                    .client
                    .batch_execute(queries::ROLLBACK_TO_SAVEPOINT)
                    .await
                {
                    tracing::error!(
                        error = %rollback,
                        statement_error = %err,
                        "could not roll back to savepoint after failed rewrite"
                    );
                }
                Err(err)
            }
        }
    }
}

fn data_access(context: &'static str) -> impl FnOnce(tokio_postgres::Error) -> DataAccessError {
    move |err| DataAccessError::with_source(format!("{context}: {err}"), err)
}

#[async_trait]
impl<C> Session for PgSession<C>
where
    C: GenericClient + Send + Sync,
{
    async fn table_columns(&mut self) -> Result<Vec<TableColumns>, DataAccessError> {
        let rows = self
            .client
            .query(queries::TABLE_COLUMNS, &[])
            .await
            .map_err(data_access("schema introspection failed"))?;

        rows.iter()
            .map(|row| {
                Ok(TableColumns {
                    table_name: row.try_get("table_name")?,
                    columns: row.try_get("columns")?,
                })
            })
            .collect::<Result<_, tokio_postgres::Error>>()
            .map_err(data_access("unexpected introspection row"))
    }

    async fn bundle_schema_ids(
        &mut self,
        datasource_id: &DatasourceId,
    ) -> Result<Vec<String>, DataAccessError> {
        let rows = self
            .client
            .query(queries::BUNDLE_SCHEMA_IDS, &[&datasource_id.as_str()])
            .await
            .map_err(data_access("bundle schema lookup failed"))?;

        rows.iter()
            .map(|row| row.try_get::<_, String>("schema_id"))
            .collect::<Result<_, _>>()
            .map_err(data_access("unexpected bundle schema row"))
    }

    async fn datasource_schemas(
        &mut self,
        datasource_id: &DatasourceId,
        tenant: &str,
    ) -> Result<Option<Vec<String>>, DataAccessError> {
        let row = self
            .client
            .query_opt(queries::DATASOURCE_SCHEMAS, &[&datasource_id.as_str(), &tenant])
            .await
            .map_err(data_access("target datasource lookup failed"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let schemas: Option<Value> = row
            .try_get("schemas")
            .map_err(data_access("unexpected target datasource row"))?;
        Ok(Some(
            schemas.as_ref().map(schemas_from_json).unwrap_or_default(),
        ))
    }

    async fn execute(&mut self, statement: &RewriteStatement) -> Result<u64, DataAccessError> {
        let result = if self.savepoints {
            self.execute_isolated(&statement.sql).await
        } else {
            self.client.execute(statement.sql.as_str(), &[]).await
        };

        let rows = result.map_err(data_access("rewrite failed"))?;
        tracing::debug!(
            table = statement.rule.table,
            column = statement.rule.column,
            rows,
            "rewrite applied"
        );
        Ok(rows)
    }
}
