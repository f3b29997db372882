//! Error types for schema reconciliation.

use crate::identifier::DatasourceId;
use std::error::Error as StdError;

/// A database call could not be executed.
///
/// Raised by [`Session`](crate::Session) implementations and carried through
/// unchanged; the engine never retries.
#[derive(Debug, thiserror::Error)]
#[error("data access error: {message}")]
pub struct DataAccessError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl DataAccessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Errors that abort a whole merge.
///
/// Anything returned as `Err` from [`reconcile`](crate::reconcile) means the
/// caller should roll back the enclosing transaction. Per-rule failures are
/// not errors; they are reported in the [`MergeReport`](crate::MergeReport).
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Introspection or a lookup query failed.
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),

    /// A schema identifier cannot be embedded in the rewrite encodings.
    #[error("invalid schema identifier {value:?}: {reason}")]
    InvalidSchemaId { value: String, reason: &'static str },

    /// A catalog rule is malformed.
    #[error("invalid rewrite rule {table}.{column}: {reason}")]
    InvalidRule {
        table: &'static str,
        column: &'static str,
        reason: &'static str,
    },

    /// Reconciliation of one datasource failed before any rule could run.
    #[error("could not change schema ids for datasource {datasource_id}: {source}")]
    Fatal {
        datasource_id: DatasourceId,
        #[source]
        source: Box<ReconcileError>,
    },
}

/// Errors raised while loading [`ReconcileConfig`](crate::ReconcileConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}
