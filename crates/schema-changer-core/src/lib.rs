//! # Schema Changer
//!
//! Reconciles schema-scoped identifiers after a bundle is merged into a
//! target environment whose datasource already owns a schema id.
//!
//! ## Architecture
//!
//! ```text
//! RuleCatalog ─┐
//!              ├─▶ filter ─▶ FilteredRuleSet ─┐   (once per merge)
//! inspect ─────┘                              │
//!                                             ▼
//! resolve target id, resolve bundle id ─▶ driver ─▶ rewrite statements
//!                                             │
//!                                             ▼
//!                                        MergeReport
//! ```
//!
//! The engine owns no connection and no transaction. The host hands in a
//! [`Session`] inside its own transaction and rolls back when
//! [`reconcile`] returns `Err`.

pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod filter;
pub mod hook;
pub mod identifier;
pub mod inspector;
pub mod memory;
pub mod report;
pub mod resolver;
pub mod session;
pub mod sql;

pub use catalog::{
    BUILTIN_RULES, CATALOG_VERSION, ColumnStorage, Encoding, RewriteRule, RewriteStatement,
    RuleCatalog,
};
pub use config::ReconcileConfig;
pub use descriptor::{DatasourceDefinition, DatasourceDescriptor, schemas_from_json};
pub use driver::{MergeContext, reconcile};
pub use error::{ConfigError, DataAccessError, ReconcileError};
pub use filter::{FilteredRuleSet, TableRules, filter};
pub use hook::{BEFORE_MERGE_EVENT, HOOK_NAME, SchemaChanger};
pub use identifier::{DatasourceId, SchemaId};
pub use inspector::{SchemaObjects, inspect};
pub use memory::MemorySession;
pub use report::{
    AppliedRule, DatasourceOutcome, DatasourceReport, MergeReport, RewriteSummary, RuleFailure,
    SkipReason, TableRewrite,
};
pub use resolver::{
    Resolution, ResolutionWarning, resolve_bundle_schema_id, resolve_target_schema_id,
};
pub use session::{NoProgress, Progress, ProgressSink, Session, TableColumns};
