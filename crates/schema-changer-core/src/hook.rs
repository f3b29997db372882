//! Entry point the import pipeline registers on its before-merge event.

use crate::catalog::RuleCatalog;
use crate::config::ReconcileConfig;
use crate::driver::{MergeContext, reconcile};
use crate::error::ReconcileError;
use crate::report::MergeReport;
use crate::session::{ProgressSink, Session};

/// Pipeline event this hook listens on.
pub const BEFORE_MERGE_EVENT: &str = "import.beforeMerge";

/// Name the hook registers under.
pub const HOOK_NAME: &str = "schema-changer";

/// Configured reconciler, built once at registration.
#[derive(Debug, Clone, Default)]
pub struct SchemaChanger {
    catalog: RuleCatalog,
    config: ReconcileConfig,
}

impl SchemaChanger {
    pub fn new(config: ReconcileConfig) -> Self {
        Self {
            catalog: RuleCatalog::builtin(),
            config,
        }
    }

    pub fn with_catalog(mut self, catalog: RuleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn name(&self) -> &'static str {
        HOOK_NAME
    }

    pub fn event(&self) -> &'static str {
        BEFORE_MERGE_EVENT
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub async fn on_before_merge<S, P>(
        &self,
        ctx: MergeContext<'_, S, P>,
    ) -> Result<MergeReport, ReconcileError>
    where
        S: Session + ?Sized,
        P: ProgressSink + ?Sized,
    {
        reconcile(ctx, &self.catalog, &self.config).await
    }
}
