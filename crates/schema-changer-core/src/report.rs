//! Result kinds of a reconciliation run.
//!
//! A merge either returns a [`MergeReport`] or a fatal
//! [`ReconcileError`](crate::ReconcileError). The report says, per
//! datasource, whether it was skipped, fully rewritten, or rewritten with
//! some rules failing, so the host can decide on rollback with the facts in
//! hand.

use crate::identifier::{DatasourceId, SchemaId};
use crate::resolver::ResolutionWarning;
use serde::Serialize;

/// Why a datasource was left alone. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoTargetSchema,
    NoBundleSchema,
    IdenticalSchemas,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedRule {
    pub column: &'static str,
    pub sql: String,
    /// `None` in dry runs.
    pub rows_affected: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRewrite {
    pub table: &'static str,
    pub applied: Vec<AppliedRule>,
}

/// A rule whose statement failed. Sibling rules and tables still ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleFailure {
    pub table: &'static str,
    pub column: &'static str,
    pub sql: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub from: SchemaId,
    pub to: SchemaId,
    pub tables: Vec<TableRewrite>,
}

impl RewriteSummary {
    pub fn statement_count(&self) -> usize {
        self.tables.iter().map(|table| table.applied.len()).sum()
    }

    pub fn rows_affected(&self) -> u64 {
        self.tables
            .iter()
            .flat_map(|table| &table.applied)
            .filter_map(|rule| rule.rows_affected)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatasourceOutcome {
    Skipped {
        reason: SkipReason,
    },
    Completed(RewriteSummary),
    PartialFailure {
        summary: RewriteSummary,
        failures: Vec<RuleFailure>,
    },
}

impl DatasourceOutcome {
    pub fn summary(&self) -> Option<&RewriteSummary> {
        match self {
            Self::Skipped { .. } => None,
            Self::Completed(summary) | Self::PartialFailure { summary, .. } => Some(summary),
        }
    }

    pub fn failures(&self) -> &[RuleFailure] {
        match self {
            Self::PartialFailure { failures, .. } => failures,
            _ => &[],
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped { reason } => Some(*reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasourceReport {
    pub datasource_id: DatasourceId,
    pub outcome: DatasourceOutcome,
    pub warnings: Vec<ResolutionWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub catalog_version: u32,
    pub dry_run: bool,
    pub datasources: Vec<DatasourceReport>,
}

impl MergeReport {
    /// No rule failed anywhere.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&DatasourceId, &RuleFailure)> {
        self.datasources.iter().flat_map(|report| {
            report
                .outcome
                .failures()
                .iter()
                .map(move |failure| (&report.datasource_id, failure))
        })
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ResolutionWarning> {
        self.datasources
            .iter()
            .flat_map(|report| report.warnings.iter())
    }

    /// Datasources whose rules ran, with or without failures.
    pub fn rewritten(&self) -> impl Iterator<Item = &DatasourceReport> {
        self.datasources
            .iter()
            .filter(|report| report.outcome.summary().is_some())
    }

    pub fn datasource(&self, datasource_id: &str) -> Option<&DatasourceReport> {
        self.datasources
            .iter()
            .find(|report| report.datasource_id.as_str() == datasource_id)
    }
}
