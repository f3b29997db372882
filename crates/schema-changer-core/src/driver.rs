//! Drive reconciliation across the datasources of one merge.
//!
//! Per datasource:
//!
//! ```text
//! resolve target id ──none──▶ Skipped(NoTargetSchema)
//!        │
//! resolve bundle id ──none──▶ Skipped(NoBundleSchema)
//!        │
//!     compare ──────equal───▶ Skipped(IdenticalSchemas)
//!        │
//! progress, then rules table by table ──▶ Completed | PartialFailure
//! ```
//!
//! Resolver errors abort the merge. Rule errors are recorded and the
//! remaining rules still run.
//!
//! Rewrites are not scoped to a datasource: every row carrying the bundle id
//! is rewritten. Schema ids touched earlier in the merge are remembered so a
//! later datasource resolving one of them is reported.

use crate::catalog::{CATALOG_VERSION, RuleCatalog};
use crate::config::ReconcileConfig;
use crate::descriptor::DatasourceDescriptor;
use crate::error::ReconcileError;
use crate::filter::{FilteredRuleSet, TableRules, filter};
use crate::identifier::{DatasourceId, SchemaId};
use crate::inspector::inspect;
use crate::report::{
    AppliedRule, DatasourceOutcome, DatasourceReport, MergeReport, RewriteSummary, RuleFailure,
    SkipReason, TableRewrite,
};
use crate::resolver::{
    ResolutionWarning, bundle_warning, resolve_bundle_schema_id, resolve_target_schema_id,
    target_warning,
};
use std::collections::BTreeMap;
use crate::session::{Progress, ProgressSink, Session};

/// Everything the host pipeline hands over for one merge.
pub struct MergeContext<'a, S: ?Sized, P: ?Sized> {
    pub session: &'a mut S,
    /// Processed in this order.
    pub datasources: &'a [DatasourceDescriptor],
    /// Scopes lookups of existing target datasources.
    pub tenant: &'a str,
    pub progress: &'a mut P,
}

/// Reconcile schema ids for every datasource of a merge.
///
/// The schema snapshot and filtered rules are computed once and shared by
/// all datasources. `Err` means the caller must roll back.
pub async fn reconcile<S, P>(
    ctx: MergeContext<'_, S, P>,
    catalog: &RuleCatalog,
    config: &ReconcileConfig,
) -> Result<MergeReport, ReconcileError>
where
    S: Session + ?Sized,
    P: ProgressSink + ?Sized,
{
    let MergeContext {
        session,
        datasources,
        tenant,
        progress,
    } = ctx;

    let objects = inspect(session).await?;
    let rules = filter(catalog, &objects).without_tables(&config.excluded_tables);
    tracing::debug!(
        tables = rules.tables().len(),
        rules = rules.rule_count(),
        dry_run = config.dry_run,
        "prepared rewrite rules"
    );

    let mut reports = Vec::with_capacity(datasources.len());
    let mut touched = BTreeMap::new();
    for descriptor in datasources {
        let pass = Pass {
            tenant,
            rules: &rules,
            dry_run: config.dry_run,
            touched: &mut touched,
        };
        match reconcile_datasource(session, progress, descriptor, pass).await {
            Ok(report) => reports.push(report),
            Err(err) => {
                let datasource_id = descriptor.datasource_id().clone();
                tracing::error!(
                    datasource = %datasource_id,
                    error = %err,
                    "could not change schema ids in bundle"
                );
                return Err(ReconcileError::Fatal {
                    datasource_id,
                    source: Box::new(err),
                });
            }
        }
    }

    Ok(MergeReport {
        catalog_version: CATALOG_VERSION,
        dry_run: config.dry_run,
        datasources: reports,
    })
}

/// Merge-wide state one datasource pass reads and extends.
struct Pass<'a> {
    tenant: &'a str,
    rules: &'a FilteredRuleSet,
    dry_run: bool,
    /// Schema ids already rewritten from or to, and by which datasource.
    touched: &'a mut BTreeMap<SchemaId, DatasourceId>,
}

async fn reconcile_datasource<S, P>(
    session: &mut S,
    progress: &mut P,
    descriptor: &DatasourceDescriptor,
    pass: Pass<'_>,
) -> Result<DatasourceReport, ReconcileError>
where
    S: Session + ?Sized,
    P: ProgressSink + ?Sized,
{
    let datasource_id = descriptor.datasource_id();
    let mut warnings = Vec::new();
    let report = |outcome, warnings| DatasourceReport {
        datasource_id: datasource_id.clone(),
        outcome,
        warnings,
    };

    let Pass {
        tenant,
        rules,
        dry_run,
        touched,
    } = pass;

    let target = resolve_target_schema_id(session, descriptor, tenant).await?;
    warnings.extend(target_warning(datasource_id, &target));
    let Some(to) = target.chosen else {
        tracing::debug!(datasource = %datasource_id, "no schema in target datasource; skipping");
        return Ok(report(skipped(SkipReason::NoTargetSchema), warnings));
    };

    let bundle = resolve_bundle_schema_id(session, datasource_id).await?;
    warnings.extend(bundle_warning(datasource_id, &bundle));
    let Some(from) = bundle.chosen else {
        tracing::debug!(datasource = %datasource_id, "no schema in bundle for target datasource; skipping");
        return Ok(report(skipped(SkipReason::NoBundleSchema), warnings));
    };

    if from == to {
        tracing::debug!(
            datasource = %datasource_id,
            schema = %to,
            "bundle and target schemas are the same; skipping"
        );
        return Ok(report(skipped(SkipReason::IdenticalSchemas), warnings));
    }

    if let Some(rewritten_by) = touched.get(&from) {
        tracing::warn!(
            datasource = %datasource_id,
            schema = %from,
            rewritten_by = %rewritten_by,
            "bundle schema was already rewritten in this merge; rows of other datasources may be changed"
        );
        warnings.push(ResolutionWarning::BundleSchemaAlreadyRewritten {
            datasource_id: datasource_id.clone(),
            schema_id: from.clone(),
            rewritten_by: rewritten_by.clone(),
        });
    }
    touched.entry(from.clone()).or_insert_with(|| datasource_id.clone());
    touched.entry(to.clone()).or_insert_with(|| datasource_id.clone());

    progress.progress(Progress {
        primary: format!("Updating schemas for local datasource ({from} -> {to})"),
    });
    tracing::info!(datasource = %datasource_id, from = %from, to = %to, "rewriting schema ids");

    let mut tables = Vec::with_capacity(rules.tables().len());
    let mut failures = Vec::new();
    for group in rules.tables() {
        let (table, table_failures) = rewrite_table(session, group, &from, &to, dry_run).await;
        tables.push(table);
        failures.extend(table_failures);
    }

    let summary = RewriteSummary { from, to, tables };
    let outcome = if failures.is_empty() {
        DatasourceOutcome::Completed(summary)
    } else {
        DatasourceOutcome::PartialFailure { summary, failures }
    };
    Ok(report(outcome, warnings))
}

fn skipped(reason: SkipReason) -> DatasourceOutcome {
    DatasourceOutcome::Skipped { reason }
}

/// Run one table's rules in order. Never fails; failures are returned.
async fn rewrite_table<S>(
    session: &mut S,
    group: &TableRules,
    from: &SchemaId,
    to: &SchemaId,
    dry_run: bool,
) -> (TableRewrite, Vec<RuleFailure>)
where
    S: Session + ?Sized,
{
    let mut applied = Vec::with_capacity(group.rules.len());
    let mut failures = Vec::new();

    for rule in &group.rules {
        let statement = rule.statement(from, to);
        tracing::debug!(table = rule.table, column = rule.column, sql = %statement.sql, "update-sql");

        if dry_run {
            applied.push(AppliedRule {
                column: rule.column,
                sql: statement.sql,
                rows_affected: None,
            });
            continue;
        }

        match session.execute(&statement).await {
            Ok(rows) => applied.push(AppliedRule {
                column: rule.column,
                sql: statement.sql,
                rows_affected: Some(rows),
            }),
            Err(err) => {
                tracing::error!(
                    table = rule.table,
                    column = rule.column,
                    error = %err,
                    "rewrite statement failed"
                );
                failures.push(RuleFailure {
                    table: rule.table,
                    column: rule.column,
                    sql: statement.sql,
                    message: err.to_string(),
                });
            }
        }
    }

    (
        TableRewrite {
            table: group.table,
            applied,
        },
        failures,
    )
}
