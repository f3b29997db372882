//! Intersect the rule catalog with the live schema.
//!
//! Rules for tables or columns the target does not have are omitted, not
//! failed: a missing rewrite leaves one table stale, a failed statement would
//! abort the merge.

use crate::catalog::{RewriteRule, RuleCatalog};
use crate::inspector::SchemaObjects;

/// Rules of one table, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRules {
    pub table: &'static str,
    pub rules: Vec<RewriteRule>,
}

/// Rules safe to run against the inspected schema, grouped by table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredRuleSet {
    tables: Vec<TableRules>,
}

impl FilteredRuleSet {
    pub fn tables(&self) -> &[TableRules] {
        &self.tables
    }

    pub fn table(&self, table: &str) -> Option<&TableRules> {
        self.tables.iter().find(|group| group.table == table)
    }

    pub fn rule_count(&self) -> usize {
        self.tables.iter().map(|group| group.rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count() == 0
    }

    /// Drop whole tables, e.g. those excluded by configuration.
    pub fn without_tables<'a>(mut self, excluded: impl IntoIterator<Item = &'a String>) -> Self {
        for table in excluded {
            self.tables.retain(|group| group.table != table.as_str());
        }
        self
    }
}

pub fn filter(catalog: &RuleCatalog, objects: &SchemaObjects) -> FilteredRuleSet {
    let mut tables = Vec::new();

    for table in catalog.tables() {
        if !objects.has_table(table) {
            tracing::debug!(table, "table not present in current schema; omitting its rules");
            continue;
        }

        let mut rules = Vec::new();
        for rule in catalog.rules_for(table) {
            if objects.has_column(table, rule.column) {
                rules.push(*rule);
            } else {
                tracing::debug!(table, column = rule.column, "column not present; omitting rule");
            }
        }
        tables.push(TableRules { table, rules });
    }

    FilteredRuleSet { tables }
}
