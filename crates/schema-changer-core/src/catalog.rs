//! The rewrite rule catalog.
//!
//! One group per table, one rule per column. A rule's key is the column it
//! rewrites, so the filter can drop rules the live schema cannot satisfy.
//! Bringing another table into reconciliation means adding rules here; the
//! driver never changes.
//!
//! ## Encodings
//!
//! ```text
//! Plain             "schemaId" = 'S1'              → 'S2'
//! JsonValue         {"schemaId": "S1"}             → {"schemaId": "S2"}
//! CompositeSegment  mapA:S1+42                     → mapA:S2+42
//! ```
//!
//! JSON and composite rewrites only match the delimited form. A bare `S1`
//! inside `S10`, a table name, or an unrelated token is never touched.

use crate::error::ReconcileError;
use crate::identifier::SchemaId;
use crate::sql::{quote_ident, quote_literal};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Bumped whenever a rule is added, removed, or changes shape.
pub const CATALOG_VERSION: u32 = 1;

/// How a schema identifier is embedded in a column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Encoding {
    /// The column value is the identifier itself.
    Plain,
    /// A JSON object member holds the identifier as a string value.
    /// `key: None` matches any member name.
    JsonValue { key: Option<&'static str> },
    /// A composite key carries the identifier as a `:<id>+` segment.
    CompositeSegment,
}

impl Encoding {
    /// Text pattern and replacement for substring-based encodings.
    pub fn replacement(&self, from: &str, to: &str) -> Option<(String, String)> {
        match *self {
            Self::Plain => None,
            Self::JsonValue { key: Some(key) } => Some((
                format!("\"{key}\": \"{from}\""),
                format!("\"{key}\": \"{to}\""),
            )),
            Self::JsonValue { key: None } => {
                Some((format!("\": \"{from}\""), format!("\": \"{to}\"")))
            }
            Self::CompositeSegment => Some((format!(":{from}+"), format!(":{to}+"))),
        }
    }

    /// Rewrite a text value. Returns `None` when nothing matched.
    pub fn rewrite_text(&self, value: &str, from: &str, to: &str) -> Option<String> {
        match self.replacement(from, to) {
            None => (value == from).then(|| to.to_string()),
            Some((pattern, replacement)) => value
                .contains(&pattern)
                .then(|| value.replace(&pattern, &replacement)),
        }
    }

    /// Rewrite a structured JSON value in place. Returns whether anything changed.
    pub fn rewrite_json(&self, value: &mut Value, from: &str, to: &str) -> bool {
        match value {
            Value::Object(map) => {
                let mut changed = false;
                if *self == Self::CompositeSegment {
                    let pattern = format!(":{from}+");
                    let renamed: Vec<String> = map
                        .keys()
                        .filter(|key| key.contains(&pattern))
                        .cloned()
                        .collect();
                    for key in renamed {
                        if let Some(member) = map.remove(&key) {
                            map.insert(key.replace(&pattern, &format!(":{to}+")), member);
                            changed = true;
                        }
                    }
                }
                for (key, member) in map.iter_mut() {
                    if let Self::JsonValue { key: wanted } = *self
                        && wanted.is_none_or(|wanted| wanted == key.as_str())
                        && member.as_str() == Some(from)
                    {
                        *member = Value::String(to.to_string());
                        changed = true;
                        continue;
                    }
                    changed |= self.rewrite_json(member, from, to);
                }
                changed
            }
            Value::Array(items) => items
                .iter_mut()
                .fold(false, |changed, item| self.rewrite_json(item, from, to) || changed),
            Value::String(text) if *self == Self::CompositeSegment => {
                match self.rewrite_text(text, from, to) {
                    Some(rewritten) => {
                        *text = rewritten;
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }
}

/// Physical storage of the rewritten column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnStorage {
    Text,
    Jsonb,
    JsonbArray,
}

/// One column-level rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewriteRule {
    pub table: &'static str,
    /// Rule key; must equal the column name exactly.
    pub column: &'static str,
    pub storage: ColumnStorage,
    /// Applied in order within one statement.
    pub encodings: &'static [Encoding],
}

impl RewriteRule {
    pub const fn new(
        table: &'static str,
        column: &'static str,
        storage: ColumnStorage,
        encodings: &'static [Encoding],
    ) -> Self {
        Self {
            table,
            column,
            storage,
            encodings,
        }
    }

    pub fn validate(&self) -> Result<(), ReconcileError> {
        let invalid = |reason| ReconcileError::InvalidRule {
            table: self.table,
            column: self.column,
            reason,
        };

        if self.table.is_empty() || self.column.is_empty() {
            return Err(invalid("table and column must be named"));
        }
        if self.encodings.is_empty() {
            return Err(invalid("no encodings"));
        }
        if self.encodings.contains(&Encoding::Plain) {
            if self.encodings.len() > 1 {
                return Err(invalid("plain encoding cannot be combined"));
            }
            if self.storage != ColumnStorage::Text {
                return Err(invalid("plain encoding requires text storage"));
            }
        }
        Ok(())
    }

    fn is_plain(&self) -> bool {
        self.encodings == [Encoding::Plain]
    }

    /// Render the statement rewriting `from` to `to` in this column.
    pub fn statement(&self, from: &SchemaId, to: &SchemaId) -> RewriteStatement {
        RewriteStatement {
            rule: *self,
            from: from.clone(),
            to: to.clone(),
            sql: self.render_sql(from.as_str(), to.as_str()),
        }
    }

    fn render_sql(&self, from: &str, to: &str) -> String {
        let table = quote_ident(self.table);
        let column = quote_ident(self.column);

        if self.is_plain() {
            return format!(
                "UPDATE {table} SET {column} = {} WHERE {column} = {}",
                quote_literal(to),
                quote_literal(from)
            );
        }

        let pairs: Vec<(String, String)> = self
            .encodings
            .iter()
            .filter_map(|encoding| encoding.replacement(from, to))
            .collect();

        match self.storage {
            ColumnStorage::Text => format!(
                "UPDATE {table} SET {column} = {} WHERE {}",
                nested_replace(&column, &pairs),
                match_guard(&column, &pairs)
            ),
            ColumnStorage::Jsonb => {
                let source = format!("{column}::text");
                format!(
                    "UPDATE {table} SET {column} = {}::jsonb WHERE {}",
                    nested_replace(&source, &pairs),
                    match_guard(&source, &pairs)
                )
            }
            // Element-wise so array order survives the rewrite.
            ColumnStorage::JsonbArray => format!(
                "UPDATE {table} SET {column} = ARRAY(SELECT {}::jsonb FROM unnest({column}) \
                 WITH ORDINALITY AS e(elem, ord) ORDER BY e.ord) WHERE EXISTS (SELECT 1 FROM \
                 unnest({column}) AS e(elem) WHERE {})",
                nested_replace("e.elem::text", &pairs),
                match_guard("e.elem::text", &pairs)
            ),
        }
    }

    /// Rewrite a text value the way the rendered statement would.
    pub fn rewrite_text(&self, value: &str, from: &str, to: &str) -> Option<String> {
        let mut current: Option<String> = None;
        for encoding in self.encodings {
            let input = current.as_deref().unwrap_or(value);
            if let Some(rewritten) = encoding.rewrite_text(input, from, to) {
                current = Some(rewritten);
            }
        }
        current
    }

    /// Rewrite a stored column value in place according to its storage.
    pub fn rewrite_value(&self, value: &mut Value, from: &str, to: &str) -> bool {
        match (self.storage, value) {
            (_, Value::Null) => false,
            (ColumnStorage::Text, Value::String(text)) => match self.rewrite_text(text, from, to) {
                Some(rewritten) => {
                    *text = rewritten;
                    true
                }
                None => false,
            },
            (ColumnStorage::Text, _) => false,
            (ColumnStorage::Jsonb, value) => self.rewrite_document(value, from, to),
            (ColumnStorage::JsonbArray, Value::Array(items)) => items
                .iter_mut()
                .fold(false, |changed, item| self.rewrite_document(item, from, to) || changed),
            (ColumnStorage::JsonbArray, _) => false,
        }
    }

    fn rewrite_document(&self, value: &mut Value, from: &str, to: &str) -> bool {
        self.encodings.iter().fold(false, |changed, encoding| {
            encoding.rewrite_json(value, from, to) || changed
        })
    }
}

fn nested_replace(source: &str, pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .fold(source.to_string(), |expr, (pattern, replacement)| {
            format!(
                "replace({expr}, {}, {})",
                quote_literal(pattern),
                quote_literal(replacement)
            )
        })
}

fn match_guard(source: &str, pairs: &[(String, String)]) -> String {
    let clauses: Vec<String> = pairs
        .iter()
        .map(|(pattern, _)| format!("strpos({source}, {}) > 0", quote_literal(pattern)))
        .collect();
    match clauses.as_slice() {
        [single] => single.clone(),
        _ => format!("({})", clauses.join(" OR ")),
    }
}

/// A rendered rewrite, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteStatement {
    pub rule: RewriteRule,
    pub from: SchemaId,
    pub to: SchemaId,
    pub sql: String,
}

const PLAIN: &[Encoding] = &[Encoding::Plain];
const COMPOSITE: &[Encoding] = &[Encoding::CompositeSegment];
const JSON_ANY_KEY: &[Encoding] = &[Encoding::JsonValue { key: None }];
const JSON_SCHEMA_ID: &[Encoding] = &[Encoding::JsonValue {
    key: Some("schemaId"),
}];
const JSON_ANY_KEY_AND_COMPOSITE: &[Encoding] = &[
    Encoding::JsonValue { key: None },
    Encoding::CompositeSegment,
];

const fn composite(table: &'static str, column: &'static str) -> RewriteRule {
    RewriteRule::new(table, column, ColumnStorage::Text, COMPOSITE)
}

const fn plain(table: &'static str, column: &'static str) -> RewriteRule {
    RewriteRule::new(table, column, ColumnStorage::Text, PLAIN)
}

/// Built-in rules, grouped by table in processing order.
pub const BUILTIN_RULES: &[RewriteRule] = &[
    RewriteRule::new("query", "flow", ColumnStorage::JsonbArray, JSON_SCHEMA_ID),
    RewriteRule::new(
        "query",
        "payload",
        ColumnStorage::Jsonb,
        JSON_ANY_KEY_AND_COMPOSITE,
    ),
    plain("mapping", "schemaId"),
    composite("mapping", "id"),
    plain("field", "schemaId"),
    composite("field", "mappingPath"),
    composite("field", "id"),
    composite("code", "mappingId"),
    composite("code", "valueFieldId"),
    composite("code", "descriptionFieldId"),
    RewriteRule::new("link", "defn", ColumnStorage::Jsonb, JSON_ANY_KEY),
    composite("link", "id"),
    composite("link", "fromId"),
    composite("link", "parentId"),
    composite("link", "toId"),
    composite("suite_mapping", "mappingId"),
    composite("dataset_field", "fieldId"),
];

/// Validated set of rewrite rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCatalog {
    rules: Vec<RewriteRule>,
}

impl RuleCatalog {
    pub fn builtin() -> Self {
        Self {
            rules: BUILTIN_RULES.to_vec(),
        }
    }

    /// Build a catalog, rejecting malformed or duplicate rules.
    pub fn new(rules: Vec<RewriteRule>) -> Result<Self, ReconcileError> {
        let mut seen = BTreeSet::new();
        for rule in &rules {
            rule.validate()?;
            if !seen.insert((rule.table, rule.column)) {
                return Err(ReconcileError::InvalidRule {
                    table: rule.table,
                    column: rule.column,
                    reason: "duplicate rule",
                });
            }
        }
        Ok(Self { rules })
    }

    /// Extend the catalog with one more rule.
    pub fn with_rule(self, rule: RewriteRule) -> Result<Self, ReconcileError> {
        let mut rules = self.rules;
        rules.push(rule);
        Self::new(rules)
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Table names in first-appearance order.
    pub fn tables(&self) -> Vec<&'static str> {
        let mut tables: Vec<&'static str> = Vec::new();
        for rule in &self.rules {
            if !tables.contains(&rule.table) {
                tables.push(rule.table);
            }
        }
        tables
    }

    pub fn rules_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a RewriteRule> + 'a {
        self.rules.iter().filter(move |rule| rule.table == table)
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids() -> (SchemaId, SchemaId) {
        (
            SchemaId::parse("S1").expect("S1"),
            SchemaId::parse("S2").expect("S2"),
        )
    }

    fn rule(table: &str, column: &str) -> RewriteRule {
        *RuleCatalog::builtin()
            .rules_for(table)
            .find(|rule| rule.column == column)
            .unwrap_or_else(|| panic!("missing builtin rule {table}.{column}"))
    }

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = RuleCatalog::new(BUILTIN_RULES.to_vec()).expect("builtin rules validate");
        assert_eq!(catalog, RuleCatalog::builtin());
        assert_eq!(
            catalog.tables(),
            vec![
                "query",
                "mapping",
                "field",
                "code",
                "link",
                "suite_mapping",
                "dataset_field"
            ]
        );
        assert_eq!(catalog.rules().len(), 17);
    }

    #[test]
    fn plain_statement_is_scoped_to_old_value() {
        let (from, to) = ids();
        let statement = rule("mapping", "schemaId").statement(&from, &to);
        insta::assert_snapshot!(
            statement.sql,
            @r#"UPDATE "mapping" SET "schemaId" = 'S2' WHERE "schemaId" = 'S1'"#
        );
    }

    #[test]
    fn composite_statement_matches_delimited_segment() {
        let (from, to) = ids();
        let statement = rule("link", "fromId").statement(&from, &to);
        assert_eq!(
            statement.sql,
            r#"UPDATE "link" SET "fromId" = replace("fromId", ':S1+', ':S2+') WHERE strpos("fromId", ':S1+') > 0"#
        );
    }

    #[test]
    fn jsonb_statement_chains_encodings() {
        let (from, to) = ids();
        let statement = rule("query", "payload").statement(&from, &to);
        assert_eq!(
            statement.sql,
            concat!(
                r#"UPDATE "query" SET "payload" = replace(replace("payload"::text, '": "S1"', '": "S2"'), ':S1+', ':S2+')::jsonb"#,
                r#" WHERE (strpos("payload"::text, '": "S1"') > 0 OR strpos("payload"::text, ':S1+') > 0)"#
            )
        );
    }

    #[test]
    fn jsonb_array_statement_rewrites_elements() {
        let (from, to) = ids();
        let statement = rule("query", "flow").statement(&from, &to);
        assert!(statement.sql.starts_with(r#"UPDATE "query" SET "flow" = ARRAY(SELECT "#));
        assert!(
            statement
                .sql
                .contains(r#"replace(e.elem::text, '"schemaId": "S1"', '"schemaId": "S2"')::jsonb"#)
        );
        assert!(statement.sql.contains("WITH ORDINALITY AS e(elem, ord) ORDER BY e.ord"));
        assert!(statement.sql.ends_with(r#"WHERE strpos(e.elem::text, '"schemaId": "S1"') > 0)"#));
    }

    #[test]
    fn quotes_in_identifiers_are_escaped() {
        let from = SchemaId::parse("o'old").expect("from");
        let to = SchemaId::parse("o'new").expect("to");
        let statement = rule("mapping", "schemaId").statement(&from, &to);
        assert_eq!(
            statement.sql,
            r#"UPDATE "mapping" SET "schemaId" = 'o''new' WHERE "schemaId" = 'o''old'"#
        );
    }

    #[test]
    fn composite_ignores_undelimited_occurrences() {
        let rule = rule("mapping", "id");
        assert_eq!(
            rule.rewrite_text("mapA:S1+42", "S1", "S2"),
            Some("mapA:S2+42".to_string())
        );
        assert_eq!(rule.rewrite_text("S1:mapA+42", "S1", "S2"), None);
        assert_eq!(rule.rewrite_text("mapA:S10+42", "S1", "S2"), None);
        assert_eq!(rule.rewrite_text("mapA:S1-42", "S1", "S2"), None);
    }

    #[test]
    fn json_text_replace_requires_quoted_value() {
        let encoding = Encoding::JsonValue {
            key: Some("schemaId"),
        };
        assert_eq!(
            encoding.rewrite_text(r#"{"schemaId": "S1"}"#, "S1", "S2"),
            Some(r#"{"schemaId": "S2"}"#.to_string())
        );
        assert_eq!(encoding.rewrite_text(r#"{"schemaId": "S10"}"#, "S1", "S2"), None);
        assert_eq!(encoding.rewrite_text(r#"{"other": "S1"}"#, "S1", "S2"), None);
    }

    #[test]
    fn json_document_rewrite_is_exact() {
        let rule = rule("link", "defn");
        let mut defn = json!({
            "source": "S1",
            "target": "S10",
            "nested": { "schema": "S1", "label": "S1 totals" },
            "list": ["S1"]
        });
        assert!(rule.rewrite_value(&mut defn, "S1", "S2"));
        assert_eq!(
            defn,
            json!({
                "source": "S2",
                "target": "S10",
                "nested": { "schema": "S2", "label": "S1 totals" },
                "list": ["S1"]
            })
        );
        assert!(!rule.rewrite_value(&mut defn, "S1", "S2"));
    }

    #[test]
    fn keyed_json_only_touches_that_key() {
        let rule = rule("query", "flow");
        let mut flow = json!([{ "schemaId": "S1", "from": "S1" }, { "step": 2 }]);
        assert!(rule.rewrite_value(&mut flow, "S1", "S2"));
        assert_eq!(
            flow,
            json!([{ "schemaId": "S2", "from": "S1" }, { "step": 2 }])
        );
    }

    #[test]
    fn payload_rewrites_both_encodings() {
        let rule = rule("query", "payload");
        let mut payload = json!({
            "schema": "S1",
            "fields": ["mapA:S1+name", "S1+name"],
            "mapA:S1+42": true
        });
        assert!(rule.rewrite_value(&mut payload, "S1", "S2"));
        assert_eq!(
            payload,
            json!({
                "schema": "S2",
                "fields": ["mapA:S2+name", "S1+name"],
                "mapA:S2+42": true
            })
        );
    }

    #[test]
    fn malformed_rules_are_rejected() {
        const MIXED: &[Encoding] = &[Encoding::Plain, Encoding::CompositeSegment];
        let mixed = RewriteRule::new("t", "c", ColumnStorage::Text, MIXED);
        assert!(RuleCatalog::new(vec![mixed]).is_err());

        let plain_json = RewriteRule::new("t", "c", ColumnStorage::Jsonb, PLAIN);
        assert!(RuleCatalog::new(vec![plain_json]).is_err());

        let empty = RewriteRule::new("t", "c", ColumnStorage::Text, &[]);
        assert!(RuleCatalog::new(vec![empty]).is_err());

        let duplicate = RuleCatalog::builtin().with_rule(composite("link", "toId"));
        assert!(matches!(
            duplicate,
            Err(ReconcileError::InvalidRule {
                reason: "duplicate rule",
                ..
            })
        ));
    }

    #[test]
    fn catalog_extends_without_touching_builtin_order() {
        let catalog = RuleCatalog::builtin()
            .with_rule(composite("report_field", "fieldId"))
            .expect("extension");
        assert_eq!(catalog.tables().last(), Some(&"report_field"));
        assert_eq!(catalog.rules_for("report_field").count(), 1);
    }
}
