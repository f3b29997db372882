//! SQL issued by [`PgSession`](crate::PgSession) besides the rewrites.

/// Tables of the current schema with their column names.
pub const TABLE_COLUMNS: &str = r#"
SELECT t.table_name::text AS table_name,
       ARRAY(SELECT c.column_name::text
               FROM information_schema.columns c
              WHERE c.table_schema = t.table_schema
                AND c.table_name = t.table_name
              ORDER BY c.ordinal_position) AS columns
  FROM information_schema.tables t
 WHERE t.table_schema = current_schema"#;

/// Distinct schema ids of a datasource's bundle mappings, most used first.
pub const BUNDLE_SCHEMA_IDS: &str = r#"
SELECT "schemaId"::text AS schema_id
  FROM mapping
 WHERE "datasourceId"::text = $1
   AND "schemaId" IS NOT NULL
 GROUP BY "schemaId"
 ORDER BY count(*) DESC, "schemaId""#;

/// Declared schemas of an existing datasource, normalized to JSON.
pub const DATASOURCE_SCHEMAS: &str = r#"
SELECT to_jsonb(schemas) AS schemas
  FROM public.datasource
 WHERE id::text = $1
   AND tenant::text = $2"#;

pub const SAVEPOINT: &str = "SAVEPOINT schema_changer_rule";
pub const RELEASE_SAVEPOINT: &str = "RELEASE SAVEPOINT schema_changer_rule";
pub const ROLLBACK_TO_SAVEPOINT: &str = "ROLLBACK TO SAVEPOINT schema_changer_rule";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn introspection_is_scoped_to_current_schema() {
        assert!(TABLE_COLUMNS.contains("t.table_schema = current_schema"));
        assert!(TABLE_COLUMNS.contains("c.table_schema = t.table_schema"));
    }

    #[test]
    fn lookups_are_parameterized() {
        assert!(BUNDLE_SCHEMA_IDS.contains("= $1"));
        assert!(DATASOURCE_SCHEMAS.contains("id::text = $1"));
        assert!(DATASOURCE_SCHEMAS.contains("tenant::text = $2"));
    }
}
