//! SQL quoting for generated rewrite statements.

/// Quote an identifier (`"schemaId"`), doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal (`'S1'`), doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_preserve_case_and_escape_quotes() {
        assert_eq!(quote_ident("schemaId"), "\"schemaId\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn literals_double_single_quotes() {
        assert_eq!(quote_literal("S1"), "'S1'");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
        assert_eq!(quote_literal("\"k\": \"v\""), "'\"k\": \"v\"'");
    }
}
