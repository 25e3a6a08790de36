//! Identifier validation and literal escaping for generated SQL.
//!
//! Everything that reaches generated SQL text from remote metadata goes
//! through this module: names are validated as plain identifiers and free
//! text is escaped into single-quoted string literals. Column names that
//! collide with a reserved keyword are backtick-quoted where they are written.
//!
//! # Examples
//!
//! ```ignore
//! assert!(validate_identifier("personIdExternal").is_ok());
//! assert!(validate_identifier("a; DROP TABLE x").is_err());
//! assert_eq!(column_ident("range"), "`range`");
//! assert_eq!(quote_string_literal("Employee's job"), r"'Employee\'s job'");
//! ```

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::IngestError;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// GoogleSQL reserved keywords, uppercase
const RESERVED_KEYWORDS: &[&str] = &[
    "ALL", "AND", "ANY", "ARRAY", "AS", "ASC", "ASSERT_ROWS_MODIFIED", "AT", "BETWEEN", "BY",
    "CASE", "CAST", "COLLATE", "CONTAINS", "CREATE", "CROSS", "CUBE", "CURRENT", "DEFAULT",
    "DEFINE", "DESC", "DISTINCT", "ELSE", "END", "ENUM", "ESCAPE", "EXCEPT", "EXCLUDE", "EXISTS",
    "EXTRACT", "FALSE", "FETCH", "FOLLOWING", "FOR", "FROM", "FULL", "GROUP", "GROUPING",
    "GROUPS", "HASH", "HAVING", "IF", "IGNORE", "IN", "INNER", "INTERSECT", "INTERVAL", "INTO",
    "IS", "JOIN", "LATERAL", "LEFT", "LIKE", "LIMIT", "LOOKUP", "MERGE", "NATURAL", "NEW", "NO",
    "NOT", "NULL", "NULLS", "OF", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "PRECEDING",
    "PROTO", "QUALIFY", "RANGE", "RECURSIVE", "RESPECT", "RIGHT", "ROLLUP", "ROWS", "SELECT",
    "SET", "SOME", "STRUCT", "TABLESAMPLE", "THEN", "TO", "TREAT", "TRUE", "UNBOUNDED", "UNION",
    "UNNEST", "USING", "WHEN", "WHERE", "WINDOW", "WITH", "WITHIN",
];

/// True when `ident` is a reserved keyword, in any letter case.
pub fn is_reserved_keyword(ident: &str) -> bool {
    let upper = ident.to_ascii_uppercase();
    RESERVED_KEYWORDS.contains(&upper.as_str())
}

/// Column name as written into generated SQL.
///
/// Names are validated plain identifiers; only reserved keywords need quoting.
pub fn column_ident(name: &str) -> Cow<'_, str> {
    if is_reserved_keyword(name) {
        Cow::Owned(format!("`{}`", name))
    } else {
        Cow::Borrowed(name)
    }
}

/// Checks that a name can be used unquoted as a column or table name.
pub fn validate_identifier(ident: &str) -> Result<(), IngestError> {
    if IDENTIFIER_RE.is_match(ident) {
        Ok(())
    } else {
        Err(IngestError::InvalidIdentifier {
            identifier: ident.to_string(),
        })
    }
}

/// Escapes text for the inside of a single-quoted string literal.
///
/// Backslashes and quotes are backslash-escaped, line breaks become `\n`
/// and `\r` so a description never splits a statement across lines.
pub fn escape_string_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str(r"\\"),
            '\'' => escaped.push_str(r"\'"),
            '\n' => escaped.push_str(r"\n"),
            '\r' => escaped.push_str(r"\r"),
            '\t' => escaped.push_str(r"\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Wraps escaped text in single quotes.
pub fn quote_string_literal(value: &str) -> String {
    format!("'{}'", escape_string_literal(value))
}
