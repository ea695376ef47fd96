//! Identifier quoting and literal escaping shared by every generated statement.
//!
//! Identifiers are wrapped in double quotes without escaping: a column name that
//! itself contains `"` produces invalid SQL. Literals double their single quotes
//! and nothing else.

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", escape_literal(value))
}

/// Escape for embedding inside an already-quoted literal (e.g. `'%{}%'`).
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// `t."col"` for a table alias.
pub fn qualified(table_alias: &str, column: &str) -> String {
    format!("{}.{}", table_alias, quote_ident(column))
}

/// `CAST("col" AS VARCHAR)`, used wherever text matching must work regardless of type.
pub fn cast_varchar(column: &str) -> String {
    format!("CAST({} AS VARCHAR)", quote_ident(column))
}

pub fn select_all(relation: &str, limit: Option<usize>) -> String {
    let mut sql = format!("SELECT * FROM {}", quote_ident(relation));
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {}", n));
    }
    sql
}

pub fn count_rows(relation: &str) -> String {
    format!(
        "SELECT COUNT(*) AS {} FROM {}",
        quote_ident(ROW_COUNT_COLUMN),
        quote_ident(relation)
    )
}

pub fn drop_table(relation: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(relation))
}

pub fn create_table_as(relation: &str, select: &str) -> String {
    format!("CREATE TABLE {} AS {}", quote_ident(relation), select)
}

pub const ROW_COUNT_COLUMN: &str = "row_count";
