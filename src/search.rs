//! Search SQL: match a term in any column, as a substring or a regular expression.

use regex::RegexBuilder;

use crate::error::Result;
use crate::sql::{cast_varchar, escape_literal, quote_ident, quote_literal};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchMode {
    #[default]
    Substring,
    Regex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub term: String,
    pub mode: SearchMode,
    pub case_sensitive: bool,
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn substring(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Self::default()
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            term: pattern.into(),
            mode: SearchMode::Regex,
            ..Self::default()
        }
    }
}

/// Build the search statement. Regex patterns are compiled first, so an
/// invalid pattern fails here and no SQL is ever issued for it.
pub fn build_search_sql(table: &str, columns: &[String], request: &SearchRequest) -> Result<String> {
    let mut sql = format!("SELECT * FROM {}", quote_ident(table));

    if !request.term.is_empty() && !columns.is_empty() {
        let predicates: Vec<String> = match request.mode {
            SearchMode::Substring => {
                let like = if request.case_sensitive { "LIKE" } else { "ILIKE" };
                let escaped = escape_literal(&request.term);
                columns
                    .iter()
                    .map(|c| format!("{} {} '%{}%'", cast_varchar(c), like, escaped))
                    .collect()
            }
            SearchMode::Regex => {
                RegexBuilder::new(&request.term)
                    .case_insensitive(!request.case_sensitive)
                    .build()?;
                let pattern = if request.case_sensitive {
                    request.term.clone()
                } else {
                    format!("(?i){}", request.term)
                };
                let literal = quote_literal(&pattern);
                columns
                    .iter()
                    .map(|c| format!("REGEXP_LIKE({}, {})", cast_varchar(c), literal))
                    .collect()
            }
        };
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" OR "));
    }

    if let Some(n) = request.limit {
        sql.push_str(&format!(" LIMIT {}", n));
    }
    Ok(sql)
}
