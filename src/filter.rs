//! Rebuilds the SQL for what the grid is currently showing: visible columns,
//! the quick filter and the per-column filter model.
//!
//! The generated statement is what full exports run, so it has to select
//! exactly the rows the grid shows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sql::{cast_varchar, escape_literal, quote_ident, quote_literal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextOperator {
    Contains,
    NotContains,
    Equals,
    NotEqual,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NumberOperator {
    Equals,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    InRange,
}

/// One column's predicate, in the grid's own JSON shape
/// (`{"filterType": "number", "type": "inRange", "filter": 10, "filterTo": 20}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filterType", rename_all = "lowercase")]
pub enum ColumnFilter {
    Text {
        #[serde(rename = "type")]
        operator: TextOperator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
    Number {
        #[serde(rename = "type")]
        operator: NumberOperator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<f64>,
        #[serde(
            default,
            rename = "filterTo",
            skip_serializing_if = "Option::is_none"
        )]
        filter_to: Option<f64>,
    },
}

impl ColumnFilter {
    /// SQL predicate for `column`, or None while the filter is incomplete.
    pub fn to_sql(&self, column: &str) -> Option<String> {
        let col = quote_ident(column);
        match self {
            ColumnFilter::Text { operator, filter } => {
                let value = filter.as_deref().filter(|v| !v.is_empty())?;
                let escaped = escape_literal(value);
                Some(match operator {
                    TextOperator::Contains => format!("{} ILIKE '%{}%'", col, escaped),
                    TextOperator::NotContains => format!("{} NOT ILIKE '%{}%'", col, escaped),
                    TextOperator::Equals => format!("{} = {}", col, quote_literal(value)),
                    TextOperator::NotEqual => format!("{} != {}", col, quote_literal(value)),
                    TextOperator::StartsWith => format!("{} ILIKE '{}%'", col, escaped),
                    TextOperator::EndsWith => format!("{} ILIKE '%{}'", col, escaped),
                })
            }
            ColumnFilter::Number {
                operator,
                filter,
                filter_to,
            } => {
                let a = (*filter)?;
                let op = match operator {
                    NumberOperator::Equals => "=",
                    NumberOperator::NotEqual => "!=",
                    NumberOperator::GreaterThan => ">",
                    NumberOperator::GreaterThanOrEqual => ">=",
                    NumberOperator::LessThan => "<",
                    NumberOperator::LessThanOrEqual => "<=",
                    NumberOperator::InRange => {
                        let b = (*filter_to)?;
                        return Some(format!("{} BETWEEN {} AND {}", col, a, b));
                    }
                };
                Some(format!("{} {} {}", col, op, a))
            }
        }
    }
}

/// Column name to predicate. Ordered by column name so generated SQL is stable.
pub type FilterModel = BTreeMap<String, ColumnFilter>;

/// The quick-filter disjunction over `columns`, or None for a blank term.
pub fn quick_filter_clause(columns: &[String], term: &str) -> Option<String> {
    let term = term.trim();
    if term.is_empty() || columns.is_empty() {
        return None;
    }
    let escaped = escape_literal(term);
    let parts: Vec<String> = columns
        .iter()
        .map(|c| format!("{} ILIKE '%{}%'", cast_varchar(c), escaped))
        .collect();
    Some(format!("({})", parts.join(" OR ")))
}

/// `SELECT` over the visible columns (caller order) with every active filter
/// as an `AND`ed conjunct. An empty column list selects `*`.
pub fn reconstruct(
    table: &str,
    visible_columns: &[String],
    quick_filter: Option<&str>,
    filter_model: Option<&FilterModel>,
) -> String {
    let projection = if visible_columns.is_empty() {
        "*".to_string()
    } else {
        visible_columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut sql = format!("SELECT {} FROM {}", projection, quote_ident(table));

    let mut clauses: Vec<String> = Vec::new();
    if let Some(clause) = quick_filter.and_then(|q| quick_filter_clause(visible_columns, q)) {
        clauses.push(clause);
    }
    if let Some(model) = filter_model {
        clauses.extend(
            model
                .iter()
                .filter_map(|(column, filter)| filter.to_sql(column)),
        );
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql
}
