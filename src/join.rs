//! Join Compiler: turns a declarative two-table join into SQL.
//!
//! The left table is always `t1` and the right `t2`. Output column naming
//! follows a fixed policy: an explicit alias wins, then a per-side prefix, and
//! otherwise only right-side columns whose bare name also exists on the left
//! are renamed (to `<right_relation>_<column>`). Left columns are never
//! renamed automatically, so an unprefixed collision keeps the left column bare.
//!
//! The engine only joins on equalities. An INNER join keeps its equalities in
//! `ON`, moves every other comparison to `WHERE`, and becomes a `CROSS JOIN`
//! when no equality is left. Outer joins accept `=` conditions only.

use serde::{Deserialize, Serialize};

use crate::catalog::LoadedTable;
use crate::error::{Error, Result};
use crate::naming::sanitize_relation_name;
use crate::sql::{self, quote_ident};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinKind {
    #[serde(alias = "inner")]
    Inner,
    #[serde(alias = "left")]
    Left,
    #[serde(alias = "right")]
    Right,
    #[serde(alias = "full_outer", alias = "FULL")]
    FullOuter,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinOperator {
    #[default]
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
}

impl JoinOperator {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinOperator::Eq => "=",
            JoinOperator::NotEq => "!=",
            JoinOperator::Lt => "<",
            JoinOperator::LtEq => "<=",
            JoinOperator::Gt => ">",
            JoinOperator::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn table_alias(self) -> &'static str {
        match self {
            Side::Left => "t1",
            Side::Right => "t2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCondition {
    pub left_column: String,
    pub right_column: String,
    #[serde(default)]
    pub operator: JoinOperator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedColumn {
    pub side: Side,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpec {
    pub left_table: String,
    pub right_table: String,
    pub join_kind: JoinKind,
    pub conditions: Vec<JoinCondition>,
    pub selected_columns: Vec<SelectedColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_prefix: Option<String>,
}

impl JoinSpec {
    fn prefix(&self, side: Side) -> Option<&str> {
        match side {
            Side::Left => self.left_prefix.as_deref(),
            Side::Right => self.right_prefix.as_deref(),
        }
        .filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledJoin {
    /// The join as declared, every condition in `ON`.
    pub select_sql: String,
    /// What actually runs. Same as `select_sql` for an equi-join.
    pub engine_sql: String,
    /// `engine_sql` with the preview `LIMIT`.
    pub preview_sql: String,
    /// Informational only: the drop-and-create pair for logs and display.
    /// Materialization stages `engine_sql` through the engine instead.
    pub materialize_sql: String,
    pub target_relation: String,
}

/// `<left>_<right>_join`, sanitized.
pub fn default_target(left_relation: &str, right_relation: &str) -> String {
    sanitize_relation_name(&format!("{}_{}_join", left_relation, right_relation))
}

pub fn compile(
    spec: &JoinSpec,
    left: &LoadedTable,
    right: &LoadedTable,
    target: Option<&str>,
    preview_limit: usize,
) -> Result<CompiledJoin> {
    validate(spec, left, right)?;

    let columns: Vec<String> = spec
        .selected_columns
        .iter()
        .map(|sel| {
            let expr = sql::qualified(sel.side.table_alias(), &sel.column);
            match output_alias(spec, sel, left, right) {
                Some(alias) => format!("{} AS {}", expr, quote_ident(&alias)),
                None => expr,
            }
        })
        .collect();

    let select_from = format!(
        "SELECT {} FROM {} AS t1",
        columns.join(", "),
        quote_ident(&left.relation_name)
    );
    let right_relation = quote_ident(&right.relation_name);
    let all: Vec<String> = spec.conditions.iter().map(condition_sql).collect();
    let select_sql = format!(
        "{} {} {} AS t2 ON {}",
        select_from,
        spec.join_kind.keyword(),
        right_relation,
        all.join(" AND ")
    );

    let (equi, other): (Vec<&JoinCondition>, Vec<&JoinCondition>) = spec
        .conditions
        .iter()
        .partition(|c| c.operator == JoinOperator::Eq);
    let engine_sql = if other.is_empty() {
        select_sql.clone()
    } else {
        let filter: Vec<String> = other.iter().map(|c| condition_sql(c)).collect();
        if equi.is_empty() {
            format!(
                "{} CROSS JOIN {} AS t2 WHERE {}",
                select_from,
                right_relation,
                filter.join(" AND ")
            )
        } else {
            let on: Vec<String> = equi.iter().map(|c| condition_sql(c)).collect();
            format!(
                "{} {} {} AS t2 ON {} WHERE {}",
                select_from,
                spec.join_kind.keyword(),
                right_relation,
                on.join(" AND "),
                filter.join(" AND ")
            )
        }
    };

    let target_relation = match target.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => sanitize_relation_name(t),
        None => default_target(&left.relation_name, &right.relation_name),
    };

    Ok(CompiledJoin {
        preview_sql: format!("{} LIMIT {}", engine_sql, preview_limit),
        materialize_sql: format!(
            "{}; {}",
            sql::drop_table(&target_relation),
            sql::create_table_as(&target_relation, &select_sql)
        ),
        select_sql,
        engine_sql,
        target_relation,
    })
}

fn condition_sql(c: &JoinCondition) -> String {
    format!(
        "{} {} {}",
        sql::qualified("t1", &c.left_column),
        c.operator.as_sql(),
        sql::qualified("t2", &c.right_column)
    )
}

fn output_alias(
    spec: &JoinSpec,
    sel: &SelectedColumn,
    left: &LoadedTable,
    right: &LoadedTable,
) -> Option<String> {
    if let Some(alias) = sel.alias.as_deref().filter(|a| !a.is_empty()) {
        return Some(alias.to_string());
    }
    if let Some(prefix) = spec.prefix(sel.side) {
        return Some(format!("{}{}", prefix, sel.column));
    }
    if sel.side == Side::Right && left.has_column(&sel.column) {
        return Some(format!("{}_{}", right.relation_name, sel.column));
    }
    None
}

fn validate(spec: &JoinSpec, left: &LoadedTable, right: &LoadedTable) -> Result<()> {
    if spec.conditions.is_empty() {
        return Err(Error::InvalidJoin(
            "at least one join condition is required".to_string(),
        ));
    }
    if spec.selected_columns.is_empty() {
        return Err(Error::InvalidJoin(
            "at least one output column is required".to_string(),
        ));
    }
    for c in &spec.conditions {
        require_column(left, &c.left_column)?;
        require_column(right, &c.right_column)?;
        if c.operator != JoinOperator::Eq && spec.join_kind != JoinKind::Inner {
            return Err(Error::InvalidJoin(format!(
                "operator '{}' is only supported in INNER joins, not {}",
                c.operator.as_sql(),
                spec.join_kind.keyword()
            )));
        }
    }
    for sel in &spec.selected_columns {
        let table = match sel.side {
            Side::Left => left,
            Side::Right => right,
        };
        require_column(table, &sel.column)?;
    }
    Ok(())
}

fn require_column(table: &LoadedTable, column: &str) -> Result<()> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(Error::InvalidJoin(format!(
            "column '{}' does not exist in {}",
            column, table.relation_name
        )))
    }
}
