//! The owned session: one engine, the catalog that mirrors its relations, and
//! every operation that touches them. All engine work goes through `&mut self`,
//! so calls are strictly sequential.

use tracing::{debug, info};

use crate::catalog::{Catalog, LoadedTable};
use crate::engine::{CopyFormat, Engine, FileBuffer, ReadOptions};
use crate::error::{Error, ExportError, Result};
use crate::export;
use crate::filter::{self, FilterModel};
use crate::format::{ExportFormat, FileFormat, TableFormat};
use crate::ingest;
use crate::join::{self, CompiledJoin, JoinSpec};
use crate::query::{self, QueryResult};
use crate::search::{build_search_sql, SearchRequest};
use crate::sql;

const EXPORT_RELATION: &str = "__tabsql_export";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub read_options: ReadOptions,
    pub join_preview_limit: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            read_options: ReadOptions::default(),
            join_preview_limit: 100,
        }
    }
}

/// A join's preview rows plus the size of the full joined result.
#[derive(Debug, Clone)]
pub struct JoinPreview {
    pub compiled: CompiledJoin,
    pub result: QueryResult,
    pub total_rows: usize,
}

pub struct Session {
    engine: Option<Engine>,
    catalog: Catalog,
    options: SessionOptions,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            engine: Some(Engine::with_read_options(options.read_options.clone())),
            catalog: Catalog::new(),
            options,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    /// Release the engine. Every later engine call fails with `EngineNotReady`.
    pub fn shutdown(&mut self) {
        if self.engine.take().is_some() {
            info!("engine shut down");
        }
        self.catalog.clear();
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn table(&self, relation_name: &str) -> Option<&LoadedTable> {
        self.catalog.get(relation_name)
    }

    fn engine_mut(&mut self) -> Result<&mut Engine> {
        self.engine.as_mut().ok_or(Error::EngineNotReady)
    }

    fn parts(&mut self) -> Result<(&mut Engine, &mut Catalog)> {
        match self.engine.as_mut() {
            Some(engine) => Ok((engine, &mut self.catalog)),
            None => Err(Error::EngineNotReady),
        }
    }

    pub fn ingest(
        &mut self,
        content: FileBuffer,
        name: &str,
        format: FileFormat,
    ) -> Result<LoadedTable> {
        let (engine, catalog) = self.parts()?;
        ingest::ingest(engine, catalog, content, name, format)
    }

    /// Drop a relation and its catalog entry together.
    pub fn drop_table(&mut self, relation_name: &str) -> Result<bool> {
        let (engine, catalog) = self.parts()?;
        let dropped = engine.drop_relation(relation_name);
        catalog.remove(relation_name);
        debug!(sql = %sql::drop_table(relation_name), dropped, "dropped table");
        Ok(dropped)
    }

    pub fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        query::execute(self.engine_mut()?, sql)
    }

    /// Row count of `sql` without materializing it.
    pub fn count(&mut self, sql: &str) -> Result<usize> {
        debug!(sql, "counting rows");
        self.engine_mut()?
            .count(sql)
            .map_err(|e| Error::query(&e))
    }

    /// Search every column of a loaded table. Returns the SQL that ran with its result.
    pub fn search(
        &mut self,
        relation_name: &str,
        request: &SearchRequest,
    ) -> Result<(String, QueryResult)> {
        let table = self
            .table(relation_name)
            .ok_or_else(|| Error::query_message(format!("no table named '{}'", relation_name)))?;
        let sql = build_search_sql(relation_name, &table.column_names(), request)?;
        let result = self.execute(&sql)?;
        Ok((sql, result))
    }

    pub fn compile_join(&self, spec: &JoinSpec, target: Option<&str>) -> Result<CompiledJoin> {
        let left = self.join_side(&spec.left_table)?;
        let right = self.join_side(&spec.right_table)?;
        join::compile(spec, left, right, target, self.options.join_preview_limit)
    }

    fn join_side(&self, relation_name: &str) -> Result<&LoadedTable> {
        self.table(relation_name)
            .ok_or_else(|| Error::InvalidJoin(format!("unknown table '{}'", relation_name)))
    }

    pub fn preview_join(&mut self, spec: &JoinSpec) -> Result<JoinPreview> {
        let compiled = self.compile_join(spec, None)?;
        let result = self.execute(&compiled.preview_sql)?;
        let total_rows = self.count(&compiled.engine_sql)?;
        Ok(JoinPreview {
            compiled,
            result,
            total_rows,
        })
    }

    /// Create (or replace) the join target and register it as a derived table.
    pub fn materialize_join(&mut self, spec: &JoinSpec, target: Option<&str>) -> Result<LoadedTable> {
        let compiled = self.compile_join(spec, target)?;
        let (engine, catalog) = self.parts()?;
        let target = compiled.target_relation.as_str();

        debug!(sql = %compiled.materialize_sql, "materializing join");
        engine
            .create_relation_as(target, &compiled.engine_sql)
            .map_err(|e| Error::query(&e))?;

        match ingest::introspect(engine, target, target, TableFormat::Derived) {
            Ok(table) => {
                info!(relation = target, rows = table.row_count, "materialized join");
                catalog.upsert(table.clone());
                Ok(table)
            }
            Err(e) => {
                engine.drop_relation(target);
                catalog.remove(target);
                Err(e)
            }
        }
    }

    pub fn encode(&mut self, result: &QueryResult, format: ExportFormat) -> Result<Vec<u8>> {
        export::encode(result, format, self.engine_mut()?)
    }

    /// Query-based export: materialize `sql` into a temporary relation and
    /// write it out. The temporary relation is always dropped.
    pub fn export_query(&mut self, sql: &str, format: ExportFormat) -> Result<Vec<u8>> {
        let engine = self.engine_mut()?;
        let staging = engine.unused_relation_name(EXPORT_RELATION);
        debug!(sql = %sql::create_table_as(&staging, sql), "staging export");
        engine
            .create_relation_as(&staging, sql)
            .map_err(|e| Error::query(&e))?;

        let bytes = write_staged(engine, &staging, format);
        engine.drop_relation(&staging);

        let bytes = bytes?;
        info!(format = format.as_str(), bytes = bytes.len(), "exported query");
        Ok(bytes)
    }

    /// Displayed-data export: rebuild the grid's SQL and export all of its rows.
    /// An empty column list means every column of the table.
    pub fn export_displayed(
        &mut self,
        relation_name: &str,
        visible_columns: &[String],
        quick_filter: Option<&str>,
        filter_model: Option<&FilterModel>,
        format: ExportFormat,
    ) -> Result<Vec<u8>> {
        let all_columns;
        let visible_columns = match self.table(relation_name) {
            Some(table) if visible_columns.is_empty() => {
                all_columns = table.column_names();
                all_columns.as_slice()
            }
            _ => visible_columns,
        };
        let sql = filter::reconstruct(relation_name, visible_columns, quick_filter, filter_model);
        let result = self.execute(&sql)?;
        let bytes = self.encode(&result, format)?;
        info!(
            format = format.as_str(),
            rows = result.row_count(),
            "exported displayed rows"
        );
        Ok(bytes)
    }
}

fn write_staged(engine: &mut Engine, staging: &str, format: ExportFormat) -> Result<Vec<u8>> {
    let copy = match format {
        ExportFormat::Csv => Some(CopyFormat::Csv),
        ExportFormat::Tsv => Some(CopyFormat::Tsv),
        ExportFormat::Parquet => Some(CopyFormat::Parquet),
        ExportFormat::Json | ExportFormat::Xlsx | ExportFormat::Xls => None,
    };
    match copy {
        Some(copy) => {
            let rows = engine
                .relation_row_count(staging)
                .map_err(|e| Error::query(&e))?;
            if rows == 0 {
                return Err(ExportError::NoRows.into());
            }
            engine
                .copy_relation(staging, copy)
                .map_err(|e| ExportError::Encode(e.to_string()).into())
        }
        None => {
            let result = query::execute(engine, &sql::select_all(staging, None))?;
            export::encode_without_engine(&result, format)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::{JoinCondition, JoinKind, JoinOperator, SelectedColumn, Side};

    fn session_with(files: &[(&str, &str)]) -> Session {
        let mut session = Session::default();
        for (name, text) in files {
            session
                .ingest(FileBuffer::Text(text.to_string()), name, FileFormat::detect(name))
                .unwrap();
        }
        session
    }

    fn people_orders() -> Session {
        session_with(&[
            ("people.csv", "id,name\n1,ann\n2,bob\n3,cy\n"),
            ("orders.csv", "id,price\n1,10\n1,12\n3,7\n"),
        ])
    }

    fn join_spec() -> JoinSpec {
        JoinSpec {
            left_table: "people".to_string(),
            right_table: "orders".to_string(),
            join_kind: JoinKind::Inner,
            conditions: vec![JoinCondition {
                left_column: "id".to_string(),
                right_column: "id".to_string(),
                operator: JoinOperator::Eq,
            }],
            selected_columns: vec![
                SelectedColumn {
                    side: Side::Left,
                    column: "name".to_string(),
                    alias: None,
                },
                SelectedColumn {
                    side: Side::Right,
                    column: "price".to_string(),
                    alias: None,
                },
            ],
            left_prefix: None,
            right_prefix: None,
        }
    }

    #[test]
    fn shutdown_makes_engine_not_ready() {
        let mut session = people_orders();
        session.shutdown();
        assert!(!session.is_ready());
        let err = session.execute("SELECT 1").unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            session.ingest(FileBuffer::Text("a\n1\n".into()), "a.csv", FileFormat::Csv),
            Err(Error::EngineNotReady)
        ));
    }

    #[test]
    fn preview_join_counts_all_rows() {
        let mut session = people_orders();
        let preview = session.preview_join(&join_spec()).unwrap();
        assert_eq!(preview.total_rows, 3);
        assert_eq!(preview.result.columns(), &["name", "price"]);
    }

    #[test]
    fn materialized_join_is_a_derived_table() {
        let mut session = people_orders();
        let table = session.materialize_join(&join_spec(), None).unwrap();
        assert_eq!(table.relation_name, "people_orders_join");
        assert_eq!(table.format, TableFormat::Derived);
        assert_eq!(table.row_count, 3);
        assert_eq!(session.catalog().len(), 3);

        // Re-joining under the same name replaces the previous result.
        let mut spec = join_spec();
        spec.join_kind = JoinKind::Left;
        let again = session.materialize_join(&spec, None).unwrap();
        assert_eq!(again.row_count, 4);
        assert_eq!(session.catalog().len(), 3);
    }

    #[test]
    fn join_on_unknown_table_is_invalid() {
        let mut session = people_orders();
        let mut spec = join_spec();
        spec.right_table = "nope".to_string();
        assert!(matches!(
            session.materialize_join(&spec, None),
            Err(Error::InvalidJoin(_))
        ));
    }

    #[test]
    fn query_export_drops_staging_relation() {
        let mut session = people_orders();
        for format in ExportFormat::ALL {
            let bytes = session
                .export_query("SELECT * FROM \"people\"", format)
                .unwrap();
            assert!(!bytes.is_empty());
        }
        let err = session.export_query("SELECT * FROM nowhere", ExportFormat::Csv);
        assert!(matches!(err, Err(Error::Query { .. })));
        assert_eq!(session.catalog().len(), 2);
        let rel = session
            .execute(&sql::select_all(EXPORT_RELATION, None))
            .unwrap_err();
        assert!(matches!(rel, Error::Query { .. }));
    }

    #[test]
    fn query_export_leaves_user_relation_with_staging_name() {
        let mut session = session_with(&[
            ("__tabsql_export.csv", "a\n1\n2\n"),
            ("other.csv", "b\nx\n"),
        ]);
        let bytes = session
            .export_query("SELECT * FROM \"other\"", ExportFormat::Csv)
            .unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "b\nx\n");

        assert!(session.table(EXPORT_RELATION).is_some());
        let kept = session
            .execute(&sql::select_all(EXPORT_RELATION, None))
            .unwrap();
        assert_eq!(kept.row_count(), 2);
        assert_eq!(session.catalog().len(), 2);
    }

    #[test]
    fn displayed_export_without_columns_still_applies_quick_filter() {
        let mut session = people_orders();
        let bytes = session
            .export_displayed("people", &[], Some("ann"), None, ExportFormat::Csv)
            .unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "id,name\n1,ann\n");
    }

    #[test]
    fn inequality_joins_run_through_the_engine() {
        let mut session = people_orders();

        // people.id < orders.id: only order 3 has smaller people ids (1 and 2).
        let mut less = join_spec();
        less.conditions[0].operator = JoinOperator::Lt;
        assert_eq!(session.preview_join(&less).unwrap().total_rows, 2);
        let table = session.materialize_join(&less, Some("less")).unwrap();
        assert_eq!(table.row_count, 2);
        assert_eq!(table.column_names(), vec!["name", "price"]);

        // Every pairing except the three matching ids.
        let mut differ = join_spec();
        differ.conditions[0].operator = JoinOperator::NotEq;
        let preview = session.preview_join(&differ).unwrap();
        assert_eq!(preview.total_rows, 6);
        assert_eq!(preview.result.row_count(), 6);
        let table = session.materialize_join(&differ, Some("differ")).unwrap();
        assert_eq!(table.row_count, 6);

        for op in [JoinOperator::Gt, JoinOperator::LtEq, JoinOperator::GtEq] {
            let mut spec = join_spec();
            spec.conditions[0].operator = op;
            assert!(session.preview_join(&spec).is_ok(), "{:?}", op);
        }
    }

    #[test]
    fn equality_and_inequality_conditions_combine() {
        let mut session = session_with(&[
            ("limits.csv", "id,cap\n1,11\n3,5\n"),
            ("orders.csv", "id,price\n1,10\n1,12\n3,7\n"),
        ]);
        let spec = JoinSpec {
            left_table: "limits".to_string(),
            right_table: "orders".to_string(),
            join_kind: JoinKind::Inner,
            conditions: vec![
                JoinCondition {
                    left_column: "id".to_string(),
                    right_column: "id".to_string(),
                    operator: JoinOperator::Eq,
                },
                JoinCondition {
                    left_column: "cap".to_string(),
                    right_column: "price".to_string(),
                    operator: JoinOperator::Gt,
                },
            ],
            selected_columns: vec![
                SelectedColumn {
                    side: Side::Left,
                    column: "cap".to_string(),
                    alias: None,
                },
                SelectedColumn {
                    side: Side::Right,
                    column: "price".to_string(),
                    alias: None,
                },
            ],
            left_prefix: None,
            right_prefix: None,
        };
        let table = session.materialize_join(&spec, None).unwrap();
        assert_eq!(table.row_count, 1);
        let rows = session
            .execute("SELECT * FROM \"limits_orders_join\"")
            .unwrap();
        assert_eq!(rows.rows()[0]["price"], serde_json::json!(10));
    }

    #[test]
    fn outer_inequality_join_fails_before_running() {
        let mut session = people_orders();
        let mut spec = join_spec();
        spec.join_kind = JoinKind::Left;
        spec.conditions[0].operator = JoinOperator::Lt;
        assert!(matches!(
            session.preview_join(&spec),
            Err(Error::InvalidJoin(_))
        ));
        assert!(matches!(
            session.materialize_join(&spec, None),
            Err(Error::InvalidJoin(_))
        ));
        assert_eq!(session.catalog().len(), 2);
    }

    #[test]
    fn empty_exports_are_rejected() {
        let mut session = people_orders();
        let sql = "SELECT * FROM \"people\" WHERE \"id\" > 100";
        assert!(matches!(
            session.export_query(sql, ExportFormat::Parquet),
            Err(Error::Export(ExportError::NoRows))
        ));
        assert!(matches!(
            session.export_query(sql, ExportFormat::Json),
            Err(Error::Export(ExportError::NoRows))
        ));
    }

    #[test]
    fn drop_table_keeps_catalog_in_step() {
        let mut session = people_orders();
        assert!(session.drop_table("orders").unwrap());
        assert!(session.table("orders").is_none());
        assert!(!session.drop_table("orders").unwrap());
    }
}
