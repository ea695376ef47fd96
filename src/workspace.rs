//! What a front end drives: one session, its tabs, and optionally a store that
//! remembers the last loaded file.

use tracing::{info, warn};

use crate::catalog::LoadedTable;
use crate::engine::FileBuffer;
use crate::error::{Error, Result};
use crate::format::{ExportFormat, FileFormat};
use crate::join::JoinSpec;
use crate::query::QueryResult;
use crate::search::SearchRequest;
use crate::session::Session;
use crate::sql;
use crate::store::{DiskStorage, RestoreOutcome, SessionStore, Storage};
use crate::tabs::{LiveFilterState, TabManager, TabState, TabUpdate};

pub struct Workspace<S: Storage = DiskStorage> {
    session: Session,
    tabs: TabManager,
    store: Option<SessionStore<S>>,
    preview_limit: usize,
}

impl<S: Storage> Workspace<S> {
    pub fn new(session: Session, store: Option<SessionStore<S>>, preview_limit: usize) -> Self {
        Self {
            session,
            tabs: TabManager::new(),
            store,
            preview_limit,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn tabs(&self) -> &TabManager {
        &self.tabs
    }

    pub fn store(&self) -> Option<&SessionStore<S>> {
        self.store.as_ref()
    }

    pub fn active_tab(&self) -> Option<&TabState> {
        self.tabs.active()
    }

    fn active_relation(&self) -> Result<String> {
        self.tabs
            .active_id()
            .map(str::to_string)
            .ok_or(Error::NoActiveTab)
    }

    fn preview_tab(&mut self, table: LoadedTable) -> Result<TabState> {
        let sql = sql::select_all(&table.relation_name, Some(self.preview_limit));
        let result = self.session.execute(&sql)?;
        Ok(TabState::new(table, sql, result))
    }

    /// Ingest a file, open a tab on its preview and remember it for restore.
    /// Saving is best-effort and never fails the load.
    pub fn open_file(
        &mut self,
        name: &str,
        bytes: Vec<u8>,
        format: Option<FileFormat>,
    ) -> Result<&TabState> {
        let format = format.unwrap_or_else(|| FileFormat::detect(name));
        let table = self
            .session
            .ingest(FileBuffer::Bytes(bytes.clone()), name, format)?;
        let tab = self.preview_tab(table)?;

        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.save(name, format, &bytes) {
                warn!(name, error = %e, "could not save file for restore");
            }
        }
        Ok(self.tabs.open(tab))
    }

    /// Run SQL and record it as the active tab's query.
    pub fn run_query(&mut self, sql: &str) -> Result<QueryResult> {
        let result = self.session.execute(sql)?;
        self.tabs
            .update_active(TabUpdate::query(sql, result.clone()));
        Ok(result)
    }

    pub fn search(&mut self, request: &SearchRequest) -> Result<QueryResult> {
        let relation = self.active_relation()?;
        let (sql, result) = self.session.search(&relation, request)?;
        self.tabs
            .update_active(TabUpdate::query(sql, result.clone()));
        Ok(result)
    }

    pub fn set_quick_filter(&mut self, text: &str) -> bool {
        self.tabs.update_active(TabUpdate::quick_filter(text))
    }

    pub fn select_tab(&mut self, id: &str, live: &dyn LiveFilterState) -> Result<&TabState> {
        self.tabs.select(id, live)
    }

    /// Close a tab. The relation stays loaded.
    pub fn close_tab(&mut self, id: &str) -> Result<TabState> {
        self.tabs.close(id)
    }

    /// Materialize a join and open a tab on the result.
    pub fn join(&mut self, spec: &JoinSpec, target: Option<&str>) -> Result<&TabState> {
        let table = self.session.materialize_join(spec, target)?;
        let tab = self.preview_tab(table)?;
        Ok(self.tabs.open(tab))
    }

    /// Export the active tab. With grid state (quick filter, column filters or
    /// an explicit column list) the displayed rows are exported in full;
    /// otherwise the tab's last query is exported as-is.
    pub fn export_active(
        &mut self,
        visible_columns: Option<&[String]>,
        format: ExportFormat,
    ) -> Result<Vec<u8>> {
        let tab = self.tabs.active().ok_or(Error::NoActiveTab)?;

        if tab.has_grid_filters() || visible_columns.is_some() {
            let relation = tab.table.relation_name.clone();
            let columns = match visible_columns {
                Some(cols) => cols.to_vec(),
                None => tab.table.column_names(),
            };
            let quick_filter = tab.quick_filter_text.clone();
            let filter_model = tab.filter_model.clone();
            self.session.export_displayed(
                &relation,
                &columns,
                Some(quick_filter.as_str()),
                filter_model.as_ref(),
                format,
            )
        } else {
            let sql = tab.last_query.clone();
            self.session.export_query(&sql, format)
        }
    }

    /// Re-ingest the last saved file and open a tab on it.
    pub fn restore_previous(&mut self) -> RestoreOutcome {
        let Some(store) = self.store.as_mut() else {
            return RestoreOutcome::NothingToRestore;
        };
        let outcome = store.restore(&mut self.session);
        if let RestoreOutcome::Restored(table) = &outcome {
            let tab = match self.preview_tab(table.clone()) {
                Ok(tab) => tab,
                Err(e) => {
                    warn!(error = %e, "restored table preview failed");
                    let sql = sql::select_all(&table.relation_name, Some(self.preview_limit));
                    TabState::new(table.clone(), sql, QueryResult::default())
                }
            };
            self.tabs.open(tab);
        }
        outcome
    }

    pub fn clear_saved_session(&mut self) -> Result<()> {
        match self.store.as_mut() {
            Some(store) => store.clear(),
            None => {
                info!("no session store configured; nothing to clear");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;

    fn workspace() -> Workspace<MemoryStorage> {
        Workspace::new(
            Session::default(),
            Some(SessionStore::new(MemoryStorage::new())),
            2,
        )
    }

    #[test]
    fn open_file_previews_with_limit_and_saves() {
        let mut ws = workspace();
        let tab = ws
            .open_file("t.csv", b"a\n1\n2\n3\n".to_vec(), None)
            .unwrap();
        assert_eq!(tab.last_result.row_count(), 2);
        assert_eq!(tab.table.row_count, 3);
        assert_eq!(tab.last_query, "SELECT * FROM \"t\" LIMIT 2");
        let saved = ws.store().and_then(|s| s.last_used_record().unwrap());
        assert_eq!(saved.map(|r| r.display_name), Some("t.csv".to_string()));
    }

    #[test]
    fn search_requires_an_active_tab() {
        let mut ws = workspace();
        assert!(matches!(
            ws.search(&SearchRequest::substring("x")),
            Err(Error::NoActiveTab)
        ));
        assert!(matches!(
            ws.export_active(None, ExportFormat::Csv),
            Err(Error::NoActiveTab)
        ));
    }

    #[test]
    fn query_updates_active_tab() {
        let mut ws = workspace();
        ws.open_file("t.csv", b"a\n1\n2\n3\n".to_vec(), None).unwrap();
        let result = ws.run_query("SELECT * FROM \"t\" WHERE \"a\" > 1").unwrap();
        assert_eq!(result.row_count(), 2);
        assert_eq!(
            ws.active_tab().map(|t| t.last_query.as_str()),
            Some("SELECT * FROM \"t\" WHERE \"a\" > 1")
        );
    }

    #[test]
    fn quick_filter_switches_export_to_displayed_rows() {
        let mut ws = workspace();
        ws.open_file("t.csv", b"a\nfox\ncat\nFOXY\n".to_vec(), None)
            .unwrap();
        // The preview query is capped at two rows.
        let capped = ws.export_active(None, ExportFormat::Csv).unwrap();
        assert_eq!(String::from_utf8(capped).unwrap(), "a\nfox\ncat\n");

        assert!(ws.set_quick_filter("fox"));
        let filtered = ws.export_active(None, ExportFormat::Csv).unwrap();
        assert_eq!(String::from_utf8(filtered).unwrap(), "a\nfox\nFOXY\n");
    }

    #[test]
    fn restore_opens_a_tab() {
        let mut ws = workspace();
        ws.open_file("t.csv", b"a\n1\n".to_vec(), None).unwrap();
        let store = ws.store.take();

        let mut fresh = Workspace::new(Session::default(), store, 10);
        match fresh.restore_previous() {
            RestoreOutcome::Restored(table) => assert_eq!(table.relation_name, "t"),
            other => panic!("expected restore, got {:?}", other),
        }
        assert_eq!(fresh.tabs().active_id(), Some("t"));

        fresh.clear_saved_session().unwrap();
        let mut after = Workspace::new(Session::default(), fresh.store.take(), 10);
        assert_eq!(after.restore_previous(), RestoreOutcome::NothingToRestore);
    }
}
