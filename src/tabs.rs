//! Tab Manager: ordered open tables, each with its own query and filter state.
//!
//! A tab's id is its relation name. Tab state changes only through
//! `update_active` (query results and quick-filter edits) and through the
//! filter-model capture that happens when switching away from a tab.

use crate::catalog::LoadedTable;
use crate::error::{Error, Result};
use crate::filter::FilterModel;
use crate::query::QueryResult;

/// Source of the grid's current column filters, read only when switching tabs.
pub trait LiveFilterState {
    fn filter_model(&self) -> Option<FilterModel>;
}

impl LiveFilterState for Option<FilterModel> {
    fn filter_model(&self) -> Option<FilterModel> {
        self.clone()
    }
}

impl LiveFilterState for FilterModel {
    fn filter_model(&self) -> Option<FilterModel> {
        if self.is_empty() {
            None
        } else {
            Some(self.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabState {
    pub table: LoadedTable,
    pub last_result: QueryResult,
    pub last_query: String,
    pub quick_filter_text: String,
    pub filter_model: Option<FilterModel>,
}

impl TabState {
    pub fn new(table: LoadedTable, last_query: impl Into<String>, last_result: QueryResult) -> Self {
        Self {
            table,
            last_result,
            last_query: last_query.into(),
            quick_filter_text: String::new(),
            filter_model: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.table.relation_name
    }

    /// True when the grid is narrowing rows beyond what `last_query` returns.
    pub fn has_grid_filters(&self) -> bool {
        !self.quick_filter_text.trim().is_empty()
            || self.filter_model.as_ref().is_some_and(|m| !m.is_empty())
    }
}

/// Partial update merged into the active tab. `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct TabUpdate {
    pub last_result: Option<QueryResult>,
    pub last_query: Option<String>,
    pub quick_filter_text: Option<String>,
}

impl TabUpdate {
    pub fn query(sql: impl Into<String>, result: QueryResult) -> Self {
        Self {
            last_result: Some(result),
            last_query: Some(sql.into()),
            ..Self::default()
        }
    }

    pub fn quick_filter(text: impl Into<String>) -> Self {
        Self {
            quick_filter_text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TabManager {
    tabs: Vec<TabState>,
    active: Option<String>,
}

impl TabManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tabs(&self) -> &[TabState] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TabState> {
        self.tabs.iter().find(|t| t.id() == id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&TabState> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.tabs.iter().position(|t| t.id() == id)
    }

    /// Add a tab and make it active. A tab with the same id is replaced, and
    /// the new one goes to the end either way.
    pub fn open(&mut self, tab: TabState) -> &TabState {
        if let Some(idx) = self.position(tab.id()) {
            self.tabs.remove(idx);
        }
        self.active = Some(tab.id().to_string());
        self.tabs.push(tab);
        let last = self.tabs.len() - 1;
        &self.tabs[last]
    }

    /// Capture the grid's filters into the current tab, then activate `id`.
    pub fn select(&mut self, id: &str, live: &dyn LiveFilterState) -> Result<&TabState> {
        let target = self
            .position(id)
            .ok_or_else(|| Error::TabNotFound(id.to_string()))?;

        if let Some(current) = self.active.as_deref().and_then(|a| self.position(a)) {
            self.tabs[current].filter_model = live.filter_model();
        }
        self.active = Some(id.to_string());
        Ok(&self.tabs[target])
    }

    /// Remove a tab. Closing the active tab activates the last remaining one.
    pub fn close(&mut self, id: &str) -> Result<TabState> {
        let idx = self
            .position(id)
            .ok_or_else(|| Error::TabNotFound(id.to_string()))?;
        let closed = self.tabs.remove(idx);
        if self.active.as_deref() == Some(id) {
            self.active = self.tabs.last().map(|t| t.id().to_string());
        }
        Ok(closed)
    }

    /// Merge `update` into the active tab. Returns false when no tab is active.
    pub fn update_active(&mut self, update: TabUpdate) -> bool {
        let Some(idx) = self.active.as_deref().and_then(|a| self.position(a)) else {
            return false;
        };
        let tab = &mut self.tabs[idx];
        if let Some(result) = update.last_result {
            tab.last_result = result;
        }
        if let Some(query) = update.last_query {
            tab.last_query = query;
        }
        if let Some(text) = update.quick_filter_text {
            tab.quick_filter_text = text;
        }
        true
    }
}
