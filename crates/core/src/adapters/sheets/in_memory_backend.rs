//! A [`SpreadsheetBackend`] that keeps everything in process memory.
//!
//! Behaves like the Google backend where sessions can observe it: new
//! spreadsheets start with a `Sheet1` worksheet and are owned by the creator,
//! granting `owner` demotes the previous owner to `writer`, worksheet titles
//! clash case-insensitively, and every call is counted.

use error_stack::{report, ResultExt};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
};

use crate::{
    domain::sheets::{
        permission::{PermissionEntry, Role},
        row::Row,
        spreadsheet::{SpreadsheetHandle, Worksheet},
        worksheet_config::same_title,
    },
    ports::spreadsheet_backend::{BackendError, BackendResult, SpreadsheetBackend},
};

const DEFAULT_WORKSHEET: &str = "Sheet1";

#[derive(Debug, Clone)]
struct StoredWorksheet {
    worksheet: Worksheet,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
struct StoredSpreadsheet {
    handle: SpreadsheetHandle,
    permissions: Vec<PermissionEntry>,
    worksheets: Vec<StoredWorksheet>,
    next_sheet_id: i32,
}

impl StoredSpreadsheet {
    fn worksheet_mut(&mut self, title: &str) -> BackendResult<&mut StoredWorksheet> {
        self.worksheets
            .iter_mut()
            .find(|ws| same_title(&ws.worksheet.title, title))
            .ok_or_else(|| report!(BackendError::NotFound))
    }

    fn title_taken(&self, title: &str, except_sheet_id: Option<i32>) -> bool {
        self.worksheets.iter().any(|ws| {
            same_title(&ws.worksheet.title, title) && Some(ws.worksheet.sheet_id) != except_sheet_id
        })
    }

    fn push_worksheet(&mut self, title: &str) -> Worksheet {
        let worksheet = Worksheet {
            sheet_id: self.next_sheet_id,
            title: title.to_string(),
        };
        self.next_sheet_id += 1;
        self.worksheets.push(StoredWorksheet {
            worksheet: worksheet.clone(),
            rows: Vec::new(),
        });
        worksheet
    }
}

#[derive(Debug, Default)]
struct State {
    spreadsheets: Vec<StoredSpreadsheet>,
    /// Lowercased email to the error every `share` for it fails with.
    share_failures: HashMap<String, BackendError>,
    next_key: usize,
}

impl State {
    fn spreadsheet_mut(&mut self, key: &str) -> BackendResult<&mut StoredSpreadsheet> {
        self.spreadsheets
            .iter_mut()
            .find(|stored| stored.handle.key == key)
            .ok_or_else(|| report!(BackendError::NotFound))
    }

    fn insert(&mut self, title: &str, key: Option<&str>, owner: &str) -> SpreadsheetHandle {
        self.next_key += 1;
        let key = key
            .map(str::to_string)
            .unwrap_or_else(|| format!("in-memory-{}", self.next_key));
        let handle = SpreadsheetHandle::new(key, title);
        let mut stored = StoredSpreadsheet {
            handle: handle.clone(),
            permissions: vec![PermissionEntry::new(owner, Role::Owner)],
            worksheets: Vec::new(),
            next_sheet_id: 0,
        };
        stored.push_worksheet(DEFAULT_WORKSHEET);
        self.spreadsheets.push(stored);
        handle
    }
}

#[derive(Debug)]
pub struct InMemoryBackend {
    identity: String,
    state: Mutex<State>,
    calls: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            state: Mutex::new(State::default()),
            calls: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    /// Seeds a spreadsheet owned by `owner` with a fixed key. Not counted as
    /// a backend call.
    pub fn seed_spreadsheet(&self, title: &str, key: &str, owner: &str) -> SpreadsheetHandle {
        self.state().insert(title, Some(key), owner)
    }

    /// Adds or replaces the entry for `email`.
    pub fn grant(&self, key: &str, email: &str, role: Role) {
        let mut state = self.state();
        if let Ok(stored) = state.spreadsheet_mut(key) {
            stored.permissions.retain(|entry| !entry.is_for(email));
            stored.permissions.push(PermissionEntry::new(email, role));
        }
    }

    pub fn revoke(&self, key: &str, email: &str) {
        let mut state = self.state();
        if let Ok(stored) = state.spreadsheet_mut(key) {
            stored.permissions.retain(|entry| !entry.is_for(email));
        }
    }

    /// Seeds a worksheet with content, creating it if needed.
    pub fn seed_worksheet(&self, key: &str, title: &str, rows: &[&[&str]]) {
        let mut state = self.state();
        if let Ok(stored) = state.spreadsheet_mut(key) {
            if stored.worksheet_mut(title).is_err() {
                stored.push_worksheet(title);
            }
            if let Ok(worksheet) = stored.worksheet_mut(title) {
                worksheet.rows = rows
                    .iter()
                    .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                    .collect();
            }
        }
    }

    /// Future `share` calls for `email` are rejected by the "backend".
    pub fn reject_shares_for(&self, email: &str) {
        self.fail_shares_with(email, BackendError::Rejected);
    }

    /// Future `share` calls for `email` fail with `error`.
    pub fn fail_shares_with(&self, email: &str, error: BackendError) {
        self.state()
            .share_failures
            .insert(email.to_lowercase(), error);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn permissions_of(&self, key: &str) -> Vec<PermissionEntry> {
        self.state()
            .spreadsheet_mut(key)
            .map(|stored| stored.permissions.clone())
            .unwrap_or_default()
    }

    pub fn worksheet_titles(&self, key: &str) -> Vec<String> {
        self.state()
            .spreadsheet_mut(key)
            .map(|stored| {
                stored
                    .worksheets
                    .iter()
                    .map(|ws| ws.worksheet.title.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn rows_of(&self, key: &str, title: &str) -> Vec<Vec<String>> {
        let mut state = self.state();
        state
            .spreadsheet_mut(key)
            .and_then(|stored| stored.worksheet_mut(title).map(|ws| ws.rows.clone()))
            .unwrap_or_default()
    }

    pub fn spreadsheet_count(&self) -> usize {
        self.state().spreadsheets.len()
    }
}

#[async_trait::async_trait]
impl SpreadsheetBackend for InMemoryBackend {
    fn identity(&self) -> &str {
        &self.identity
    }

    async fn create_spreadsheet(&self, title: &str) -> BackendResult<SpreadsheetHandle> {
        self.record_call();
        Ok(self.state().insert(title, None, &self.identity))
    }

    async fn open_by_title(&self, title: &str) -> BackendResult<SpreadsheetHandle> {
        self.record_call();
        let state = self.state();
        state
            .spreadsheets
            .iter()
            .find(|stored| {
                stored.handle.title == title
                    && stored
                        .permissions
                        .iter()
                        .any(|entry| entry.is_for(&self.identity))
            })
            .map(|stored| stored.handle.clone())
            .ok_or_else(|| report!(BackendError::NotFound))
    }

    async fn open_by_key(&self, key: &str) -> BackendResult<SpreadsheetHandle> {
        self.record_call();
        let mut state = self.state();
        state
            .spreadsheet_mut(key)
            .map(|stored| stored.handle.clone())
    }

    async fn list_permissions(
        &self,
        spreadsheet: &SpreadsheetHandle,
    ) -> BackendResult<Vec<PermissionEntry>> {
        self.record_call();
        let mut state = self.state();
        state
            .spreadsheet_mut(&spreadsheet.key)
            .map(|stored| stored.permissions.clone())
    }

    async fn share(
        &self,
        spreadsheet: &SpreadsheetHandle,
        email: &str,
        role: Role,
        _notify: bool,
    ) -> BackendResult<()> {
        self.record_call();
        let mut state = self.state();
        if let Some(error) = state.share_failures.get(&email.to_lowercase()).cloned() {
            return Err(report!(error))
                .attach_printable(format!("Sharing with {email} failed"));
        }

        let stored = state.spreadsheet_mut(&spreadsheet.key)?;
        if role == Role::Owner {
            for entry in stored.permissions.iter_mut() {
                if entry.role() == Some(Role::Owner) {
                    entry.role = Role::Writer.to_string();
                }
            }
        }
        stored.permissions.retain(|entry| !entry.is_for(email));
        stored.permissions.push(PermissionEntry::new(email, role));
        Ok(())
    }

    async fn worksheets(&self, spreadsheet: &SpreadsheetHandle) -> BackendResult<Vec<Worksheet>> {
        self.record_call();
        let mut state = self.state();
        state
            .spreadsheet_mut(&spreadsheet.key)
            .map(|stored| {
                stored
                    .worksheets
                    .iter()
                    .map(|ws| ws.worksheet.clone())
                    .collect()
            })
    }

    async fn add_worksheet(
        &self,
        spreadsheet: &SpreadsheetHandle,
        title: &str,
    ) -> BackendResult<Worksheet> {
        self.record_call();
        let mut state = self.state();
        let stored = state.spreadsheet_mut(&spreadsheet.key)?;
        if stored.title_taken(title, None) {
            return Err(report!(BackendError::Rejected))
                .attach_printable(format!("A sheet with the name {title} already exists"));
        }
        Ok(stored.push_worksheet(title))
    }

    async fn rename_worksheet(
        &self,
        spreadsheet: &SpreadsheetHandle,
        sheet_id: i32,
        title: &str,
    ) -> BackendResult<()> {
        self.record_call();
        let mut state = self.state();
        let stored = state.spreadsheet_mut(&spreadsheet.key)?;
        if stored.title_taken(title, Some(sheet_id)) {
            return Err(report!(BackendError::Rejected))
                .attach_printable(format!("A sheet with the name {title} already exists"));
        }
        let worksheet = stored
            .worksheets
            .iter_mut()
            .find(|ws| ws.worksheet.sheet_id == sheet_id)
            .ok_or_else(|| report!(BackendError::NotFound))?;
        worksheet.worksheet.title = title.to_string();
        Ok(())
    }

    async fn read_rows(
        &self,
        spreadsheet: &SpreadsheetHandle,
        worksheet_title: &str,
    ) -> BackendResult<Vec<Vec<String>>> {
        self.record_call();
        let mut state = self.state();
        let stored = state.spreadsheet_mut(&spreadsheet.key)?;
        Ok(stored.worksheet_mut(worksheet_title)?.rows.clone())
    }

    async fn write_row(
        &self,
        spreadsheet: &SpreadsheetHandle,
        worksheet_title: &str,
        row: Row,
        values: &[String],
    ) -> BackendResult<()> {
        self.record_call();
        let mut state = self.state();
        let stored = state.spreadsheet_mut(&spreadsheet.key)?;
        let worksheet = stored.worksheet_mut(worksheet_title)?;
        let index = row.index() as usize;
        if worksheet.rows.len() <= index {
            worksheet.rows.resize(index + 1, Vec::new());
        }
        let target = &mut worksheet.rows[index];
        if target.len() < values.len() {
            target.resize(values.len(), String::new());
        }
        target[..values.len()].clone_from_slice(values);
        Ok(())
    }
}
