use thiserror::Error;

use crate::domain::sheets::{
    permission::{PermissionEntry, Role},
    row::Row,
    spreadsheet::{SpreadsheetHandle, Worksheet},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Resource not found")]
    NotFound,
    #[error("Request rejected by the backend")]
    Rejected,
    #[error("Failed to authenticate against the backend")]
    Authentication,
    #[error("Failed to reach the backend")]
    Transport,
    #[error("Unexpected response from the backend")]
    InvalidResponse,
}

impl BackendError {
    /// Errors the backend answered with, as opposed to ones it never saw.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BackendError::Rejected | BackendError::NotFound)
    }
}

pub type BackendResult<T> = error_stack::Result<T, BackendError>;

/// Everything a session needs from the remote spreadsheet service.
///
/// Implementations are shared between sessions through an `Arc`, so each
/// call must be self-contained.
#[async_trait::async_trait]
pub trait SpreadsheetBackend: Send + Sync {
    /// Email of the principal the backend acts as.
    fn identity(&self) -> &str;

    async fn create_spreadsheet(&self, title: &str) -> BackendResult<SpreadsheetHandle>;

    /// Fails with [`BackendError::NotFound`] when no spreadsheet has that title.
    async fn open_by_title(&self, title: &str) -> BackendResult<SpreadsheetHandle>;

    /// Fails with [`BackendError::NotFound`] when the key does not resolve.
    async fn open_by_key(&self, key: &str) -> BackendResult<SpreadsheetHandle>;

    /// All permission entries, across every page the backend returns.
    async fn list_permissions(
        &self,
        spreadsheet: &SpreadsheetHandle,
    ) -> BackendResult<Vec<PermissionEntry>>;

    /// Granting [`Role::Owner`] transfers ownership.
    async fn share(
        &self,
        spreadsheet: &SpreadsheetHandle,
        email: &str,
        role: Role,
        notify: bool,
    ) -> BackendResult<()>;

    async fn worksheets(&self, spreadsheet: &SpreadsheetHandle) -> BackendResult<Vec<Worksheet>>;

    async fn add_worksheet(
        &self,
        spreadsheet: &SpreadsheetHandle,
        title: &str,
    ) -> BackendResult<Worksheet>;

    async fn rename_worksheet(
        &self,
        spreadsheet: &SpreadsheetHandle,
        sheet_id: i32,
        title: &str,
    ) -> BackendResult<()>;

    /// Rows of a worksheet as displayed strings. Trailing empty rows and
    /// cells may be omitted.
    async fn read_rows(
        &self,
        spreadsheet: &SpreadsheetHandle,
        worksheet_title: &str,
    ) -> BackendResult<Vec<Vec<String>>>;

    /// Overwrites the cells of `row` starting at column A.
    async fn write_row(
        &self,
        spreadsheet: &SpreadsheetHandle,
        worksheet_title: &str,
        row: Row,
        values: &[String],
    ) -> BackendResult<()>;
}
