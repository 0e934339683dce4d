use error_stack::{report, Report, ResultExt};
use google_drive3::{
    api::{Permission, Scope as DriveScope},
    DriveHub,
};
use google_sheets4::{
    api::{
        AddSheetRequest, BatchUpdateSpreadsheetRequest, Request, SheetProperties, Spreadsheet,
        SpreadsheetProperties, UpdateSheetPropertiesRequest, ValueRange,
    },
    FieldMask, Sheets,
};
use std::fmt::Debug;
use tracing::instrument;

use super::{
    auth,
    cell_values::IntoCellStrings,
    http_client::{self, HttpsConnector},
    value_range_factory::ValueRangeFactory,
};
use crate::{
    adapters::config::sheets_config::SpreadsheetConfig,
    domain::sheets::{
        a1_notation::A1Notation,
        permission::{PermissionEntry, Role},
        row::Row,
        spreadsheet::{SpreadsheetHandle, Worksheet},
    },
    ports::spreadsheet_backend::{BackendError, BackendResult, SpreadsheetBackend},
};

const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";
const PERMISSION_FIELDS: &str = "nextPageToken,permissions(emailAddress,role,type)";

/// Sheets API for spreadsheet content, Drive API for lookup by title and
/// permissions. Both hubs share one HTTP client and one authenticator.
pub struct GoogleBackend {
    identity: String,
    sheets: Sheets<HttpsConnector>,
    drive: DriveHub<HttpsConnector>,
}

impl Debug for GoogleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GoogleBackend {{ identity: {:?} }}", self.identity)
    }
}

impl GoogleBackend {
    #[instrument(name = "GoogleBackend::new")]
    pub async fn new(config: &SpreadsheetConfig) -> BackendResult<Self> {
        let client = http_client::http_client();
        let account = auth::auth(config, client.clone()).await?;
        tracing::debug!("Authenticated as {}", account.email);

        let sheets = Sheets::new(client.clone(), account.authenticator.clone());
        let drive = DriveHub::new(client, account.authenticator);

        Ok(GoogleBackend {
            identity: account.email,
            sheets,
            drive,
        })
    }
}

fn status_from_body(body: &serde_json::Value) -> Option<u64> {
    body.get("error")
        .and_then(|error| error.get("code"))
        .and_then(serde_json::Value::as_u64)
}

fn status_to_error(status: Option<u64>) -> BackendError {
    match status {
        Some(404) => BackendError::NotFound,
        _ => BackendError::Rejected,
    }
}

/// The generated clients each re-export the same error shape.
macro_rules! api_error_classifier {
    ($name:ident, $krate:ident) => {
        fn $name(err: $krate::Error) -> Report<BackendError> {
            let context = match &err {
                $krate::Error::BadRequest(body) => status_to_error(status_from_body(body)),
                $krate::Error::Failure(response) => {
                    status_to_error(Some(u64::from(response.status().as_u16())))
                }
                $krate::Error::MissingToken(_) | $krate::Error::MissingAPIKey => {
                    BackendError::Authentication
                }
                $krate::Error::JsonDecodeError(..) | $krate::Error::FieldClash(_) => {
                    BackendError::InvalidResponse
                }
                _ => BackendError::Transport,
            };
            report!(context).attach_printable(err.to_string())
        }
    };
}

api_error_classifier!(sheets_error, google_sheets4);
api_error_classifier!(drive_error, google_drive3);

fn handle_from_spreadsheet(spreadsheet: Spreadsheet) -> BackendResult<SpreadsheetHandle> {
    let key = spreadsheet
        .spreadsheet_id
        .ok_or_else(|| report!(BackendError::InvalidResponse))
        .attach_printable("Spreadsheet id not present in response")?;
    let title = spreadsheet
        .properties
        .and_then(|properties| properties.title)
        .unwrap_or_default();
    Ok(SpreadsheetHandle::new(key, title))
}

fn worksheet_from_properties(properties: SheetProperties) -> Worksheet {
    Worksheet {
        sheet_id: properties.sheet_id.unwrap_or(0),
        title: properties.title.unwrap_or_default(),
    }
}

/// Escapes a value for a Drive `q` string literal.
fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

impl GoogleBackend {
    async fn batch_update(
        &self,
        spreadsheet: &SpreadsheetHandle,
        requests: Vec<Request>,
    ) -> BackendResult<google_sheets4::api::BatchUpdateSpreadsheetResponse> {
        let request = BatchUpdateSpreadsheetRequest {
            requests: Some(requests),
            ..Default::default()
        };
        let (_, response) = self
            .sheets
            .spreadsheets()
            .batch_update(request, &spreadsheet.key)
            .doit()
            .await
            .map_err(sheets_error)?;
        Ok(response)
    }
}

#[async_trait::async_trait]
impl SpreadsheetBackend for GoogleBackend {
    fn identity(&self) -> &str {
        &self.identity
    }

    #[instrument(skip(self))]
    async fn create_spreadsheet(&self, title: &str) -> BackendResult<SpreadsheetHandle> {
        let request = Spreadsheet {
            properties: Some(SpreadsheetProperties {
                title: Some(title.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let (_, created) = self
            .sheets
            .spreadsheets()
            .create(request)
            .doit()
            .await
            .map_err(sheets_error)?;

        handle_from_spreadsheet(created)
    }

    #[instrument(skip(self))]
    async fn open_by_title(&self, title: &str) -> BackendResult<SpreadsheetHandle> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query_literal(title),
            SPREADSHEET_MIME_TYPE
        );

        let (_, list) = self
            .drive
            .files()
            .list()
            .q(&query)
            .supports_all_drives(true)
            .include_items_from_all_drives(true)
            .add_scope(DriveScope::Full)
            .doit()
            .await
            .map_err(drive_error)?;

        let file = list
            .files
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| report!(BackendError::NotFound))
            .attach_printable_lazy(|| format!("No spreadsheet titled {title}"))?;

        let key = file
            .id
            .ok_or_else(|| report!(BackendError::InvalidResponse))
            .attach_printable("File id not present in response")?;

        Ok(SpreadsheetHandle::new(
            key,
            file.name.unwrap_or_else(|| title.to_string()),
        ))
    }

    #[instrument(skip(self))]
    async fn open_by_key(&self, key: &str) -> BackendResult<SpreadsheetHandle> {
        let (_, spreadsheet) = self
            .sheets
            .spreadsheets()
            .get(key)
            .include_grid_data(false)
            .doit()
            .await
            .map_err(sheets_error)?;

        handle_from_spreadsheet(spreadsheet)
    }

    #[instrument(skip(self))]
    async fn list_permissions(
        &self,
        spreadsheet: &SpreadsheetHandle,
    ) -> BackendResult<Vec<PermissionEntry>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call = self
                .drive
                .permissions()
                .list(&spreadsheet.key)
                .supports_all_drives(true)
                .param("fields", PERMISSION_FIELDS)
                .add_scope(DriveScope::Full);
            if let Some(token) = &page_token {
                call = call.page_token(token);
            }

            let (_, list) = call.doit().await.map_err(drive_error)?;

            entries.extend(
                list.permissions
                    .unwrap_or_default()
                    .into_iter()
                    .map(|permission| PermissionEntry {
                        email: permission.email_address,
                        role: permission.role.unwrap_or_default(),
                    }),
            );

            match list.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!("Fetched {} permission entries", entries.len());
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn share(
        &self,
        spreadsheet: &SpreadsheetHandle,
        email: &str,
        role: Role,
        notify: bool,
    ) -> BackendResult<()> {
        let permission = Permission {
            email_address: Some(email.to_string()),
            role: Some(role.to_string()),
            type_: Some("user".to_string()),
            ..Default::default()
        };

        let mut call = self
            .drive
            .permissions()
            .create(permission, &spreadsheet.key)
            .send_notification_email(notify)
            .supports_all_drives(true)
            .add_scope(DriveScope::Full);
        if role == Role::Owner {
            call = call.transfer_ownership(true);
        }

        call.doit()
            .await
            .map(|_| ())
            .map_err(drive_error)
            .attach_printable_lazy(|| format!("Failed to share with {email} as {role}"))
    }

    #[instrument(skip(self))]
    async fn worksheets(&self, spreadsheet: &SpreadsheetHandle) -> BackendResult<Vec<Worksheet>> {
        let (_, response) = self
            .sheets
            .spreadsheets()
            .get(&spreadsheet.key)
            .param("fields", "sheets.properties")
            .doit()
            .await
            .map_err(sheets_error)?;

        Ok(response
            .sheets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|sheet| sheet.properties)
            .map(worksheet_from_properties)
            .collect())
    }

    #[instrument(skip(self))]
    async fn add_worksheet(
        &self,
        spreadsheet: &SpreadsheetHandle,
        title: &str,
    ) -> BackendResult<Worksheet> {
        let request = Request {
            add_sheet: Some(AddSheetRequest {
                properties: Some(SheetProperties {
                    title: Some(title.to_string()),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        };

        let response = self.batch_update(spreadsheet, vec![request]).await?;

        response
            .replies
            .unwrap_or_default()
            .into_iter()
            .find_map(|reply| reply.add_sheet.and_then(|added| added.properties))
            .map(worksheet_from_properties)
            .ok_or_else(|| report!(BackendError::InvalidResponse))
            .attach_printable_lazy(|| format!("No properties returned for new worksheet {title}"))
    }

    #[instrument(skip(self))]
    async fn rename_worksheet(
        &self,
        spreadsheet: &SpreadsheetHandle,
        sheet_id: i32,
        title: &str,
    ) -> BackendResult<()> {
        let request = Request {
            update_sheet_properties: Some(UpdateSheetPropertiesRequest {
                properties: Some(SheetProperties {
                    sheet_id: Some(sheet_id),
                    title: Some(title.to_string()),
                    ..Default::default()
                }),
                fields: Some(FieldMask::new(&["title"])),
            }),
            ..Default::default()
        };

        self.batch_update(spreadsheet, vec![request])
            .await
            .map(|_| ())
            .attach_printable_lazy(|| format!("Failed to rename worksheet {sheet_id} to {title}"))
    }

    #[instrument(skip(self))]
    async fn read_rows(
        &self,
        spreadsheet: &SpreadsheetHandle,
        worksheet_title: &str,
    ) -> BackendResult<Vec<Vec<String>>> {
        let range = A1Notation::whole_sheet(worksheet_title);
        let (_, value_range) = self
            .sheets
            .spreadsheets()
            .values_get(&spreadsheet.key, range.as_ref())
            .doit()
            .await
            .map_err(sheets_error)
            .attach_printable_lazy(|| format!("Failed to read range {range}"))?;

        Ok(value_range.values.unwrap_or_default().into_cell_strings())
    }

    #[instrument(skip(self))]
    async fn write_row(
        &self,
        spreadsheet: &SpreadsheetHandle,
        worksheet_title: &str,
        row: Row,
        values: &[String],
    ) -> BackendResult<()> {
        let range = A1Notation::row_start(worksheet_title, row);
        self.sheets
            .spreadsheets()
            .values_update(
                ValueRange::from_single_row(values),
                &spreadsheet.key,
                range.as_ref(),
            )
            .value_input_option("RAW")
            .doit()
            .await
            .map(|_| ())
            .map_err(sheets_error)
            .attach_printable_lazy(|| format!("Failed to write to range {range}"))
    }
}
