use error_stack::ResultExt;
use tracing::instrument;

use super::session::{Result, Session, SessionError};
use crate::domain::sheets::{
    row::Row,
    worksheet_config::{
        header_matches, inactive_title, is_inactive, same_title, unique_title, WorksheetConfig,
        WorksheetDeclaration, CONFIG_HEADER, CONFIG_WORKSHEET,
    },
};

/// What a call to [`Session::initialize`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitializeReport {
    pub config_created: bool,
    pub created: Vec<String>,
    pub reactivated: Vec<String>,
    /// `(old title, new title)` of worksheets no longer declared.
    pub deactivated: Vec<(String, String)>,
    pub headers_written: Vec<String>,
}

impl InitializeReport {
    pub fn is_noop(&self) -> bool {
        !self.config_created
            && self.created.is_empty()
            && self.reactivated.is_empty()
            && self.deactivated.is_empty()
            && self.headers_written.is_empty()
    }
}

impl Session {
    /// Brings the worksheets in line with the `config` worksheet, creating
    /// `config` first if it does not exist.
    ///
    /// Declared worksheets are created (or restored from `_inactive-<name>`)
    /// and get their header row; undeclared ones are renamed to
    /// `_inactive-<name>`. A `config` that declares nothing leaves every
    /// worksheet alone. Nothing is ever deleted, and a second call with an
    /// unchanged `config` does nothing.
    ///
    /// Titles match case-insensitively. An existing worksheet keeps its own
    /// casing when it matches a declaration.
    #[instrument(skip(self), fields(spreadsheet = %self.spreadsheet))]
    pub async fn initialize(&self) -> Result<InitializeReport> {
        let mut report = InitializeReport::default();
        let mut worksheets = self
            .backend
            .worksheets(&self.spreadsheet)
            .await
            .change_context(SessionError::Backend)?;

        let Some(config_title) = worksheets
            .iter()
            .find(|ws| same_title(&ws.title, CONFIG_WORKSHEET))
            .map(|ws| ws.title.clone())
        else {
            tracing::info!("No {} worksheet found, creating it.", CONFIG_WORKSHEET);
            self.backend
                .add_worksheet(&self.spreadsheet, CONFIG_WORKSHEET)
                .await
                .change_context(SessionError::Backend)?;
            self.backend
                .write_row(
                    &self.spreadsheet,
                    CONFIG_WORKSHEET,
                    Row::HEADER,
                    &CONFIG_HEADER.map(String::from),
                )
                .await
                .change_context(SessionError::Backend)?;
            report.config_created = true;
            return Ok(report);
        };

        let rows = self
            .backend
            .read_rows(&self.spreadsheet, &config_title)
            .await
            .change_context(SessionError::Backend)?;
        let config = WorksheetConfig::parse(&rows)
            .change_context(SessionError::Configuration)
            .attach_printable("Invalid config worksheet")?;

        for name in &config.duplicates {
            tracing::warn!(
                "Worksheet {} is declared more than once in {}, keeping the first declaration.",
                name,
                config_title
            );
        }

        if config.declarations.is_empty() {
            tracing::warn!(
                "{} declares no worksheets yet, leaving existing worksheets untouched.",
                config_title
            );
            return Ok(report);
        }

        for declaration in &config.declarations {
            if let Some(existing) = worksheets
                .iter()
                .find(|ws| same_title(&ws.title, &declaration.name))
            {
                let title = existing.title.clone();
                if self.apply_header(&title, declaration).await? {
                    report.headers_written.push(title);
                }
                continue;
            }

            let inactive = inactive_title(&declaration.name);
            if let Some(worksheet) = worksheets
                .iter_mut()
                .find(|ws| same_title(&ws.title, &inactive))
            {
                self.backend
                    .rename_worksheet(&self.spreadsheet, worksheet.sheet_id, &declaration.name)
                    .await
                    .change_context(SessionError::Backend)?;
                tracing::info!(
                    "Reactivated worksheet {} from {}.",
                    declaration.name,
                    worksheet.title
                );
                worksheet.title = declaration.name.clone();
                report.reactivated.push(declaration.name.clone());

                if self.apply_header(&declaration.name, declaration).await? {
                    report.headers_written.push(declaration.name.clone());
                }
                continue;
            }

            let worksheet = self
                .backend
                .add_worksheet(&self.spreadsheet, &declaration.name)
                .await
                .change_context(SessionError::Backend)?;
            tracing::info!("Created worksheet {}.", declaration.name);
            worksheets.push(worksheet);
            report.created.push(declaration.name.clone());

            if !declaration.columns.is_empty() {
                self.write_header(&declaration.name, declaration.columns.clone())
                    .await?;
                report.headers_written.push(declaration.name.clone());
            }
        }

        let undeclared = worksheets
            .iter()
            .filter(|ws| {
                !same_title(&ws.title, CONFIG_WORKSHEET)
                    && !is_inactive(&ws.title)
                    && !config.is_declared(&ws.title)
            })
            .map(|ws| (ws.sheet_id, ws.title.clone()))
            .collect::<Vec<_>>();

        for (sheet_id, title) in undeclared {
            let target = unique_title(&inactive_title(&title), |candidate| {
                worksheets.iter().any(|ws| same_title(&ws.title, candidate))
            });
            self.backend
                .rename_worksheet(&self.spreadsheet, sheet_id, &target)
                .await
                .change_context(SessionError::Backend)?;
            tracing::info!(
                "Worksheet {} is no longer declared in {}, renamed to {}.",
                title,
                config_title,
                target
            );
            if let Some(worksheet) = worksheets.iter_mut().find(|ws| ws.sheet_id == sheet_id) {
                worksheet.title = target.clone();
            }
            report.deactivated.push((title, target));
        }

        Ok(report)
    }

    /// Returns whether the header row of `worksheet_title` had to be rewritten.
    async fn apply_header(
        &self,
        worksheet_title: &str,
        declaration: &WorksheetDeclaration,
    ) -> Result<bool> {
        if declaration.columns.is_empty() {
            return Ok(false);
        }

        let rows = self
            .backend
            .read_rows(&self.spreadsheet, worksheet_title)
            .await
            .change_context(SessionError::Backend)?;
        let existing = rows.first().map(Vec::as_slice).unwrap_or_default();
        if header_matches(existing, &declaration.columns) {
            return Ok(false);
        }

        // Blank out leftover cells so the comparison holds on the next run.
        let mut header = declaration.columns.clone();
        if existing.len() > header.len() {
            header.resize(existing.len(), String::new());
        }
        self.write_header(worksheet_title, header).await?;
        Ok(true)
    }

    async fn write_header(&self, worksheet_title: &str, header: Vec<String>) -> Result<()> {
        self.backend
            .write_row(&self.spreadsheet, worksheet_title, Row::HEADER, &header)
            .await
            .change_context(SessionError::Backend)
            .attach_printable_lazy(|| format!("Failed to write header of {worksheet_title}"))?;
        tracing::info!("Wrote header of worksheet {}.", worksheet_title);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::sheets::in_memory_backend::InMemoryBackend,
        domain::sheets::{lookup::Lookup, permission::Role},
    };
    use std::sync::Arc;

    const ROBOT: &str = "robot@project.iam.gserviceaccount.com";
    const KEY: &str = "budget-key";

    fn backend_with_config(config: &[&[&str]]) -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new(ROBOT));
        backend.seed_spreadsheet("Budget", KEY, ROBOT);
        backend.seed_worksheet(KEY, CONFIG_WORKSHEET, config);
        backend
    }

    fn titles(backend: &InMemoryBackend) -> Vec<String> {
        backend.worksheet_titles(KEY)
    }

    #[tokio::test]
    async fn test_missing_config_is_created_and_nothing_else() {
        let backend = Arc::new(InMemoryBackend::new(ROBOT));
        backend.seed_spreadsheet("Budget", KEY, ROBOT);

        let session = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();

        assert_eq!(titles(&backend), vec!["Sheet1", "config"]);
        assert_eq!(
            backend.rows_of(KEY, CONFIG_WORKSHEET),
            vec![vec!["worksheet", "columns"]]
        );

        let report = session.initialize().await.unwrap();
        assert!(report.is_noop(), "{report:?}");
        assert_eq!(titles(&backend), vec!["Sheet1", "config"]);
    }

    #[tokio::test]
    async fn test_empty_config_keeps_existing_tabs_across_opens() {
        let backend = Arc::new(InMemoryBackend::new(ROBOT));
        backend.seed_spreadsheet("Budget", KEY, ROBOT);
        backend.seed_worksheet(KEY, "Ledger", &[&["date", "amount"], &["2024-01-01", "5"]]);

        for _ in 0..3 {
            let session = Session::open(backend.clone(), Lookup::Key(KEY.into()))
                .await
                .unwrap();
            assert!(session.initialize_report().deactivated.is_empty());
        }

        assert_eq!(titles(&backend), vec!["Sheet1", "Ledger", "config"]);
        assert_eq!(
            backend.rows_of(KEY, "Ledger"),
            vec![vec!["date", "amount"], vec!["2024-01-01", "5"]]
        );
    }

    #[tokio::test]
    async fn test_config_is_applied_then_idempotent() {
        let backend = backend_with_config(&[
            &["worksheet", "columns"],
            &["Balances", "date", "amount"],
            &["Notes"],
        ]);
        backend.seed_worksheet(KEY, "Legacy", &[&["old", "data"], &["1", "2"]]);

        let session = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();

        assert_eq!(
            titles(&backend),
            vec![
                "_inactive-Sheet1",
                "config",
                "_inactive-Legacy",
                "Balances",
                "Notes"
            ]
        );
        assert_eq!(
            backend.rows_of(KEY, "Balances"),
            vec![vec!["date", "amount"]]
        );
        assert!(backend.rows_of(KEY, "Notes").is_empty());
        assert_eq!(
            backend.rows_of(KEY, "_inactive-Legacy"),
            vec![vec!["old", "data"], vec!["1", "2"]]
        );

        let report = session.initialize().await.unwrap();
        assert!(report.is_noop(), "{report:?}");
        assert_eq!(titles(&backend).len(), 5);
    }

    #[tokio::test]
    async fn test_inactive_worksheet_is_reactivated_with_its_data() {
        let backend = backend_with_config(&[&["worksheet", "columns"], &["Balances", "date"]]);
        backend.seed_worksheet(KEY, "_inactive-Balances", &[&["date"], &["2024-01-01"]]);

        Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();

        assert!(titles(&backend).contains(&"Balances".to_string()));
        assert!(!titles(&backend).contains(&"_inactive-Balances".to_string()));
        assert_eq!(
            backend.rows_of(KEY, "Balances"),
            vec![vec!["date"], vec!["2024-01-01"]]
        );
    }

    #[tokio::test]
    async fn test_header_is_rewritten_and_leftovers_cleared() {
        let backend = backend_with_config(&[&["worksheet", "columns"], &["Balances", "date"]]);
        backend.seed_worksheet(
            KEY,
            "Balances",
            &[&["when", "amount", "note"], &["2024-01-01", "10", "x"]],
        );

        let session = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();

        assert_eq!(
            backend.rows_of(KEY, "Balances"),
            vec![vec!["date", "", ""], vec!["2024-01-01", "10", "x"]]
        );
        assert!(session.initialize().await.unwrap().is_noop());
    }

    #[tokio::test]
    async fn test_deactivation_avoids_title_collisions() {
        let backend = backend_with_config(&[&["worksheet", "columns"], &["Balances"]]);
        backend.seed_worksheet(KEY, "_INACTIVE-sheet1", &[&["older"]]);

        Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();

        let titles = titles(&backend);
        assert!(titles.contains(&"_INACTIVE-sheet1".to_string()));
        assert!(titles.contains(&"_inactive-Sheet1-2".to_string()));
        assert!(titles.contains(&"Balances".to_string()));
        assert_eq!(backend.rows_of(KEY, "_INACTIVE-sheet1"), vec![vec!["older"]]);
    }

    #[tokio::test]
    async fn test_declarations_match_titles_regardless_of_case() {
        let backend = backend_with_config(&[
            &["worksheet", "columns"],
            &["balances", "date", "amount"],
            &["Notes"],
            &["sheet1"],
        ]);
        backend.seed_worksheet(KEY, "Balances", &[&["when"], &["2024-01-01"]]);
        backend.seed_worksheet(KEY, "_Inactive-notes", &[&["kept"]]);

        let session = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();

        assert_eq!(titles(&backend), vec!["Sheet1", "config", "Balances", "Notes"]);
        assert_eq!(
            backend.rows_of(KEY, "Balances"),
            vec![vec!["date", "amount"], vec!["2024-01-01"]]
        );
        assert_eq!(backend.rows_of(KEY, "Notes"), vec![vec!["kept"]]);
        assert!(session.initialize().await.unwrap().is_noop());
    }

    #[tokio::test]
    async fn test_config_worksheet_found_regardless_of_case() {
        let backend = Arc::new(InMemoryBackend::new(ROBOT));
        backend.seed_spreadsheet("Budget", KEY, ROBOT);
        backend.seed_worksheet(KEY, "Config", &[&["worksheet", "columns"], &["Sheet1"]]);

        let session = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();

        assert_eq!(titles(&backend), vec!["Sheet1", "Config"]);
        assert!(session.initialize_report().is_noop());
    }

    #[tokio::test]
    async fn test_reserved_declaration_is_configuration_error() {
        let backend = backend_with_config(&[&["worksheet", "columns"], &["config", "x"]]);

        let report = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap_err();
        assert_eq!(*report.current_context(), SessionError::Configuration);
    }

    #[tokio::test]
    async fn test_writer_can_initialize() {
        let backend = backend_with_config(&[&["worksheet", "columns"], &["Sheet1"]]);
        backend.grant(KEY, "alice@example.com", Role::Owner);
        backend.grant(KEY, ROBOT, Role::Writer);

        let session = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();

        assert_eq!(titles(&backend), vec!["Sheet1", "config"]);
        assert!(session.initialize().await.unwrap().is_noop());
    }
}
