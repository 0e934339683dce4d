use spreadsheet_session_core::{
    adapters::{config::app_config::AppConfig, sheets::google_backend::GoogleBackend},
    Lookup, SpreadsheetBackend,
};
use std::{str::FromStr, sync::Arc};

pub struct BackendFactory;

impl BackendFactory {
    /// Authenticates against Google and returns the backend together with
    /// the configured default lookup, if any.
    pub async fn create(
        config: &AppConfig,
    ) -> Result<(Arc<dyn SpreadsheetBackend>, Option<Lookup>), Box<dyn std::error::Error>> {
        let default_lookup = config
            .sheets
            .lookup
            .as_deref()
            .map(Lookup::from_str)
            .transpose()
            .map_err(|e| format!("Invalid sheets.lookup in config: {}", e))?;

        let backend = GoogleBackend::new(&config.sheets)
            .await
            .map_err(|report| format!("Failed to connect to Google: {:?}", report))?;

        Ok((Arc::new(backend), default_lookup))
    }
}
