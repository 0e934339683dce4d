#[derive(serde::Deserialize, Debug, Clone)]
pub struct SpreadsheetConfig {
    /// Path to the service account key JSON.
    pub priv_key: Box<str>,
    /// Spreadsheet to use when a command names none, e.g. `key=1AbC...`.
    #[serde(default)]
    pub lookup: Option<Box<str>>,
}
