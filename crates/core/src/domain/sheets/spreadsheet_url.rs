use std::sync::LazyLock;

use regex::Regex;

static PATH_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/spreadsheets/d/([a-zA-Z0-9\-_]+)").expect("path key pattern is valid")
});

static QUERY_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"key=([^&#]+)").expect("query key pattern is valid"));

/// Extracts the spreadsheet key from a Google Sheets URL.
///
/// Both the current `/spreadsheets/d/<key>` form and the legacy `?key=<key>`
/// form are recognised.
///
/// ```
/// use spreadsheet_session_core::domain::sheets::spreadsheet_url::extract_key_from_url;
/// let url = "https://docs.google.com/spreadsheets/d/17JHcvLkX0xi-_tR71/edit#gid=0";
/// assert_eq!(extract_key_from_url(url), Some("17JHcvLkX0xi-_tR71"));
/// assert_eq!(extract_key_from_url("https://example.com/"), None);
/// ```
pub fn extract_key_from_url(url: &str) -> Option<&str> {
    PATH_KEY
        .captures(url)
        .or_else(|| QUERY_KEY.captures(url))
        .and_then(|captures| captures.get(1))
        .map(|key| key.as_str())
}
