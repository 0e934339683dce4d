use std::fmt::Formatter;

/// Reference to one remote spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetHandle {
    pub key: String,
    pub title: String,
}

impl SpreadsheetHandle {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
        }
    }

    pub fn url(&self) -> String {
        format!("https://docs.google.com/spreadsheets/d/{}", self.key)
    }
}

impl std::fmt::Display for SpreadsheetHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.title, self.key)
    }
}

/// A single tab of a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worksheet {
    pub sheet_id: i32,
    pub title: String,
}
