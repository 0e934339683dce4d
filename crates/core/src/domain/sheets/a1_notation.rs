use std::fmt::Formatter;

use super::row::Row;

/// A range reference in A1 notation, e.g. `'Budget 2024'!A1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Notation(String);

impl A1Notation {
    /// Every cell of a worksheet.
    pub fn whole_sheet(sheet_title: &str) -> Self {
        A1Notation(quote_sheet_title(sheet_title))
    }

    /// The row starting at column A; values written here extend to the right.
    pub fn row_start(sheet_title: &str, row: Row) -> Self {
        A1Notation(format!("{}!A{}", quote_sheet_title(sheet_title), row))
    }
}

/// Sheet titles are always quoted so that spaces and punctuation survive;
/// embedded single quotes are doubled.
fn quote_sheet_title(sheet_title: &str) -> String {
    format!("'{}'", sheet_title.replace('\'', "''"))
}

impl std::fmt::Display for A1Notation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<A1Notation> for String {
    fn from(a1_notation: A1Notation) -> Self {
        a1_notation.0
    }
}

impl AsRef<str> for A1Notation {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
