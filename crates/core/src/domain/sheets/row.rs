use std::fmt::Formatter;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Row {
    index: u32,
}

impl Row {
    /// The header row of every worksheet.
    pub const HEADER: Row = Row { index: 0 };

    pub fn from_index(index: u32) -> Self {
        Row { index }
    }

    pub fn from_row(row: u32) -> Self {
        Row {
            index: row.saturating_sub(1), // Convert to zero-based index
        }
    }

    /// Returns the row number as a 1-based index, as shown in the spreadsheet UI.
    /// # Examples
    /// ```
    /// use spreadsheet_session_core::domain::sheets::row::Row;
    /// assert_eq!(Row::from_index(0).row(), 1);
    /// assert_eq!(Row::HEADER.row(), 1);
    /// assert_eq!(Row::from_index(25).row(), 26);
    /// ```
    pub fn row(&self) -> u32 {
        self.index.saturating_add(1)
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl std::fmt::Display for Row {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.row())
    }
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Row(index: {}, row: {})", self.index(), self.row())
    }
}
