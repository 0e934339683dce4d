//! Schema of the `config` worksheet.
//!
//! Row 1 is a header (`worksheet | columns`) and is ignored. Every following
//! row declares one worksheet: column A holds its title, columns B onwards
//! hold the header cells that worksheet must carry in its first row.
//!
//! Worksheet titles are compared case-insensitively, matching the backend,
//! which refuses two tabs whose titles differ only in case.

use std::collections::HashSet;
use thiserror::Error;

use super::row::Row;

pub const CONFIG_WORKSHEET: &str = "config";
pub const INACTIVE_PREFIX: &str = "_inactive-";
pub const CONFIG_HEADER: [&str; 2] = ["worksheet", "columns"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorksheetDeclaration {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorksheetConfig {
    pub declarations: Vec<WorksheetDeclaration>,
    /// Names declared more than once; only the first declaration is kept.
    pub duplicates: Vec<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorksheetConfigError {
    #[error("Row {row} declares reserved worksheet name '{name}'")]
    ReservedName { row: Row, name: String },
}

impl WorksheetConfig {
    pub fn parse(rows: &[Vec<String>]) -> Result<Self, WorksheetConfigError> {
        let mut config = WorksheetConfig::default();
        let mut seen = HashSet::new();

        for (index, cells) in rows.iter().enumerate().skip(1) {
            let row = Row::from_index(index as u32);
            let Some((name, columns)) = cells.split_first() else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if same_title(name, CONFIG_WORKSHEET) || is_inactive(name) {
                return Err(WorksheetConfigError::ReservedName {
                    row,
                    name: name.to_string(),
                });
            }
            if !seen.insert(name.to_lowercase()) {
                config.duplicates.push(name.to_string());
                continue;
            }

            let columns = columns
                .iter()
                .map(|cell| cell.trim().to_string())
                .collect::<Vec<_>>();
            config.declarations.push(WorksheetDeclaration {
                name: name.to_string(),
                columns: trim_trailing_blanks(&columns).to_vec(),
            });
        }

        Ok(config)
    }

    pub fn get(&self, name: &str) -> Option<&WorksheetDeclaration> {
        self.declarations
            .iter()
            .find(|decl| same_title(&decl.name, name))
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

pub fn same_title(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

pub fn inactive_title(name: &str) -> String {
    format!("{INACTIVE_PREFIX}{name}")
}

pub fn is_inactive(title: &str) -> bool {
    title
        .get(..INACTIVE_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(INACTIVE_PREFIX))
}

pub fn trim_trailing_blanks(cells: &[String]) -> &[String] {
    let len = cells
        .iter()
        .rposition(|cell| !cell.trim().is_empty())
        .map_or(0, |last| last + 1);
    &cells[..len]
}

/// Whether a worksheet's first row already carries the declared header.
pub fn header_matches(existing: &[String], declared: &[String]) -> bool {
    trim_trailing_blanks(existing) == trim_trailing_blanks(declared)
}

/// `base`, or `base-2`, `base-3`, ... whichever is not yet taken.
pub fn unique_title(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_parse_skips_header_and_blank_rows() {
        let config = WorksheetConfig::parse(&rows(&[
            &["worksheet", "columns"],
            &["Balances", "date", "amount", ""],
            &[],
            &["  ", "ignored"],
            &["Notes"],
        ]))
        .unwrap();

        assert_eq!(
            config.declarations,
            vec![
                WorksheetDeclaration {
                    name: "Balances".into(),
                    columns: vec!["date".into(), "amount".into()],
                },
                WorksheetDeclaration {
                    name: "Notes".into(),
                    columns: vec![],
                },
            ]
        );
        assert!(config.duplicates.is_empty());
    }

    #[test]
    fn test_parse_keeps_first_duplicate() {
        let config = WorksheetConfig::parse(&rows(&[
            &["worksheet", "columns"],
            &["Balances", "date"],
            &["Balances", "other"],
        ]))
        .unwrap();

        assert_eq!(config.declarations.len(), 1);
        assert_eq!(config.get("Balances").unwrap().columns, vec!["date"]);
        assert_eq!(config.duplicates, vec!["Balances"]);
    }

    #[test]
    fn test_duplicates_differing_in_case() {
        let config = WorksheetConfig::parse(&rows(&[
            &["worksheet", "columns"],
            &["Balances", "date"],
            &["BALANCES", "other"],
        ]))
        .unwrap();

        assert_eq!(config.declarations.len(), 1);
        assert_eq!(config.duplicates, vec!["BALANCES"]);
        assert!(config.is_declared("balances"));
    }

    #[test]
    fn test_parse_rejects_reserved_names() {
        let err = WorksheetConfig::parse(&rows(&[&["worksheet"], &["config"]])).unwrap_err();
        assert_eq!(
            err,
            WorksheetConfigError::ReservedName {
                row: Row::from_row(2),
                name: "config".into()
            }
        );

        let err = WorksheetConfig::parse(&rows(&[&["worksheet"], &["x"], &["_inactive-old"]]))
            .unwrap_err();
        assert!(matches!(err, WorksheetConfigError::ReservedName { .. }));

        for reserved in ["Config", "_Inactive-old"] {
            let err = WorksheetConfig::parse(&rows(&[&["worksheet"], &[reserved]])).unwrap_err();
            assert!(matches!(err, WorksheetConfigError::ReservedName { .. }));
        }
    }

    #[test]
    fn test_header_matches_ignores_trailing_blanks() {
        let existing = vec!["date".to_string(), "amount".to_string(), "".to_string()];
        let declared = vec!["date".to_string(), "amount".to_string()];
        assert!(header_matches(&existing, &declared));
        assert!(!header_matches(&existing[..1], &declared));
    }

    #[test]
    fn test_unique_title() {
        let taken = ["_inactive-x", "_inactive-x-2"];
        assert_eq!(
            unique_title("_inactive-x", |t| taken.contains(&t)),
            "_inactive-x-3"
        );
        assert_eq!(unique_title("_inactive-y", |t| taken.contains(&t)), "_inactive-y");
    }

    #[test]
    fn test_inactive_title() {
        assert_eq!(inactive_title("Balances"), "_inactive-Balances");
        assert!(is_inactive(&inactive_title("Balances")));
        assert!(!is_inactive("Balances"));
        assert!(is_inactive("_INACTIVE-Balances"));
        assert!(!is_inactive("_in"));
    }

    #[test]
    fn test_same_title() {
        assert!(same_title("Balances", "balances"));
        assert!(same_title("Ünits", "ünits"));
        assert!(!same_title("Balances", "Balance"));
    }
}
