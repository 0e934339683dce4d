pub mod a1_notation;
pub mod lookup;
pub mod permission;
pub mod row;
pub mod spreadsheet;
pub mod spreadsheet_url;
pub mod worksheet_config;
