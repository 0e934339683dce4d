pub mod command_handler;
pub mod spreadsheet_backend;
