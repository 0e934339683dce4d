// Public API exports
pub mod adapters;
pub mod application;
pub mod domain;
pub mod ports;
pub mod prettyprint;

// Re-export key types for easy access
pub use application::session::Session;
pub use domain::sheets::lookup::Lookup;
pub use domain::sheets::permission::{PermissionEntry, Role};
pub use ports::spreadsheet_backend::{BackendError, SpreadsheetBackend};
