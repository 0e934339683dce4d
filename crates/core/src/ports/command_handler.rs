use thiserror::Error;

use crate::domain::sheets::{lookup::Lookup, permission::Role};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Invalid command: {details}")]
    InvalidCommand { details: String },
    #[error("Command execution failed: {details}")]
    ExecutionFailed { details: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open (or create, when `lookup` is `None`) and report the session state.
    Open { lookup: Option<Lookup> },
    Share {
        lookup: Lookup,
        email: String,
        role: Role,
        notify: bool,
    },
    ChangeOwner { lookup: Lookup, email: String },
    Initialize { lookup: Lookup },
    Permissions { lookup: Lookup },
}

#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command) -> error_stack::Result<String, CommandError>;
}
