use error_stack::ResultExt;
use spreadsheet_session_core::application::initialize::InitializeReport;
use spreadsheet_session_core::ports::command_handler::{Command, CommandError, CommandHandler};
use spreadsheet_session_core::{Lookup, Role, Session, SpreadsheetBackend};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

const USAGE: &str = "\
usage: spreadsheet-session <command>
  open [title|method=value]
  share <lookup> <email> <role> [--no-notify]
      (role owner transfers ownership unchecked; prefer change-owner)
  change-owner <lookup> <email>
  init <lookup>
  permissions <lookup>";

pub struct CliAdapter {
    backend: Arc<dyn SpreadsheetBackend>,
    default_lookup: Option<Lookup>,
}

impl std::fmt::Debug for CliAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliAdapter")
            .field("backend", &self.backend.identity())
            .field("default_lookup", &self.default_lookup)
            .finish()
    }
}

impl CliAdapter {
    /// `default_lookup` stands in for `<lookup>` when a command omits it.
    pub fn new(backend: Arc<dyn SpreadsheetBackend>, default_lookup: Option<Lookup>) -> Self {
        Self {
            backend,
            default_lookup,
        }
    }

    #[instrument]
    pub async fn run(&self, args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
        let command = self.parse_args(args)?;

        match self.handle(command).await {
            Ok(result) => {
                info!("{}", result);
                Ok(())
            }
            Err(report) => {
                error!("Command failed: {:?}", report);
                Err(format!("Command failed: {:?}", report).into())
            }
        }
    }

    fn parse_args(&self, args: Vec<String>) -> Result<Command, CommandError> {
        let notify = !args.iter().any(|arg| arg == "--no-notify");
        let args = args
            .into_iter()
            .skip(1)
            .filter(|arg| arg != "--no-notify")
            .collect::<Vec<_>>();

        match args.first().map(|s| s.as_str()) {
            Some("open") => {
                let lookup = match args.get(1) {
                    Some(raw) => Some(parse_lookup(raw)?),
                    None => self.default_lookup.clone(),
                };
                Ok(Command::Open { lookup })
            }
            Some("share") => {
                let (lookup, rest) = self.split_lookup(&args[1..], 2)?;
                let role = Role::from_str(&rest[1]).map_err(|_| CommandError::InvalidCommand {
                    details: format!("Unknown role '{}'", rest[1]),
                })?;
                Ok(Command::Share {
                    lookup,
                    email: rest[0].clone(),
                    role,
                    notify,
                })
            }
            Some("change-owner") => {
                let (lookup, rest) = self.split_lookup(&args[1..], 1)?;
                Ok(Command::ChangeOwner {
                    lookup,
                    email: rest[0].clone(),
                })
            }
            Some("init") => {
                let (lookup, _) = self.split_lookup(&args[1..], 0)?;
                Ok(Command::Initialize { lookup })
            }
            Some("permissions") => {
                let (lookup, _) = self.split_lookup(&args[1..], 0)?;
                Ok(Command::Permissions { lookup })
            }
            Some(other) => Err(CommandError::InvalidCommand {
                details: format!("Unknown command '{}'\n{}", other, USAGE),
            }),
            None => Err(CommandError::InvalidCommand {
                details: USAGE.to_string(),
            }),
        }
    }

    /// Splits `args` into a lookup and `trailing` required arguments. The
    /// lookup may be omitted when a default is configured.
    fn split_lookup<'a>(
        &self,
        args: &'a [String],
        trailing: usize,
    ) -> Result<(Lookup, &'a [String]), CommandError> {
        if args.len() == trailing + 1 {
            return Ok((parse_lookup(&args[0])?, &args[1..]));
        }
        match &self.default_lookup {
            Some(lookup) if args.len() == trailing => Ok((lookup.clone(), args)),
            _ => Err(CommandError::InvalidCommand {
                details: format!("Wrong number of arguments\n{}", USAGE),
            }),
        }
    }

    async fn session(&self, lookup: Lookup) -> error_stack::Result<Session, CommandError> {
        let details = format!("Failed to open spreadsheet ({})", lookup);
        Session::open(Arc::clone(&self.backend), lookup)
            .await
            .change_context(CommandError::ExecutionFailed { details })
    }
}

fn parse_lookup(raw: &str) -> Result<Lookup, CommandError> {
    Lookup::from_str(raw).map_err(|e| CommandError::InvalidCommand {
        details: e.to_string(),
    })
}

fn describe_session(session: &Session) -> String {
    format!(
        "Spreadsheet: {}\nURL: {}\nService account: {}\nOwner: {}\nRole: {}",
        session.spreadsheet(),
        session.spreadsheet().url(),
        session.whoami(),
        session.owner().unwrap_or("<unknown>"),
        session
            .role()
            .map(|role| role.to_string())
            .unwrap_or_else(|| "<none>".to_string()),
    )
}

fn describe_initialize(report: &InitializeReport) -> String {
    if report.is_noop() {
        return "Worksheets already match config".to_string();
    }

    let mut output = String::new();
    if report.config_created {
        output.push_str("Created config worksheet\n");
    }
    for title in &report.created {
        output.push_str(&format!("Created: {}\n", title));
    }
    for title in &report.reactivated {
        output.push_str(&format!("Reactivated: {}\n", title));
    }
    for (old, new) in &report.deactivated {
        output.push_str(&format!("Deactivated: {} -> {}\n", old, new));
    }
    for title in &report.headers_written {
        output.push_str(&format!("Header written: {}\n", title));
    }
    output.trim_end().to_string()
}

#[async_trait::async_trait]
impl CommandHandler for CliAdapter {
    #[instrument]
    async fn handle(&self, command: Command) -> error_stack::Result<String, CommandError> {
        match command {
            Command::Open { lookup } => {
                let session = self.session(lookup.unwrap_or(Lookup::Create)).await?;
                Ok(describe_session(&session))
            }
            Command::Share {
                lookup,
                email,
                role,
                notify,
            } => {
                if role == Role::Owner {
                    warn!("share with role owner skips the ownership check, prefer change-owner");
                }
                let session = self.session(lookup).await?;
                let shared = session
                    .share(&email, role, notify)
                    .await
                    .change_context_lazy(|| CommandError::ExecutionFailed {
                        details: format!("Failed to share with {}", email),
                    })?;

                Ok(if shared {
                    format!("✅ Shared {} with {} as {}", session.spreadsheet(), email, role)
                } else {
                    format!("❌ Share with {} was rejected", email)
                })
            }
            Command::ChangeOwner { lookup, email } => {
                let mut session = self.session(lookup).await?;
                let changed = session.change_owner(&email).await.change_context_lazy(|| {
                    CommandError::ExecutionFailed {
                        details: format!("Failed to change owner to {}", email),
                    }
                })?;

                Ok(if changed {
                    format!("✅ {} is now owned by {}", session.spreadsheet(), email)
                } else {
                    format!("❌ Owner of {} was not changed", session.spreadsheet())
                })
            }
            Command::Initialize { lookup } => {
                // Opening runs the worksheet pass.
                let session = self.session(lookup).await?;
                Ok(describe_initialize(session.initialize_report()))
            }
            Command::Permissions { lookup } => {
                let session = self.session(lookup).await?;
                let entries = session.permissions().await.change_context(
                    CommandError::ExecutionFailed {
                        details: "Failed to list permissions".to_string(),
                    },
                )?;

                let mut output = format!("Permissions of {}:\n", session.spreadsheet());
                for entry in entries {
                    output.push_str(&format!(
                        "{}: {}\n",
                        entry.email.as_deref().unwrap_or("<anyone>"),
                        entry.role
                    ));
                }
                Ok(output.trim_end().to_string())
            }
        }
    }
}
