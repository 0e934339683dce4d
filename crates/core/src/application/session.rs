use std::{fmt::Debug, sync::Arc};

use error_stack::{report, Report, ResultExt};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use super::initialize::InitializeReport;
use crate::{
    domain::sheets::{
        lookup::Lookup,
        permission::{PermissionEntry, ResolvedAccess, Role},
        spreadsheet::SpreadsheetHandle,
        spreadsheet_url::extract_key_from_url,
    },
    ports::spreadsheet_backend::{BackendError, BackendResult, SpreadsheetBackend},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid session configuration")]
    Configuration,
    #[error("Spreadsheet not found")]
    NotFound,
    #[error("Insufficient privileges on spreadsheet")]
    Permission,
    #[error("Spreadsheet backend request failed")]
    Backend,
}

pub type Result<T> = error_stack::Result<T, SessionError>;

/// A verified connection to exactly one remote spreadsheet.
///
/// `owner` and `role` are captured when the session opens and are only
/// updated by [`Session::refresh`] or a successful [`Session::change_owner`].
/// Changes made remotely in between are not seen, and nothing prevents other
/// processes from mutating the same spreadsheet concurrently.
pub struct Session {
    pub(super) backend: Arc<dyn SpreadsheetBackend>,
    pub(super) spreadsheet: SpreadsheetHandle,
    whoami: String,
    owner: Option<String>,
    role: Option<Role>,
    initialized: InitializeReport,
}

impl Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("spreadsheet", &self.spreadsheet)
            .field("whoami", &self.whoami)
            .field("owner", &self.owner)
            .field("role", &self.role)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl Session {
    /// Resolves `lookup` to a spreadsheet, verifies the backend identity can
    /// edit it, then applies the `config` worksheet.
    ///
    /// [`Lookup::Create`] always creates a new spreadsheet.
    #[instrument(name = "Session::open", skip(backend))]
    pub async fn open(backend: Arc<dyn SpreadsheetBackend>, lookup: Lookup) -> Result<Self> {
        let whoami = backend.identity().to_string();

        let spreadsheet = Self::resolve_spreadsheet(backend.as_ref(), &lookup).await?;

        let mut session = Session {
            backend,
            spreadsheet,
            whoami,
            owner: None,
            role: None,
            initialized: InitializeReport::default(),
        };

        session.verify().await?;
        session.initialized = session.initialize().await?;

        Ok(session)
    }

    /// Keyword form of [`Session::open`]: no arguments creates, a positional
    /// argument is a title, otherwise exactly one of `title`, `key`, `url`.
    pub async fn open_with_keywords<K, V>(
        backend: Arc<dyn SpreadsheetBackend>,
        positional: Option<String>,
        keywords: Vec<(K, V)>,
    ) -> Result<Self>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let lookup = Lookup::from_args(positional, keywords).map_err(|err| {
            tracing::error!("{}. Aborting...", err);
            Report::new(err).change_context(SessionError::Configuration)
        })?;

        Self::open(backend, lookup).await
    }

    async fn resolve_spreadsheet(
        backend: &dyn SpreadsheetBackend,
        lookup: &Lookup,
    ) -> Result<SpreadsheetHandle> {
        let value = lookup.value().unwrap_or_default();

        let opened: BackendResult<SpreadsheetHandle> = match lookup {
            Lookup::Create => {
                let title = Uuid::new_v4().to_string();
                tracing::info!(
                    "No lookup value found, creating a new spreadsheet: {}.",
                    title
                );
                backend
                    .create_spreadsheet(&title)
                    .await
                    .attach_printable_lazy(|| format!("Failed to create spreadsheet {title}"))
            }
            Lookup::Title(title) => {
                tracing::info!("Opening sheet by title: {}.", title);
                backend.open_by_title(title).await
            }
            Lookup::Key(key) => {
                tracing::info!("Opening sheet by key: {}.", key);
                backend.open_by_key(key).await
            }
            Lookup::Url(url) => {
                tracing::info!("Opening sheet by url: {}.", url);
                match extract_key_from_url(url) {
                    Some(key) => backend.open_by_key(key).await,
                    None => Err(report!(BackendError::NotFound))
                        .attach_printable_lazy(|| format!("No spreadsheet key in url {url}")),
                }
            }
        };

        opened.map_err(|report| {
            if *report.current_context() == BackendError::NotFound {
                let err_msg = format!(
                    "Cannot find spreadsheet by {}: {}. Aborting...",
                    lookup.method(),
                    value
                );
                tracing::error!("{}", err_msg);
                report
                    .change_context(SessionError::NotFound)
                    .attach_printable(err_msg)
            } else {
                report.change_context(SessionError::Backend)
            }
        })
    }

    /// Enumerates permissions, records the owner and the caller's role, and
    /// refuses anything short of `owner` or `writer`. State is only replaced
    /// when the check passes.
    #[instrument(skip(self), fields(spreadsheet = %self.spreadsheet))]
    async fn verify(&mut self) -> Result<()> {
        let entries = self
            .backend
            .list_permissions(&self.spreadsheet)
            .await
            .change_context(SessionError::Backend)?;

        let access = ResolvedAccess::resolve(&entries, &self.whoami);
        if !access.is_sufficient() {
            let err_msg = format!(
                "Insufficient privileges for service account: {}. Aborting...",
                self.whoami
            );
            tracing::error!("{}", err_msg);
            return Err(report!(SessionError::Permission))
                .attach_printable(err_msg)
                .attach_printable_lazy(|| format!("Resolved role: {:?}", access.role));
        }

        if access.owner.is_none() {
            tracing::warn!("No permission entry reports an owner for {}.", self.spreadsheet);
        }

        self.owner = access.owner;
        self.role = access.role;
        Ok(())
    }

    /// Re-reads permissions from the backend.
    pub async fn refresh(&mut self) -> Result<()> {
        tracing::info!("Refreshing permissions of {}.", self.spreadsheet);
        self.verify().await
    }

    /// Grants `role` to `email`. Returns `Ok(false)` when the backend turns
    /// the request down; transport and authentication failures are errors.
    #[instrument(skip(self), fields(spreadsheet = %self.spreadsheet))]
    pub async fn share(&self, email: &str, role: Role, notify: bool) -> Result<bool> {
        match self
            .backend
            .share(&self.spreadsheet, email, role, notify)
            .await
        {
            Ok(()) => {
                tracing::info!("Shared with {}.", email);
                Ok(true)
            }
            Err(report) if report.current_context().is_rejection() => {
                tracing::warn!("Unable to share with {}: {:?}", email, report);
                Ok(false)
            }
            Err(report) => Err(report.change_context(SessionError::Backend)),
        }
    }

    /// Transfers ownership, provided the recorded owner is the caller.
    ///
    /// The check uses the owner captured at open/refresh time and makes no
    /// backend call when it fails.
    #[instrument(skip(self), fields(spreadsheet = %self.spreadsheet))]
    pub async fn change_owner(&mut self, new_owner_email: &str) -> Result<bool> {
        if !self.is_owner() {
            tracing::warn!(
                "Service account is not the current owner of document. Unable to change owner."
            );
            return Ok(false);
        }

        match self
            .backend
            .share(&self.spreadsheet, new_owner_email, Role::Owner, false)
            .await
        {
            Ok(()) => {
                tracing::info!("Ownership changed to {}.", new_owner_email);
                self.owner = Some(new_owner_email.to_string());
                self.role = Some(Role::Writer);
                Ok(true)
            }
            Err(report) if report.current_context().is_rejection() => {
                tracing::warn!(
                    "Unable to change owner to {}: {:?}",
                    new_owner_email,
                    report
                );
                Ok(false)
            }
            Err(report) => Err(report.change_context(SessionError::Backend)),
        }
    }

    pub fn spreadsheet(&self) -> &SpreadsheetHandle {
        &self.spreadsheet
    }

    pub fn whoami(&self) -> &str {
        &self.whoami
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// What the worksheet pass run by [`Session::open`] changed.
    pub fn initialize_report(&self) -> &InitializeReport {
        &self.initialized
    }

    pub fn is_owner(&self) -> bool {
        self.owner
            .as_deref()
            .is_some_and(|owner| owner.eq_ignore_ascii_case(&self.whoami))
    }

    /// Current permission entries, straight from the backend.
    pub async fn permissions(&self) -> Result<Vec<PermissionEntry>> {
        self.backend
            .list_permissions(&self.spreadsheet)
            .await
            .change_context(SessionError::Backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sheets::in_memory_backend::InMemoryBackend;

    const ROBOT: &str = "robot@project.iam.gserviceaccount.com";
    const ALICE: &str = "alice@example.com";
    const KEY: &str = "1AbCdEfGhIjK_lmn-OP";

    /// A spreadsheet owned by Alice, shared with the robot as `robot_role`.
    fn seeded(robot_role: Role) -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new(ROBOT));
        backend.seed_spreadsheet("Budget", KEY, ALICE);
        backend.grant(KEY, ROBOT, robot_role);
        backend
    }

    async fn open_owned() -> (Arc<InMemoryBackend>, Session) {
        let backend = seeded(Role::Writer);
        backend.grant(KEY, ALICE, Role::Writer);
        backend.grant(KEY, ROBOT, Role::Owner);
        let session = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();
        (backend, session)
    }

    #[tokio::test]
    async fn test_open_by_every_method_binds_same_spreadsheet() {
        let backend = seeded(Role::Writer);
        let lookups = [
            Lookup::Title("Budget".into()),
            Lookup::Key(KEY.into()),
            Lookup::Url(format!("https://docs.google.com/spreadsheets/d/{KEY}/edit#gid=0")),
        ];

        for lookup in lookups {
            let session = Session::open(backend.clone(), lookup.clone()).await.unwrap();
            assert_eq!(session.spreadsheet().key, KEY, "lookup {lookup}");
            assert_eq!(session.owner(), Some(ALICE));
            assert_eq!(session.role(), Some(Role::Writer));
            assert_eq!(session.whoami(), ROBOT);
        }
    }

    #[tokio::test]
    async fn test_invalid_keyword_is_configuration_error() {
        let backend = seeded(Role::Writer);

        for value in ["Budget", KEY, ""] {
            let report = Session::open_with_keywords(backend.clone(), None, vec![("id", value)])
                .await
                .unwrap_err();
            assert_eq!(*report.current_context(), SessionError::Configuration);
        }
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_keywords_are_configuration_error() {
        let backend = seeded(Role::Writer);

        let report = Session::open_with_keywords(
            backend.clone(),
            None,
            vec![("title", "Budget"), ("key", KEY)],
        )
        .await
        .unwrap_err();

        assert_eq!(*report.current_context(), SessionError::Configuration);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_keyword_and_positional_forms() {
        let backend = seeded(Role::Writer);

        let session =
            Session::open_with_keywords(backend.clone(), None, vec![("key", KEY)])
                .await
                .unwrap();
        assert_eq!(session.spreadsheet().key, KEY);

        let session = Session::open_with_keywords(
            backend.clone(),
            Some("Budget".into()),
            Vec::<(&str, &str)>::new(),
        )
        .await
        .unwrap();
        assert_eq!(session.spreadsheet().key, KEY);
    }

    #[tokio::test]
    async fn test_missing_target_is_not_found() {
        let backend = seeded(Role::Writer);
        let lookups = [
            Lookup::Title("Nope".into()),
            Lookup::Key("nope".into()),
            Lookup::Url("https://docs.google.com/spreadsheets/d/nope/edit".into()),
            Lookup::Url("https://example.com/no-key-here".into()),
        ];

        for lookup in lookups {
            let report = Session::open(backend.clone(), lookup).await.unwrap_err();
            assert_eq!(*report.current_context(), SessionError::NotFound);
        }
    }

    #[tokio::test]
    async fn test_reader_is_refused_even_with_known_owner() {
        let backend = seeded(Role::Reader);

        let report = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap_err();
        assert_eq!(*report.current_context(), SessionError::Permission);
    }

    #[tokio::test]
    async fn test_caller_without_entry_is_refused() {
        let backend = seeded(Role::Writer);
        backend.revoke(KEY, ROBOT);

        let report = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap_err();
        assert_eq!(*report.current_context(), SessionError::Permission);
    }

    #[tokio::test]
    async fn test_create_makes_a_new_spreadsheet_each_time() {
        let backend = Arc::new(InMemoryBackend::new(ROBOT));

        let first = Session::open(backend.clone(), Lookup::Create).await.unwrap();
        let second = Session::open(backend.clone(), Lookup::Create).await.unwrap();

        assert_eq!(backend.spreadsheet_count(), 2);
        assert_ne!(first.spreadsheet().key, second.spreadsheet().key);
        assert_ne!(first.spreadsheet().title, second.spreadsheet().title);
        assert!(first.is_owner());
        assert_eq!(first.role(), Some(Role::Owner));
        assert!(backend
            .worksheet_titles(&first.spreadsheet().key)
            .contains(&"config".to_string()));
    }

    #[tokio::test]
    async fn test_change_owner_without_ownership_makes_no_backend_call() {
        let backend = seeded(Role::Writer);
        let mut session = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();
        let calls = backend.call_count();

        assert!(!session.change_owner("bob@example.com").await.unwrap());
        assert_eq!(backend.call_count(), calls);
        assert_eq!(session.owner(), Some(ALICE));
    }

    #[tokio::test]
    async fn test_change_owner_transfers_ownership() {
        let (backend, mut session) = open_owned().await;

        assert!(session.change_owner(ALICE).await.unwrap());

        let permissions = backend.permissions_of(KEY);
        assert!(permissions.contains(&PermissionEntry::new(ALICE, Role::Owner)));
        assert!(permissions.contains(&PermissionEntry::new(ROBOT, Role::Writer)));
        assert_eq!(session.owner(), Some(ALICE));
        assert_eq!(session.role(), Some(Role::Writer));
        assert!(!session.is_owner());
    }

    #[tokio::test]
    async fn test_change_owner_rejected_returns_false() {
        let (backend, mut session) = open_owned().await;
        backend.reject_shares_for("bob@example.com");

        assert!(!session.change_owner("bob@example.com").await.unwrap());
        assert!(session.is_owner());
        assert!(backend
            .permissions_of(KEY)
            .contains(&PermissionEntry::new(ROBOT, Role::Owner)));
    }

    #[tokio::test]
    async fn test_share_accepted_and_rejected() {
        let backend = seeded(Role::Writer);
        let session = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();
        backend.reject_shares_for("nobody@example.com");

        assert!(session
            .share("bob@example.com", Role::Reader, false)
            .await
            .unwrap());
        assert!(backend
            .permissions_of(KEY)
            .contains(&PermissionEntry::new("bob@example.com", Role::Reader)));

        assert!(!session
            .share("nobody@example.com", Role::Writer, false)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_share_transport_failure_is_an_error() {
        let backend = seeded(Role::Writer);
        let session = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();
        backend.fail_shares_with("bob@example.com", BackendError::Transport);

        let report = session
            .share("bob@example.com", Role::Reader, false)
            .await
            .unwrap_err();
        assert_eq!(*report.current_context(), SessionError::Backend);
        assert!(!backend
            .permissions_of(KEY)
            .iter()
            .any(|entry| entry.is_for("bob@example.com")));
    }

    #[tokio::test]
    async fn test_change_owner_auth_failure_is_an_error() {
        let (backend, mut session) = open_owned().await;
        backend.fail_shares_with("bob@example.com", BackendError::Authentication);

        let report = session.change_owner("bob@example.com").await.unwrap_err();
        assert_eq!(*report.current_context(), SessionError::Backend);
        assert!(session.is_owner());
        assert_eq!(session.role(), Some(Role::Owner));
    }

    #[tokio::test]
    async fn test_owner_is_stale_until_refresh() {
        let (backend, mut session) = open_owned().await;
        backend.grant(KEY, ROBOT, Role::Writer);
        backend.grant(KEY, ALICE, Role::Owner);

        assert!(session.is_owner());

        session.refresh().await.unwrap();
        assert_eq!(session.owner(), Some(ALICE));
        assert_eq!(session.role(), Some(Role::Writer));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_state() {
        let backend = seeded(Role::Writer);
        let mut session = Session::open(backend.clone(), Lookup::Key(KEY.into()))
            .await
            .unwrap();
        backend.grant(KEY, ROBOT, Role::Reader);

        let report = session.refresh().await.unwrap_err();
        assert_eq!(*report.current_context(), SessionError::Permission);
        assert_eq!(session.role(), Some(Role::Writer));
        assert_eq!(session.owner(), Some(ALICE));
    }
}
