use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};

/// Access level of a principal on a spreadsheet, as reported by Drive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Owner,
    Organizer,
    FileOrganizer,
    Writer,
    Commenter,
    Reader,
}

impl Role {
    /// Roles that allow the session to exist at all.
    pub fn can_edit_session(&self) -> bool {
        matches!(self, Role::Owner | Role::Writer)
    }
}

/// One principal with access to a spreadsheet.
///
/// `role` is kept as the raw backend string; the role enumeration belongs to
/// the backend and may grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    /// `None` for domain or "anyone with the link" grants.
    pub email: Option<String>,
    pub role: String,
}

impl PermissionEntry {
    pub fn new(email: impl Into<String>, role: Role) -> Self {
        Self {
            email: Some(email.into()),
            role: role.to_string(),
        }
    }

    pub fn role(&self) -> Option<Role> {
        Role::from_str(&self.role).ok()
    }

    pub fn is_for(&self, email: &str) -> bool {
        self.email
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(email))
    }
}

/// Owner and caller role resolved from a permission listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAccess {
    pub owner: Option<String>,
    pub role: Option<Role>,
}

impl ResolvedAccess {
    /// Later entries win, matching the order the backend lists them in.
    pub fn resolve(entries: &[PermissionEntry], whoami: &str) -> Self {
        let mut access = ResolvedAccess::default();
        for entry in entries {
            if entry.role() == Some(Role::Owner) {
                if let Some(email) = &entry.email {
                    access.owner = Some(email.clone());
                }
            }
            if entry.is_for(whoami) {
                access.role = entry.role();
            }
        }
        access
    }

    pub fn is_sufficient(&self) -> bool {
        self.role.is_some_and(|role| role.can_edit_session())
    }
}
