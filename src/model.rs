//! Grant records owned by the grant store.

use crate::permission::PermissionCode;
use crate::types::{PermissionId, RoleId, RoleName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Enabled/disabled flag shared by roles and permissions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Participates in permission decisions.
    #[default]
    Enabled,
    /// Kept in the store but ignored by permission decisions.
    Disabled,
}

impl Status {
    /// Storage encoding: `1` enabled, `0` disabled.
    pub const fn as_i16(self) -> i16 {
        match self {
            Self::Enabled => 1,
            Self::Disabled => 0,
        }
    }

    /// Decodes the storage encoding. Anything but `1` is disabled.
    pub const fn from_i16(value: i16) -> Self {
        if value == 1 {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }

    /// Returns true for [`Status::Enabled`].
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Named policy group.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: RoleName,
    pub display_name: String,
    pub description: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for role creation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: RoleName,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Status,
}

impl NewRole {
    /// Creates an enabled role input with an empty description.
    pub fn new(name: RoleName, display_name: impl Into<String>) -> Self {
        Self {
            name,
            display_name: display_name.into(),
            description: String::new(),
            status: Status::Enabled,
        }
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the status.
    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }
}

/// Partial role update; `None` fields are left unchanged.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub name: Option<RoleName>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
}

impl RoleUpdate {
    pub(crate) fn apply(self, role: &mut Role) {
        if let Some(name) = self.name {
            role.name = name;
        }
        if let Some(display_name) = self.display_name {
            role.display_name = display_name;
        }
        if let Some(description) = self.description {
            role.description = description;
        }
        if let Some(status) = self.status {
            role.status = status;
        }
    }
}

/// Atomic capability identified by its code.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub code: PermissionCode,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub description: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for permission creation. Resource and action come from the code.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewPermission {
    pub code: PermissionCode,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Status,
}

impl NewPermission {
    /// Creates an enabled permission input with an empty description.
    pub fn new(code: PermissionCode, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            description: String::new(),
            status: Status::Enabled,
        }
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the status.
    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }
}

/// Partial permission update; `None` fields are left unchanged.
///
/// A new code also replaces the stored resource and action.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PermissionUpdate {
    pub code: Option<PermissionCode>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
}

impl PermissionUpdate {
    pub(crate) fn apply(self, permission: &mut Permission) {
        if let Some(code) = self.code {
            permission.resource = code.resource().to_string();
            permission.action = code.action().to_string();
            permission.code = code;
        }
        if let Some(name) = self.name {
            permission.name = name;
        }
        if let Some(description) = self.description {
            permission.description = description;
        }
        if let Some(status) = self.status {
            permission.status = status;
        }
    }
}

/// Role together with every permission assigned to it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}
