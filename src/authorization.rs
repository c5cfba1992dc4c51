//! Role-based capability checks for template authoring and report admin.
//!
//! A fixed permission matrix over an enumerated role set. The role of a
//! caller comes from an injected `PermissionProvider` (the external auth
//! collaborator); `StaticRoles` is the in-process implementation used by
//! tests and single-tenant deployments.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Therapist,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Therapist => "therapist",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "therapist" => Some(Self::Therapist),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CreateTemplate,
    EditTemplate,
    ApproveTemplate,
    DeleteReport,
}

impl Capability {
    fn describe(self) -> &'static str {
        match self {
            Self::CreateTemplate => "create templates",
            Self::EditTemplate => "edit templates",
            Self::ApproveTemplate => "approve templates",
            Self::DeleteReport => "delete reports",
        }
    }
}

/// Admin and Manager hold every authoring capability; Therapist is
/// read-only on templates.
pub fn role_has_capability(role: Role, _capability: Capability) -> bool {
    matches!(role, Role::Admin | Role::Manager)
}

/// Capability lookup supplied by the external auth collaborator.
pub trait PermissionProvider {
    /// The caller's role, or None for unknown users.
    fn role_of(&self, user_id: &str) -> Option<Role>;
}

/// Fixed user → role map.
#[derive(Debug, Clone, Default)]
pub struct StaticRoles {
    roles: HashMap<String, Role>,
}

impl StaticRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, user_id: impl Into<String>, role: Role) -> Self {
        self.roles.insert(user_id.into(), role);
        self
    }
}

impl PermissionProvider for StaticRoles {
    fn role_of(&self, user_id: &str) -> Option<Role> {
        self.roles.get(user_id).copied()
    }
}

/// Fail with `Forbidden` unless the caller's role carries the capability.
pub fn require(
    provider: &dyn PermissionProvider,
    user_id: &str,
    capability: Capability,
) -> Result<(), WorkflowError> {
    match provider.role_of(user_id) {
        Some(role) if role_has_capability(role, capability) => Ok(()),
        Some(role) => Err(WorkflowError::forbidden(format!(
            "role {} may not {}",
            role.as_str(),
            capability.describe()
        ))),
        None => Err(WorkflowError::forbidden(format!(
            "unknown user {user_id}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_and_manager_hold_all_capabilities() {
        for role in [Role::Admin, Role::Manager] {
            for cap in [
                Capability::CreateTemplate,
                Capability::EditTemplate,
                Capability::ApproveTemplate,
                Capability::DeleteReport,
            ] {
                assert!(role_has_capability(role, cap));
            }
        }
    }

    #[test]
    fn therapist_is_read_only() {
        for cap in [
            Capability::CreateTemplate,
            Capability::EditTemplate,
            Capability::ApproveTemplate,
            Capability::DeleteReport,
        ] {
            assert!(!role_has_capability(Role::Therapist, cap));
        }
    }

    #[test]
    fn require_rejects_unknown_and_underprivileged_users() {
        let roles = StaticRoles::new()
            .with_role("admin-1", Role::Admin)
            .with_role("t-1", Role::Therapist);

        assert!(require(&roles, "admin-1", Capability::ApproveTemplate).is_ok());
        assert!(matches!(
            require(&roles, "t-1", Capability::ApproveTemplate),
            Err(WorkflowError::Forbidden { .. })
        ));
        assert!(matches!(
            require(&roles, "ghost", Capability::CreateTemplate),
            Err(WorkflowError::Forbidden { .. })
        ));
    }

    #[test]
    fn role_string_round_trip() {
        for role in [Role::Admin, Role::Manager, Role::Therapist] {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_str("janitor"), None);
    }
}
