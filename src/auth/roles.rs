use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Closed set of primary roles.
///
/// Privilege is a strict total order: superadmin > admin > department_head >
/// teacher > student. The numeric levels are used by role-assignment
/// endpoints to prevent privilege escalation: a user may only assign roles
/// strictly below their own level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Superadmin,
    Admin,
    DepartmentHead,
    Teacher,
    Student,
}

impl Role {
    /// Numeric privilege level, highest wins.
    pub fn level(self) -> u8 {
        match self {
            Role::Superadmin => 5,
            Role::Admin => 4,
            Role::DepartmentHead => 3,
            Role::Teacher => 2,
            Role::Student => 1,
        }
    }

    /// Platform-level superuser, not bound to any single tenant.
    pub fn is_superuser(self) -> bool {
        matches!(self, Role::Superadmin)
    }

    /// Whether this role may assign `target` to another user.
    /// Equal or higher levels are always denied.
    pub fn can_assign(self, target: Role) -> bool {
        target.level() < self.level()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::DepartmentHead => "department_head",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown role: {0}")]
pub struct RoleParseError(pub String);

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "superadmin" => Ok(Role::Superadmin),
            "admin" => Ok(Role::Admin),
            "department_head" => Ok(Role::DepartmentHead),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

/// A secondary role held alongside the primary role, e.g. a teacher who is
/// also a department head. Granted and revoked administratively; read here
/// only to widen the effective permission set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditionalRoleGrant {
    pub role: Role,
    pub granted_at: DateTime<Utc>,
    pub granted_by: Option<Uuid>,
    pub metadata: Option<Value>,
}

/// True when the user holds `role` either as their primary role or through
/// an additional grant.
pub fn holds_role(primary: Role, grants: &[AdditionalRoleGrant], role: Role) -> bool {
    primary == role || grants.iter().any(|g| g.role == role)
}

/// Department-head status is derived, never stored on the user row.
pub fn is_department_head(primary: Role, grants: &[AdditionalRoleGrant]) -> bool {
    holds_role(primary, grants, Role::DepartmentHead)
}

/// Department assigned through a department-head grant, if any.
pub fn department_of(grants: &[AdditionalRoleGrant]) -> Option<String> {
    grants
        .iter()
        .filter(|g| g.role == Role::DepartmentHead)
        .find_map(|g| {
            g.metadata
                .as_ref()
                .and_then(|m| m.get("department"))
                .and_then(|d| d.as_str())
                .map(|d| d.to_string())
        })
}
