use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use super::roles::{AdditionalRoleGrant, Role};

/// Static role -> permission table. Consulted on every fine-grained check,
/// never mutated at runtime. Permissions follow `domain:verb` naming.
static ROLE_PERMISSIONS: Lazy<HashMap<Role, HashSet<&'static str>>> = Lazy::new(|| {
    let student: HashSet<&'static str> =
        ["classes:read", "exams:read", "invoices:read", "tickets:read"]
            .into_iter()
            .collect();

    let teacher: HashSet<&'static str> = [
        "students:read",
        "classes:read",
        "exams:read",
        "exams:manage",
        "attendance:read",
        "attendance:manage",
        "tickets:read",
    ]
    .into_iter()
    .collect();

    let department_head: HashSet<&'static str> = [
        "students:read",
        "teachers:read",
        "classes:read",
        "classes:manage",
        "exams:read",
        "exams:manage",
        "attendance:read",
        "reports:read",
        "tickets:read",
    ]
    .into_iter()
    .collect();

    let admin: HashSet<&'static str> = [
        "students:read",
        "students:manage",
        "teachers:read",
        "teachers:manage",
        "classes:read",
        "classes:manage",
        "exams:read",
        "exams:manage",
        "attendance:read",
        "attendance:manage",
        "invoices:read",
        "invoices:manage",
        "tickets:read",
        "tickets:manage",
        "reports:read",
        "users:manage",
        "roles:assign",
    ]
    .into_iter()
    .collect();

    // The platform superuser holds every tenant-level permission plus the
    // cross-tenant administrative ones.
    let mut superadmin = admin.clone();
    superadmin.extend(["tenants:manage", "billing:manage"]);

    HashMap::from([
        (Role::Student, student),
        (Role::Teacher, teacher),
        (Role::DepartmentHead, department_head),
        (Role::Admin, admin),
        (Role::Superadmin, superadmin),
    ])
});

/// Whether `role` is granted `permission` by the static table.
pub fn role_has_permission(role: Role, permission: &str) -> bool {
    ROLE_PERMISSIONS
        .get(&role)
        .map(|set| set.contains(permission))
        .unwrap_or(false)
}

pub fn role_has_any_permission(role: Role, permissions: &[&str]) -> bool {
    permissions.iter().any(|p| role_has_permission(role, p))
}

pub fn role_has_all_permissions(role: Role, permissions: &[&str]) -> bool {
    permissions.iter().all(|p| role_has_permission(role, p))
}

/// Union of the primary role's permissions and those of every additional
/// role grant. This is the basis for "does this user have capability X
/// anywhere in their role set" checks.
pub fn effective_permissions(
    primary: Role,
    grants: &[AdditionalRoleGrant],
) -> HashSet<&'static str> {
    let mut set = ROLE_PERMISSIONS
        .get(&primary)
        .cloned()
        .unwrap_or_default();
    for grant in grants {
        if let Some(extra) = ROLE_PERMISSIONS.get(&grant.role) {
            set.extend(extra.iter().copied());
        }
    }
    set
}

/// Permission check over the full role set, primary plus grants.
pub fn user_has_permission(
    primary: Role,
    grants: &[AdditionalRoleGrant],
    permission: &str,
) -> bool {
    role_has_permission(primary, permission)
        || grants
            .iter()
            .any(|g| role_has_permission(g.role, permission))
}
