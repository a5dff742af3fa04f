pub mod authenticate;
pub mod isolation_guard;
pub mod rbac;
pub mod response;
pub mod tenant_resolver;

pub use authenticate::{authenticate, AuthUser};
pub use isolation_guard::tenant_isolation_guard;
pub use rbac::{
    enforce_role_hierarchy, require_all_permissions, require_any_permission, require_permission,
    require_role, require_self_or_permission, require_superuser,
};
pub use response::{ApiResponse, ApiResult};
pub use tenant_resolver::{resolve_tenant, resolve_tenant_optional, TenantContext};
