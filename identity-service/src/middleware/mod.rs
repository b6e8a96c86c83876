pub mod auth;
pub mod policy;
pub mod roles;

pub use auth::{auth_middleware, AuthUser, Identity};
pub use policy::enforce_policy_middleware;
pub use roles::{require_roles, AllowedRoles};
