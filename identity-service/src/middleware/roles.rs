use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use std::sync::Arc;

use crate::middleware::auth::Identity;

/// Coarse roles accepted by [`require_roles`].
#[derive(Clone)]
pub struct AllowedRoles(Arc<[String]>);

impl AllowedRoles {
    pub fn new<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.iter().any(|r| r == role)
    }
}

/// Trusts the role in the token claims; the policy engine is not consulted.
/// Must run after `auth_middleware`.
pub async fn require_roles(
    State(allowed): State<AllowedRoles>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = req
        .extensions()
        .get::<Identity>()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not authenticated")))?;

    if !allowed.contains(&identity.role) {
        tracing::warn!(account_id = identity.account_id, role = %identity.role, "Insufficient role");
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Forbidden: insufficient role"
        )));
    }

    Ok(next.run(req).await)
}
