use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use service_core::error::AppError;

use crate::models::{OrgMembership, UserType};
use crate::AppState;

/// Request-scoped identity established by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct Identity {
    pub account_id: i64,
    pub email: String,
    /// Coarse role from the token claims.
    pub role: String,
    pub user_type: UserType,
    pub memberships: Vec<OrgMembership>,
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authenticate the bearer token, then re-check the live account before the handler runs.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
    })?;

    let claims = state.tokens.validate_access_token(token).map_err(|e| {
        tracing::warn!(error = %e, "Rejected access token");
        AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
    })?;

    let account_id = claims
        .account_id()
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;

    let account = state
        .store
        .find_by_id(account_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User not found")))?;

    if account.is_access_expired(Utc::now()) {
        tracing::warn!(account_id, "Rejected request from expired external account");
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Access expired for this user"
        )));
    }

    let identity = Identity {
        account_id,
        email: claims.email.clone(),
        role: claims.role.clone(),
        user_type: account.user_type(),
        memberships: claims.memberships.clone(),
    };

    req.extensions_mut().insert(identity);
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extractor to get the authenticated identity in handlers
pub struct AuthUser(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not authenticated")))
    }
}
