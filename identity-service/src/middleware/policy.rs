use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use std::collections::HashMap;

use crate::middleware::auth::Identity;
use crate::models::{Domain, Subject};
use crate::AppState;

/// Domain-scoped authorization for routes carrying an `org_unit_id` path segment.
/// Asks the policy engine whether `user:<id>` may perform the request method on the
/// request path within `orgunit:<org_unit_id>`. Install with `route_layer`, after
/// `auth_middleware`.
pub async fn enforce_policy_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = req
        .extensions()
        .get::<Identity>()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not authenticated")))?;

    let org_unit_id: i64 = params
        .get("org_unit_id")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid org_unit_id")))?;

    let subject = Subject::user(identity.account_id);
    let domain = Domain::org_unit(org_unit_id);
    let object = req.uri().path().to_string();
    let action = req.method().as_str().to_string();

    let allowed = state
        .policy
        .enforce(&subject, &domain, &object, &action)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, subject = %subject, domain = %domain, "Policy enforcement error");
            AppError::InternalError(anyhow::anyhow!("enforcement error"))
        })?;

    if !allowed {
        tracing::warn!(subject = %subject, domain = %domain, object = %object, action = %action, "Policy denied request");
        return Err(AppError::Forbidden(anyhow::anyhow!("Forbidden")));
    }

    Ok(next.run(req).await)
}
