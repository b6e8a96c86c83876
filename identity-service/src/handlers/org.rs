use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::admin::UserPoliciesResponse,
    middleware::AuthUser,
    models::{Domain, Subject},
    AppState,
};

/// The caller's effective permissions within an organizational unit.
/// Reaching this handler already required a matching policy.
#[utoipa::path(
    get,
    path = "/org-units/{org_unit_id}/permissions/me",
    params(("org_unit_id" = i64, Path, description = "Organizational unit ID")),
    responses(
        (status = 200, description = "Effective permissions", body = UserPoliciesResponse),
        (status = 403, description = "Denied by policy", body = crate::dtos::ErrorResponse)
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn my_permissions(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(org_unit_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let domain = Domain::org_unit(org_unit_id);
    let permissions = state
        .policy
        .get_implicit_permissions_for_user(&Subject::user(identity.account_id), Some(&domain))
        .await?;

    Ok(Json(UserPoliciesResponse {
        user_id: identity.account_id,
        permissions,
    }))
}
