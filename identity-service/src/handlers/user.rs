use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::user::UpdateProfileRequest, middleware::AuthUser, utils::ValidatedJson, AppState,
};

/// Current account profile with organizational memberships
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Current user", body = crate::models::AccountResponse),
        (status = 401, description = "Not authenticated", body = crate::dtos::ErrorResponse)
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .store
        .find_by_id(identity.account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("user not found")))?;
    let memberships = state.store.find_memberships(account.id).await?;

    Ok(Json(account.sanitized(memberships)))
}

/// Complete or edit the current account's profile
#[utoipa::path(
    put,
    path = "/users/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = crate::models::AccountResponse),
        (status = 400, description = "Required profile fields missing", body = crate::dtos::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Account not confirmed", body = crate::dtos::ErrorResponse)
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .lifecycle
        .update_profile(identity.account_id, req.into())
        .await?;
    let memberships = state.store.find_memberships(account.id).await?;

    Ok(Json(account.sanitized(memberships)))
}
