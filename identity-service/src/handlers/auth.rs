use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{CompleteInviteRequest, LoginRequest, ResendConfirmationRequest, SignupRequest},
        MessageResponse,
    },
    services::LifecycleError,
    utils::{Password, ValidatedJson},
    AppState,
};

/// Self-service signup for corporate addresses
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created, confirmation sent", body = crate::services::TokenPair),
        (status = 400, description = "Invalid input", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Email domain not allowed", body = crate::dtos::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state
        .lifecycle
        .signup(&req.email, &Password::new(req.password))
        .await?;
    Ok((StatusCode::OK, Json(tokens)))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = crate::services::TokenPair),
        (status = 401, description = "Invalid email or password", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Account not confirmed or access expired", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state
        .lifecycle
        .login(&req.email, &Password::new(req.password))
        .await?;
    Ok((StatusCode::OK, Json(tokens)))
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false)
}

fn confirm_error_reason(err: &LifecycleError) -> Option<&'static str> {
    match err {
        LifecycleError::TokenExpired => Some("expired"),
        LifecycleError::AlreadyConfirmed => Some("already-confirmed"),
        LifecycleError::InvalidToken | LifecycleError::InviteNotCompleted => Some("invalid"),
        _ => None,
    }
}

/// Confirm an account from the emailed link
///
/// Browsers are redirected to the frontend; clients sending `Accept: application/json`
/// get a JSON body instead.
#[utoipa::path(
    get,
    path = "/auth/confirm/{token}",
    params(("token" = String, Path, description = "Confirmation token")),
    responses(
        (status = 200, description = "Account confirmed", body = crate::dtos::MessageResponse),
        (status = 303, description = "Redirect to the frontend result page"),
        (status = 400, description = "Invalid, expired or already used token", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn confirm(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let result = state.lifecycle.confirm_registration(&token).await;

    if wants_json(&headers) {
        result?;
        return Ok(Json(MessageResponse::new("account confirmed")).into_response());
    }

    let frontend = state.config.frontend.base_url.trim_end_matches('/');
    match result {
        Ok(_) => Ok(Redirect::to(&format!("{}/email-confirmed", frontend)).into_response()),
        Err(e) => match confirm_error_reason(&e) {
            Some(reason) => Ok(Redirect::to(&format!(
                "{}/confirm-error?reason={}",
                frontend, reason
            ))
            .into_response()),
            None => Err(e.into()),
        },
    }
}

/// Issue a fresh confirmation link
#[utoipa::path(
    post,
    path = "/auth/resend-confirmation",
    request_body = ResendConfirmationRequest,
    responses(
        (status = 200, description = "Confirmation re-sent", body = crate::dtos::MessageResponse),
        (status = 400, description = "Already confirmed", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Resend not allowed for this account", body = crate::dtos::ErrorResponse),
        (status = 404, description = "User not found", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn resend_confirmation(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResendConfirmationRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.lifecycle.resend_confirmation(&req.email).await?;
    Ok(Json(MessageResponse::new("confirmation email sent")))
}

/// Set a password for an invited account and sign in
#[utoipa::path(
    post,
    path = "/auth/complete-invite",
    request_body = CompleteInviteRequest,
    responses(
        (status = 200, description = "Account activated", body = crate::services::TokenPair),
        (status = 400, description = "Invalid token or passwords", body = crate::dtos::ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn complete_invite(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CompleteInviteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state
        .lifecycle
        .complete_invite(
            &req.token,
            &Password::new(req.password),
            &Password::new(req.confirm_password),
        )
        .await?;
    Ok((StatusCode::OK, Json(tokens)))
}
