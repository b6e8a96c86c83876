use service_core::error::AppError;
use thiserror::Error;

use crate::utils::DurationParseError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Unexpected signing algorithm")]
    InvalidAlgorithm,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Policy store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Policy store error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to send notification: {0}")]
    Send(String),
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("email domain not allowed")]
    InvalidEmailDomain,

    #[error("email already registered")]
    EmailAlreadyRegistered,

    #[error("invalid user type: {0}")]
    InvalidUserType(String),

    #[error("{0}")]
    InvalidDuration(#[from] DurationParseError),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account not confirmed")]
    AccountNotConfirmed,

    #[error("access expired")]
    AccessExpired,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("account already confirmed")]
    AlreadyConfirmed,

    #[error("token expired")]
    TokenExpired,

    #[error("invite must be completed by setting a password")]
    InviteNotCompleted,

    #[error("password and confirmation are required")]
    PasswordRequired,

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("user not found")]
    UserNotFound,

    #[error("resend allowed only for internal users")]
    ResendNotAllowed,

    #[error("internal users must provide full name, employee ID, phone, and address")]
    InternalProfileIncomplete,

    #[error("external users must provide name")]
    NameRequired,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => {
                AppError::Conflict(anyhow::anyhow!("email already registered"))
            }
            StoreError::Database(e) => AppError::DatabaseError(e.into()),
            StoreError::Internal(e) => AppError::InternalError(anyhow::anyhow!(e)),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(e) => AppError::InternalError(anyhow::anyhow!(e)),
            other => AppError::Unauthorized(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl From<PolicyError> for AppError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Database(e) => AppError::DatabaseError(e.into()),
            PolicyError::Internal(e) => AppError::InternalError(anyhow::anyhow!(e)),
        }
    }
}

impl From<NotifyError> for AppError {
    fn from(err: NotifyError) -> Self {
        AppError::EmailError(err.to_string())
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        let message = err.to_string();
        match err {
            LifecycleError::InvalidEmailDomain
            | LifecycleError::AccountNotConfirmed
            | LifecycleError::AccessExpired
            | LifecycleError::ResendNotAllowed => AppError::Forbidden(anyhow::anyhow!(message)),
            LifecycleError::EmailAlreadyRegistered => AppError::Conflict(anyhow::anyhow!(message)),
            LifecycleError::InvalidCredentials => AppError::AuthError(anyhow::anyhow!(message)),
            LifecycleError::UserNotFound => AppError::NotFound(anyhow::anyhow!(message)),
            LifecycleError::InvalidUserType(_)
            | LifecycleError::InvalidDuration(_)
            | LifecycleError::InvalidToken
            | LifecycleError::AlreadyConfirmed
            | LifecycleError::TokenExpired
            | LifecycleError::InviteNotCompleted
            | LifecycleError::PasswordRequired
            | LifecycleError::PasswordMismatch
            | LifecycleError::InternalProfileIncomplete
            | LifecycleError::NameRequired => AppError::BadRequest(anyhow::anyhow!(message)),
            LifecycleError::Store(e) => e.into(),
            LifecycleError::Token(TokenError::Signing(e)) => {
                AppError::InternalError(anyhow::anyhow!(e))
            }
            LifecycleError::Token(e) => AppError::InternalError(anyhow::anyhow!(e.to_string())),
            LifecycleError::Notify(e) => e.into(),
            LifecycleError::Internal(e) => AppError::InternalError(e),
        }
    }
}
