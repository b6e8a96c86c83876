//! Account lifecycle: signup, invitation, confirmation, resend, login and
//! self-service profile completion.
//!
//! An account is created `pending` with a confirmation token and becomes
//! `active` exactly once, when the token is redeemed by confirmation or invite
//! completion. The confirmation window is measured from `created_at`, so a
//! resend never extends it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::config::LifecycleConfig;
use crate::models::{Account, AccountStatus, NewAccount, ProfileUpdate, UserType};
use crate::services::error::{LifecycleError, StoreError};
use crate::services::jwt::{TokenPair, TokenService};
use crate::services::notifier::{NotificationKind, Notifier};
use crate::services::store::AccountStore;
use crate::utils::{
    generate_confirmation_token, hash_password, normalize_email, parse_access_duration,
    verify_password, DurationParseError, Password, PasswordHashString,
};

/// Admin-issued invitation.
#[derive(Debug, Clone, Default)]
pub struct Invitation {
    pub email: String,
    pub full_name: Option<String>,
    /// `internal` or `external`; derived from the email domain when absent.
    pub user_type: Option<String>,
    pub role: Option<String>,
    /// Access window for external accounts, e.g. `2w` or `6mo`.
    pub duration: Option<String>,
}

#[async_trait]
pub trait AccountLifecycle: Send + Sync {
    async fn signup(&self, email: &str, password: &Password) -> Result<TokenPair, LifecycleError>;

    async fn invite_user(&self, invitation: Invitation) -> Result<Account, LifecycleError>;

    async fn confirm_registration(&self, token: &str) -> Result<Account, LifecycleError>;

    async fn complete_invite(
        &self,
        token: &str,
        password: &Password,
        confirm_password: &Password,
    ) -> Result<TokenPair, LifecycleError>;

    async fn resend_confirmation(&self, email: &str) -> Result<(), LifecycleError>;

    async fn login(&self, email: &str, password: &Password) -> Result<TokenPair, LifecycleError>;

    /// Only active accounts may edit their profile.
    async fn update_profile(
        &self,
        account_id: i64,
        update: ProfileUpdate,
    ) -> Result<Account, LifecycleError>;
}

pub struct LifecycleService {
    store: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    tokens: TokenService,
    config: LifecycleConfig,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Apply the per-type field rules, returning what should be stored.
pub fn normalize_profile(
    user_type: UserType,
    update: ProfileUpdate,
) -> Result<ProfileUpdate, LifecycleError> {
    let full_name = update.full_name.trim().to_string();
    match user_type {
        UserType::Internal => {
            let phone = non_blank(update.phone);
            let address = non_blank(update.address);
            match (full_name.is_empty(), update.employee_id, phone, address) {
                (false, Some(employee_id), Some(phone), Some(address)) => Ok(ProfileUpdate {
                    full_name,
                    employee_id: Some(employee_id),
                    phone: Some(phone),
                    address: Some(address),
                }),
                _ => Err(LifecycleError::InternalProfileIncomplete),
            }
        }
        UserType::External if full_name.is_empty() => Err(LifecycleError::NameRequired),
        UserType::External => Ok(ProfileUpdate {
            full_name,
            ..ProfileUpdate::default()
        }),
    }
}

/// True once more than `ttl` has elapsed since `created_at`.
pub fn confirmation_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - created_at > ttl
}

fn map_duplicate(err: StoreError) -> LifecycleError {
    match err {
        StoreError::DuplicateEmail => LifecycleError::EmailAlreadyRegistered,
        other => LifecycleError::Store(other),
    }
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
        tokens: TokenService,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            tokens,
            config,
        }
    }

    async fn issue_for(&self, account: &Account) -> Result<TokenPair, LifecycleError> {
        let memberships = self.store.find_memberships(account.id).await?;
        Ok(self.tokens.issue(account, memberships)?)
    }

    /// Resolve a token to a pending account still inside its confirmation window.
    async fn redeemable_account(&self, token: &str) -> Result<Account, LifecycleError> {
        if token.is_empty() {
            return Err(LifecycleError::InvalidToken);
        }

        let account = self
            .store
            .find_by_confirmation_token(token)
            .await?
            .ok_or(LifecycleError::InvalidToken)?;

        if account.status() != AccountStatus::Pending {
            return Err(LifecycleError::AlreadyConfirmed);
        }

        if confirmation_expired(account.created_at, Utc::now(), self.config.confirmation_ttl()) {
            tracing::warn!(account_id = account.id, "Confirmation attempted after TTL");
            return Err(LifecycleError::TokenExpired);
        }

        Ok(account)
    }

    fn access_expiry(
        &self,
        user_type: UserType,
        duration: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, LifecycleError> {
        let raw = match (user_type, duration.map(str::trim)) {
            (UserType::External, Some(d)) if !d.is_empty() => d,
            _ => return Ok(None),
        };

        let window = parse_access_duration(raw)?;
        Utc::now()
            .checked_add_signed(window)
            .map(Some)
            .ok_or_else(|| DurationParseError::new(raw, "out of range").into())
    }
}

#[async_trait]
impl AccountLifecycle for LifecycleService {
    async fn signup(&self, email: &str, password: &Password) -> Result<TokenPair, LifecycleError> {
        let email = normalize_email(email);

        if !self.config.is_corporate_email(&email) {
            tracing::warn!(email = %email, "Signup rejected: email domain not allowed");
            return Err(LifecycleError::InvalidEmailDomain);
        }

        if password.as_str().is_empty() {
            return Err(LifecycleError::PasswordRequired);
        }

        if self.store.email_exists(&email).await? {
            return Err(LifecycleError::EmailAlreadyRegistered);
        }

        let password_hash = hash_password(password)?;
        let token = generate_confirmation_token();

        let account = self
            .store
            .create_account(NewAccount {
                email: email.clone(),
                password_hash: Some(password_hash.into_string()),
                full_name: None,
                role: self.config.default_role.clone(),
                user_type: UserType::Internal,
                confirmation_token: token.clone(),
                access_expires_at: None,
            })
            .await
            .map_err(map_duplicate)?;

        tracing::info!(account_id = account.id, email = %account.email, "Account created via signup");

        self.notifier
            .notify(&account.email, &token, NotificationKind::Confirmation)
            .await
            .map_err(|e| {
                tracing::error!(account_id = account.id, error = %e, "Failed to send confirmation");
                e
            })?;

        self.issue_for(&account).await
    }

    async fn invite_user(&self, invitation: Invitation) -> Result<Account, LifecycleError> {
        let email = normalize_email(&invitation.email);

        let user_type = match invitation.user_type.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw
                .parse::<UserType>()
                .map_err(|_| LifecycleError::InvalidUserType(raw.to_string()))?,
            _ if self.config.is_corporate_email(&email) => UserType::Internal,
            _ => UserType::External,
        };

        let access_expires_at = self.access_expiry(user_type, invitation.duration.as_deref())?;

        if self.store.email_exists(&email).await? {
            return Err(LifecycleError::EmailAlreadyRegistered);
        }

        let role = invitation
            .role
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.config.default_role.clone());
        let token = generate_confirmation_token();

        let account = self
            .store
            .create_account(NewAccount {
                email,
                password_hash: None,
                full_name: invitation.full_name,
                role,
                user_type,
                confirmation_token: token.clone(),
                access_expires_at,
            })
            .await
            .map_err(map_duplicate)?;

        tracing::info!(
            account_id = account.id,
            email = %account.email,
            user_type = %user_type,
            access_expires_at = ?account.access_expires_at,
            "Account invited"
        );

        self.notifier
            .notify(&account.email, &token, NotificationKind::Invite)
            .await
            .map_err(|e| {
                tracing::error!(account_id = account.id, error = %e, "Failed to send invite");
                e
            })?;

        Ok(account)
    }

    async fn confirm_registration(&self, token: &str) -> Result<Account, LifecycleError> {
        let mut account = self.redeemable_account(token).await?;

        if account.password_hash.is_none() {
            return Err(LifecycleError::InviteNotCompleted);
        }

        if !self.store.confirm_account(account.id, token).await? {
            return Err(LifecycleError::InvalidToken);
        }

        account.status = AccountStatus::Active.as_str().to_string();
        account.confirmation_token = None;

        tracing::info!(account_id = account.id, "Account confirmed");
        Ok(account)
    }

    async fn complete_invite(
        &self,
        token: &str,
        password: &Password,
        confirm_password: &Password,
    ) -> Result<TokenPair, LifecycleError> {
        if password.as_str().is_empty() || confirm_password.as_str().is_empty() {
            return Err(LifecycleError::PasswordRequired);
        }
        if password.as_str() != confirm_password.as_str() {
            return Err(LifecycleError::PasswordMismatch);
        }

        let account = self.redeemable_account(token).await?;
        let password_hash = hash_password(password)?;

        if !self
            .store
            .set_password_and_activate(account.id, token, password_hash.as_str())
            .await?
        {
            return Err(LifecycleError::InvalidToken);
        }

        let account = self
            .store
            .find_by_id(account.id)
            .await?
            .ok_or(LifecycleError::UserNotFound)?;

        tracing::info!(account_id = account.id, "Invite completed, account activated");
        self.issue_for(&account).await
    }

    async fn resend_confirmation(&self, email: &str) -> Result<(), LifecycleError> {
        let email = normalize_email(email);

        let account = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(LifecycleError::UserNotFound)?;

        if account.status() != AccountStatus::Pending {
            return Err(LifecycleError::AlreadyConfirmed);
        }

        if account.user_type() != UserType::Internal || !self.config.is_corporate_email(&account.email) {
            tracing::warn!(account_id = account.id, "Resend rejected for non-internal account");
            return Err(LifecycleError::ResendNotAllowed);
        }

        let token = generate_confirmation_token();
        if !self.store.set_confirmation_token(account.id, &token).await? {
            return Err(LifecycleError::AlreadyConfirmed);
        }

        // Invitees have no password yet, so they need the set-password link again.
        let kind = if account.password_hash.is_some() {
            NotificationKind::ConfirmationResend
        } else {
            NotificationKind::Invite
        };

        self.notifier.notify(&account.email, &token, kind).await?;

        tracing::info!(account_id = account.id, "Confirmation token reissued");
        Ok(())
    }

    async fn login(&self, email: &str, password: &Password) -> Result<TokenPair, LifecycleError> {
        let email = normalize_email(email);

        let account = match self.store.find_by_email(&email).await? {
            Some(a) => a,
            None => {
                tracing::warn!(email = %email, "Login failed");
                return Err(LifecycleError::InvalidCredentials);
            }
        };

        // Checked before the password so a pending account never reveals whether it matched.
        if !account.is_active() {
            return Err(LifecycleError::AccountNotConfirmed);
        }

        let stored = account
            .password_hash
            .as_deref()
            .ok_or(LifecycleError::InvalidCredentials)?;
        if !verify_password(password, &PasswordHashString::new(stored))? {
            tracing::warn!(email = %email, "Login failed");
            return Err(LifecycleError::InvalidCredentials);
        }

        // Only revealed to callers who already proved the password.
        if account.is_access_expired(Utc::now()) {
            tracing::warn!(account_id = account.id, "Login rejected: external access expired");
            return Err(LifecycleError::AccessExpired);
        }

        tracing::info!(account_id = account.id, "Login succeeded");
        self.issue_for(&account).await
    }

    async fn update_profile(
        &self,
        account_id: i64,
        update: ProfileUpdate,
    ) -> Result<Account, LifecycleError> {
        let account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(LifecycleError::UserNotFound)?;

        if !account.is_active() {
            return Err(LifecycleError::AccountNotConfirmed);
        }

        let profile = normalize_profile(account.user_type(), update)?;
        let updated = self
            .store
            .update_profile(account.id, &profile)
            .await?
            .ok_or(LifecycleError::UserNotFound)?;

        tracing::info!(account_id = updated.id, user_type = %updated.user_type, "Profile updated");
        Ok(updated)
    }
}
