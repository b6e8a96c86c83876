//! Credential store: account rows and their organizational memberships.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tracing::instrument;

use crate::models::{Account, AccountStatus, NewAccount, OrgMembership, ProfileUpdate};
use crate::services::error::StoreError;

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, StoreError>;

    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_confirmation_token(&self, token: &str) -> Result<Option<Account>, StoreError>;

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::DuplicateEmail`] when the email is taken.
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError>;

    /// Replace the token of a still-pending account. Returns false if the account is not pending.
    async fn set_confirmation_token(&self, id: i64, token: &str) -> Result<bool, StoreError>;

    /// Flip a pending account to active and clear its token, only if `token` is still
    /// the current one and a password is already set.
    async fn confirm_account(&self, id: i64, token: &str) -> Result<bool, StoreError>;

    /// Same guard as [`AccountStore::confirm_account`], also storing the password hash.
    async fn set_password_and_activate(
        &self,
        id: i64,
        token: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError>;

    /// Write the profile fields of an active account. `None` if no active account has `id`.
    async fn update_profile(
        &self,
        id: i64,
        profile: &ProfileUpdate,
    ) -> Result<Option<Account>, StoreError>;

    /// All accounts, oldest first.
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    async fn find_memberships(&self, account_id: i64) -> Result<Vec<OrgMembership>, StoreError>;

    /// Delete pending accounts created before `cutoff`. Returns the number removed.
    async fn delete_expired_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, full_name, role, status, user_type, \
                               confirmation_token, access_expires_at, employee_id, phone, \
                               address, created_at";

/// PostgreSQL-backed store over the `users` and `user_org_units` tables.
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, predicate: &str, value: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE {}", ACCOUNT_COLUMNS, predicate);
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", ACCOUNT_COLUMNS);
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.fetch_one_by("lower(email) = lower($1)", email).await
    }

    #[instrument(skip_all)]
    async fn find_by_confirmation_token(&self, token: &str) -> Result<Option<Account>, StoreError> {
        self.fetch_one_by("confirmation_token = $1", token).await
    }

    #[instrument(skip(self))]
    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE lower(email) = lower($1))",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    #[instrument(skip(self, account), fields(email = %account.email, user_type = %account.user_type))]
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (email, password_hash, full_name, role, status, user_type,
                               confirmation_token, access_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );

        sqlx::query_as::<_, Account>(&sql)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(&account.full_name)
            .bind(&account.role)
            .bind(AccountStatus::Pending.as_str())
            .bind(account.user_type.as_str())
            .bind(&account.confirmation_token)
            .bind(account.access_expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    StoreError::DuplicateEmail
                }
                other => StoreError::Database(other),
            })
    }

    #[instrument(skip(self, token))]
    async fn set_confirmation_token(&self, id: i64, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET confirmation_token = $2 WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, token))]
    async fn confirm_account(&self, id: i64, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET status = 'active', confirmation_token = NULL
            WHERE id = $1
              AND status = 'pending'
              AND confirmation_token = $2
              AND password_hash IS NOT NULL
            "#,
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, token, password_hash))]
    async fn set_password_and_activate(
        &self,
        id: i64,
        token: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $3, status = 'active', confirmation_token = NULL
            WHERE id = $1 AND status = 'pending' AND confirmation_token = $2
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, profile))]
    async fn update_profile(
        &self,
        id: i64,
        profile: &ProfileUpdate,
    ) -> Result<Option<Account>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
            SET full_name = $2, employee_id = $3, phone = $4, address = $5
            WHERE id = $1 AND status = 'active'
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(&profile.full_name)
            .bind(profile.employee_id)
            .bind(&profile.phone)
            .bind(&profile.address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    #[instrument(skip(self))]
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at, id", ACCOUNT_COLUMNS);
        let accounts = sqlx::query_as::<_, Account>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(accounts)
    }

    #[instrument(skip(self))]
    async fn find_memberships(&self, account_id: i64) -> Result<Vec<OrgMembership>, StoreError> {
        let memberships = sqlx::query_as::<_, OrgMembership>(
            r#"
            SELECT uou.org_unit_id, ou.name AS org_unit, uou.function
            FROM user_org_units uou
            JOIN organizational_units ou ON ou.id = uou.org_unit_id
            WHERE uou.user_id = $1
            ORDER BY uou.org_unit_id
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(memberships)
    }

    #[instrument(skip(self))]
    async fn delete_expired_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE status = 'pending' AND created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Default)]
struct InMemoryState {
    accounts: HashMap<i64, Account>,
    memberships: HashMap<i64, Vec<OrgMembership>>,
}

/// Process-local store used by tests and local runs without PostgreSQL.
#[derive(Default)]
pub struct InMemoryAccountStore {
    state: Mutex<InMemoryState>,
    next_id: AtomicI64,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Internal("account store lock poisoned".to_string()))
    }

    pub fn add_membership(&self, account_id: i64, membership: OrgMembership) -> Result<(), StoreError> {
        self.lock()?
            .memberships
            .entry(account_id)
            .or_default()
            .push(membership);
        Ok(())
    }

    /// Mutate a stored account in place, e.g. to backdate `created_at`.
    pub fn update_account<F>(&self, id: i64, f: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut Account),
    {
        Ok(self.lock()?.accounts.get_mut(&id).map(f).is_some())
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .lock()?
            .accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_confirmation_token(&self, token: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .lock()?
            .accounts
            .values()
            .find(|a| a.confirmation_token.as_deref() == Some(token))
            .cloned())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()?
            .accounts
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(email)))
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut state = self.lock()?;
        if state
            .accounts
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(&account.email))
        {
            return Err(StoreError::DuplicateEmail);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let created = Account {
            id,
            email: account.email,
            password_hash: account.password_hash,
            full_name: account.full_name,
            role: account.role,
            status: AccountStatus::Pending.as_str().to_string(),
            user_type: account.user_type.as_str().to_string(),
            confirmation_token: Some(account.confirmation_token),
            access_expires_at: account.access_expires_at,
            employee_id: None,
            phone: None,
            address: None,
            created_at: Utc::now(),
        };
        state.accounts.insert(id, created.clone());
        Ok(created)
    }

    async fn set_confirmation_token(&self, id: i64, token: &str) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.accounts.get_mut(&id) {
            Some(a) if a.status() == AccountStatus::Pending => {
                a.confirmation_token = Some(token.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn confirm_account(&self, id: i64, token: &str) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.accounts.get_mut(&id) {
            Some(a)
                if a.status() == AccountStatus::Pending
                    && a.confirmation_token.as_deref() == Some(token)
                    && a.password_hash.is_some() =>
            {
                a.status = AccountStatus::Active.as_str().to_string();
                a.confirmation_token = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_password_and_activate(
        &self,
        id: i64,
        token: &str,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.accounts.get_mut(&id) {
            Some(a)
                if a.status() == AccountStatus::Pending
                    && a.confirmation_token.as_deref() == Some(token) =>
            {
                a.password_hash = Some(password_hash.to_string());
                a.status = AccountStatus::Active.as_str().to_string();
                a.confirmation_token = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_profile(
        &self,
        id: i64,
        profile: &ProfileUpdate,
    ) -> Result<Option<Account>, StoreError> {
        let mut state = self.lock()?;
        match state.accounts.get_mut(&id) {
            Some(a) if a.is_active() => {
                a.full_name = Some(profile.full_name.clone());
                a.employee_id = profile.employee_id;
                a.phone = profile.phone.clone();
                a.address = profile.address.clone();
                Ok(Some(a.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self.lock()?.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| (a.created_at, a.id));
        Ok(accounts)
    }

    async fn find_memberships(&self, account_id: i64) -> Result<Vec<OrgMembership>, StoreError> {
        Ok(self
            .lock()?
            .memberships
            .get(&account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_expired_pending(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let before = state.accounts.len();
        state
            .accounts
            .retain(|_, a| !(a.status() == AccountStatus::Pending && a.created_at < cutoff));
        let removed = before - state.accounts.len();
        let InMemoryState {
            accounts,
            memberships,
        } = &mut *state;
        memberships.retain(|id, _| accounts.contains_key(id));
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserType;
    use chrono::Duration;

    fn new_account(email: &str, token: &str, password_hash: Option<&str>) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password_hash: password_hash.map(str::to_string),
            full_name: None,
            role: "user".to_string(),
            user_type: UserType::Internal,
            confirmation_token: token.to_string(),
            access_expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_case_insensitive() {
        let store = InMemoryAccountStore::new();
        store
            .create_account(new_account("a@corp.example", "t1", Some("h")))
            .await
            .unwrap();

        let err = store
            .create_account(new_account("A@Corp.Example", "t2", Some("h")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        assert!(store.email_exists("A@CORP.EXAMPLE").await.unwrap());
    }

    #[tokio::test]
    async fn test_confirm_is_guarded_by_current_token() {
        let store = InMemoryAccountStore::new();
        let acc = store
            .create_account(new_account("a@corp.example", "old", Some("h")))
            .await
            .unwrap();

        assert!(store.set_confirmation_token(acc.id, "new").await.unwrap());
        assert!(!store.confirm_account(acc.id, "old").await.unwrap());
        assert!(store.confirm_account(acc.id, "new").await.unwrap());
        assert!(!store.confirm_account(acc.id, "new").await.unwrap());

        let stored = store.find_by_id(acc.id).await.unwrap().unwrap();
        assert!(stored.is_active());
        assert!(stored.confirmation_token.is_none());
        assert!(!store.set_confirmation_token(acc.id, "again").await.unwrap());
    }

    #[tokio::test]
    async fn test_confirm_requires_password() {
        let store = InMemoryAccountStore::new();
        let acc = store
            .create_account(new_account("guest@partner.example", "tok", None))
            .await
            .unwrap();

        assert!(!store.confirm_account(acc.id, "tok").await.unwrap());
        assert!(store
            .set_password_and_activate(acc.id, "tok", "hash")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_update_profile_only_writes_active_accounts() {
        let store = InMemoryAccountStore::new();
        let acc = store
            .create_account(new_account("a@corp.example", "tok", Some("h")))
            .await
            .unwrap();
        let profile = ProfileUpdate {
            full_name: "Ada Ops".to_string(),
            employee_id: Some(1207),
            phone: Some("+1 555 0100".to_string()),
            address: Some("1 Hangar Rd".to_string()),
        };

        assert!(store.update_profile(acc.id, &profile).await.unwrap().is_none());
        assert!(store.update_profile(999, &profile).await.unwrap().is_none());

        store.confirm_account(acc.id, "tok").await.unwrap();
        let updated = store.update_profile(acc.id, &profile).await.unwrap().unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Ada Ops"));
        assert_eq!(updated.employee_id, Some(1207));

        let listed = store.list_accounts().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].address.as_deref(), Some("1 Hangar Rd"));
    }

    #[tokio::test]
    async fn test_delete_expired_pending_only_touches_old_pending_rows() {
        let store = InMemoryAccountStore::new();
        let old_pending = store
            .create_account(new_account("old@corp.example", "t1", Some("h")))
            .await
            .unwrap();
        let old_active = store
            .create_account(new_account("active@corp.example", "t2", Some("h")))
            .await
            .unwrap();
        let fresh = store
            .create_account(new_account("fresh@corp.example", "t3", Some("h")))
            .await
            .unwrap();

        store.confirm_account(old_active.id, "t2").await.unwrap();
        for id in [old_pending.id, old_active.id] {
            store
                .update_account(id, |a| a.created_at = Utc::now() - Duration::days(3))
                .unwrap();
        }

        let removed = store
            .delete_expired_pending(Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_by_id(old_pending.id).await.unwrap().is_none());
        assert!(store.find_by_id(old_active.id).await.unwrap().is_some());
        assert!(store.find_by_id(fresh.id).await.unwrap().is_some());
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL with migrations applied
    async fn test_pg_store_roundtrip() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        let store = PgAccountStore::new(pool);
        let email = format!("pg-{}@corp.example", crate::utils::generate_confirmation_token());

        let acc = store
            .create_account(new_account(&email, "tok", Some("h")))
            .await
            .unwrap();
        assert!(store.find_by_email(&email.to_uppercase()).await.unwrap().is_some());
        assert!(store.confirm_account(acc.id, "tok").await.unwrap());
    }
}
