//! Account model - a workforce identity and its lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Lifecycle status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Active,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Active => "active",
        }
    }
}

/// Whether the account belongs to the organization or is a time-boxed guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Internal,
    External,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Internal => "internal",
            UserType::External => "external",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(UserType::Internal),
            "external" => Ok(UserType::External),
            other => Err(format!("unknown user type: {}", other)),
        }
    }
}

/// Account entity.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: i64,
    pub email: String,
    /// Absent while the account is pending an invite completion.
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub role: String,
    pub status: String,
    pub user_type: String,
    pub confirmation_token: Option<String>,
    pub access_expires_at: Option<DateTime<Utc>>,
    pub employee_id: Option<i32>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Unknown status codes read as pending, which keeps the account unusable.
    pub fn status(&self) -> AccountStatus {
        if self.status == AccountStatus::Active.as_str() {
            AccountStatus::Active
        } else {
            AccountStatus::Pending
        }
    }

    pub fn is_active(&self) -> bool {
        self.status() == AccountStatus::Active
    }

    /// Unknown type codes read as external, the more restricted class.
    pub fn user_type(&self) -> UserType {
        self.user_type.parse().unwrap_or(UserType::External)
    }

    /// True for an external account whose access window has closed.
    pub fn is_access_expired(&self, now: DateTime<Utc>) -> bool {
        self.user_type() == UserType::External
            && self.access_expires_at.map(|at| at < now).unwrap_or(false)
    }

    pub fn sanitized(&self, memberships: Vec<OrgMembership>) -> AccountResponse {
        AccountResponse {
            id: self.id,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: self.role.clone(),
            status: self.status.clone(),
            user_type: self.user_type.clone(),
            access_expires_at: self.access_expires_at,
            employee_id: self.employee_id,
            phone: self.phone.clone(),
            address: self.address.clone(),
            created_at: self.created_at,
            memberships,
        }
    }
}

/// Fields needed to insert a pending account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub role: String,
    pub user_type: UserType,
    pub confirmation_token: String,
    pub access_expires_at: Option<DateTime<Utc>>,
}

/// Organizational unit membership carried in access token claims.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct OrgMembership {
    pub org_unit_id: i64,
    pub org_unit: String,
    pub function: String,
}

/// Account as returned by the API (no hash, no token).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountResponse {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub role: String,
    pub status: String,
    pub user_type: String,
    pub access_expires_at: Option<DateTime<Utc>>,
    pub employee_id: Option<i32>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub memberships: Vec<OrgMembership>,
}

/// Self-service profile fields. Internal-only fields are dropped for external accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub employee_id: Option<i32>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(user_type: &str, access_expires_at: Option<DateTime<Utc>>) -> Account {
        Account {
            id: 1,
            email: "guest@partner.example".to_string(),
            password_hash: Some("hash".to_string()),
            full_name: None,
            role: "user".to_string(),
            status: "active".to_string(),
            user_type: user_type.to_string(),
            confirmation_token: None,
            access_expires_at,
            employee_id: None,
            phone: None,
            address: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_access_expiry_only_applies_to_external_accounts() {
        let now = Utc::now();
        let past = Some(now - Duration::hours(1));
        let future = Some(now + Duration::hours(1));

        assert!(account("external", past).is_access_expired(now));
        assert!(!account("external", future).is_access_expired(now));
        assert!(!account("external", None).is_access_expired(now));
        assert!(!account("internal", past).is_access_expired(now));
    }

    #[test]
    fn test_unknown_codes_fall_back_to_restricted_values() {
        let mut acc = account("contractor", None);
        acc.status = "archived".to_string();
        assert_eq!(acc.user_type(), UserType::External);
        assert_eq!(acc.status(), AccountStatus::Pending);
        assert!(!acc.is_active());
    }

    #[test]
    fn test_sanitized_response_omits_secrets() {
        let mut acc = account("internal", None);
        acc.confirmation_token = Some("deadbeef".to_string());
        let json = serde_json::to_string(&acc.sanitized(vec![])).unwrap();
        assert!(!json.contains("hash"));
        assert!(!json.contains("deadbeef"));
    }
}
