use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::JwtConfig;
use crate::models::{Account, OrgMembership};
use crate::services::error::TokenError;

/// Issues and validates HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    access_encoding_key: EncodingKey,
    access_decoding_key: DecodingKey,
    refresh_encoding_key: EncodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (account ID)
    pub sub: String,
    pub email: String,
    /// Coarse role used by `require_roles`
    pub role: String,
    pub memberships: Vec<OrgMembership>,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn account_id(&self) -> Result<i64, TokenError> {
        self.sub
            .parse()
            .map_err(|_| TokenError::Invalid("subject is not an account id".to_string()))
    }
}

/// Refresh tokens carry nothing but their validity window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub iat: i64,
    pub exp: i64,
}

/// Token pair returned to client
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Access token lifetime in seconds
    #[schema(example = 900)]
    pub expires_in: i64,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access_encoding_key: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding_key: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding_key: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
        }
    }

    /// Mint an access and refresh token for the account's current role and memberships.
    pub fn issue(
        &self,
        account: &Account,
        memberships: Vec<OrgMembership>,
    ) -> Result<TokenPair, TokenError> {
        let now = Utc::now();

        let access_claims = AccessClaims {
            sub: account.id.to_string(),
            email: account.email.clone(),
            role: account.role.clone(),
            memberships,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.access_token_expiry_minutes)).timestamp(),
        };
        let access_token = self.sign_access(&access_claims)?;

        let refresh_claims = RefreshClaims {
            iat: now.timestamp(),
            exp: (now + Duration::days(self.refresh_token_expiry_days)).timestamp(),
        };
        let refresh_token = encode(
            &Header::new(Algorithm::HS256),
            &refresh_claims,
            &self.refresh_encoding_key,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry_seconds(),
        })
    }

    fn sign_access(&self, claims: &AccessClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.access_encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Stateless check of signature, algorithm and expiry.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<AccessClaims>(token, &self.access_decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidAlgorithm => TokenError::InvalidAlgorithm,
                _ => TokenError::Invalid(e.to_string()),
            })
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            access_secret: "access-secret-for-tests-0123456789abcdef".to_string(),
            refresh_secret: "refresh-secret-for-tests-0123456789abcdef".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        }
    }

    fn account() -> Account {
        Account {
            id: 42,
            email: "jane@corp.example".to_string(),
            password_hash: Some("hash".to_string()),
            full_name: Some("Jane".to_string()),
            role: "planner".to_string(),
            status: "active".to_string(),
            user_type: "internal".to_string(),
            confirmation_token: None,
            access_expires_at: None,
            employee_id: None,
            phone: None,
            address: None,
            created_at: Utc::now(),
        }
    }

    fn memberships() -> Vec<OrgMembership> {
        vec![OrgMembership {
            org_unit_id: 7,
            org_unit: "Flight Ops".to_string(),
            function: "dispatcher".to_string(),
        }]
    }

    #[test]
    fn test_issue_then_validate_recovers_claims() {
        let service = TokenService::new(&config());
        let pair = service.issue(&account(), memberships()).unwrap();

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 900);

        let claims = service.validate_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.account_id().unwrap(), 42);
        assert_eq!(claims.email, "jane@corp.example");
        assert_eq!(claims.role, "planner");
        assert_eq!(claims.memberships, memberships());
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_refresh_token_uses_refresh_secret_and_longer_ttl() {
        let service = TokenService::new(&config());
        let pair = service.issue(&account(), vec![]).unwrap();

        // Not an access token.
        assert!(service.validate_access_token(&pair.refresh_token).is_err());

        let claims = decode::<RefreshClaims>(
            &pair.refresh_token,
            &DecodingKey::from_secret(config().refresh_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap()
        .claims;
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn test_rejects_expired_token() {
        let service = TokenService::new(&config());
        let now = Utc::now().timestamp();
        let token = service
            .sign_access(&AccessClaims {
                sub: "42".to_string(),
                email: "jane@corp.example".to_string(),
                role: "user".to_string(),
                memberships: vec![],
                iat: now - 1000,
                exp: now - 10,
            })
            .unwrap();

        assert!(matches!(
            service.validate_access_token(&token),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_rejects_algorithm_substitution() {
        let service = TokenService::new(&config());
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: "42".to_string(),
            email: "jane@corp.example".to_string(),
            role: "admin".to_string(),
            memberships: vec![],
            iat: now,
            exp: now + 600,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(config().access_secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            service.validate_access_token(&token),
            Err(TokenError::InvalidAlgorithm)
        ));
    }

    #[test]
    fn test_rejects_foreign_secret_and_garbage() {
        let service = TokenService::new(&config());
        let mut other = config();
        other.access_secret = "some-other-secret-entirely-0123456789".to_string();
        let foreign = TokenService::new(&other)
            .issue(&account(), vec![])
            .unwrap();

        assert!(matches!(
            service.validate_access_token(&foreign.access_token),
            Err(TokenError::Invalid(_))
        ));
        assert!(service.validate_access_token("not.a.jwt").is_err());
        assert!(service.validate_access_token("").is_err());
    }
}
