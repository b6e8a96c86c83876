//! Shared setup for identity-service integration tests.
//!
//! Builds the real router over in-memory stores and a recording notifier, and
//! drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use identity_service::{
    build_router,
    config::{
        DatabaseConfig, Environment, FrontendConfig, IdentityConfig, JwtConfig, LifecycleConfig,
        RateLimitConfig, SecurityConfig,
    },
    models::{NewAccount, UserType},
    services::{
        AccountStore, InMemoryAccountStore, InMemoryPolicyStore, MockNotifier, PolicyStore,
        TokenPair,
    },
    utils::{generate_confirmation_token, hash_password, Password},
    AppState,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const CORPORATE_DOMAIN: &str = "corp.example";
pub const FRONTEND_URL: &str = "https://app.example";
pub const PASSWORD: &str = "correct-horse-battery";

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            access_secret: "integration-access-secret-0123456789abcdef".to_string(),
            refresh_secret: "integration-refresh-secret-0123456789abcdef".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        lifecycle: LifecycleConfig {
            confirmation_ttl_hours: 24,
            cleanup_interval: Duration::from_secs(3600),
            corporate_domain: CORPORATE_DOMAIN.to_string(),
            default_role: "user".to_string(),
        },
        frontend: FrontendConfig {
            base_url: FRONTEND_URL.to_string(),
            confirm_url: format!("{}/confirm", FRONTEND_URL),
            set_password_url: format!("{}/set-password", FRONTEND_URL),
        },
        smtp: None,
        security: SecurityConfig {
            allowed_origins: vec![FRONTEND_URL.to_string()],
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            signup_attempts: 1000,
            signup_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
            trust_forwarded_for: false,
        },
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub store: Arc<InMemoryAccountStore>,
    pub notifier: Arc<MockNotifier>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_policy_store(Arc::new(InMemoryPolicyStore::new()))
    }

    pub fn with_policy_store(policy_store: Arc<dyn PolicyStore>) -> Self {
        let store = Arc::new(InMemoryAccountStore::new());
        let notifier = Arc::new(MockNotifier::new());
        let state = AppState::new(test_config(), store.clone(), policy_store, notifier.clone());
        let router = build_router(state.clone());

        Self {
            state,
            router,
            store,
            notifier,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    pub async fn post(&self, uri: &str, body: Value, bearer: Option<&str>) -> TestResponse {
        self.request(Method::POST, uri, Some(body), bearer).await
    }

    pub async fn put(&self, uri: &str, body: Value, bearer: Option<&str>) -> TestResponse {
        self.request(Method::PUT, uri, Some(body), bearer).await
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, None, bearer).await
    }

    /// Last token mailed to `email`.
    pub fn token_for(&self, email: &str) -> String {
        self.notifier
            .last_for(email)
            .expect("no notification recorded")
            .token
    }

    pub async fn signup(&self, email: &str) -> TestResponse {
        self.post(
            "/auth/signup",
            serde_json::json!({ "email": email, "password": PASSWORD }),
            None,
        )
        .await
    }

    /// Signup, confirm and login; returns the login token pair.
    pub async fn active_user(&self, email: &str) -> TokenPair {
        assert_eq!(self.signup(email).await.status, StatusCode::OK);
        let token = self.token_for(email);
        let confirmed = self
            .request(
                Method::GET,
                &format!("/auth/confirm/{}", token),
                None,
                None,
            )
            .await;
        assert!(confirmed.status.is_redirection());

        let login = self
            .post(
                "/auth/login",
                serde_json::json!({ "email": email, "password": PASSWORD }),
                None,
            )
            .await;
        assert_eq!(login.status, StatusCode::OK);
        serde_json::from_value(login.body).unwrap()
    }

    /// Insert an active account with the given coarse role and issue tokens for it.
    pub async fn seeded_account(&self, email: &str, role: &str, user_type: UserType) -> (i64, TokenPair) {
        let token = generate_confirmation_token();
        let hash = hash_password(&Password::new(PASSWORD)).unwrap();
        let account = self
            .store
            .create_account(NewAccount {
                email: email.to_string(),
                password_hash: Some(hash.into_string()),
                full_name: None,
                role: role.to_string(),
                user_type,
                confirmation_token: token.clone(),
                access_expires_at: None,
            })
            .await
            .unwrap();
        assert!(self.store.confirm_account(account.id, &token).await.unwrap());

        let account = self.store.find_by_id(account.id).await.unwrap().unwrap();
        let pair = self.state.tokens.issue(&account, vec![]).unwrap();
        (account.id, pair)
    }

    pub async fn admin(&self) -> (i64, TokenPair) {
        self.seeded_account(&format!("admin@{}", CORPORATE_DOMAIN), "admin", UserType::Internal)
            .await
    }
}
