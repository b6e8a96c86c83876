mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use chrono::{Duration, Utc};
use common::{TestApp, CORPORATE_DOMAIN};
use identity_service::models::{OrgMembership, UserType};
use identity_service::services::{AccountStore, PendingAccountSweeper};

#[tokio::test]
async fn test_missing_authorization_header_is_rejected() {
    let app = TestApp::new();

    let res = app.get("/users/me", None).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "Missing or invalid Authorization header");
}

#[tokio::test]
async fn test_non_bearer_scheme_is_rejected() {
    let app = TestApp::new();
    let (_, tokens) = app.admin().await;

    let res = app
        .send(
            Request::builder()
                .uri("/users/me")
                .header(header::AUTHORIZATION, format!("Token {}", tokens.access_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_garbage_token_is_rejected() {
    let app = TestApp::new();

    let res = app.get("/users/me", Some("not-a-jwt")).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let app = TestApp::new();
    let (_, tokens) = app.admin().await;

    let res = app.get("/users/me", Some(&tokens.refresh_token)).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deleted_account_is_rejected_with_valid_token() {
    let app = TestApp::new();
    let email = format!("gone@{}", CORPORATE_DOMAIN);
    let tokens = app.active_user(&email).await;

    // Flip the account back to pending and age it past the confirmation window,
    // then let the sweep delete it.
    let account = app.store.find_by_email(&email).await.unwrap().unwrap();
    app.store
        .update_account(account.id, |a| {
            a.status = "pending".to_string();
            a.confirmation_token = Some("stale".to_string());
            a.created_at = Utc::now() - Duration::days(3);
        })
        .unwrap();
    let sweeper = PendingAccountSweeper::new(
        app.store.clone(),
        std::time::Duration::from_secs(3600),
        Duration::hours(24),
    );
    assert_eq!(sweeper.run_once().await.unwrap(), 1);

    let res = app.get("/users/me", Some(&tokens.access_token)).await;

    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["error"], "User not found");
}

#[tokio::test]
async fn test_expired_external_account_is_forbidden_even_with_fresh_token() {
    let app = TestApp::new();
    let (id, tokens) = app
        .seeded_account("guest@partner.example", "user", UserType::External)
        .await;
    app.store
        .update_account(id, |a| a.access_expires_at = Some(Utc::now() - Duration::minutes(1)))
        .unwrap();

    let res = app.get("/users/me", Some(&tokens.access_token)).await;

    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["error"], "Access expired for this user");
}

#[tokio::test]
async fn test_external_account_inside_window_is_admitted() {
    let app = TestApp::new();
    let (id, tokens) = app
        .seeded_account("guest@partner.example", "user", UserType::External)
        .await;
    app.store
        .update_account(id, |a| a.access_expires_at = Some(Utc::now() + Duration::days(1)))
        .unwrap();

    let res = app.get("/users/me", Some(&tokens.access_token)).await;

    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_me_returns_sanitized_profile_with_memberships() {
    let app = TestApp::new();
    let (id, tokens) = app
        .seeded_account(&format!("planner@{}", CORPORATE_DOMAIN), "user", UserType::Internal)
        .await;
    app.store
        .add_membership(
            id,
            OrgMembership {
                org_unit_id: 7,
                org_unit: "Flight Ops".to_string(),
                function: "planner".to_string(),
            },
        )
        .unwrap();

    let res = app.get("/users/me", Some(&tokens.access_token)).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["id"], id);
    assert_eq!(res.body["status"], "active");
    assert_eq!(res.body["memberships"][0]["org_unit_id"], 7);
    assert!(res.body.get("password_hash").is_none());
    assert!(res.body.get("confirmation_token").is_none());
}

#[tokio::test]
async fn test_responses_carry_request_id_and_security_headers() {
    let app = TestApp::new();

    let res = app.request(Method::GET, "/users/me", None, None).await;

    assert!(res.headers.contains_key("x-request-id"));
    assert_eq!(res.headers.get("x-content-type-options").unwrap(), "nosniff");
}
