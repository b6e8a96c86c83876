pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimit},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::IdentityConfig;
use crate::middleware::{
    auth_middleware, enforce_policy_middleware, require_roles, AllowedRoles,
};
use crate::services::{
    AccountLifecycle, AccountStore, LifecycleService, Notifier, PolicyEngine, PolicyStore,
    TokenService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::signup,
        handlers::auth::login,
        handlers::auth::confirm,
        handlers::auth::resend_confirmation,
        handlers::auth::complete_invite,
        handlers::user::get_me,
        handlers::user::update_me,
        handlers::org::my_permissions,
        handlers::admin::create_user,
        handlers::admin::assign_role,
        handlers::admin::revoke_role,
        handlers::admin::add_policy,
        handlers::admin::remove_policy,
        handlers::admin::list_policies,
        handlers::admin::user_policies,
        handlers::admin::list_users,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::SignupRequest,
            dtos::auth::LoginRequest,
            dtos::auth::ResendConfirmationRequest,
            dtos::auth::CompleteInviteRequest,
            dtos::user::UpdateProfileRequest,
            dtos::admin::CreateUserRequest,
            dtos::admin::CreateUserResponse,
            dtos::admin::RoleAssignmentRequest,
            dtos::admin::PolicyRequest,
            dtos::admin::PoliciesResponse,
            dtos::admin::UserPoliciesResponse,
            services::TokenPair,
            models::AccountResponse,
            models::OrgMembership,
            models::PermissionFact,
            models::GroupingFact,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Signup, confirmation and login"),
        (name = "User", description = "Current user"),
        (name = "Organization", description = "Organization-scoped resources"),
        (name = "Admin", description = "Invitations and policy administration"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn AccountStore>,
    pub policy: PolicyEngine,
    pub tokens: TokenService,
    pub lifecycle: Arc<dyn AccountLifecycle>,
    pub login_rate_limiter: IpRateLimit,
    pub signup_rate_limiter: IpRateLimit,
    pub ip_rate_limiter: IpRateLimit,
}

impl AppState {
    /// Wire the services over the given collaborators.
    pub fn new(
        config: IdentityConfig,
        store: Arc<dyn AccountStore>,
        policy_store: Arc<dyn PolicyStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let tokens = TokenService::new(&config.jwt);
        let lifecycle = Arc::new(LifecycleService::new(
            store.clone(),
            notifier,
            tokens.clone(),
            config.lifecycle.clone(),
        ));

        let limits = &config.rate_limit;
        let trust_proxy = limits.trust_forwarded_for;
        let login_rate_limiter = create_ip_rate_limiter(
            limits.login_attempts,
            limits.login_window_seconds,
            trust_proxy,
        );
        let signup_rate_limiter = create_ip_rate_limiter(
            limits.signup_attempts,
            limits.signup_window_seconds,
            trust_proxy,
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            limits.global_ip_limit,
            limits.global_ip_window_seconds,
            trust_proxy,
        );

        Self {
            store,
            policy: PolicyEngine::new(policy_store),
            tokens,
            lifecycle,
            login_rate_limiter,
            signup_rate_limiter,
            ip_rate_limiter,
            config,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let signup_route = Router::new()
        .route("/auth/signup", post(handlers::auth::signup))
        .layer(from_fn_with_state(
            state.signup_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let admin_routes = Router::new()
        .route("/admin/create-user", post(handlers::admin::create_user))
        .route("/admin/users", get(handlers::admin::list_users))
        .route(
            "/admin/roles",
            post(handlers::admin::assign_role).delete(handlers::admin::revoke_role),
        )
        .route(
            "/admin/policies",
            post(handlers::admin::add_policy)
                .delete(handlers::admin::remove_policy)
                .get(handlers::admin::list_policies),
        )
        .route("/admin/user/:id/policies", get(handlers::admin::user_policies))
        .layer(from_fn_with_state(AllowedRoles::new(["admin"]), require_roles))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let org_routes = Router::new()
        .route(
            "/org-units/:org_unit_id/permissions/me",
            get(handlers::org::my_permissions),
        )
        .route_layer(from_fn_with_state(state.clone(), enforce_policy_middleware))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let user_routes = Router::new()
        .route(
            "/users/me",
            get(handlers::user::get_me).put(handlers::user::update_me),
        )
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let allowed_origins: Vec<HeaderValue> = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .route("/auth/confirm/:token", get(handlers::auth::confirm))
        .route(
            "/auth/resend-confirmation",
            post(handlers::auth::resend_confirmation),
        )
        .route("/auth/complete-invite", post(handlers::auth::complete_invite))
        .merge(login_route)
        .merge(signup_route)
        .merge(admin_routes)
        .merge(org_routes)
        .merge(user_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]),
        )
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Credential store unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Credential store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
