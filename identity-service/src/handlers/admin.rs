//! Administrative operations: invitations, account listing and policy administration.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        admin::{
            CreateUserRequest, CreateUserResponse, PoliciesResponse, PolicyRequest,
            RoleAssignmentRequest, UserPoliciesQuery, UserPoliciesResponse,
        },
        MessageResponse,
    },
    middleware::AuthUser,
    models::{Domain, GroupingFact, PermissionFact, Subject},
    services::Invitation,
    utils::ValidatedJson,
    AppState,
};

/// Invite a user; they activate the account by choosing a password
#[utoipa::path(
    post,
    path = "/admin/create-user",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Invitation sent", body = CreateUserResponse),
        (status = 400, description = "Invalid user type or duration", body = crate::dtos::ErrorResponse),
        (status = 403, description = "Insufficient role", body = crate::dtos::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::dtos::ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .lifecycle
        .invite_user(Invitation {
            email: req.email,
            full_name: req.full_name,
            user_type: req.user_type,
            role: req.role,
            duration: req.duration,
        })
        .await?;

    tracing::info!(admin_id = admin.account_id, account_id = account.id, "User invited by admin");

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            id: account.id,
            email: account.email,
            role: account.role,
            user_type: account.user_type,
            access_expires_at: account.access_expires_at,
            message: "invitation sent".to_string(),
        }),
    ))
}

async fn ensure_user_exists(state: &AppState, user_id: i64) -> Result<(), AppError> {
    state
        .store
        .find_by_id(user_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("user not found")))
}

/// Grant a role to a user within an organizational unit
#[utoipa::path(
    post,
    path = "/admin/roles",
    request_body = RoleAssignmentRequest,
    responses(
        (status = 200, description = "Role granted", body = crate::dtos::MessageResponse),
        (status = 404, description = "User not found", body = crate::dtos::ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RoleAssignmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_user_exists(&state, req.user_id).await?;

    state
        .policy
        .add_grouping_policy(GroupingFact::new(
            Subject::user(req.user_id),
            req.function,
            Domain::org_unit(req.org_unit_id),
        ))
        .await?;

    Ok(Json(MessageResponse::new("role assigned")))
}

/// Revoke a role from a user within an organizational unit
#[utoipa::path(
    delete,
    path = "/admin/roles",
    request_body = RoleAssignmentRequest,
    responses((status = 200, description = "Role revoked", body = crate::dtos::MessageResponse)),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn revoke_role(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RoleAssignmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .policy
        .remove_grouping_policy(GroupingFact::new(
            Subject::user(req.user_id),
            req.function,
            Domain::org_unit(req.org_unit_id),
        ))
        .await?;

    Ok(Json(MessageResponse::new("role removed")))
}

fn permission_fact(req: PolicyRequest) -> PermissionFact {
    PermissionFact::new(
        req.role,
        Domain::org_unit(req.org_unit_id),
        req.object,
        req.action,
    )
}

/// Allow a role to perform an action on an object within an organizational unit
#[utoipa::path(
    post,
    path = "/admin/policies",
    request_body = PolicyRequest,
    responses((status = 200, description = "Policy added", body = crate::dtos::MessageResponse)),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn add_policy(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PolicyRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.policy.add_policy(permission_fact(req)).await?;
    Ok(Json(MessageResponse::new("policy added")))
}

#[utoipa::path(
    delete,
    path = "/admin/policies",
    request_body = PolicyRequest,
    responses((status = 200, description = "Policy removed", body = crate::dtos::MessageResponse)),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn remove_policy(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PolicyRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.policy.remove_policy(permission_fact(req)).await?;
    Ok(Json(MessageResponse::new("policy removed")))
}

/// List every permission and grouping fact
#[utoipa::path(
    get,
    path = "/admin/policies",
    responses((status = 200, description = "All policy facts", body = PoliciesResponse)),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn list_policies(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let policies = state.policy.list_policies().await?;
    let groupings = state.policy.list_groupings().await?;
    Ok(Json(PoliciesResponse {
        policies,
        groupings,
    }))
}

/// Effective permissions of a user, optionally within one organizational unit
#[utoipa::path(
    get,
    path = "/admin/user/{id}/policies",
    params(
        ("id" = i64, Path, description = "User ID"),
        UserPoliciesQuery
    ),
    responses((status = 200, description = "Effective permissions", body = UserPoliciesResponse)),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn user_policies(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<UserPoliciesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let domain = query.org_unit_id.map(Domain::org_unit);
    let permissions = state
        .policy
        .get_implicit_permissions_for_user(&Subject::user(user_id), domain.as_deref())
        .await?;

    Ok(Json(UserPoliciesResponse {
        user_id,
        permissions,
    }))
}

/// Every account, sanitized, with its organizational memberships
#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "All accounts", body = [crate::models::AccountResponse]),
        (status = 403, description = "Insufficient role", body = crate::dtos::ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let accounts = state.store.list_accounts().await?;
    let mut users = Vec::with_capacity(accounts.len());
    for account in accounts {
        let memberships = state.store.find_memberships(account.id).await?;
        users.push(account.sanitized(memberships));
    }
    Ok(Json(users))
}
