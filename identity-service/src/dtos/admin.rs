use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::{GroupingFact, PermissionFact};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "guest@partner.example")]
    pub email: String,

    #[schema(example = "Guest Pilot")]
    pub full_name: Option<String>,

    /// `internal` or `external`; derived from the email domain when omitted.
    #[schema(example = "external")]
    pub user_type: Option<String>,

    /// Coarse role, defaults to `user`.
    #[schema(example = "user")]
    pub role: Option<String>,

    /// External access window: `Nd`, `Nw`, `Nmo`, `Ny` or e.g. `36h`.
    #[schema(example = "2w")]
    pub duration: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateUserResponse {
    pub id: i64,
    pub email: String,
    pub role: String,
    pub user_type: String,
    pub access_expires_at: Option<DateTime<Utc>>,
    #[schema(example = "invitation sent")]
    pub message: String,
}

/// Grants `function` to a user within an organizational unit.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RoleAssignmentRequest {
    #[schema(example = 42)]
    pub user_id: i64,

    #[validate(length(min = 1, message = "Function is required"))]
    #[schema(example = "planner")]
    pub function: String,

    #[schema(example = 7)]
    pub org_unit_id: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PolicyRequest {
    #[validate(length(min = 1, message = "Role is required"))]
    #[schema(example = "planner")]
    pub role: String,

    #[schema(example = 7)]
    pub org_unit_id: i64,

    #[validate(length(min = 1, message = "Object is required"))]
    #[schema(example = "/org-units/7/*")]
    pub object: String,

    #[validate(length(min = 1, message = "Action is required"))]
    #[schema(example = "GET")]
    pub action: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PoliciesResponse {
    pub policies: Vec<PermissionFact>,
    pub groupings: Vec<GroupingFact>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserPoliciesQuery {
    /// Restrict to one organizational unit.
    pub org_unit_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserPoliciesResponse {
    pub user_id: i64,
    pub permissions: Vec<PermissionFact>,
}
