use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane.doe@madagascarairlines.com")]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "password123", min_length = 8)]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane.doe@madagascarairlines.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResendConfirmationRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane.doe@madagascarairlines.com")]
    pub email: String,
}

/// Password rules are enforced by the lifecycle service so mismatches surface as 400s.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CompleteInviteRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    #[schema(example = "5f2b...e9")]
    pub token: String,

    #[serde(default)]
    #[schema(example = "password123")]
    pub password: String,

    #[serde(default)]
    #[schema(example = "password123")]
    pub confirm_password: String,
}
