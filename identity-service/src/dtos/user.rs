use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::models::ProfileUpdate;

/// Internal accounts must send every field. External accounts only need `full_name`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    #[validate(length(max = 200, message = "Full name is too long"))]
    #[schema(example = "Jane Doe")]
    pub full_name: String,

    #[validate(range(min = 1, message = "Employee ID must be positive"))]
    #[schema(example = 4411)]
    pub employee_id: Option<i32>,

    #[validate(length(max = 32, message = "Phone is too long"))]
    #[schema(example = "+1 555 0142")]
    pub phone: Option<String>,

    #[validate(length(max = 500, message = "Address is too long"))]
    #[schema(example = "7 Runway Way")]
    pub address: Option<String>,
}

impl From<UpdateProfileRequest> for ProfileUpdate {
    fn from(req: UpdateProfileRequest) -> Self {
        Self {
            full_name: req.full_name,
            employee_id: req.employee_id,
            phone: req.phone,
            address: req.address,
        }
    }
}
