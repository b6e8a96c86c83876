use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// "subject holds role within domain"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct GroupingFact {
    pub subject: String,
    pub role: String,
    pub domain: String,
}

/// "role may perform action on object within domain"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct PermissionFact {
    pub role: String,
    pub domain: String,
    pub object: String,
    pub action: String,
}

impl GroupingFact {
    pub fn new(subject: impl Into<String>, role: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            role: role.into(),
            domain: domain.into(),
        }
    }
}

impl PermissionFact {
    pub fn new(
        role: impl Into<String>,
        domain: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            domain: domain.into(),
            object: object.into(),
            action: action.into(),
        }
    }
}

/// Policy subject naming.
pub struct Subject;

impl Subject {
    pub fn user(account_id: i64) -> String {
        format!("user:{}", account_id)
    }
}

/// Policy domain naming. The engine treats domains as opaque strings.
pub struct Domain;

impl Domain {
    pub fn org_unit(org_unit_id: i64) -> String {
        format!("orgunit:{}", org_unit_id)
    }
}
