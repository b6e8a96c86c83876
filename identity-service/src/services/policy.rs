//! Domain-scoped role/permission evaluation.
//!
//! Two fact kinds are stored: grouping facts `(subject, role, domain)` and
//! permission facts `(role, domain, object, action)`. A subject may act when a
//! permission fact exists for the subject itself or for any role it reaches
//! through grouping facts in the *same* domain. Objects match exactly or by a
//! trailing `*` prefix; the action `*` matches any action.

use async_trait::async_trait;
use sqlx::{postgres::PgPool, FromRow};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use tracing::instrument;

use crate::models::{GroupingFact, PermissionFact};
use crate::services::error::PolicyError;

/// Persistence for policy facts. Mutations return whether the set changed.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn add_permission(&self, fact: &PermissionFact) -> Result<bool, PolicyError>;

    async fn remove_permission(&self, fact: &PermissionFact) -> Result<bool, PolicyError>;

    async fn add_grouping(&self, fact: &GroupingFact) -> Result<bool, PolicyError>;

    async fn remove_grouping(&self, fact: &GroupingFact) -> Result<bool, PolicyError>;

    /// All permission facts, or only those of `domain`.
    async fn permissions(&self, domain: Option<&str>) -> Result<Vec<PermissionFact>, PolicyError>;

    /// All grouping facts, or only those of `domain`.
    async fn groupings(&self, domain: Option<&str>) -> Result<Vec<GroupingFact>, PolicyError>;
}

/// Explicitly constructed enforcer; clone it into whatever needs it.
#[derive(Clone)]
pub struct PolicyEngine {
    store: Arc<dyn PolicyStore>,
}

impl PolicyEngine {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// Any store error is returned as `Err`; callers must treat it as a denial.
    #[instrument(skip(self))]
    pub async fn enforce(
        &self,
        subject: &str,
        domain: &str,
        object: &str,
        action: &str,
    ) -> Result<bool, PolicyError> {
        let groupings = self.store.groupings(Some(domain)).await?;
        let roles = reachable_roles(&groupings, subject, domain);

        let allowed = self
            .store
            .permissions(Some(domain))
            .await?
            .iter()
            .any(|p| {
                p.domain == domain
                    && roles.contains(p.role.as_str())
                    && object_matches(&p.object, object)
                    && action_matches(&p.action, action)
            });

        Ok(allowed)
    }

    pub async fn add_policy(&self, fact: PermissionFact) -> Result<bool, PolicyError> {
        let added = self.store.add_permission(&fact).await?;
        if added {
            tracing::info!(role = %fact.role, domain = %fact.domain, object = %fact.object, action = %fact.action, "Policy added");
        }
        Ok(added)
    }

    pub async fn remove_policy(&self, fact: PermissionFact) -> Result<bool, PolicyError> {
        let removed = self.store.remove_permission(&fact).await?;
        if removed {
            tracing::info!(role = %fact.role, domain = %fact.domain, object = %fact.object, action = %fact.action, "Policy removed");
        }
        Ok(removed)
    }

    pub async fn add_grouping_policy(&self, fact: GroupingFact) -> Result<bool, PolicyError> {
        let added = self.store.add_grouping(&fact).await?;
        if added {
            tracing::info!(subject = %fact.subject, role = %fact.role, domain = %fact.domain, "Role granted");
        }
        Ok(added)
    }

    pub async fn remove_grouping_policy(&self, fact: GroupingFact) -> Result<bool, PolicyError> {
        let removed = self.store.remove_grouping(&fact).await?;
        if removed {
            tracing::info!(subject = %fact.subject, role = %fact.role, domain = %fact.domain, "Role revoked");
        }
        Ok(removed)
    }

    /// Permission facts reachable by `subject`, in one domain or across all of them.
    pub async fn get_implicit_permissions_for_user(
        &self,
        subject: &str,
        domain: Option<&str>,
    ) -> Result<Vec<PermissionFact>, PolicyError> {
        let groupings = self.store.groupings(domain).await?;
        let permissions = self.store.permissions(domain).await?;

        let domains: BTreeSet<&str> = permissions.iter().map(|p| p.domain.as_str()).collect();
        let mut result = Vec::new();
        for d in domains {
            let roles = reachable_roles(&groupings, subject, d);
            result.extend(
                permissions
                    .iter()
                    .filter(|p| p.domain == d && roles.contains(p.role.as_str()))
                    .cloned(),
            );
        }
        Ok(result)
    }

    pub async fn list_policies(&self) -> Result<Vec<PermissionFact>, PolicyError> {
        self.store.permissions(None).await
    }

    pub async fn list_groupings(&self) -> Result<Vec<GroupingFact>, PolicyError> {
        self.store.groupings(None).await
    }
}

/// The subject plus every role reachable through grouping facts in `domain`.
fn reachable_roles<'a>(
    groupings: &'a [GroupingFact],
    subject: &'a str,
    domain: &str,
) -> HashSet<&'a str> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    seen.insert(subject);
    queue.push_back(subject);

    while let Some(current) = queue.pop_front() {
        for g in groupings
            .iter()
            .filter(|g| g.domain == domain && g.subject == current)
        {
            if seen.insert(g.role.as_str()) {
                queue.push_back(g.role.as_str());
            }
        }
    }

    seen
}

fn object_matches(pattern: &str, object: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => object.starts_with(prefix),
        None => pattern == object,
    }
}

fn action_matches(pattern: &str, action: &str) -> bool {
    pattern == "*" || pattern.eq_ignore_ascii_case(action)
}

#[derive(Default)]
struct FactSets {
    permissions: BTreeSet<PermissionFact>,
    groupings: BTreeSet<GroupingFact>,
}

/// Process-local fact store; each instance is fully isolated.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    facts: RwLock<FactSets>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, FactSets>, PolicyError> {
        self.facts
            .read()
            .map_err(|_| PolicyError::Internal("policy store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, FactSets>, PolicyError> {
        self.facts
            .write()
            .map_err(|_| PolicyError::Internal("policy store lock poisoned".to_string()))
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn add_permission(&self, fact: &PermissionFact) -> Result<bool, PolicyError> {
        Ok(self.write()?.permissions.insert(fact.clone()))
    }

    async fn remove_permission(&self, fact: &PermissionFact) -> Result<bool, PolicyError> {
        Ok(self.write()?.permissions.remove(fact))
    }

    async fn add_grouping(&self, fact: &GroupingFact) -> Result<bool, PolicyError> {
        Ok(self.write()?.groupings.insert(fact.clone()))
    }

    async fn remove_grouping(&self, fact: &GroupingFact) -> Result<bool, PolicyError> {
        Ok(self.write()?.groupings.remove(fact))
    }

    async fn permissions(&self, domain: Option<&str>) -> Result<Vec<PermissionFact>, PolicyError> {
        Ok(self
            .read()?
            .permissions
            .iter()
            .filter(|p| domain.map_or(true, |d| p.domain == d))
            .cloned()
            .collect())
    }

    async fn groupings(&self, domain: Option<&str>) -> Result<Vec<GroupingFact>, PolicyError> {
        Ok(self
            .read()?
            .groupings
            .iter()
            .filter(|g| domain.map_or(true, |d| g.domain == d))
            .cloned()
            .collect())
    }
}

const PERMISSION: &str = "p";
const GROUPING: &str = "g";

#[derive(FromRow)]
struct PolicyRow {
    v0: String,
    v1: String,
    v2: String,
    v3: String,
}

/// Facts in `policy_rules(ptype, v0, v1, v2, v3)`:
/// `p` rows are (role, domain, object, action), `g` rows are (subject, role, domain, '').
#[derive(Clone)]
pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, ptype: &str, values: [&str; 4]) -> Result<bool, PolicyError> {
        let result = sqlx::query(
            r#"
            INSERT INTO policy_rules (ptype, v0, v1, v2, v3)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(ptype)
        .bind(values[0])
        .bind(values[1])
        .bind(values[2])
        .bind(values[3])
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, ptype: &str, values: [&str; 4]) -> Result<bool, PolicyError> {
        let result = sqlx::query(
            r#"
            DELETE FROM policy_rules
            WHERE ptype = $1 AND v0 = $2 AND v1 = $3 AND v2 = $4 AND v3 = $5
            "#,
        )
        .bind(ptype)
        .bind(values[0])
        .bind(values[1])
        .bind(values[2])
        .bind(values[3])
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn select(
        &self,
        ptype: &str,
        domain_column: &str,
        domain: Option<&str>,
    ) -> Result<Vec<PolicyRow>, PolicyError> {
        let sql = format!(
            "SELECT v0, v1, v2, v3 FROM policy_rules \
             WHERE ptype = $1 AND ($2::text IS NULL OR {} = $2) \
             ORDER BY v0, v1, v2, v3",
            domain_column
        );
        let rows = sqlx::query_as::<_, PolicyRow>(&sql)
            .bind(ptype)
            .bind(domain)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn add_permission(&self, fact: &PermissionFact) -> Result<bool, PolicyError> {
        self.insert(
            PERMISSION,
            [&fact.role, &fact.domain, &fact.object, &fact.action],
        )
        .await
    }

    async fn remove_permission(&self, fact: &PermissionFact) -> Result<bool, PolicyError> {
        self.delete(
            PERMISSION,
            [&fact.role, &fact.domain, &fact.object, &fact.action],
        )
        .await
    }

    async fn add_grouping(&self, fact: &GroupingFact) -> Result<bool, PolicyError> {
        self.insert(GROUPING, [&fact.subject, &fact.role, &fact.domain, ""])
            .await
    }

    async fn remove_grouping(&self, fact: &GroupingFact) -> Result<bool, PolicyError> {
        self.delete(GROUPING, [&fact.subject, &fact.role, &fact.domain, ""])
            .await
    }

    async fn permissions(&self, domain: Option<&str>) -> Result<Vec<PermissionFact>, PolicyError> {
        Ok(self
            .select(PERMISSION, "v1", domain)
            .await?
            .into_iter()
            .map(|r| PermissionFact::new(r.v0, r.v1, r.v2, r.v3))
            .collect())
    }

    async fn groupings(&self, domain: Option<&str>) -> Result<Vec<GroupingFact>, PolicyError> {
        Ok(self
            .select(GROUPING, "v2", domain)
            .await?
            .into_iter()
            .map(|r| GroupingFact::new(r.v0, r.v1, r.v2))
            .collect())
    }
}
