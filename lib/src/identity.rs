// lib/src/identity.rs
// Identity collaborator contract. Users are owned by the external provider;
// the planner only reads them and pushes gateway claims back.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use models::errors::{PlannerError, PlannerResult};
use models::{Role, TerritoryId, User, UserId};

/// A caller whose token the provider has verified.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fails with `Unauthorized` for unknown or expired tokens.
    async fn verify_token(&self, token: &str) -> PlannerResult<Principal>;
    async fn get_user(&self, id: &UserId) -> PlannerResult<Option<User>>;
    /// Users holding `role`, ordered by display name.
    async fn list_users_by_role(&self, role: Role) -> PlannerResult<Vec<User>>;
    async fn set_custom_claims(&self, id: &UserId, claims: Value) -> PlannerResult<()>;
}

/// Fetches a user that must exist and hold the CHW role.
pub async fn require_chw(identity: &dyn IdentityProvider, chw_id: &UserId) -> PlannerResult<User> {
    let user = identity
        .get_user(chw_id)
        .await?
        .ok_or_else(|| PlannerError::not_found("user", chw_id))?;
    if !user.is_chw() {
        return Err(PlannerError::BadRequest(format!(
            "user {} has role {}, expected chw",
            chw_id, user.role
        )));
    }
    Ok(user)
}

/// Gateway claims document for `user`, nested under `namespace`.
pub fn hasura_claims(namespace: &str, user: &User, territory_id: Option<TerritoryId>) -> Value {
    let mut claims = json!({
        "x-hasura-allowed-roles": [user.role.as_str()],
        "x-hasura-default-role": user.role.as_str(),
        "x-hasura-user-id": user.id.to_string(),
    });
    if let (Some(territory_id), Some(map)) = (territory_id, claims.as_object_mut()) {
        map.insert("x-hasura-territory-id".to_string(), Value::String(territory_id.to_string()));
    }
    let mut root = Map::new();
    root.insert(namespace.to_string(), claims);
    Value::Object(root)
}

/// Provider backed by process memory, for tests and the fixture-driven binary.
#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    users: RwLock<HashMap<UserId, User>>,
    tokens: RwLock<HashMap<String, UserId>>,
    claims: RwLock<HashMap<UserId, Value>>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let provider = Self::new();
        for user in users {
            provider.insert_user(user).await;
        }
        provider
    }

    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    /// Registers an opaque bearer token for `user_id`.
    pub async fn issue_token(&self, user_id: UserId) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.tokens.write().await.insert(token.clone(), user_id);
        token
    }

    pub async fn claims_for(&self, user_id: &UserId) -> Option<Value> {
        self.claims.read().await.get(user_id).cloned()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn verify_token(&self, token: &str) -> PlannerResult<Principal> {
        let user_id = self
            .tokens
            .read()
            .await
            .get(token)
            .copied()
            .ok_or_else(|| PlannerError::Unauthorized("unknown token".to_string()))?;
        let users = self.users.read().await;
        let user = users
            .get(&user_id)
            .ok_or_else(|| PlannerError::Unauthorized("token subject no longer exists".to_string()))?;
        Ok(Principal { user_id, role: user.role })
    }

    async fn get_user(&self, id: &UserId) -> PlannerResult<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn list_users_by_role(&self, role: Role) -> PlannerResult<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.role == role)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn set_custom_claims(&self, id: &UserId, claims: Value) -> PlannerResult<()> {
        if !self.users.read().await.contains_key(id) {
            return Err(PlannerError::not_found("user", id));
        }
        debug!("Setting custom claims for user {}", id);
        self.claims.write().await.insert(*id, claims);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use models::ErrorCategory;

    #[tokio::test]
    async fn verifies_issued_tokens_only() {
        let chw = User::new("Amina", Role::Chw, Utc::now());
        let provider = InMemoryIdentityProvider::with_users([chw.clone()]).await;
        let token = provider.issue_token(chw.id).await;

        let principal = provider.verify_token(&token).await.unwrap();
        assert_eq!(principal, Principal { user_id: chw.id, role: Role::Chw });

        let err = provider.verify_token("forged").await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Unauthorized);
    }

    #[tokio::test]
    async fn require_chw_checks_existence_then_role() {
        let mother = User::new("Wanjiru", Role::Mother, Utc::now());
        let provider = InMemoryIdentityProvider::with_users([mother.clone()]).await;

        let err = require_chw(&provider, &UserId::new()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
        let err = require_chw(&provider, &mother.id).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadRequest);
    }

    #[test]
    fn claims_are_namespaced() {
        let chw = User::new("Amina", Role::Chw, Utc::now());
        let territory = TerritoryId::new();
        let claims = hasura_claims("https://hasura.io/jwt/claims", &chw, Some(territory));
        let inner = &claims["https://hasura.io/jwt/claims"];
        assert_eq!(inner["x-hasura-default-role"], "chw");
        assert_eq!(inner["x-hasura-user-id"], chw.id.to_string());
        assert_eq!(inner["x-hasura-territory-id"], territory.to_string());
    }
}
