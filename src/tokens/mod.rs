//! Bearer token issuance, validation, listing and revocation.
//!
//! Tokens are HS256 JWTs. Every issued token is mirrored into a registry
//! keyed by `jti`; a token whose `jti` is missing, revoked or expired in the
//! registry is rejected even when its signature still verifies.

mod secret;

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::directory::UserDirectory;
use crate::errors::McpError;
use crate::middleware::rbac::{self, Capability, Principal};
use crate::models::token::{
    IssuedToken, TokenClaims, TokenRecord, TokenRegistry, TokenSummary, TokenUser,
};
use crate::store::{self, KvStore};

pub use secret::{SECRET_KEY, SECRET_LEN};

pub const REGISTRY_KEY: &str = "mcp_token_registry";
const JTI_LEN: usize = 32;

/// Bounds on caller-supplied token lifetimes, in seconds.
///
/// Requests outside `[min, max]` are rejected with `rest_invalid_param`
/// before anything is signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub min: u64,
    pub max: u64,
    pub default: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            min: 3600,
            max: 30 * 24 * 3600,
            default: 3600,
        }
    }
}

impl TtlPolicy {
    pub fn resolve(&self, requested: Option<u64>) -> Result<u64, McpError> {
        let ttl = requested.unwrap_or(self.default);
        if ttl < self.min || ttl > self.max {
            return Err(McpError::InvalidParam(format!(
                "Invalid parameter(s): expires_in must be between {} and {} seconds.",
                self.min, self.max
            )));
        }
        Ok(ttl)
    }
}

#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn KvStore>,
    directory: Arc<dyn UserDirectory>,
    policy: TtlPolicy,
    issuer: String,
}

impl TokenService {
    pub fn new(store: Arc<dyn KvStore>, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            store,
            directory,
            policy: TtlPolicy::default(),
            issuer: "mcp-gateway".to_string(),
        }
    }

    pub fn with_policy(mut self, policy: TtlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    async fn load_registry(&self) -> anyhow::Result<TokenRegistry> {
        store::load(self.store.as_ref(), REGISTRY_KEY).await
    }

    async fn save_registry(&self, registry: &TokenRegistry) -> anyhow::Result<()> {
        store::save(self.store.as_ref(), REGISTRY_KEY, registry).await
    }

    /// Issue a token for `user_id`. The signing secret is generated on the
    /// first issuance if the store does not hold one yet.
    pub async fn issue(&self, user_id: u64, requested_ttl: Option<u64>) -> Result<IssuedToken, McpError> {
        let ttl = self.policy.resolve(requested_ttl)?;

        if self.directory.find_by_id(user_id).await?.is_none() {
            return Err(McpError::InvalidCredentials);
        }

        let secret = secret::load_or_generate(self.store.as_ref()).await?;
        let issued_at = Utc::now().timestamp();
        let expires_at = i64::try_from(ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add(ttl))
            .ok_or_else(|| {
                McpError::InvalidParam(format!("Invalid parameter(s): expires_in {} is out of range.", ttl))
            })?;
        let jti: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(JTI_LEN)
            .map(char::from)
            .collect();

        let claims = TokenClaims {
            iss: self.issuer.clone(),
            iat: issued_at,
            exp: expires_at,
            jti: jti.clone(),
            user_id,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| anyhow::anyhow!("failed to sign token: {}", e))?;

        let mut registry = self.load_registry().await?;
        registry.insert(
            jti.clone(),
            TokenRecord {
                jti: jti.clone(),
                user_id,
                issued_at,
                expires_at,
                revoked: false,
            },
        );
        self.save_registry(&registry).await?;

        tracing::info!(jti = %jti, user_id, ttl, "token issued");

        Ok(IssuedToken {
            token,
            user_id,
            expires_in: ttl,
            expires_at,
        })
    }

    /// Resolve a raw bearer token to its principal.
    pub async fn validate(&self, raw_token: &str) -> Result<Principal, McpError> {
        let Some(secret) = secret::load(self.store.as_ref()).await? else {
            return Err(McpError::InvalidToken("Invalid token.".to_string()));
        };

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is decided below, against the registry, so that an expired
        // token reports token_invalid rather than a signature failure.
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<TokenClaims>(
            raw_token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!("token rejected: {}", e);
            McpError::InvalidToken(format!("Invalid token: {}", e))
        })?;
        let claims = data.claims;

        let registry = self.load_registry().await?;
        let record = registry
            .get(&claims.jti)
            .filter(|r| r.user_id == claims.user_id)
            .ok_or_else(|| McpError::InvalidToken("Token is not recognized.".to_string()))?;

        if record.revoked {
            return Err(McpError::TokenInvalid("Token has been revoked.".to_string()));
        }
        let now = Utc::now().timestamp();
        if record.is_expired_at(now) || now >= claims.exp {
            return Err(McpError::TokenInvalid("Token has expired.".to_string()));
        }

        self.directory
            .find_by_id(claims.user_id)
            .await?
            .ok_or_else(|| {
                McpError::InvalidToken("User associated with token no longer exists.".to_string())
            })
    }

    /// Mark `jti` revoked. An empty `jti` is reported as `missing_jti`.
    pub async fn revoke(&self, jti: &str) -> Result<(), McpError> {
        let jti = jti.trim();
        if jti.is_empty() {
            return Err(McpError::MissingJti);
        }

        let mut registry = self.load_registry().await?;
        let record = registry.get_mut(jti).ok_or(McpError::TokenNotFound)?;
        record.revoked = true;
        self.save_registry(&registry).await?;

        tracing::info!(jti = %jti, "token revoked");
        Ok(())
    }

    /// Drop the signing secret and the registry. Every outstanding token
    /// stops validating; the next issuance generates a fresh secret.
    pub async fn reset(&self) -> Result<(), McpError> {
        self.store.delete(SECRET_KEY).await?;
        self.store.delete(REGISTRY_KEY).await?;
        tracing::warn!("token signing secret and registry cleared");
        Ok(())
    }

    /// List live tokens, newest first. Expired entries are purged from the
    /// registry as a side effect.
    pub async fn list(&self, caller: &Principal) -> Result<Vec<TokenSummary>, McpError> {
        rbac::require(caller, Capability::ManageSettings)?;

        let mut registry = self.load_registry().await?;
        let now = Utc::now().timestamp();
        let before = registry.len();
        registry.retain(|_, record| !record.is_expired_at(now));
        let purged = before - registry.len();
        if purged > 0 {
            self.save_registry(&registry).await?;
            tracing::info!(purged, "purged expired tokens");
        }

        let mut summaries = Vec::with_capacity(registry.len());
        for record in registry.values() {
            let user = self
                .directory
                .find_by_id(record.user_id)
                .await?
                .map(|p| TokenUser {
                    id: p.id,
                    username: p.login,
                    display_name: p.display_name,
                });
            summaries.push(TokenSummary {
                jti: record.jti.clone(),
                user,
                issued_at: record.issued_at,
                expires_at: record.expires_at,
                revoked: record.revoked,
                is_expired: record.is_expired_at(now),
            });
        }
        summaries.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then_with(|| a.jti.cmp(&b.jti)));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::builtin::{StaticDirectory, UserRecord};
    use crate::middleware::rbac::Role;
    use crate::store::memory::MemoryStore;

    fn service() -> (TokenService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StaticDirectory::new(vec![UserRecord {
            id: 1,
            login: "admin".into(),
            display_name: None,
            role: Role::Admin,
            password_hash: None,
        }]));
        (TokenService::new(store.clone(), directory), store)
    }

    #[test]
    fn test_ttl_policy() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.resolve(None).unwrap(), 3600);
        assert_eq!(policy.resolve(Some(7200)).unwrap(), 7200);
        let err = policy.resolve(Some(1800)).unwrap_err();
        assert_eq!(err.code(), "rest_invalid_param");
        assert!(policy.resolve(Some(policy.max + 1)).is_err());
    }

    #[tokio::test]
    async fn test_issue_rejects_unrepresentable_expiry() {
        let (svc, _) = service();
        let svc = svc.with_policy(TtlPolicy {
            min: 1,
            max: u64::MAX,
            default: 3600,
        });
        let err = svc.issue(1, Some(u64::MAX)).await.unwrap_err();
        assert_eq!(err.code(), "rest_invalid_param");
        let err = svc.issue(1, Some(i64::MAX as u64)).await.unwrap_err();
        assert_eq!(err.code(), "rest_invalid_param");
        assert!(svc.issue(1, Some(7200)).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_invalidates_outstanding_tokens() {
        let (svc, store) = service();
        let issued = svc.issue(1, None).await.unwrap();
        let old_secret = store.get(SECRET_KEY).await.unwrap().unwrap();

        svc.reset().await.unwrap();
        assert!(store.get(SECRET_KEY).await.unwrap().is_none());
        assert!(store.get(REGISTRY_KEY).await.unwrap().is_none());
        let err = svc.validate(&issued.token).await.unwrap_err();
        assert_eq!(err.code(), "invalid_token");

        let fresh = svc.issue(1, None).await.unwrap();
        assert_ne!(store.get(SECRET_KEY).await.unwrap().unwrap(), old_secret);
        assert!(svc.validate(&fresh.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_issue_default_ttl_generates_secret() {
        let (svc, store) = service();
        assert!(store.get(SECRET_KEY).await.unwrap().is_none());

        let issued = svc.issue(1, None).await.unwrap();
        assert_eq!(issued.expires_in, 3600);
        assert_eq!(issued.user_id, 1);

        let secret = store.get(SECRET_KEY).await.unwrap().unwrap();
        assert_eq!(secret.as_str().unwrap().len(), SECRET_LEN);
    }

    #[tokio::test]
    async fn test_issue_unknown_user() {
        let (svc, _) = service();
        let err = svc.issue(42, None).await.unwrap_err();
        assert_eq!(err.code(), "invalid_credentials");
    }

    #[tokio::test]
    async fn test_validate_and_revoke() {
        let (svc, store) = service();
        let issued = svc.issue(1, None).await.unwrap();
        let principal = svc.validate(&issued.token).await.unwrap();
        assert_eq!(principal.id, 1);

        let registry: TokenRegistry = store::load(store.as_ref(), REGISTRY_KEY).await.unwrap();
        let jti = registry.keys().next().unwrap().clone();
        svc.revoke(&jti).await.unwrap();

        let err = svc.validate(&issued.token).await.unwrap_err();
        assert_eq!(err.code(), "token_invalid");
    }

    #[tokio::test]
    async fn test_validate_garbage() {
        let (svc, _) = service();
        svc.issue(1, None).await.unwrap();
        let err = svc.validate("not.a.jwt").await.unwrap_err();
        assert_eq!(err.code(), "invalid_token");
    }

    #[tokio::test]
    async fn test_revoke_errors() {
        let (svc, _) = service();
        assert_eq!(svc.revoke("").await.unwrap_err().code(), "missing_jti");
        assert_eq!(svc.revoke("nope").await.unwrap_err().code(), "token_not_found");
    }
}
