pub mod builtin;

use async_trait::async_trait;

use crate::middleware::rbac::Principal;

/// Host user model consumed as an authentication oracle.
/// Implementations: StaticDirectory (YAML users + in-memory sessions).
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: u64) -> anyhow::Result<Option<Principal>>;

    async fn find_by_login(&self, login: &str) -> anyhow::Result<Option<Principal>>;

    /// Check a username/password pair. `None` means the pair did not verify.
    async fn verify_password(&self, login: &str, password: &str) -> anyhow::Result<Option<Principal>>;

    /// Resolve an already-established session to its principal.
    async fn resolve_session(&self, session_id: &str) -> anyhow::Result<Option<Principal>>;
}
