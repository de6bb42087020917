use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::store::KvStore;

pub const SECRET_KEY: &str = "mcp_jwt_secret";
pub const SECRET_LEN: usize = 64;

pub(super) async fn load(store: &dyn KvStore) -> anyhow::Result<Option<Zeroizing<String>>> {
    match store.get(SECRET_KEY).await? {
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(Zeroizing::new(s))),
        Some(Value::String(_)) | None => Ok(None),
        Some(other) => anyhow::bail!("signing secret has unexpected type: {}", other),
    }
}

/// Return the stored signing secret, creating and persisting one if absent.
/// Never rotated automatically.
pub(super) async fn load_or_generate(store: &dyn KvStore) -> anyhow::Result<Zeroizing<String>> {
    if let Some(secret) = load(store).await? {
        return Ok(secret);
    }

    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect();
    store.set(SECRET_KEY, Value::String(secret.clone())).await?;
    tracing::info!("generated new token signing secret");
    Ok(Zeroizing::new(secret))
}
