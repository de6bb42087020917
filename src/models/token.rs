use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Claims embedded in every issued bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub user_id: u64,
}

/// Registry mirror of an issued token. The registry, not the signature,
/// decides whether a token is still valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub jti: String,
    pub user_id: u64,
    pub issued_at: i64,
    pub expires_at: i64,
    #[serde(default)]
    pub revoked: bool,
}

impl TokenRecord {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Persisted `jti → TokenRecord` map.
pub type TokenRegistry = BTreeMap<String, TokenRecord>;

/// Response body of a successful issuance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub user_id: u64,
    pub expires_in: u64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUser {
    pub id: u64,
    pub username: String,
    pub display_name: String,
}

/// One entry of the administrative token listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSummary {
    pub jti: String,
    /// `None` when the owning user no longer exists.
    pub user: Option<TokenUser>,
    pub issued_at: i64,
    pub expires_at: i64,
    pub revoked: bool,
    pub is_expired: bool,
}

impl TokenSummary {
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.expires_at, 0).single()
    }
}
