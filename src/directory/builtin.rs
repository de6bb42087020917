use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::UserDirectory;
use crate::middleware::rbac::{Principal, Role};

const SALT_LEN: usize = 16;

/// One user entry of the YAML directory file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub role: Role,
    /// `<salt>$<hex sha256(salt + password)>`, as produced by [`hash_password`].
    #[serde(default)]
    pub password_hash: Option<String>,
}

impl UserRecord {
    fn principal(&self) -> Principal {
        let display = self.display_name.clone().unwrap_or_else(|| self.login.clone());
        Principal::new(self.id, self.login.clone(), display, self.role)
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    users: Vec<UserRecord>,
}

/// Directory backed by a static user list, with server-side sessions.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    users: DashMap<u64, UserRecord>,
    sessions: DashMap<String, u64>,
}

impl StaticDirectory {
    pub fn new(users: impl IntoIterator<Item = UserRecord>) -> Self {
        let dir = Self::default();
        for user in users {
            dir.insert(user);
        }
        dir
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let file: DirectoryFile = serde_yaml::from_str(yaml)?;
        Ok(Self::new(file.users))
    }

    /// Load the YAML directory. A missing file yields an empty directory.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(yaml) => {
                let dir = Self::from_yaml_str(&yaml)?;
                tracing::info!(path = %path.display(), users = dir.len(), "user directory loaded");
                Ok(dir)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "user directory file not found; no users can authenticate");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn insert(&self, user: UserRecord) {
        self.users.insert(user.id, user);
    }

    /// Remove a user and every session they hold.
    pub fn remove(&self, id: u64) -> bool {
        self.sessions.retain(|_, uid| *uid != id);
        self.users.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Open a session for `user_id`; the returned id is what clients present
    /// in the session cookie.
    pub fn open_session(&self, user_id: u64) -> Option<String> {
        if !self.users.contains_key(&user_id) {
            return None;
        }
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.sessions.insert(id.clone(), user_id);
        Some(id)
    }

    pub fn close_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    fn lookup_login(&self, login: &str) -> Option<UserRecord> {
        self.users
            .iter()
            .find(|entry| entry.login.eq_ignore_ascii_case(login))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn find_by_id(&self, id: u64) -> anyhow::Result<Option<Principal>> {
        Ok(self.users.get(&id).map(|u| u.principal()))
    }

    async fn find_by_login(&self, login: &str) -> anyhow::Result<Option<Principal>> {
        Ok(self.lookup_login(login).map(|u| u.principal()))
    }

    async fn verify_password(&self, login: &str, password: &str) -> anyhow::Result<Option<Principal>> {
        let Some(user) = self.lookup_login(login) else {
            return Ok(None);
        };
        let Some(stored) = user.password_hash.as_deref() else {
            return Ok(None);
        };
        if verify_password_hash(stored, password) {
            Ok(Some(user.principal()))
        } else {
            tracing::warn!(login = %login, "password verification failed");
            Ok(None)
        }
    }

    async fn resolve_session(&self, session_id: &str) -> anyhow::Result<Option<Principal>> {
        let Some(user_id) = self.sessions.get(session_id).map(|s| *s) else {
            return Ok(None);
        };
        self.find_by_id(user_id).await
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a password for the directory file with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect();
    format!("{}${}", salt, digest(&salt, password))
}

pub fn verify_password_hash(stored: &str, password: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    let actual = digest(salt, password);
    actual.as_bytes().ct_eq(expected.as_bytes()).into()
}
