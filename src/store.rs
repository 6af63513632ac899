use crate::error::{Error, Result};
use crate::models::{Credential, PendingAuthorization};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_TOKEN_EXPIRY: &str = "token_expiry";
pub const KEY_PKCE_VERIFIER: &str = "pkce_verifier";
pub const KEY_OAUTH_STATE: &str = "oauth_state";

/// Minimal key/value persistence seam. Production uses SQLite; tests use the
/// in-memory fake.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);";

/// SQLite-backed store. Connections are short-lived, one per operation, so
/// the store can be shared across tasks without holding a connection open.
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("create {}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { db_path: path.to_path_buf() })
    }

    fn conn(&self) -> Result<Connection> {
        Ok(Connection::open(&self.db_path)?)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE key = ?1 LIMIT 1")?;
        let row = stmt
            .query_row(params![key], |r| r.get::<_, String>(0))
            .optional()?;
        Ok(row)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, strftime('%s','now')) ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = strftime('%s','now')",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// In-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.map
            .lock()
            .map_err(|_| Error::Storage("memory store mutex poisoned".into()))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Typed view over the persisted credential keys. Only the auth manager
/// writes through this; everything else reads via `valid_token()`.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<dyn KvStore>,
}

impl CredentialStore {
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self { inner }
    }

    pub fn load(&self) -> Result<Option<Credential>> {
        let access_token = match self.inner.get(KEY_ACCESS_TOKEN)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let expiry = match self.inner.get(KEY_TOKEN_EXPIRY)? {
            Some(e) => e,
            None => return Ok(None),
        };
        let expires_at_ms = expiry
            .parse::<i64>()
            .map_err(|_| Error::Storage(format!("unreadable token_expiry value '{}'", expiry)))?;
        let refresh_token = self.inner.get(KEY_REFRESH_TOKEN)?;
        Ok(Some(Credential { access_token, refresh_token, expires_at_ms }))
    }

    pub fn save(&self, cred: &Credential) -> Result<()> {
        self.inner.set(KEY_ACCESS_TOKEN, &cred.access_token)?;
        self.inner.set(KEY_TOKEN_EXPIRY, &cred.expires_at_ms.to_string())?;
        match &cred.refresh_token {
            Some(rt) => self.inner.set(KEY_REFRESH_TOKEN, rt)?,
            None => self.inner.delete(KEY_REFRESH_TOKEN)?,
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.delete(KEY_ACCESS_TOKEN)?;
        self.inner.delete(KEY_REFRESH_TOKEN)?;
        self.inner.delete(KEY_TOKEN_EXPIRY)?;
        Ok(())
    }
}

/// Transient state for one in-flight authorization attempt.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<dyn KvStore>,
}

impl SessionStore {
    pub fn new(inner: Arc<dyn KvStore>) -> Self {
        Self { inner }
    }

    pub fn save_pending(&self, pending: &PendingAuthorization) -> Result<()> {
        self.inner.set(KEY_PKCE_VERIFIER, &pending.code_verifier)?;
        self.inner.set(KEY_OAUTH_STATE, &pending.state)?;
        Ok(())
    }

    pub fn stored_state(&self) -> Result<Option<String>> {
        self.inner.get(KEY_OAUTH_STATE)
    }

    pub fn stored_verifier(&self) -> Result<Option<String>> {
        self.inner.get(KEY_PKCE_VERIFIER)
    }

    pub fn clear_pending(&self) -> Result<()> {
        self.inner.delete(KEY_PKCE_VERIFIER)?;
        self.inner.delete(KEY_OAUTH_STATE)?;
        Ok(())
    }
}
