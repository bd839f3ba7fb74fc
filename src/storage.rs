//! Persisted client state.
//!
//! `SessionStorage` lives for one app session and holds the auth and chat
//! identifiers. `LocalStorage` survives restarts; it only carries plain
//! string flags such as completed feature tours.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::api::AuthPayload;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Corrupt storage file {}: {message}", .path.display())]
    Corrupt { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    ChatUserId,
    SessionId,
    AccessToken,
    Agent,
    BillId,
    IsExistingUser,
}

impl SessionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::ChatUserId => "chatUserId",
            SessionKey::SessionId => "sessionId",
            SessionKey::AccessToken => "access_token",
            SessionKey::Agent => "agent",
            SessionKey::BillId => "billId",
            SessionKey::IsExistingUser => "isExistingUser",
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionStorage {
    values: HashMap<SessionKey, String>,
}

impl SessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: SessionKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn set(&mut self, key: SessionKey, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    pub fn remove(&mut self, key: SessionKey) -> Option<String> {
        self.values.remove(&key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn access_token(&self) -> Option<&str> {
        self.get(SessionKey::AccessToken)
    }

    pub fn is_existing_user(&self) -> bool {
        self.get(SessionKey::IsExistingUser) == Some("true")
    }

    /// Chat session id, created on first use.
    pub fn ensure_session_id(&mut self) -> String {
        self.values
            .entry(SessionKey::SessionId)
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }

    /// Store what login/register returned.
    pub fn sign_in(&mut self, auth: &AuthPayload) {
        self.set(SessionKey::AccessToken, auth.access_token.as_str());
        self.set(SessionKey::ChatUserId, auth.user_id.as_str());
        self.set(SessionKey::IsExistingUser, auth.is_existing_user.to_string());
        tracing::info!("Session started");
    }

    pub fn sign_out(&mut self) {
        self.clear();
        tracing::info!("Session cleared");
    }
}

/// String flags persisted as a JSON object.
#[derive(Debug)]
pub struct LocalStorage {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl LocalStorage {
    /// Load from `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let values = match fs::read_to_string(path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(StorageError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    /// Like `open`, but a corrupt file is discarded instead of failing.
    pub fn open_or_reset(path: &Path) -> Result<Self, StorageError> {
        match Self::open(path) {
            Err(StorageError::Corrupt { message, .. }) => {
                tracing::warn!(path = %path.display(), error = %message, "Resetting corrupt local storage");
                Ok(Self {
                    path: path.to_path_buf(),
                    values: BTreeMap::new(),
                })
            }
            other => other,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Persist first; memory only changes once the file write succeeds.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut next = self.values.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        self.values = next;
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if !self.values.contains_key(key) {
            return Ok(());
        }
        let mut next = self.values.clone();
        next.remove(key);
        self.persist(&next)?;
        self.values = next;
        Ok(())
    }

    pub fn tour_completed(&self, tour: &str) -> bool {
        self.get(&tour_key(tour)) == Some("true")
    }

    pub fn mark_tour_completed(&mut self, tour: &str) -> Result<(), StorageError> {
        self.set(&tour_key(tour), "true")
    }

    /// Write to a sibling temp file, then rename over the target.
    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let io_err = |source: io::Error| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(values).map_err(|e| StorageError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

fn tour_key(tour: &str) -> String {
    format!("{tour}TourCompleted")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn session_keys_use_wire_names() {
        assert_eq!(SessionKey::AccessToken.as_str(), "access_token");
        assert_eq!(SessionKey::ChatUserId.as_str(), "chatUserId");
    }

    #[test]
    fn sign_in_and_out() {
        let mut session = SessionStorage::new();
        session.sign_in(&AuthPayload {
            access_token: "tok".into(),
            user_id: "u1".into(),
            is_existing_user: true,
            extra: Map::new(),
        });
        assert_eq!(session.access_token(), Some("tok"));
        assert_eq!(session.get(SessionKey::ChatUserId), Some("u1"));
        assert!(session.is_existing_user());

        session.sign_out();
        assert_eq!(session.access_token(), None);
        assert!(!session.is_existing_user());
    }

    #[test]
    fn session_id_is_stable_once_created() {
        let mut session = SessionStorage::new();
        let first = session.ensure_session_id();
        assert_eq!(session.ensure_session_id(), first);
        session.remove(SessionKey::SessionId);
        assert_ne!(session.ensure_session_id(), first);
    }

    #[test]
    fn local_flags_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("local_storage.json");

        let mut local = LocalStorage::open(&path).unwrap();
        assert!(!local.tour_completed("dashboard"));
        local.mark_tour_completed("dashboard").unwrap();
        local.set("theme", "dark").unwrap();

        let reopened = LocalStorage::open(&path).unwrap();
        assert!(reopened.tour_completed("dashboard"));
        assert_eq!(reopened.get("theme"), Some("dark"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_reported_or_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            LocalStorage::open(&path),
            Err(StorageError::Corrupt { .. })
        ));
        let mut local = LocalStorage::open_or_reset(&path).unwrap();
        assert_eq!(local.get("anything"), None);
        local.set("k", "v").unwrap();
        assert_eq!(LocalStorage::open(&path).unwrap().get("k"), Some("v"));
    }

    #[test]
    fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");
        let mut local = LocalStorage::open(&path).unwrap();
        local.set("theme", "light").unwrap();

        fs::create_dir(path.with_extension("json.tmp")).unwrap();
        assert!(matches!(local.set("theme", "dark"), Err(StorageError::Io { .. })));
        assert_eq!(local.get("theme"), Some("light"));
        assert!(local.remove("theme").is_err());
        assert_eq!(local.get("theme"), Some("light"));
        assert_eq!(LocalStorage::open(&path).unwrap().get("theme"), Some("light"));
    }

    #[test]
    fn remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local_storage.json");
        let mut local = LocalStorage::open(&path).unwrap();
        local.set("k", "v").unwrap();
        local.remove("k").unwrap();
        assert_eq!(LocalStorage::open(&path).unwrap().get("k"), None);
    }
}
