//! Durable client-side persistence of the session.
//!
//! [`TokenStore`] gives the three session entries (token, decoded claims,
//! profile) a typed API over any [`KeyValueStore`]. Two backends ship with
//! the crate: [`MemoryStore`] and, behind the `file-store` feature,
//! [`FileStore`], which survives process restarts.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::token::DecodedClaims;
use crate::types::{BearerToken, UserRecord};

pub(crate) const AUTH_TOKEN_KEY: &str = "auth_token";
pub(crate) const DECODED_TOKEN_KEY: &str = "decoded_token";
pub(crate) const USER_PROFILE_KEY: &str = "user_profile";

/// Synchronous string key-value storage scoped to one client instance.
///
/// Implementations must make a successful `set`/`remove` visible to every
/// later `get` on the same store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;

    fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), Error>;
}

/// In-process store. State is lost when the value is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, Error> {
        self.entries
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.lock()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.lock()?.remove(key);
        Ok(())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        (**self).remove(key)
    }
}

#[cfg(feature = "file-store")]
pub use file::FileStore;

#[cfg(feature = "file-store")]
mod file {
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use super::KeyValueStore;
    use crate::error::Error;

    /// Store backed by a single JSON document on disk.
    ///
    /// The whole document is rewritten on every mutation, through a temporary
    /// file and a rename, so a crash never leaves a half-written file behind.
    #[derive(Debug)]
    pub struct FileStore {
        path: PathBuf,
        entries: Mutex<BTreeMap<String, String>>,
    }

    impl FileStore {
        /// Open (or lazily create) the store at `path`.
        ///
        /// # Errors
        ///
        /// Returns [`Error::Storage`] if the file exists but cannot be read,
        /// or [`Error::CorruptSession`] if it is not a JSON object of strings.
        pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
            let path = path.into();
            let entries = if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Storage(format!("failed to read {}: {e}", path.display()))
                })?;
                if content.trim().is_empty() {
                    BTreeMap::new()
                } else {
                    serde_json::from_str(&content).map_err(|e| {
                        Error::CorruptSession(format!("failed to parse {}: {e}", path.display()))
                    })?
                }
            } else {
                BTreeMap::new()
            };

            Ok(Self {
                path,
                entries: Mutex::new(entries),
            })
        }

        /// Open the store at [`default_path`](Self::default_path).
        ///
        /// # Errors
        ///
        /// Same as [`open`](Self::open), plus [`Error::Config`] when no home
        /// directory can be determined.
        pub fn open_default() -> Result<Self, Error> {
            Self::open(Self::default_path()?)
        }

        /// Platform data directory for this crate, e.g.
        /// `~/.local/share/socnet/session.json` on Linux.
        ///
        /// # Errors
        ///
        /// Returns [`Error::Config`] when no home directory can be determined.
        pub fn default_path() -> Result<PathBuf, Error> {
            let dirs = directories::ProjectDirs::from("com", "socnet", "socnet")
                .ok_or_else(|| Error::Config("could not determine data directory".into()))?;
            Ok(dirs.data_dir().join("session.json"))
        }

        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }

        fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), Error> {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| Error::Storage("file store lock poisoned".into()))?;
            f(&mut entries);
            self.persist(&entries)
        }

        fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), Error> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("failed to create {}: {e}", parent.display()))
                })?;
            }

            let content = serde_json::to_string_pretty(entries)
                .map_err(|e| Error::Storage(format!("failed to serialize store: {e}")))?;

            let tmp = self.path.with_extension("json.tmp");
            std::fs::write(&tmp, content)
                .map_err(|e| Error::Storage(format!("failed to write {}: {e}", tmp.display())))?;
            std::fs::rename(&tmp, &self.path).map_err(|e| {
                Error::Storage(format!("failed to replace {}: {e}", self.path.display()))
            })
        }
    }

    impl KeyValueStore for FileStore {
        fn get(&self, key: &str) -> Result<Option<String>, Error> {
            let entries = self
                .entries
                .lock()
                .map_err(|_| Error::Storage("file store lock poisoned".into()))?;
            Ok(entries.get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> Result<(), Error> {
            self.mutate(|entries| {
                entries.insert(key.to_owned(), value.to_owned());
            })
        }

        fn remove(&self, key: &str) -> Result<(), Error> {
            self.mutate(|entries| {
                entries.remove(key);
            })
        }
    }
}

/// Typed access to the persisted session entries.
///
/// Contents are not validated beyond deserialization: the store is trusted
/// to hold whatever the session manager last wrote.
#[derive(Debug)]
pub struct TokenStore<S> {
    backend: S,
}

impl<S: KeyValueStore> TokenStore<S> {
    #[must_use]
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn set_token(&self, token: &BearerToken) -> Result<(), Error> {
        self.backend.set(AUTH_TOKEN_KEY, token.as_str())
    }

    pub fn get_token(&self) -> Result<Option<BearerToken>, Error> {
        Ok(self
            .backend
            .get(AUTH_TOKEN_KEY)?
            .filter(|t| !t.is_empty())
            .map(BearerToken::new))
    }

    pub fn remove_token(&self) -> Result<(), Error> {
        self.backend.remove(AUTH_TOKEN_KEY)
    }

    pub fn set_decoded_token(&self, claims: &DecodedClaims) -> Result<(), Error> {
        self.set_json(DECODED_TOKEN_KEY, claims)
    }

    pub fn get_decoded_token(&self) -> Result<Option<DecodedClaims>, Error> {
        self.get_json(DECODED_TOKEN_KEY)
    }

    pub fn remove_decoded_token(&self) -> Result<(), Error> {
        self.backend.remove(DECODED_TOKEN_KEY)
    }

    pub fn set_profile(&self, profile: &UserRecord) -> Result<(), Error> {
        self.set_json(USER_PROFILE_KEY, profile)
    }

    pub fn get_profile(&self) -> Result<Option<UserRecord>, Error> {
        self.get_json(USER_PROFILE_KEY)
    }

    pub fn remove_profile(&self) -> Result<(), Error> {
        self.backend.remove(USER_PROFILE_KEY)
    }

    /// Removes all three session entries. Every removal is attempted even if
    /// an earlier one fails; the first error is returned.
    pub fn clear(&self) -> Result<(), Error> {
        let results = [
            self.remove_token(),
            self.remove_decoded_token(),
            self.remove_profile(),
        ];
        results.into_iter().collect()
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), Error> {
        let json = serde_json::to_string(value)
            .map_err(|e| Error::Storage(format!("failed to serialize {key}: {e}")))?;
        self.backend.set(key, &json)
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        match self.backend.get(key)? {
            None => Ok(None),
            Some(raw) if raw == "null" => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::CorruptSession(format!("{key}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn profile() -> UserRecord {
        UserRecord::new("42", "Alice", "Liddell", "1990-05-04", "Oxford", "alice")
    }

    fn claims() -> DecodedClaims {
        DecodedClaims {
            subject_id: UserId::from("42"),
            token_id: None,
            permissions: vec!["read".into()],
            expires_at: Some(1_900_000_000),
        }
    }

    #[test]
    fn empty_store_returns_none() {
        let store = TokenStore::new(MemoryStore::new());
        assert!(store.get_token().unwrap().is_none());
        assert!(store.get_profile().unwrap().is_none());
        assert!(store.get_decoded_token().unwrap().is_none());
    }

    #[test]
    fn set_get_remove_token() {
        let store = TokenStore::new(MemoryStore::new());
        store.set_token(&BearerToken::from("a.b.c")).unwrap();
        assert_eq!(store.get_token().unwrap(), Some(BearerToken::from("a.b.c")));
        store.remove_token().unwrap();
        assert!(store.get_token().unwrap().is_none());
    }

    #[test]
    fn profile_and_claims_round_trip_through_json() {
        let store = TokenStore::new(MemoryStore::new());
        store.set_profile(&profile()).unwrap();
        store.set_decoded_token(&claims()).unwrap();

        assert_eq!(store.get_profile().unwrap(), Some(profile()));
        assert_eq!(store.get_decoded_token().unwrap(), Some(claims()));

        let raw = store.backend().get(USER_PROFILE_KEY).unwrap().unwrap();
        assert!(raw.contains("\"first_name\":\"Alice\""));
    }

    #[test]
    fn garbage_json_is_corrupt_session() {
        let backend = MemoryStore::new();
        backend.set(USER_PROFILE_KEY, "{not json").unwrap();
        let store = TokenStore::new(backend);
        assert!(matches!(store.get_profile(), Err(Error::CorruptSession(_))));
    }

    #[test]
    fn clear_removes_everything() {
        let store = TokenStore::new(MemoryStore::new());
        store.set_token(&BearerToken::from("t")).unwrap();
        store.set_profile(&profile()).unwrap();
        store.set_decoded_token(&claims()).unwrap();

        store.clear().unwrap();

        assert!(store.get_token().unwrap().is_none());
        assert!(store.get_profile().unwrap().is_none());
        assert!(store.get_decoded_token().unwrap().is_none());
    }

    #[test]
    fn removing_absent_keys_is_ok() {
        let store = TokenStore::new(MemoryStore::new());
        store.clear().unwrap();
    }

    #[cfg(feature = "file-store")]
    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        {
            let store = TokenStore::new(FileStore::open(&path).unwrap());
            store.set_token(&BearerToken::from("persisted")).unwrap();
            store.set_profile(&profile()).unwrap();
        }

        let store = TokenStore::new(FileStore::open(&path).unwrap());
        assert_eq!(
            store.get_token().unwrap(),
            Some(BearerToken::from("persisted"))
        );
        assert_eq!(store.get_profile().unwrap(), Some(profile()));

        store.clear().unwrap();
        let store = TokenStore::new(FileStore::open(&path).unwrap());
        assert!(store.get_token().unwrap().is_none());
    }

    #[cfg(feature = "file-store")]
    #[test]
    fn file_store_rejects_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(FileStore::open(&path), Err(Error::CorruptSession(_))));
    }

    #[cfg(feature = "file-store")]
    #[test]
    fn file_store_treats_empty_file_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "").unwrap();
        let store = FileStore::open(&path).unwrap();
        assert!(store.get(AUTH_TOKEN_KEY).unwrap().is_none());
        assert_eq!(store.path(), path.as_path());
    }
}
