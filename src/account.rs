//! Accounts, and the storage of their authentication sessions

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::auth::{AuthMethod, AuthState};
use crate::error::ErrorKind;

/// Where a server lives, and how to log in
#[derive(Clone)]
pub struct AccountCredentials {
    host: String,
    secure: bool,
    username: String,
    secret: String,
}

impl AccountCredentials {
    /// `host` may contain a port (e.g. `dav.example.com:8443`)
    pub fn new<S: ToString, T: ToString, U: ToString>(host: S, secure: bool, username: T, secret: U) -> Self {
        Self {
            host: host.to_string(),
            secure,
            username: username.to_string(),
            secret: secret.to_string(),
        }
    }

    pub fn host(&self) -> &str { &self.host }
    pub fn is_secure(&self) -> bool { self.secure }
    pub fn username(&self) -> &str { &self.username }
    pub fn secret(&self) -> &str { &self.secret }

    /// Build the full URL of a path on this server
    pub fn url_for(&self, path: &str) -> Result<Url, url::ParseError> {
        let scheme = if self.secure { "https" } else { "http" };
        Url::parse(&format!("{}://{}{}", scheme, self.host, path))
    }
}

impl Debug for AccountCredentials {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("host", &self.host)
            .field("secure", &self.secure)
            .field("username", &self.username)
            .finish()
    }
}


/// An account, with its credentials and its current authentication session.
///
/// The request pipeline needs a `&mut Account`, which serializes every use of a given account.
/// To share an account between tasks, wrap it into a `tokio::sync::Mutex`.
#[derive(Debug, Clone)]
pub struct Account {
    id: String,
    credentials: AccountCredentials,
    auth: AuthState,
}

impl Account {
    /// Create an account that has never talked to its server
    pub fn new<S: ToString>(id: S, credentials: AccountCredentials) -> Self {
        Self { id: id.to_string(), credentials, auth: AuthState::new() }
    }

    /// Create an account, and restore its authentication session from `store` if it has been saved before
    pub fn restore<S: ToString, A: AccountStore + ?Sized>(id: S, credentials: AccountCredentials, store: &A) -> Result<Self, ErrorKind> {
        let id = id.to_string();
        let auth = match store.load(&id).map_err(|err| ErrorKind::AccountStore(err.to_string()))? {
            None => AuthState::new(),
            Some(record) => {
                let method: AuthMethod = record.method.parse()
                    .map_err(|_| ErrorKind::UnsupportedAuthMethod(record.method.clone()))?;
                AuthState::from_parts(method, record.options, record.nonce_count)
            },
        };
        log::debug!("Account {} uses {} auth", id, auth.method());
        Ok(Self { id, credentials, auth })
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn credentials(&self) -> &AccountCredentials { &self.credentials }
    pub fn auth(&self) -> &AuthState { &self.auth }
    pub(crate) fn auth_mut(&mut self) -> &mut AuthState { &mut self.auth }
}


/// The persisted form of an [`AuthState`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    #[serde(rename = "authMethod")]
    pub method: String,
    #[serde(rename = "authOptions")]
    pub options: String,
    #[serde(rename = "authDigestNC")]
    pub nonce_count: u32,
}

impl From<&AuthState> for AuthRecord {
    fn from(state: &AuthState) -> Self {
        Self {
            method: state.method().as_str().to_string(),
            options: state.options().to_string(),
            nonce_count: state.nonce_count(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("invalid account store content: {0}")]
    Format(#[from] serde_json::Error),
    #[error("account store lock is poisoned")]
    Poisoned,
}

/// Persistent storage for the authentication sessions of accounts.
///
/// `save` must be durable when it returns: the Digest nonce-count is saved before every request that uses it.
pub trait AccountStore {
    fn load(&self, account_id: &str) -> Result<Option<AuthRecord>, StoreError>;
    fn save(&self, account_id: &str, record: &AuthRecord) -> Result<(), StoreError>;
}

/// A store that only lives as long as the process
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    records: Mutex<HashMap<String, AuthRecord>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryAccountStore {
    fn load(&self, account_id: &str) -> Result<Option<AuthRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(account_id).cloned())
    }

    fn save(&self, account_id: &str, record: &AuthRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.insert(account_id.to_string(), record.clone());
        Ok(())
    }
}

/// A store backed by a JSON file, that maps account IDs to their [`AuthRecord`]
#[derive(Debug)]
pub struct JsonAccountStore {
    backing_file: PathBuf,
    records: Mutex<HashMap<String, AuthRecord>>,
}

impl JsonAccountStore {
    /// Open a store. A missing file is treated as an empty store, and will be created on the first save
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let records = match std::fs::File::open(path) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No account store at {:?} yet", path);
                HashMap::new()
            },
            Err(err) => return Err(StoreError::Io { path: path.to_path_buf(), source: err }),
            Ok(file) => serde_json::from_reader(std::io::BufReader::new(file))?,
        };

        Ok(Self {
            backing_file: path.to_path_buf(),
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path { &self.backing_file }

    /// The sibling file the store is written to before it replaces the backing file
    fn temp_file(&self) -> PathBuf {
        let mut name = self.backing_file.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.backing_file.with_file_name(name)
    }

    fn save_to_file(&self, records: &HashMap<String, AuthRecord>) -> Result<(), StoreError> {
        // A crash must leave either the old or the new content, never a truncated file
        let tmp_path = self.temp_file();
        let tmp_err = |source| StoreError::Io { path: tmp_path.clone(), source };

        let file = std::fs::File::create(&tmp_path).map_err(tmp_err)?;
        serde_json::to_writer_pretty(&file, records)?;
        file.sync_all().map_err(tmp_err)?;
        drop(file);

        std::fs::rename(&tmp_path, &self.backing_file)
            .map_err(|source| StoreError::Io { path: self.backing_file.clone(), source })
    }
}

impl AccountStore for JsonAccountStore {
    fn load(&self, account_id: &str) -> Result<Option<AuthRecord>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(account_id).cloned())
    }

    fn save(&self, account_id: &str, record: &AuthRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        records.insert(account_id.to_string(), record.clone());
        self.save_to_file(&records)
    }
}
