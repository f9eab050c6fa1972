//! Delegation token persistence
//!
//! The manager keeps the signing keys and token records in a [`TokenStore`].
//! Two implementations are provided: an in-memory map and a directory of JSON
//! files. Every store failure surfaces as [`AuthError::TokenStore`], which
//! callers keep distinct from a missing token.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::delegation_token::TokenIdentifier;
use crate::error::{AuthError, Result};

/// Persisted state of one issued token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Signed identifier
    pub identifier: TokenIdentifier,

    /// Current expiry (ms since epoch); moved forward by renewals
    pub renew_date_ms: u64,
}

impl TokenRecord {
    pub fn sequence_number(&self) -> u64 {
        self.identifier.sequence_number
    }
}

/// Persisted signing key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKeyRecord {
    pub key_id: u32,

    /// Time the key was created (ms since epoch)
    pub created_ms: u64,

    /// Key material, base64 encoded
    pub secret: String,
}

/// Storage backend for token records and signing keys
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    /// Insert or replace a token record
    fn put_token(&self, record: &TokenRecord) -> Result<()>;

    /// Fetch a token record by sequence number
    fn get_token(&self, sequence_number: u64) -> Result<Option<TokenRecord>>;

    /// Remove a token record; returns false if it was not present
    fn remove_token(&self, sequence_number: u64) -> Result<bool>;

    /// All token records
    fn tokens(&self) -> Result<Vec<TokenRecord>>;

    /// Insert or replace a signing key
    fn put_master_key(&self, key: &MasterKeyRecord) -> Result<()>;

    /// Remove a signing key; returns false if it was not present
    fn remove_master_key(&self, key_id: u32) -> Result<bool>;

    /// All signing keys
    fn master_keys(&self) -> Result<Vec<MasterKeyRecord>>;

    /// Highest sequence number ever handed out, 0 when none
    fn sequence_high_water(&self) -> Result<u64>;

    /// Record that sequence numbers up to `sequence_number` are taken.
    /// Never moves the mark backwards.
    fn advance_sequence_high_water(&self, sequence_number: u64) -> Result<()>;
}

/// In-memory token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<u64, TokenRecord>>,
    keys: RwLock<HashMap<u32, MasterKeyRecord>>,
    high_water: RwLock<u64>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn put_token(&self, record: &TokenRecord) -> Result<()> {
        self.tokens
            .write()
            .insert(record.sequence_number(), record.clone());
        Ok(())
    }

    fn get_token(&self, sequence_number: u64) -> Result<Option<TokenRecord>> {
        Ok(self.tokens.read().get(&sequence_number).cloned())
    }

    fn remove_token(&self, sequence_number: u64) -> Result<bool> {
        Ok(self.tokens.write().remove(&sequence_number).is_some())
    }

    fn tokens(&self) -> Result<Vec<TokenRecord>> {
        Ok(self.tokens.read().values().cloned().collect())
    }

    fn put_master_key(&self, key: &MasterKeyRecord) -> Result<()> {
        self.keys.write().insert(key.key_id, key.clone());
        Ok(())
    }

    fn remove_master_key(&self, key_id: u32) -> Result<bool> {
        Ok(self.keys.write().remove(&key_id).is_some())
    }

    fn master_keys(&self) -> Result<Vec<MasterKeyRecord>> {
        Ok(self.keys.read().values().cloned().collect())
    }

    fn sequence_high_water(&self) -> Result<u64> {
        Ok(*self.high_water.read())
    }

    fn advance_sequence_high_water(&self, sequence_number: u64) -> Result<()> {
        let mut high_water = self.high_water.write();
        *high_water = (*high_water).max(sequence_number);
        Ok(())
    }
}

/// On-disk form of the sequence high-water mark
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SequenceRecord {
    high_water: u64,
}

/// Directory-backed token store
///
/// Layout:
/// ```text
/// <dir>/tokens/<sequence>.json
/// <dir>/keys/<key_id>.json
/// <dir>/sequence.json
/// ```
/// Files are written to a temporary name and renamed into place.
#[derive(Debug)]
pub struct FileTokenStore {
    tokens_dir: PathBuf,
    keys_dir: PathBuf,
    sequence_path: PathBuf,

    /// Serializes read-modify-write of `sequence.json`
    sequence_lock: Mutex<()>,
}

impl FileTokenStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let tokens_dir = dir.join("tokens");
        let keys_dir = dir.join("keys");
        for d in [&tokens_dir, &keys_dir] {
            fs::create_dir_all(d)
                .map_err(|e| AuthError::token_store("open", format!("{}: {}", d.display(), e)))?;
        }
        info!(path = %dir.display(), "Opened delegation token store");
        Ok(Self {
            tokens_dir,
            keys_dir,
            sequence_path: dir.join("sequence.json"),
            sequence_lock: Mutex::new(()),
        })
    }

    fn write_json<T: Serialize>(operation: &str, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| AuthError::token_store(operation, e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .and_then(|_| fs::rename(&tmp, path))
            .map_err(|e| AuthError::token_store(operation, format!("{}: {}", path.display(), e)))
    }

    fn read_json<T: for<'de> Deserialize<'de>>(operation: &str, path: &Path) -> Result<Option<T>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Self::check_reachable(operation, path)?;
                return Ok(None);
            }
            Err(e) => {
                return Err(AuthError::token_store(
                    operation,
                    format!("{}: {}", path.display(), e),
                ))
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| AuthError::token_store(operation, format!("{}: {}", path.display(), e)))
    }

    /// A missing file only means "not found" while its directory still exists
    fn check_reachable(operation: &str, path: &Path) -> Result<()> {
        match path.parent() {
            Some(dir) if dir.is_dir() => Ok(()),
            _ => Err(AuthError::token_store(
                operation,
                format!("{}: store directory is missing", path.display()),
            )),
        }
    }

    fn remove_file(operation: &str, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Self::check_reachable(operation, path)?;
                Ok(false)
            }
            Err(e) => Err(AuthError::token_store(
                operation,
                format!("{}: {}", path.display(), e),
            )),
        }
    }

    fn read_all<T: for<'de> Deserialize<'de>>(operation: &str, dir: &Path) -> Result<Vec<T>> {
        let entries = fs::read_dir(dir)
            .map_err(|e| AuthError::token_store(operation, format!("{}: {}", dir.display(), e)))?;

        let mut values = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| AuthError::token_store(operation, e.to_string()))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(value) = Self::read_json(operation, &path)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn token_path(&self, sequence_number: u64) -> PathBuf {
        self.tokens_dir.join(format!("{}.json", sequence_number))
    }

    fn key_path(&self, key_id: u32) -> PathBuf {
        self.keys_dir.join(format!("{}.json", key_id))
    }
}

impl TokenStore for FileTokenStore {
    fn put_token(&self, record: &TokenRecord) -> Result<()> {
        let path = self.token_path(record.sequence_number());
        Self::write_json("store token", &path, record)?;
        debug!(sequence = record.sequence_number(), "Persisted delegation token");
        Ok(())
    }

    fn get_token(&self, sequence_number: u64) -> Result<Option<TokenRecord>> {
        Self::read_json("read token", &self.token_path(sequence_number))
    }

    fn remove_token(&self, sequence_number: u64) -> Result<bool> {
        Self::remove_file("remove token", &self.token_path(sequence_number))
    }

    fn tokens(&self) -> Result<Vec<TokenRecord>> {
        Self::read_all("list tokens", &self.tokens_dir)
    }

    fn put_master_key(&self, key: &MasterKeyRecord) -> Result<()> {
        Self::write_json("store master key", &self.key_path(key.key_id), key)
    }

    fn remove_master_key(&self, key_id: u32) -> Result<bool> {
        Self::remove_file("remove master key", &self.key_path(key_id))
    }

    fn master_keys(&self) -> Result<Vec<MasterKeyRecord>> {
        Self::read_all("list master keys", &self.keys_dir)
    }

    fn sequence_high_water(&self) -> Result<u64> {
        let _guard = self.sequence_lock.lock();
        let record: Option<SequenceRecord> =
            Self::read_json("read sequence", &self.sequence_path)?;
        Ok(record.map_or(0, |r| r.high_water))
    }

    fn advance_sequence_high_water(&self, sequence_number: u64) -> Result<()> {
        let _guard = self.sequence_lock.lock();
        let current: Option<SequenceRecord> =
            Self::read_json("store sequence", &self.sequence_path)?;
        if current.is_some_and(|r| r.high_water >= sequence_number) {
            return Ok(());
        }
        Self::write_json(
            "store sequence",
            &self.sequence_path,
            &SequenceRecord {
                high_water: sequence_number,
            },
        )
    }
}
