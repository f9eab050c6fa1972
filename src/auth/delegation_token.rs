//! Delegation Token Management
//!
//! Delegation tokens let a client that authenticated once over Kerberos
//! re-authenticate later without another Kerberos handshake.
//!
//! ## Token format
//!
//! A token is `base64url(identifier) "." base64url(hmac)` where the identifier
//! is the JSON encoding of [`TokenIdentifier`] and the HMAC-SHA-256 is keyed
//! with the master key named by `master_key_id`. The token string never
//! changes after issue; its live expiry is kept in the [`TokenRecord`] held by
//! the token store, so renewals extend it in place.
//!
//! ## Master keys
//!
//! Master keys form a ring bounded by count (`retained_master_keys`, default
//! 8). A new key is rolled every `key_update_interval_ms` (default 1 day), so
//! with the defaults a key stays usable for verification for 8 days, longer
//! than the 7 day maximum token lifetime. Tokens signed by a key that has
//! left the ring fail verification.
//!
//! ## Concurrency
//!
//! Operations on one token serialize on one of 16 shard locks chosen by the
//! token's sequence number, so a verify racing a renew or cancel of the same
//! token always observes one of them fully applied.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
    Engine,
};
use hmac::{Hmac, Mac};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::auth::clock::{Clock, SystemClock};
use crate::auth::token_store::{MasterKeyRecord, MemoryTokenStore, TokenRecord, TokenStore};
use crate::config::{
    DEFAULT_KEY_UPDATE_INTERVAL_MS, DEFAULT_RETAINED_MASTER_KEYS, DEFAULT_TOKEN_GC_INTERVAL_MS,
    DEFAULT_TOKEN_MAX_LIFETIME_MS, DEFAULT_TOKEN_RENEW_INTERVAL_MS,
};
use crate::error::{AuthError, Result};

/// Number of per-token lock shards
const TOKEN_LOCK_SHARDS: usize = 16;

/// HMAC key length in bytes
const HMAC_KEY_BYTES: usize = 32;

/// Delegation token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationTokenConfig {
    /// Maximum token lifetime in milliseconds
    pub max_lifetime_ms: u64,

    /// How far one renewal extends a token, in milliseconds
    pub renew_interval_ms: u64,

    /// Master key rotation interval in milliseconds
    pub key_update_interval_ms: u64,

    /// Number of master keys kept for verification
    pub retained_master_keys: usize,

    /// Expired token sweep interval in milliseconds
    pub gc_interval_ms: u64,
}

impl Default for DelegationTokenConfig {
    fn default() -> Self {
        Self {
            max_lifetime_ms: DEFAULT_TOKEN_MAX_LIFETIME_MS,
            renew_interval_ms: DEFAULT_TOKEN_RENEW_INTERVAL_MS,
            key_update_interval_ms: DEFAULT_KEY_UPDATE_INTERVAL_MS,
            retained_master_keys: DEFAULT_RETAINED_MASTER_KEYS,
            gc_interval_ms: DEFAULT_TOKEN_GC_INTERVAL_MS,
        }
    }
}

impl DelegationTokenConfig {
    /// Set the maximum token lifetime
    pub fn with_max_lifetime_ms(mut self, ms: u64) -> Self {
        self.max_lifetime_ms = ms;
        self
    }

    /// Set the renew interval
    pub fn with_renew_interval_ms(mut self, ms: u64) -> Self {
        self.renew_interval_ms = ms;
        self
    }

    /// Set the number of retained master keys
    pub fn with_retained_master_keys(mut self, count: usize) -> Self {
        self.retained_master_keys = count;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.retained_master_keys == 0 {
            return Err(AuthError::config(
                "delegation_token.retained_master_keys",
                "must be at least 1",
            ));
        }
        if self.max_lifetime_ms == 0 || self.renew_interval_ms == 0 {
            return Err(AuthError::config(
                "delegation_token",
                "max_lifetime_ms and renew_interval_ms must be positive",
            ));
        }
        Ok(())
    }
}

/// The signed part of a delegation token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenIdentifier {
    /// Identity the token authenticates as
    pub owner: String,

    /// Identity allowed to renew the token
    pub renewer: String,

    /// Identity that requested the token (differs from owner under impersonation)
    pub real_user: String,

    /// Service tag the token is scoped to
    pub service: String,

    /// Issue time (ms since epoch)
    pub issue_date_ms: u64,

    /// Renewals never extend the token past this time (ms since epoch)
    pub max_date_ms: u64,

    /// Unique token number
    pub sequence_number: u64,

    /// Master key that signed the token
    pub master_key_id: u32,
}

/// Token information returned to callers (excludes the signature)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub owner: String,
    pub renewer: String,
    pub real_user: String,
    pub service: String,
    pub issue_date_ms: u64,
    pub expiry_date_ms: u64,
    pub max_date_ms: u64,
}

impl From<&TokenRecord> for TokenInfo {
    fn from(record: &TokenRecord) -> Self {
        let id = &record.identifier;
        Self {
            owner: id.owner.clone(),
            renewer: id.renewer.clone(),
            real_user: id.real_user.clone(),
            service: id.service.clone(),
            issue_date_ms: id.issue_date_ms,
            expiry_date_ms: record.renew_date_ms,
            max_date_ms: id.max_date_ms,
        }
    }
}

/// A master key held in memory
struct MasterKey {
    key_id: u32,
    created_ms: u64,
    secret: Zeroizing<Vec<u8>>,
}

impl MasterKey {
    fn generate(key_id: u32, created_ms: u64) -> Self {
        let mut secret = Zeroizing::new(vec![0u8; HMAC_KEY_BYTES]);
        rand::thread_rng().fill(&mut secret[..]);
        Self {
            key_id,
            created_ms,
            secret,
        }
    }

    fn from_record(record: &MasterKeyRecord) -> Result<Self> {
        let secret = BASE64.decode(&record.secret).map_err(|e| {
            AuthError::token_store(
                "load master key",
                format!("key {} is not valid base64: {}", record.key_id, e),
            )
        })?;
        Ok(Self {
            key_id: record.key_id,
            created_ms: record.created_ms,
            secret: Zeroizing::new(secret),
        })
    }

    fn to_record(&self) -> MasterKeyRecord {
        MasterKeyRecord {
            key_id: self.key_id,
            created_ms: self.created_ms,
            secret: BASE64.encode(&*self.secret),
        }
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret)
            .map_err(|e| AuthError::token_issuance(format!("HMAC error: {}", e)))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Statistics about delegation tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationTokenStats {
    /// Total number of stored tokens
    pub total: usize,

    /// Number of active (non-expired) tokens
    pub active: usize,

    /// Number of expired tokens awaiting removal
    pub expired: usize,

    /// Number of master keys in the ring
    pub master_keys: usize,
}

/// Delegation token manager
pub struct DelegationTokenManager {
    config: DelegationTokenConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn TokenStore>,

    /// Master key ring, oldest first; the last key signs new tokens
    keys: RwLock<VecDeque<MasterKey>>,

    /// Last sequence number handed out; persisted before use
    last_sequence: Mutex<u64>,

    token_locks: Vec<Mutex<()>>,
}

impl DelegationTokenManager {
    /// Create a manager backed by `store`
    ///
    /// Keys and the sequence counter are restored from the store. Sequence
    /// numbers of cancelled or swept tokens are never handed out again. A
    /// fresh master key is rolled when none is present or the newest is due.
    pub fn new(
        config: DelegationTokenConfig,
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let mut records = store.master_keys()?;
        records.sort_by_key(|k| k.key_id);
        let keys = records
            .iter()
            .map(MasterKey::from_record)
            .collect::<Result<VecDeque<_>>>()?;

        let last_sequence = store
            .tokens()?
            .iter()
            .map(TokenRecord::sequence_number)
            .fold(store.sequence_high_water()?, u64::max);

        let manager = Self {
            config,
            clock,
            store,
            keys: RwLock::new(keys),
            last_sequence: Mutex::new(last_sequence),
            token_locks: (0..TOKEN_LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        };
        manager.evict_old_keys()?;
        if manager.master_key_due() {
            manager.roll_master_key()?;
        }

        info!(
            master_keys = manager.keys.read().len(),
            last_sequence, "Delegation token manager started"
        );
        Ok(manager)
    }

    /// Create a manager with an in-memory store and the system clock
    pub fn in_memory(config: DelegationTokenConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(MemoryTokenStore::new()),
            Arc::new(SystemClock),
        )
    }

    /// Manager configuration
    pub fn config(&self) -> &DelegationTokenConfig {
        &self.config
    }

    /// Issue a token for `owner`, renewable by `renewer`
    ///
    /// `real_user` is the authenticated identity that asked for the token.
    pub fn issue(
        &self,
        owner: &str,
        renewer: &str,
        real_user: &str,
        service: &str,
    ) -> Result<String> {
        if owner.trim().is_empty() {
            return Err(AuthError::token_issuance("token owner must not be empty"));
        }

        let now = self.clock.now_ms();
        let sequence_number = self.allocate_sequence()?;

        let (identifier, token) = {
            let keys = self.keys.read();
            let key = keys
                .back()
                .ok_or_else(|| AuthError::token_issuance("no master key available"))?;

            let identifier = TokenIdentifier {
                owner: owner.to_string(),
                renewer: renewer.to_string(),
                real_user: real_user.to_string(),
                service: service.to_string(),
                issue_date_ms: now,
                max_date_ms: now.saturating_add(self.config.max_lifetime_ms),
                sequence_number,
                master_key_id: key.key_id,
            };
            let payload = serde_json::to_vec(&identifier)
                .map_err(|e| AuthError::token_issuance(e.to_string()))?;
            let signature = key.sign(&payload)?;
            let token = format!(
                "{}.{}",
                URL_SAFE_NO_PAD.encode(&payload),
                URL_SAFE_NO_PAD.encode(&signature)
            );
            (identifier, token)
        };

        let record = TokenRecord {
            renew_date_ms: now
                .saturating_add(self.config.renew_interval_ms)
                .min(identifier.max_date_ms),
            identifier,
        };

        {
            let _guard = self.lock_token(sequence_number);
            self.store.put_token(&record).map_err(|e| {
                AuthError::token_issuance(format!("unable to persist token: {}", e))
            })?;
        }

        info!(
            owner = %owner,
            renewer = %renewer,
            sequence = sequence_number,
            expiry_ms = record.renew_date_ms,
            "Issued delegation token"
        );

        Ok(token)
    }

    /// Verify a token and return its owner
    pub fn verify(&self, token: &str) -> Result<String> {
        let record = self.validate(token)?;
        debug!(
            owner = %record.identifier.owner,
            sequence = record.sequence_number(),
            "Verified delegation token"
        );
        Ok(record.identifier.owner)
    }

    /// Owner of a valid token
    pub fn get_user_from_token(&self, token: &str) -> Result<String> {
        Ok(self.validate(token)?.identifier.owner)
    }

    /// Details of a valid token
    pub fn token_info(&self, token: &str) -> Result<TokenInfo> {
        Ok(TokenInfo::from(&self.validate(token)?))
    }

    /// Extend a token's expiry; returns the new expiry (ms since epoch)
    ///
    /// The new expiry is `now + renew_interval_ms`, capped at the token's max date.
    pub fn renew(&self, token: &str, renewer: &str) -> Result<u64> {
        let (identifier, payload, signature) = Self::decode(token)?;
        self.check_signature(&identifier, &payload, &signature)?;

        let _guard = self.lock_token(identifier.sequence_number);
        let mut record = self.load_live_record(&identifier)?;

        if identifier.renewer.is_empty() {
            return Err(AuthError::token_invalid(format!(
                "{} tried to renew a token without a renewer",
                renewer
            )));
        }
        if identifier.renewer != renewer {
            return Err(AuthError::token_invalid(format!(
                "{} tries to renew a token with renewer {}",
                renewer, identifier.renewer
            )));
        }

        let now = self.clock.now_ms();
        let new_expiry = now
            .saturating_add(self.config.renew_interval_ms)
            .min(identifier.max_date_ms);
        record.renew_date_ms = new_expiry;
        self.store.put_token(&record)?;

        debug!(
            sequence = identifier.sequence_number,
            new_expiry_ms = new_expiry,
            "Renewed delegation token"
        );
        Ok(new_expiry)
    }

    /// Cancel a token
    ///
    /// Cancelling an unknown or already cancelled token succeeds. Store
    /// failures are returned as [`AuthError::TokenStore`].
    pub fn cancel(&self, token: &str) -> Result<()> {
        let (identifier, payload, signature) = Self::decode(token)?;
        match self.check_signature(&identifier, &payload, &signature) {
            Ok(()) => {}
            Err(_) if !self.has_key(identifier.master_key_id) => {
                debug!(
                    sequence = identifier.sequence_number,
                    "Cancel of token signed by a retired key"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let _guard = self.lock_token(identifier.sequence_number);
        let owned = self
            .store
            .get_token(identifier.sequence_number)?
            .is_some_and(|record| record.identifier == identifier);
        if owned && self.store.remove_token(identifier.sequence_number)? {
            info!(
                owner = %identifier.owner,
                sequence = identifier.sequence_number,
                "Cancelled delegation token"
            );
        } else {
            debug!(
                sequence = identifier.sequence_number,
                "Cancel of unknown delegation token"
            );
        }
        Ok(())
    }

    /// Remove expired tokens from the store; returns how many were removed
    pub fn remove_expired(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let mut removed = 0;

        for record in self.store.tokens()? {
            if record.renew_date_ms > now {
                continue;
            }
            let sequence_number = record.sequence_number();
            let _guard = self.lock_token(sequence_number);
            // A renewal may have landed since the listing
            let still_expired = self
                .store
                .get_token(sequence_number)?
                .is_some_and(|current| current.renew_date_ms <= now);
            if still_expired && self.store.remove_token(sequence_number)? {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(count = removed, "Removed expired delegation tokens");
        }
        Ok(removed)
    }

    /// Generate a new signing key and evict keys beyond the retained count
    ///
    /// Returns the new key id.
    pub fn roll_master_key(&self) -> Result<u32> {
        let key_id = {
            let mut keys = self.keys.write();
            let key_id = keys.back().map_or(1, |k| k.key_id.wrapping_add(1));
            let key = MasterKey::generate(key_id, self.clock.now_ms());
            self.store.put_master_key(&key.to_record())?;
            keys.push_back(key);
            key_id
        };
        self.evict_old_keys()?;

        info!(key_id, "Rolled delegation token master key");
        Ok(key_id)
    }

    /// Whether the newest master key is older than the rotation interval
    pub fn master_key_due(&self) -> bool {
        match self.keys.read().back() {
            Some(key) => {
                self.clock.now_ms().saturating_sub(key.created_ms)
                    >= self.config.key_update_interval_ms
            }
            None => true,
        }
    }

    /// Ids of the master keys in the ring, oldest first
    pub fn master_key_ids(&self) -> Vec<u32> {
        self.keys.read().iter().map(|k| k.key_id).collect()
    }

    /// Get statistics about delegation tokens
    pub fn stats(&self) -> Result<DelegationTokenStats> {
        let now = self.clock.now_ms();
        let tokens = self.store.tokens()?;
        let expired = tokens.iter().filter(|t| t.renew_date_ms <= now).count();

        Ok(DelegationTokenStats {
            total: tokens.len(),
            active: tokens.len() - expired,
            expired,
            master_keys: self.keys.read().len(),
        })
    }

    /// One maintenance pass: roll the key if due, then sweep expired tokens
    pub fn run_maintenance(&self) -> Result<usize> {
        if self.master_key_due() {
            self.roll_master_key()?;
        }
        self.remove_expired()
    }

    // ========== Internals ==========

    fn lock_token(&self, sequence_number: u64) -> parking_lot::MutexGuard<'_, ()> {
        self.token_locks[(sequence_number % TOKEN_LOCK_SHARDS as u64) as usize].lock()
    }

    /// Reserve the next sequence number, persisting it before it is used
    fn allocate_sequence(&self) -> Result<u64> {
        let mut last = self.last_sequence.lock();
        let next = last.wrapping_add(1);
        self.store
            .advance_sequence_high_water(next)
            .map_err(|e| AuthError::token_issuance(format!("unable to reserve sequence: {}", e)))?;
        *last = next;
        Ok(next)
    }

    fn has_key(&self, key_id: u32) -> bool {
        self.keys.read().iter().any(|k| k.key_id == key_id)
    }

    fn evict_old_keys(&self) -> Result<()> {
        let mut keys = self.keys.write();
        while keys.len() > self.config.retained_master_keys {
            if let Some(old) = keys.pop_front() {
                self.store.remove_master_key(old.key_id)?;
                debug!(key_id = old.key_id, "Retired delegation token master key");
            }
        }
        Ok(())
    }

    fn decode(token: &str) -> Result<(TokenIdentifier, Vec<u8>, Vec<u8>)> {
        let (payload_b64, signature_b64) = token
            .trim()
            .split_once('.')
            .ok_or_else(|| AuthError::token_invalid("malformed token"))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::token_invalid("malformed token identifier encoding"))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthError::token_invalid("malformed token signature encoding"))?;
        let identifier: TokenIdentifier = serde_json::from_slice(&payload)
            .map_err(|_| AuthError::token_invalid("malformed token identifier"))?;

        Ok((identifier, payload, signature))
    }

    fn check_signature(
        &self,
        identifier: &TokenIdentifier,
        payload: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let keys = self.keys.read();
        let key = keys
            .iter()
            .find(|k| k.key_id == identifier.master_key_id)
            .ok_or_else(|| {
                AuthError::token_invalid(format!(
                    "token signed with unknown master key {}",
                    identifier.master_key_id
                ))
            })?;

        let expected = key
            .sign(payload)
            .map_err(|_| AuthError::token_invalid("unable to compute token signature"))?;
        if !Self::constant_time_eq(signature, &expected) {
            return Err(AuthError::token_invalid("token signature does not match"));
        }
        Ok(())
    }

    /// Stored record of a token that is neither cancelled nor expired.
    /// Caller holds the token's shard lock.
    fn load_live_record(&self, identifier: &TokenIdentifier) -> Result<TokenRecord> {
        let record = self
            .store
            .get_token(identifier.sequence_number)?
            .filter(|record| &record.identifier == identifier)
            .ok_or_else(|| AuthError::token_invalid("token is cancelled or unknown"))?;

        let now = self.clock.now_ms();
        if now >= record.renew_date_ms {
            return Err(AuthError::token_invalid(format!(
                "token expired at {}, current time {}",
                record.renew_date_ms, now
            )));
        }
        Ok(record)
    }

    fn validate(&self, token: &str) -> Result<TokenRecord> {
        let (identifier, payload, signature) = Self::decode(token)?;
        self.check_signature(&identifier, &payload, &signature)?;

        let _guard = self.lock_token(identifier.sequence_number);
        self.load_live_record(&identifier)
    }

    /// Constant-time comparison to prevent timing attacks
    fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

impl std::fmt::Debug for DelegationTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegationTokenManager")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("master_keys", &self.master_key_ids())
            .finish()
    }
}

/// Spawn a background task that rolls master keys and sweeps expired tokens
pub fn spawn_maintenance_task(
    manager: Arc<DelegationTokenManager>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);
        loop {
            interval_timer.tick().await;
            if let Err(e) = manager.run_maintenance() {
                warn!(error = %e, "Delegation token maintenance failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::token_store::FileTokenStore;
    use tempfile::TempDir;

    const HOUR: u64 = 60 * 60 * 1000;
    const DAY: u64 = 24 * HOUR;

    fn manager_with_clock(
        config: DelegationTokenConfig,
    ) -> (DelegationTokenManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let manager =
            DelegationTokenManager::new(config, Arc::new(MemoryTokenStore::new()), clock.clone())
                .unwrap();
        (manager, clock)
    }

    fn issue(manager: &DelegationTokenManager) -> String {
        manager
            .issue("alice", "hive", "alice", "sparkserverClientToken")
            .unwrap()
    }

    #[test]
    fn test_issue_then_get_user() {
        let (manager, _) = manager_with_clock(DelegationTokenConfig::default());
        let token = issue(&manager);

        assert!(!token.is_empty());
        assert_eq!(manager.get_user_from_token(&token).unwrap(), "alice");
        assert_eq!(manager.verify(&token).unwrap(), "alice");

        let info = manager.token_info(&token).unwrap();
        assert_eq!(info.renewer, "hive");
        assert_eq!(info.service, "sparkserverClientToken");
        assert_eq!(info.expiry_date_ms, info.issue_date_ms + DAY);
        assert_eq!(info.max_date_ms, info.issue_date_ms + 7 * DAY);
    }

    #[test]
    fn test_issue_rejects_empty_owner() {
        let (manager, _) = manager_with_clock(DelegationTokenConfig::default());
        let err = manager.issue("", "hive", "hive", "svc").unwrap_err();
        assert!(matches!(err, AuthError::TokenIssuance(_)));
    }

    #[test]
    fn test_sequence_numbers_unique() {
        let (manager, _) = manager_with_clock(DelegationTokenConfig::default());
        let a = issue(&manager);
        let b = issue(&manager);
        assert_ne!(a, b);
        assert_eq!(manager.stats().unwrap().total, 2);
    }

    #[test]
    fn test_malformed_tokens() {
        let (manager, _) = manager_with_clock(DelegationTokenConfig::default());
        for bad in ["", "nodot", "!!!.!!!", "e30.AAAA"] {
            let err = manager.verify(bad).unwrap_err();
            assert!(matches!(err, AuthError::TokenInvalid(_)), "{}: {}", bad, err);
        }
    }

    #[test]
    fn test_tampered_signature() {
        let (manager, _) = manager_with_clock(DelegationTokenConfig::default());
        let token = issue(&manager);
        let (payload, _) = token.split_once('.').unwrap();
        let forged = format!("{}.{}", payload, URL_SAFE_NO_PAD.encode([0u8; 32]));

        let err = manager.verify(&forged).unwrap_err();
        assert!(err.to_string().contains("signature"));
    }

    #[test]
    fn test_tampered_identifier() {
        let (manager, _) = manager_with_clock(DelegationTokenConfig::default());
        let token = issue(&manager);
        let (payload, signature) = token.split_once('.').unwrap();

        let mut identifier: TokenIdentifier =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        identifier.owner = "mallory".to_string();
        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&identifier).unwrap()),
            signature
        );

        assert!(matches!(
            manager.verify(&forged).unwrap_err(),
            AuthError::TokenInvalid(_)
        ));
    }

    #[test]
    fn test_expiry() {
        let (manager, clock) = manager_with_clock(DelegationTokenConfig::default());
        let token = issue(&manager);

        clock.advance(DAY - 1);
        assert!(manager.verify(&token).is_ok());

        clock.advance(1);
        let err = manager.verify(&token).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_renew_extends_expiry() {
        let (manager, clock) = manager_with_clock(DelegationTokenConfig::default());
        let token = issue(&manager);
        let original = manager.token_info(&token).unwrap().expiry_date_ms;

        clock.advance(DAY / 2);
        let renewed = manager.renew(&token, "hive").unwrap();
        assert!(renewed > original);

        clock.set(original + HOUR);
        assert_eq!(manager.verify(&token).unwrap(), "alice");
    }

    #[test]
    fn test_renew_capped_at_max_date() {
        let config = DelegationTokenConfig::default()
            .with_max_lifetime_ms(3 * HOUR)
            .with_renew_interval_ms(2 * HOUR);
        let (manager, clock) = manager_with_clock(config);
        let token = issue(&manager);
        let max = manager.token_info(&token).unwrap().max_date_ms;

        clock.advance(90 * 60 * 1000);
        assert_eq!(manager.renew(&token, "hive").unwrap(), max);

        clock.set(max);
        assert!(manager.verify(&token).is_err());
        assert!(manager.renew(&token, "hive").is_err());
    }

    #[test]
    fn test_renew_wrong_renewer() {
        let (manager, _) = manager_with_clock(DelegationTokenConfig::default());
        let token = issue(&manager);

        let err = manager.renew(&token, "mallory").unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));

        let no_renewer = manager.issue("bob", "", "bob", "svc").unwrap();
        assert!(manager.renew(&no_renewer, "bob").is_err());
    }

    #[test]
    fn test_renew_after_expiry_fails() {
        let (manager, clock) = manager_with_clock(DelegationTokenConfig::default());
        let token = issue(&manager);

        clock.advance(DAY);
        assert!(matches!(
            manager.renew(&token, "hive").unwrap_err(),
            AuthError::TokenInvalid(_)
        ));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (manager, _) = manager_with_clock(DelegationTokenConfig::default());
        let token = issue(&manager);

        manager.cancel(&token).unwrap();
        assert!(matches!(
            manager.verify(&token).unwrap_err(),
            AuthError::TokenInvalid(_)
        ));
        manager.cancel(&token).unwrap();
        assert!(manager.verify(&token).is_err());
        assert!(manager.renew(&token, "hive").is_err());
    }

    #[test]
    fn test_cancel_malformed() {
        let (manager, _) = manager_with_clock(DelegationTokenConfig::default());
        assert!(matches!(
            manager.cancel("garbage").unwrap_err(),
            AuthError::TokenInvalid(_)
        ));
    }

    #[test]
    fn test_key_ring_eviction() {
        let config = DelegationTokenConfig::default().with_retained_master_keys(2);
        let (manager, _) = manager_with_clock(config);
        let old = issue(&manager);

        manager.roll_master_key().unwrap();
        assert!(manager.verify(&old).is_ok());

        manager.roll_master_key().unwrap();
        assert_eq!(manager.master_key_ids().len(), 2);
        let err = manager.verify(&old).unwrap_err();
        assert!(err.to_string().contains("unknown master key"));

        // The token is unusable, so cancelling it is a no-op
        manager.cancel(&old).unwrap();

        let fresh = issue(&manager);
        assert!(manager.verify(&fresh).is_ok());
    }

    #[test]
    fn test_remove_expired() {
        let (manager, clock) = manager_with_clock(DelegationTokenConfig::default());
        let short = issue(&manager);
        clock.advance(HOUR);
        let renewed = issue(&manager);

        clock.advance(DAY - HOUR);
        manager.renew(&renewed, "hive").unwrap();
        assert_eq!(manager.remove_expired().unwrap(), 1);
        assert!(manager.verify(&short).is_err());
        assert!(manager.verify(&renewed).is_ok());

        let stats = manager.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.active, 1);
    }

    #[test]
    fn test_run_maintenance_rolls_due_key() {
        let (manager, clock) = manager_with_clock(DelegationTokenConfig::default());
        assert_eq!(manager.master_key_ids(), vec![1]);
        assert!(!manager.master_key_due());

        clock.advance(DAY);
        assert!(manager.master_key_due());
        manager.run_maintenance().unwrap();
        assert_eq!(manager.master_key_ids(), vec![1, 2]);
    }

    #[test]
    fn test_concurrent_renew_and_verify() {
        let (manager, _) = manager_with_clock(DelegationTokenConfig::default());
        let manager = Arc::new(manager);
        let token = issue(&manager);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = Arc::clone(&manager);
                let token = token.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        if i % 2 == 0 {
                            manager.renew(&token, "hive").unwrap();
                        } else {
                            assert_eq!(manager.verify(&token).unwrap(), "alice");
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_file_store_restart() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000_000));

        let token = {
            let store = Arc::new(FileTokenStore::open(dir.path()).unwrap());
            let manager =
                DelegationTokenManager::new(DelegationTokenConfig::default(), store, clock.clone())
                    .unwrap();
            issue(&manager)
        };

        let store = Arc::new(FileTokenStore::open(dir.path()).unwrap());
        let manager =
            DelegationTokenManager::new(DelegationTokenConfig::default(), store, clock).unwrap();
        assert_eq!(manager.verify(&token).unwrap(), "alice");

        let next = issue(&manager);
        assert_ne!(next, token);
    }

    #[test]
    fn test_sequence_not_reused_after_restart() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let open = |clock: Arc<ManualClock>| {
            let store = Arc::new(FileTokenStore::open(dir.path()).unwrap());
            DelegationTokenManager::new(DelegationTokenConfig::default(), store, clock).unwrap()
        };

        let alice = {
            let manager = open(clock.clone());
            let token = issue(&manager);
            manager.cancel(&token).unwrap();
            token
        };

        let manager = open(clock);
        let bob = manager.issue("bob", "hive", "bob", "svc").unwrap();
        let (alice_id, _, _) = DelegationTokenManager::decode(&alice).unwrap();
        let (bob_id, _, _) = DelegationTokenManager::decode(&bob).unwrap();
        assert!(bob_id.sequence_number > alice_id.sequence_number);

        manager.cancel(&alice).unwrap();
        assert_eq!(manager.verify(&bob).unwrap(), "bob");
    }

    #[test]
    fn test_cancel_leaves_other_token_with_same_sequence() {
        let store = Arc::new(MemoryTokenStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let manager =
            DelegationTokenManager::new(DelegationTokenConfig::default(), store.clone(), clock)
                .unwrap();
        let alice = issue(&manager);
        manager.cancel(&alice).unwrap();

        // A record under alice's sequence number that belongs to someone else
        let (alice_id, _, _) = DelegationTokenManager::decode(&alice).unwrap();
        let other = TokenRecord {
            identifier: TokenIdentifier {
                owner: "bob".to_string(),
                ..alice_id.clone()
            },
            renew_date_ms: u64::MAX,
        };
        store.put_token(&other).unwrap();

        manager.cancel(&alice).unwrap();
        assert_eq!(store.get_token(alice_id.sequence_number).unwrap(), Some(other));
    }

    #[test]
    fn test_store_failure_on_cancel() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileTokenStore::open(dir.path()).unwrap());
        let manager = DelegationTokenManager::new(
            DelegationTokenConfig::default(),
            store,
            Arc::new(ManualClock::new(1_000_000)),
        )
        .unwrap();
        let token = issue(&manager);

        std::fs::remove_dir_all(dir.path()).unwrap();
        assert!(matches!(
            manager.cancel(&token).unwrap_err(),
            AuthError::TokenStore(_)
        ));
        assert!(matches!(
            manager.issue("bob", "hive", "bob", "svc").unwrap_err(),
            AuthError::TokenIssuance(_)
        ));
    }

    #[test]
    fn test_invalid_config() {
        let config = DelegationTokenConfig::default().with_retained_master_keys(0);
        assert!(DelegationTokenManager::in_memory(config).unwrap_err().is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_task_sweeps() {
        let (manager, clock) = manager_with_clock(DelegationTokenConfig::default());
        let manager = Arc::new(manager);
        let token = issue(&manager);
        clock.advance(DAY);

        let handle = spawn_maintenance_task(Arc::clone(&manager), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        handle.abort();

        assert_eq!(manager.stats().unwrap().total, 0);
        assert!(manager.verify(&token).is_err());
        assert_eq!(manager.master_key_ids(), vec![1, 2]);
    }
}
