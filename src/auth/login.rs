//! Server Kerberos login and keytab freshness
//!
//! The server logs in from its keytab once per process. A later start of the
//! Kerberos strategy reuses that login unless the configured principal or
//! keytab no longer match it, or the keytab contents changed on disk.

use std::fmt;
use std::fs;
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::auth::credentials::{CredentialAuthority, LoginIdentity};
use crate::auth::principal::server_principal;
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};

/// Decide whether a fresh keytab login is required
///
/// `required_principal` must already have `_HOST` substituted. An unknown
/// `current_keytab` counts as differing from `required_keytab`.
pub fn needs_login(
    current: Option<&LoginIdentity>,
    required_principal: &str,
    required_keytab: &str,
    current_keytab: Option<&str>,
) -> bool {
    let Some(identity) = current else {
        return true;
    };
    !identity.has_kerberos_credentials
        || identity.user_name != required_principal
        || current_keytab != Some(required_keytab)
}

/// SHA-256 over principal, keytab path and keytab contents, hex encoded
///
/// An unreadable keytab contributes no content bytes.
pub fn credential_fingerprint(principal: &str, keytab_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(principal.as_bytes());
    hasher.update([0u8]);
    hasher.update(keytab_path.as_bytes());
    hasher.update([0u8]);
    match fs::read(keytab_path) {
        Ok(bytes) => hasher.update(&bytes),
        Err(e) => debug!(keytab = %keytab_path, error = %e, "Keytab not readable for fingerprint"),
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// The server login held by a [`ServerCredentialContext`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLogin {
    /// Principal after `_HOST` substitution
    pub principal: String,

    /// Keytab path the login was made from
    pub keytab_path: String,

    /// Fingerprint of the credentials at login time
    pub fingerprint: String,
}

/// Outcome of [`ServerCredentialContext::ensure_login`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub login: ServerLogin,

    /// True if a new login was performed, false if the existing one was reused
    pub logged_in: bool,
}

/// Owns the process' server login
///
/// The check-and-login sequence runs under one mutex, so concurrent callers
/// never trigger more than one login.
pub struct ServerCredentialContext {
    authority: Arc<dyn CredentialAuthority>,
    state: Mutex<Option<ServerLogin>>,
}

impl ServerCredentialContext {
    pub fn new(authority: Arc<dyn CredentialAuthority>) -> Self {
        Self {
            authority,
            state: Mutex::new(None),
        }
    }

    /// The credential authority this context logs in against
    pub fn authority(&self) -> &Arc<dyn CredentialAuthority> {
        &self.authority
    }

    /// Ensure the server is logged in as `principal` from `keytab_path`
    ///
    /// `principal` may contain `_HOST`, which resolves against `bind_host`.
    /// Login failures propagate unchanged and are not retried.
    pub fn ensure_login(
        &self,
        principal: &str,
        keytab_path: &str,
        bind_host: &str,
    ) -> Result<LoginOutcome> {
        let required_principal = server_principal(principal, bind_host)?;
        let fingerprint = credential_fingerprint(&required_principal, keytab_path);

        let mut state = self.state.lock();

        let current = self.authority.current_identity();
        let current_keytab = self.authority.current_login_keytab_path();
        let stale = needs_login(
            current.as_ref(),
            &required_principal,
            keytab_path,
            current_keytab.as_deref(),
        );
        let rotated = state
            .as_ref()
            .is_some_and(|login| login.fingerprint != fingerprint);

        if !stale && !rotated {
            let login = state.get_or_insert_with(|| ServerLogin {
                principal: required_principal.clone(),
                keytab_path: keytab_path.to_string(),
                fingerprint: fingerprint.clone(),
            });
            debug!(principal = %login.principal, "Reusing existing server login");
            return Ok(LoginOutcome {
                login: login.clone(),
                logged_in: false,
            });
        }

        if rotated {
            warn!(principal = %required_principal, "Keytab contents changed, logging in again");
        }

        self.authority
            .login_from_keytab(&required_principal, keytab_path)?;

        let login = ServerLogin {
            principal: required_principal,
            keytab_path: keytab_path.to_string(),
            fingerprint,
        };
        info!(
            principal = %login.principal,
            keytab = %login.keytab_path,
            "Server logged in from keytab"
        );
        *state = Some(login.clone());

        Ok(LoginOutcome {
            login,
            logged_in: true,
        })
    }

    /// The current server login, if one was established
    pub fn current(&self) -> Option<ServerLogin> {
        self.state.lock().clone()
    }

    /// Whether a server login was established
    pub fn is_established(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Forget the server login on shutdown
    pub fn teardown(&self) -> Option<ServerLogin> {
        let previous = self.state.lock().take();
        if let Some(login) = &previous {
            debug!(principal = %login.principal, "Server credential context torn down");
        }
        previous
    }
}

impl fmt::Debug for ServerCredentialContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCredentialContext")
            .field("login", &*self.state.lock())
            .finish()
    }
}

fn require_pair<'a>(
    principal: &'a str,
    keytab: &'a str,
    principal_key: &str,
    keytab_key: &str,
) -> Result<(&'a str, &'a str)> {
    let principal = principal.trim();
    let keytab = keytab.trim();
    if principal.is_empty() {
        return Err(AuthError::config(principal_key, "must not be empty"));
    }
    if keytab.is_empty() {
        return Err(AuthError::config(keytab_key, "must not be empty"));
    }
    Ok((principal, keytab))
}

/// Log the process in with the configured Kerberos principal and keytab
pub fn login_from_keytab(
    config: &AuthConfig,
    authority: &dyn CredentialAuthority,
) -> Result<LoginIdentity> {
    let (principal, keytab) = require_pair(
        &config.kerberos_principal,
        &config.kerberos_keytab,
        "kerberos_principal",
        "kerberos_keytab",
    )?;
    let principal = server_principal(principal, &config.bind_host)?;
    authority.login_from_keytab(&principal, keytab)
}

/// Obtain the SPNEGO identity from the configured principal and keytab
///
/// The process login is left untouched.
pub fn login_from_spnego_keytab(
    config: &AuthConfig,
    authority: &dyn CredentialAuthority,
) -> Result<LoginIdentity> {
    let (principal, keytab) = require_pair(
        &config.spnego_principal,
        &config.spnego_keytab,
        "spnego_principal",
        "spnego_keytab",
    )?;
    let principal = server_principal(principal, &config.bind_host)?;
    let identity = authority.identity_from_keytab(&principal, keytab)?;
    info!(principal = %identity.user_name, "SPNEGO login established");
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::LocalCredentialAuthority;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const PRINCIPAL: &str = "hive/node1.example.com@EXAMPLE.COM";

    fn keytab(contents: &[u8]) -> (NamedTempFile, String) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        let path = file.path().to_string_lossy().to_string();
        (file, path)
    }

    #[test]
    fn test_needs_login_matching_pair() {
        let identity = LoginIdentity::from_keytab(PRINCIPAL, "/etc/hive.keytab");
        assert!(!needs_login(
            Some(&identity),
            PRINCIPAL,
            "/etc/hive.keytab",
            Some("/etc/hive.keytab")
        ));
    }

    #[test]
    fn test_needs_login_cases() {
        let identity = LoginIdentity::from_keytab(PRINCIPAL, "/etc/hive.keytab");

        assert!(needs_login(None, PRINCIPAL, "/etc/hive.keytab", None));
        assert!(needs_login(
            Some(&LoginIdentity::simple(PRINCIPAL)),
            PRINCIPAL,
            "/etc/hive.keytab",
            Some("/etc/hive.keytab")
        ));
        assert!(needs_login(
            Some(&identity),
            "spark/node1.example.com@EXAMPLE.COM",
            "/etc/hive.keytab",
            Some("/etc/hive.keytab")
        ));
        assert!(needs_login(
            Some(&identity),
            PRINCIPAL,
            "/etc/other.keytab",
            Some("/etc/hive.keytab")
        ));
        assert!(needs_login(Some(&identity), PRINCIPAL, "/etc/hive.keytab", None));
    }

    #[test]
    fn test_fingerprint_tracks_contents() {
        let (file, path) = keytab(b"first");
        let before = credential_fingerprint(PRINCIPAL, &path);
        assert_eq!(before.len(), 64);
        assert_eq!(before, credential_fingerprint(PRINCIPAL, &path));

        fs::write(file.path(), b"second").unwrap();
        assert_ne!(before, credential_fingerprint(PRINCIPAL, &path));
    }

    #[test]
    fn test_ensure_login_single_login() {
        let (_file, path) = keytab(b"keytab");
        let authority = Arc::new(LocalCredentialAuthority::new(true, vec![]));
        let context = ServerCredentialContext::new(authority.clone());

        let first = context
            .ensure_login("hive/_HOST@EXAMPLE.COM", &path, "node1.example.com")
            .unwrap();
        assert!(first.logged_in);
        assert_eq!(first.login.principal, PRINCIPAL);

        let second = context
            .ensure_login("hive/_HOST@EXAMPLE.COM", &path, "node1.example.com")
            .unwrap();
        assert!(!second.logged_in);
        assert_eq!(second.login, first.login);
    }

    #[test]
    fn test_ensure_login_reuses_existing_process_login() {
        let (_file, path) = keytab(b"keytab");
        let authority = Arc::new(LocalCredentialAuthority::with_login(
            true,
            vec![],
            LoginIdentity::from_keytab(PRINCIPAL, &path),
        ));
        let context = ServerCredentialContext::new(authority);

        let outcome = context.ensure_login(PRINCIPAL, &path, "ignored").unwrap();
        assert!(!outcome.logged_in);
        assert!(context.is_established());
    }

    #[test]
    fn test_ensure_login_after_keytab_rotation() {
        let (file, path) = keytab(b"keytab-v1");
        let authority = Arc::new(LocalCredentialAuthority::new(true, vec![]));
        let context = ServerCredentialContext::new(authority);

        assert!(context.ensure_login(PRINCIPAL, &path, "").unwrap().logged_in);
        fs::write(file.path(), b"keytab-v2").unwrap();
        assert!(context.ensure_login(PRINCIPAL, &path, "").unwrap().logged_in);
    }

    #[test]
    fn test_ensure_login_failure_propagates() {
        let authority = Arc::new(LocalCredentialAuthority::new(true, vec![]));
        let context = ServerCredentialContext::new(authority);

        let err = context
            .ensure_login(PRINCIPAL, "/nonexistent/hive.keytab", "")
            .unwrap_err();
        assert!(matches!(err, AuthError::Login(_)));
        assert!(!context.is_established());
    }

    #[test]
    fn test_concurrent_ensure_login() {
        let (_file, path) = keytab(b"keytab");
        let authority = Arc::new(LocalCredentialAuthority::new(true, vec![]));
        let context = Arc::new(ServerCredentialContext::new(authority));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let context = Arc::clone(&context);
                let path = path.clone();
                std::thread::spawn(move || context.ensure_login(PRINCIPAL, &path, "").unwrap())
            })
            .collect();

        let logins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|outcome| outcome.logged_in)
            .count();
        assert_eq!(logins, 1);
    }

    #[test]
    fn test_teardown() {
        let (_file, path) = keytab(b"keytab");
        let context =
            ServerCredentialContext::new(Arc::new(LocalCredentialAuthority::new(true, vec![])));
        context.ensure_login(PRINCIPAL, &path, "").unwrap();

        assert!(context.teardown().is_some());
        assert!(context.current().is_none());
        assert!(context.teardown().is_none());
    }

    #[test]
    fn test_login_from_keytab_requires_pair() {
        let authority = LocalCredentialAuthority::new(true, vec![]);
        let mut config = AuthConfig::default();

        let err = login_from_keytab(&config, &authority).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("kerberos_principal"));

        config.kerberos_principal = PRINCIPAL.to_string();
        let err = login_from_keytab(&config, &authority).unwrap_err();
        assert!(err.to_string().contains("kerberos_keytab"));

        let (_file, path) = keytab(b"keytab");
        config.kerberos_keytab = path;
        assert!(login_from_keytab(&config, &authority).is_ok());
    }

    #[test]
    fn test_login_from_spnego_keytab() {
        let authority = LocalCredentialAuthority::new(true, vec![]);
        let (_file, path) = keytab(b"spnego");
        let mut config = AuthConfig {
            bind_host: "Node1.Example.com".to_string(),
            spnego_principal: "HTTP/_HOST@EXAMPLE.COM".to_string(),
            ..Default::default()
        };

        assert!(login_from_spnego_keytab(&config, &authority)
            .unwrap_err()
            .is_fatal());

        config.spnego_keytab = path;
        let identity = login_from_spnego_keytab(&config, &authority).unwrap();
        assert_eq!(identity.user_name, "HTTP/node1.example.com@EXAMPLE.COM");
        assert!(authority.current_identity().is_none());
    }
}
