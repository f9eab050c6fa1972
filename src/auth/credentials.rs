//! Credential authority adapter
//!
//! The credential authority is the external identity system (a Kerberos KDC
//! and its client library in production). The rest of the crate only talks to
//! it through [`CredentialAuthority`], so the login, freshness and proxy checks
//! can be exercised against the config-backed [`LocalCredentialAuthority`].

use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::auth::principal::{short_name, KerberosName};
use crate::config::ProxyUserRule;
use crate::error::{AuthError, Result};

/// Identity currently logged in to the credential authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginIdentity {
    /// Full principal name of the login
    pub user_name: String,

    /// Whether the login holds Kerberos credentials (ticket or keytab)
    pub has_kerberos_credentials: bool,

    /// Keytab the login was made from, when the authority can report it
    pub keytab_path: Option<String>,
}

impl LoginIdentity {
    /// Identity obtained from a keytab login
    pub fn from_keytab(principal: &str, keytab_path: &str) -> Self {
        Self {
            user_name: principal.to_string(),
            has_kerberos_credentials: true,
            keytab_path: Some(keytab_path.to_string()),
        }
    }

    /// Identity of an unauthenticated OS user
    pub fn simple(user_name: &str) -> Self {
        Self {
            user_name: user_name.to_string(),
            has_kerberos_credentials: false,
            keytab_path: None,
        }
    }
}

/// Subject of an impersonation check
///
/// Under Kerberos the real user is bound as a proxy of the server login user;
/// `via` names that login user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySubject {
    pub user: String,
    pub via: Option<String>,
}

/// Narrow interface to the external identity system
pub trait CredentialAuthority: Send + Sync {
    /// Whether Kerberos security is active for the process
    fn is_security_enabled(&self) -> bool;

    /// Identity of the current process login, if any
    fn current_identity(&self) -> Option<LoginIdentity>;

    /// Keytab path of the active login. `None` means unknown, not absent.
    fn current_login_keytab_path(&self) -> Option<String>;

    /// Log in with a principal and keytab, replacing the process login
    fn login_from_keytab(&self, principal: &str, keytab_path: &str) -> Result<LoginIdentity>;

    /// Log in with a principal and keytab without touching the process login
    fn identity_from_keytab(&self, principal: &str, keytab_path: &str) -> Result<LoginIdentity>;

    /// Short name of the process login user
    fn login_user(&self) -> Result<String>;

    /// Ask whether `subject` may impersonate `proxy_user` from `remote_address`
    ///
    /// Returns the reason on denial.
    fn authorize_proxy(
        &self,
        subject: &ProxySubject,
        proxy_user: &str,
        remote_address: Option<&str>,
    ) -> std::result::Result<(), String>;
}

/// Config-backed credential authority
///
/// Keytab logins succeed when the principal parses and the keytab file is a
/// readable, non-empty file. Impersonation is decided by [`ProxyUserRule`]s.
#[derive(Debug)]
pub struct LocalCredentialAuthority {
    security_enabled: bool,
    proxy_rules: Vec<ProxyUserRule>,
    login: RwLock<Option<LoginIdentity>>,
}

impl LocalCredentialAuthority {
    /// Create an authority with no active login
    pub fn new(security_enabled: bool, proxy_rules: Vec<ProxyUserRule>) -> Self {
        Self {
            security_enabled,
            proxy_rules,
            login: RwLock::new(None),
        }
    }

    /// Create an authority that already has an active login
    pub fn with_login(
        security_enabled: bool,
        proxy_rules: Vec<ProxyUserRule>,
        login: LoginIdentity,
    ) -> Self {
        Self {
            security_enabled,
            proxy_rules,
            login: RwLock::new(Some(login)),
        }
    }

    /// Drop the active login
    pub fn logout(&self) {
        if let Some(previous) = self.login.write().take() {
            debug!(user = %previous.user_name, "Logged out");
        }
    }

    fn check_keytab(keytab_path: &str) -> Result<()> {
        let metadata = fs::metadata(Path::new(keytab_path))
            .map_err(|e| AuthError::Login(format!("cannot read keytab {}: {}", keytab_path, e)))?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(AuthError::Login(format!(
                "keytab {} is not a non-empty file",
                keytab_path
            )));
        }
        Ok(())
    }
}

impl CredentialAuthority for LocalCredentialAuthority {
    fn is_security_enabled(&self) -> bool {
        self.security_enabled
    }

    fn current_identity(&self) -> Option<LoginIdentity> {
        self.login.read().clone()
    }

    fn current_login_keytab_path(&self) -> Option<String> {
        self.login
            .read()
            .as_ref()
            .and_then(|identity| identity.keytab_path.clone())
    }

    fn login_from_keytab(&self, principal: &str, keytab_path: &str) -> Result<LoginIdentity> {
        let identity = self.identity_from_keytab(principal, keytab_path)?;
        *self.login.write() = Some(identity.clone());

        info!(principal = %principal, keytab = %keytab_path, "Logged in from keytab");
        Ok(identity)
    }

    fn identity_from_keytab(&self, principal: &str, keytab_path: &str) -> Result<LoginIdentity> {
        KerberosName::parse(principal)?;
        Self::check_keytab(keytab_path)?;
        Ok(LoginIdentity::from_keytab(principal, keytab_path))
    }

    fn login_user(&self) -> Result<String> {
        match self.login.read().as_ref() {
            Some(identity) => Ok(short_name(&identity.user_name)),
            None => Ok(whoami::username()),
        }
    }

    fn authorize_proxy(
        &self,
        subject: &ProxySubject,
        proxy_user: &str,
        remote_address: Option<&str>,
    ) -> std::result::Result<(), String> {
        let rules: Vec<&ProxyUserRule> = self
            .proxy_rules
            .iter()
            .filter(|rule| rule.real_user.eq_ignore_ascii_case(&subject.user))
            .collect();

        if rules.is_empty() {
            return Err(format!(
                "User: {} is not allowed to impersonate {}",
                subject.user, proxy_user
            ));
        }

        if rules.iter().any(|rule| rule.allows(proxy_user, remote_address)) {
            Ok(())
        } else {
            Err(format!(
                "Unauthorized connection for super-user: {} from IP {}",
                subject.user,
                remote_address.unwrap_or("unknown")
            ))
        }
    }
}
