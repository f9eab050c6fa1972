//! Authentication configuration
//!
//! This module provides configuration for selecting the authentication
//! strategy, the Kerberos and SPNEGO logins and the proxy-user rules used when
//! authorizing impersonation.

use serde::{Deserialize, Serialize};

use super::defaults::{DEFAULT_BIND_HOST, DEFAULT_SASL_QOP, DEFAULT_TRANSPORT_MODE};
use crate::auth::TransportMode;

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Authentication type (NOSASL, NONE, LDAP, KERBEROS, CUSTOM, PAM).
    /// When unset the default depends on the transport mode.
    pub auth_type: Option<String>,

    /// Transport mode ("http" or "binary")
    pub transport_mode: String,

    /// Host the server binds to, used for `_HOST` principal substitution
    pub bind_host: String,

    /// Kerberos server principal (may contain `_HOST`)
    pub kerberos_principal: String,

    /// Kerberos keytab path
    pub kerberos_keytab: String,

    /// SPNEGO principal for the HTTP login path
    pub spnego_principal: String,

    /// SPNEGO keytab path
    pub spnego_keytab: String,

    /// SASL quality of protection (auth, auth-int, auth-conf)
    pub sasl_qop: String,

    /// Proxy-user rules consulted by the local credential authority
    pub proxy_users: Vec<ProxyUserRule>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_type: None,
            transport_mode: DEFAULT_TRANSPORT_MODE.to_string(),
            bind_host: DEFAULT_BIND_HOST.to_string(),
            kerberos_principal: String::new(),
            kerberos_keytab: String::new(),
            spnego_principal: String::new(),
            spnego_keytab: String::new(),
            sasl_qop: DEFAULT_SASL_QOP.to_string(),
            proxy_users: Vec::new(),
        }
    }
}

impl AuthConfig {
    /// Parsed transport mode; anything other than "http" is binary
    pub fn transport_mode(&self) -> TransportMode {
        TransportMode::parse(&self.transport_mode)
    }

    /// Returns true if the transport mode is HTTP
    pub fn is_http(&self) -> bool {
        self.transport_mode().is_http()
    }
}

/// A rule allowing a real user to impersonate other users
///
/// `"*"` in `hosts` or `users` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyUserRule {
    /// Short name of the impersonating (real) user
    pub real_user: String,

    /// Remote addresses the real user may impersonate from
    pub hosts: Vec<String>,

    /// Users that may be impersonated
    pub users: Vec<String>,
}

impl ProxyUserRule {
    /// Create a rule
    pub fn new(real_user: &str, hosts: &[&str], users: &[&str]) -> Self {
        Self {
            real_user: real_user.to_string(),
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            users: users.iter().map(|u| u.to_string()).collect(),
        }
    }

    /// Check whether this rule allows impersonating `proxy_user` from `remote_address`
    pub fn allows(&self, proxy_user: &str, remote_address: Option<&str>) -> bool {
        let host_ok = match remote_address {
            Some(addr) => self.hosts.iter().any(|h| h == "*" || h == addr),
            None => self.hosts.iter().any(|h| h == "*"),
        };
        let user_ok = self
            .users
            .iter()
            .any(|u| u == "*" || u.eq_ignore_ascii_case(proxy_user));
        host_ok && user_ok
    }
}
