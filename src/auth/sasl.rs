//! SASL negotiation settings and the PLAIN mechanism

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use zeroize::Zeroizing;

use crate::auth::AuthType;
use crate::error::{AuthError, Result};

/// Property key for the quality of protection
pub const SASL_QOP_PROPERTY: &str = "sasl.qop";

/// Property key requiring the server to authenticate itself
pub const SASL_SERVER_AUTH_PROPERTY: &str = "sasl.server.authentication";

/// SASL mechanism types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    /// SASL/PLAIN (username/password)
    Plain,
    /// SASL/GSSAPI (Kerberos)
    Gssapi,
}

impl SaslMechanism {
    /// Get the mechanism name
    pub fn name(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::Gssapi => "GSSAPI",
        }
    }
}

/// Quality of protection negotiated for a SASL channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslQop {
    /// Authentication only
    Auth,
    /// Authentication with integrity protection
    AuthInt,
    /// Authentication with integrity and confidentiality protection
    AuthConf,
}

impl SaslQop {
    /// Wire name of the QOP
    pub fn name(&self) -> &'static str {
        match self {
            SaslQop::Auth => "auth",
            SaslQop::AuthInt => "auth-int",
            SaslQop::AuthConf => "auth-conf",
        }
    }

    /// Parse a configured QOP (case-insensitive)
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auth" => Ok(SaslQop::Auth),
            "auth-int" => Ok(SaslQop::AuthInt),
            "auth-conf" => Ok(SaslQop::AuthConf),
            _ => Err(AuthError::config(
                "sasl_qop",
                format!(
                    "unknown QOP value '{}', expected one of auth, auth-int, auth-conf",
                    value
                ),
            )),
        }
    }
}

impl fmt::Display for SaslQop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Negotiation options handed to the SASL layer. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslProperties {
    qop: SaslQop,
    server_auth_required: bool,
}

impl SaslProperties {
    /// Build properties from a configured QOP; server authentication is always required
    pub fn from_qop(qop: &str) -> Result<Self> {
        Ok(Self {
            qop: SaslQop::parse(qop)?,
            server_auth_required: true,
        })
    }

    /// Quality of protection
    pub fn qop(&self) -> SaslQop {
        self.qop
    }

    /// Whether the server must authenticate itself
    pub fn server_auth_required(&self) -> bool {
        self.server_auth_required
    }

    /// Properties as the key/value map consumed by SASL engines
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(SASL_QOP_PROPERTY.to_string(), self.qop.name().to_string());
        map.insert(
            SASL_SERVER_AUTH_PROPERTY.to_string(),
            self.server_auth_required.to_string(),
        );
        map
    }
}

/// Validates a username/password pair for one of the password-based types
///
/// LDAP, PAM and custom backends live outside this crate and plug in here.
pub trait PasswordAuthenticator: Send + Sync {
    /// Accept or reject the credentials
    fn authenticate(&self, username: &str, password: &str) -> Result<()>;
}

/// Accepts any credentials
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousAuthenticator;

impl PasswordAuthenticator for AnonymousAuthenticator {
    fn authenticate(&self, _username: &str, _password: &str) -> Result<()> {
        Ok(())
    }
}

/// Password authenticators registered per authentication type
#[derive(Clone, Default)]
pub struct PasswordAuthenticators {
    ldap: Option<Arc<dyn PasswordAuthenticator>>,
    pam: Option<Arc<dyn PasswordAuthenticator>>,
    custom: Option<Arc<dyn PasswordAuthenticator>>,
}

impl PasswordAuthenticators {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the authenticator used for `auth_type`
    pub fn with(
        mut self,
        auth_type: AuthType,
        authenticator: Arc<dyn PasswordAuthenticator>,
    ) -> Self {
        match auth_type {
            AuthType::Ldap => self.ldap = Some(authenticator),
            AuthType::Pam => self.pam = Some(authenticator),
            AuthType::Custom => self.custom = Some(authenticator),
            _ => {}
        }
        self
    }

    /// Authenticator for `auth_type`
    pub fn get(&self, auth_type: AuthType) -> Result<Arc<dyn PasswordAuthenticator>> {
        let found = match auth_type {
            AuthType::Ldap => self.ldap.clone(),
            AuthType::Pam => self.pam.clone(),
            AuthType::Custom => self.custom.clone(),
            AuthType::NoSasl | AuthType::None | AuthType::Kerberos => None,
        };
        found.ok_or_else(|| {
            AuthError::config(
                "auth_type",
                format!("no password authenticator registered for {}", auth_type),
            )
        })
    }
}

impl fmt::Debug for PasswordAuthenticators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordAuthenticators")
            .field("ldap", &self.ldap.is_some())
            .field("pam", &self.pam.is_some())
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// SASL/PLAIN authenticator bound to one password backend
pub struct SaslPlainAuthenticator {
    auth_type: AuthType,
    backend: Arc<dyn PasswordAuthenticator>,
}

impl SaslPlainAuthenticator {
    /// Create an authenticator for the given sub-strategy
    pub fn new(auth_type: AuthType, backend: Arc<dyn PasswordAuthenticator>) -> Self {
        Self { auth_type, backend }
    }

    /// The sub-strategy this authenticator validates for
    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    /// Authenticate using SASL/PLAIN mechanism
    ///
    /// SASL/PLAIN format: \[authzid\]\\x00username\\x00password
    ///
    /// The password is held in `Zeroizing` storage so it is wiped once the
    /// backend has answered.
    pub fn authenticate(&self, auth_bytes: &[u8]) -> Result<String> {
        let parts: Vec<&[u8]> = auth_bytes.split(|&b| b == 0).collect();

        if parts.len() != 3 {
            return Err(AuthError::AuthenticationFailed(
                "Invalid SASL/PLAIN format".to_string(),
            ));
        }

        let username = std::str::from_utf8(parts[1]).map_err(|_| {
            AuthError::AuthenticationFailed("Invalid username encoding".to_string())
        })?;
        if username.is_empty() {
            return Err(AuthError::AuthenticationFailed(
                "No user name provided".to_string(),
            ));
        }

        let password: Zeroizing<String> = Zeroizing::new(
            std::str::from_utf8(parts[2])
                .map_err(|_| {
                    AuthError::AuthenticationFailed("Invalid password encoding".to_string())
                })?
                .to_string(),
        );

        self.backend.authenticate(username, &password)?;
        debug!(
            user = %username,
            auth_type = %self.auth_type,
            "SASL/PLAIN authentication succeeded"
        );

        Ok(username.to_string())
    }

    /// Encode credentials for SASL/PLAIN (useful for testing)
    #[cfg(test)]
    pub fn encode_credentials(username: &str, password: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.push(0);
        bytes.extend_from_slice(username.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(password.as_bytes());
        bytes
    }
}

impl fmt::Debug for SaslPlainAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslPlainAuthenticator")
            .field("auth_type", &self.auth_type)
            .finish()
    }
}
