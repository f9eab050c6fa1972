//! Authentication types and transport modes

use std::fmt;
use std::str::FromStr;

use crate::error::{AuthError, Result};

/// Authentication type chosen once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthType {
    /// No SASL negotiation at all
    NoSasl,
    /// Identity presented in-band is trusted
    None,
    /// Username/password checked against LDAP
    Ldap,
    /// Kerberos via SASL GSSAPI
    Kerberos,
    /// Username/password checked by a user-supplied provider
    Custom,
    /// Username/password checked against PAM
    Pam,
}

impl AuthType {
    /// All supported types
    pub const ALL: [AuthType; 6] = [
        AuthType::NoSasl,
        AuthType::None,
        AuthType::Ldap,
        AuthType::Kerberos,
        AuthType::Custom,
        AuthType::Pam,
    ];

    /// Canonical configuration name
    pub fn name(&self) -> &'static str {
        match self {
            AuthType::NoSasl => "NOSASL",
            AuthType::None => "NONE",
            AuthType::Ldap => "LDAP",
            AuthType::Kerberos => "KERBEROS",
            AuthType::Custom => "CUSTOM",
            AuthType::Pam => "PAM",
        }
    }

    /// Parse a configured name (case-insensitive)
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                AuthError::Config(format!("Unsupported authentication type {}", name))
            })
    }

    /// Resolve the effective type, applying the transport-mode default when unset
    ///
    /// HTTP transport defaults to `NOSASL`, binary transport to `NONE`.
    pub fn resolve(configured: Option<&str>, http_transport: bool) -> Result<Self> {
        match configured {
            Some(name) if !name.trim().is_empty() => Self::parse(name),
            _ if http_transport => Ok(AuthType::NoSasl),
            _ => Ok(AuthType::None),
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AuthType {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Wire transport mode of the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Raw Thrift over TCP
    Binary,
    /// Thrift over HTTP
    Http,
}

impl TransportMode {
    /// Parse a configured mode; anything other than "http" is binary
    pub fn parse(mode: &str) -> Self {
        if mode.trim().eq_ignore_ascii_case("http") {
            TransportMode::Http
        } else {
            TransportMode::Binary
        }
    }

    /// Returns true for HTTP
    pub fn is_http(&self) -> bool {
        matches!(self, TransportMode::Http)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(AuthType::parse("kerberos").unwrap(), AuthType::Kerberos);
        assert_eq!(AuthType::parse("Ldap").unwrap(), AuthType::Ldap);
        assert_eq!(AuthType::parse("NOSASL").unwrap(), AuthType::NoSasl);
        assert_eq!(AuthType::parse(" pam ").unwrap(), AuthType::Pam);
        assert_eq!("custom".parse::<AuthType>().unwrap(), AuthType::Custom);
    }

    #[test]
    fn test_parse_unsupported() {
        for bad in ["", "OAUTH", "kerberos5", "NO_SASL", "none!"] {
            let err = AuthType::parse(bad).unwrap_err();
            assert!(err.is_fatal(), "{} should be fatal", bad);
            assert!(err.to_string().contains("Unsupported authentication type"));
        }
    }

    #[test]
    fn test_resolve_defaults() {
        assert_eq!(AuthType::resolve(None, true).unwrap(), AuthType::NoSasl);
        assert_eq!(AuthType::resolve(None, false).unwrap(), AuthType::None);
        assert_eq!(AuthType::resolve(Some(""), false).unwrap(), AuthType::None);
        assert_eq!(
            AuthType::resolve(Some("kerberos"), true).unwrap(),
            AuthType::Kerberos
        );
    }

    #[test]
    fn test_name_roundtrip() {
        for t in AuthType::ALL {
            assert_eq!(AuthType::parse(t.name()).unwrap(), t);
            assert_eq!(t.to_string(), t.name());
        }
    }

    #[test]
    fn test_transport_mode() {
        assert!(TransportMode::parse("HTTP").is_http());
        assert!(!TransportMode::parse("binary").is_http());
        assert!(!TransportMode::parse("anything").is_http());
    }
}
