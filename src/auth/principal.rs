//! Kerberos principal names
//!
//! Principals take the form `service/host@REALM`; the host and realm parts are
//! optional. A host component of `_HOST` is a placeholder for the server's own
//! host name and is substituted before login.

use std::fmt;

use crate::config::HOST_PLACEHOLDER;
use crate::error::{AuthError, Result};

/// A parsed Kerberos principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KerberosName {
    service: String,
    host: Option<String>,
    realm: Option<String>,
}

impl KerberosName {
    /// Parse `service[/host][@REALM]`
    pub fn parse(principal: &str) -> Result<Self> {
        let principal = principal.trim();
        if principal.is_empty() {
            return Err(AuthError::Login("empty Kerberos principal".to_string()));
        }

        let (name, realm) = match principal.split_once('@') {
            Some((name, realm)) => (name, Some(realm)),
            None => (principal, None),
        };
        let (service, host) = match name.split_once('/') {
            Some((service, host)) => (service, Some(host)),
            None => (name, None),
        };

        if service.is_empty()
            || host.is_some_and(|h| h.is_empty() || h.contains('/'))
            || realm.is_some_and(|r| r.is_empty() || r.contains('@'))
        {
            return Err(AuthError::Login(format!(
                "malformed Kerberos principal: {}",
                principal
            )));
        }

        Ok(Self {
            service: service.to_string(),
            host: host.map(str::to_string),
            realm: realm.map(str::to_string),
        })
    }

    /// First component of the principal
    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }
}

impl fmt::Display for KerberosName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service)?;
        if let Some(host) = &self.host {
            write!(f, "/{}", host)?;
        }
        if let Some(realm) = &self.realm {
            write!(f, "@{}", realm)?;
        }
        Ok(())
    }
}

/// Service name of a principal, or the input unchanged if it does not parse
pub fn short_name(principal: &str) -> String {
    KerberosName::parse(principal)
        .map(|name| name.service_name().to_string())
        .unwrap_or_else(|_| principal.to_string())
}

/// Replace a `_HOST` host component with the lower-cased bind host
///
/// A bind host of `0.0.0.0` or empty resolves to the local host name.
/// Principals without the placeholder are returned unchanged.
pub fn server_principal(principal: &str, bind_host: &str) -> Result<String> {
    let mut name = KerberosName::parse(principal)?;
    if name.host() != Some(HOST_PLACEHOLDER) {
        return Ok(principal.trim().to_string());
    }

    let host = match bind_host.trim() {
        "" | "0.0.0.0" | "::" => local_hostname()?,
        other => other.to_string(),
    };
    name.host = Some(host.to_lowercase());
    Ok(name.to_string())
}

fn local_hostname() -> Result<String> {
    whoami::fallible::hostname()
        .map_err(|e| AuthError::Login(format!("unable to resolve local host name: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_principal() {
        let name = KerberosName::parse("hive/node1.example.com@EXAMPLE.COM").unwrap();
        assert_eq!(name.service_name(), "hive");
        assert_eq!(name.host(), Some("node1.example.com"));
        assert_eq!(name.realm(), Some("EXAMPLE.COM"));
        assert_eq!(name.to_string(), "hive/node1.example.com@EXAMPLE.COM");
    }

    #[test]
    fn test_parse_user_principal() {
        let name = KerberosName::parse("alice@EXAMPLE.COM").unwrap();
        assert_eq!(name.service_name(), "alice");
        assert!(name.host().is_none());

        let bare = KerberosName::parse("alice").unwrap();
        assert!(bare.realm().is_none());
    }

    #[test]
    fn test_parse_malformed() {
        for bad in ["", "@EXAMPLE.COM", "hive/@EXAMPLE.COM", "hive/a/b@R", "a@b@c"] {
            assert!(KerberosName::parse(bad).is_err(), "{} should not parse", bad);
        }
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("hive/node1@EXAMPLE.COM"), "hive");
        assert_eq!(short_name("bob"), "bob");
        assert_eq!(short_name(""), "");
    }

    #[test]
    fn test_host_substitution() {
        let resolved =
            server_principal("hive/_HOST@EXAMPLE.COM", "Node1.Example.COM").unwrap();
        assert_eq!(resolved, "hive/node1.example.com@EXAMPLE.COM");
    }

    #[test]
    fn test_no_placeholder_unchanged() {
        let resolved = server_principal("hive/fixed@EXAMPLE.COM", "other").unwrap();
        assert_eq!(resolved, "hive/fixed@EXAMPLE.COM");
    }

    #[test]
    fn test_wildcard_bind_uses_local_host() {
        let resolved = server_principal("hive/_HOST@EXAMPLE.COM", "0.0.0.0").unwrap();
        assert!(!resolved.contains(HOST_PLACEHOLDER));
        assert!(resolved.starts_with("hive/"));
        assert!(resolved.ends_with("@EXAMPLE.COM"));
    }
}
