//! TLS configuration for the Thrift server socket
//!
//! This module provides TLS-related configuration, including the list of
//! protocol versions that must be disabled on the server socket.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// TLS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Enable TLS (default: false)
    pub enabled: bool,
    /// Path to certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to private key file (PEM format)
    pub key_path: PathBuf,
    /// Protocol versions to remove from the enabled set (e.g. "TLSv1", "SSLv3")
    pub blacklisted_protocol_versions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_config_default_values() {
        let config = TlsConfig::default();

        assert!(!config.enabled);
        assert_eq!(config.cert_path, PathBuf::new());
        assert_eq!(config.key_path, PathBuf::new());
        assert!(config.blacklisted_protocol_versions.is_empty());
    }

    #[test]
    fn test_tls_config_deserialize_json() {
        let json = r#"{
            "enabled": true,
            "cert_path": "/ssl/server.crt",
            "key_path": "/ssl/server.key",
            "blacklisted_protocol_versions": ["SSLv2", "SSLv3", "TLSv1"]
        }"#;

        let config: TlsConfig = serde_json::from_str(json).unwrap();

        assert!(config.enabled);
        assert_eq!(config.cert_path, PathBuf::from("/ssl/server.crt"));
        assert_eq!(config.blacklisted_protocol_versions.len(), 3);
    }
}
