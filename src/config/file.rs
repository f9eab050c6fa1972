//! Configuration file support
//!
//! This module provides TOML configuration file parsing. Values from the file
//! are merged under command-line arguments (see [`super::merge_config_with_args`]).
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! bind_host = "0.0.0.0"
//! port = 10000
//! log_level = "info"
//!
//! [auth]
//! auth_type = "KERBEROS"
//! transport_mode = "binary"
//! kerberos_principal = "hive/_HOST@EXAMPLE.COM"
//! kerberos_keytab = "/etc/security/keytabs/hive.keytab"
//! sasl_qop = "auth-conf"
//!
//! [[auth.proxy_users]]
//! real_user = "hue"
//! hosts = ["10.0.0.12"]
//! users = ["*"]
//!
//! [tls]
//! enabled = true
//! cert_path = "/etc/thriftserver/server.crt"
//! key_path = "/etc/thriftserver/server.key"
//! blacklisted_protocol_versions = ["SSLv2", "SSLv3", "TLSv1", "TLSv1.1"]
//!
//! [delegation_token]
//! max_lifetime_ms = 604800000
//! renew_interval_ms = 86400000
//! retained_master_keys = 8
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::DelegationTokenConfig;
use crate::error::{AuthError, Result};

use super::auth::AuthConfig;
use super::tls::TlsConfig;

/// Root configuration structure for TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Server configuration
    pub server: ServerSection,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// TLS configuration
    pub tls: TlsConfig,

    /// Delegation token configuration
    pub delegation_token: DelegationTokenConfig,
}

/// Server section configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host to bind
    pub bind_host: Option<String>,

    /// Port to bind
    pub port: Option<u16>,

    /// Log level
    pub log_level: Option<String>,

    /// Directory for the file-backed token store
    pub token_store_dir: Option<PathBuf>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AuthError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&contents).map_err(|e| match e {
            AuthError::Config(msg) => {
                AuthError::Config(format!("Failed to parse config file {:?}: {}", path, msg))
            }
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| AuthError::Config(e.to_string()))
    }
}
