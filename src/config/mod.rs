//! Configuration module
//!
//! This module is organized into submodules:
//! - `defaults` - Default constants and values
//! - `auth` - Authentication strategy, Kerberos and proxy-user configuration
//! - `tls` - TLS configuration
//! - `file` - TOML configuration file
//! - `args` - CLI argument definitions
//! - `merge` - CLI/file merging

mod args;
mod auth;
mod defaults;
pub mod file;
mod merge;
mod tls;

pub use args::ServerArgs;
pub use auth::{AuthConfig, ProxyUserRule};
pub use defaults::*;
pub use file::ConfigFile;
pub use merge::merge_config_with_args;
pub use tls::TlsConfig;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::auth::{AuthType, DelegationTokenConfig, SaslQop};
use crate::error::{AuthError, Result};

/// Complete configuration of the authentication layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind
    pub bind_host: String,

    /// Port to bind
    pub port: u16,

    /// Log level
    pub log_level: String,

    /// Directory for persisted delegation tokens (in-memory store when unset)
    pub token_store_dir: Option<PathBuf>,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// TLS configuration
    pub tls: TlsConfig,

    /// Delegation token configuration
    pub delegation_token: DelegationTokenConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            token_store_dir: None,
            auth: AuthConfig::default(),
            tls: TlsConfig::default(),
            delegation_token: DelegationTokenConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from arguments, reading the configuration file they name
    pub fn from_args(args: ServerArgs) -> Result<Self> {
        let file = match args.config.as_ref() {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        Ok(merge_config_with_args(args, file))
    }

    /// Check the settings that are fatal at startup
    ///
    /// The authentication type and QOP must parse, and Kerberos requires both
    /// a principal and a keytab.
    pub fn validate(&self) -> Result<()> {
        let auth_type = AuthType::resolve(self.auth.auth_type.as_deref(), self.auth.is_http())?;
        SaslQop::parse(&self.auth.sasl_qop)?;

        if auth_type == AuthType::Kerberos {
            if self.auth.kerberos_principal.trim().is_empty() {
                return Err(AuthError::config(
                    "kerberos_principal",
                    "must be set when auth_type is KERBEROS",
                ));
            }
            if self.auth.kerberos_keytab.trim().is_empty() {
                return Err(AuthError::config(
                    "kerberos_keytab",
                    "must be set when auth_type is KERBEROS",
                ));
            }
        }

        if self.tls.enabled
            && (self.tls.cert_path.as_os_str().is_empty()
                || self.tls.key_path.as_os_str().is_empty())
        {
            return Err(AuthError::config(
                "tls",
                "cert_path and key_path are required when TLS is enabled",
            ));
        }

        Ok(())
    }
}
