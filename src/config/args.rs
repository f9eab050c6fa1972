//! Command-line arguments for the auth-check binary
//!
//! This module defines the CLI arguments structure using clap.

use clap::Parser;
use std::path::PathBuf;

use super::defaults::*;

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "auth-check")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate and initialise the Thrift SQL server authentication layer")]
pub struct ServerArgs {
    /// Path to configuration file (TOML format)
    #[arg(short, long, env = "THRIFTSERVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host the server binds to
    #[arg(long, env = "THRIFTSERVER_BIND_HOST", default_value = DEFAULT_BIND_HOST)]
    pub bind_host: String,

    /// Thrift port
    #[arg(long, env = "THRIFTSERVER_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "THRIFTSERVER_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Authentication type (NOSASL, NONE, LDAP, KERBEROS, CUSTOM, PAM)
    #[arg(long, env = "THRIFTSERVER_AUTHENTICATION")]
    pub auth_type: Option<String>,

    /// Transport mode (binary or http)
    #[arg(long, env = "THRIFTSERVER_TRANSPORT_MODE", default_value = DEFAULT_TRANSPORT_MODE)]
    pub transport_mode: String,

    /// Kerberos server principal
    #[arg(long, env = "THRIFTSERVER_KERBEROS_PRINCIPAL")]
    pub kerberos_principal: Option<String>,

    /// Kerberos keytab path
    #[arg(long, env = "THRIFTSERVER_KERBEROS_KEYTAB")]
    pub kerberos_keytab: Option<String>,

    /// SPNEGO principal
    #[arg(long, env = "THRIFTSERVER_SPNEGO_PRINCIPAL")]
    pub spnego_principal: Option<String>,

    /// SPNEGO keytab path
    #[arg(long, env = "THRIFTSERVER_SPNEGO_KEYTAB")]
    pub spnego_keytab: Option<String>,

    /// SASL quality of protection (auth, auth-int, auth-conf)
    #[arg(long, env = "THRIFTSERVER_SASL_QOP", default_value = DEFAULT_SASL_QOP)]
    pub sasl_qop: String,

    /// Enable TLS on the server socket
    #[arg(long, env = "THRIFTSERVER_TLS_ENABLED")]
    pub tls_enabled: bool,

    /// TLS certificate (PEM)
    #[arg(long, env = "THRIFTSERVER_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long, env = "THRIFTSERVER_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Comma separated protocol versions to disable (e.g. TLSv1,TLSv1.1)
    #[arg(long, env = "THRIFTSERVER_TLS_BLACKLIST", value_delimiter = ',')]
    pub tls_blacklisted_protocols: Vec<String>,

    /// Directory for persisted delegation tokens (in-memory when unset)
    #[arg(long, env = "THRIFTSERVER_TOKEN_STORE_DIR")]
    pub token_store_dir: Option<PathBuf>,
}
