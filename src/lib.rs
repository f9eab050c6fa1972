#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # thriftserver-auth
//!
//! The authentication layer of a Thrift SQL server. It decides, once at
//! startup, how clients authenticate and keeps the credentials behind that
//! decision healthy for the life of the process.
//!
//! ## Features
//!
//! - **Strategy selection**: NOSASL, NONE, LDAP, PAM, CUSTOM and KERBEROS,
//!   with transport-mode dependent defaults
//! - **Kerberos login freshness**: keytab logins are reused until the
//!   principal, keytab path or keytab contents change
//! - **Delegation tokens**: issue, verify, renew and cancel with rotating
//!   HMAC master keys and pluggable storage
//! - **Proxy users**: impersonation checked against the credential authority
//!   on every request
//! - **TLS**: protocol blacklist applied to the server socket
//!
//! ## Library Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use thriftserver_auth::auth::{AuthFactory, LocalCredentialAuthority, ServerCredentialContext};
//! use thriftserver_auth::config::AuthConfig;
//!
//! # fn main() -> thriftserver_auth::Result<()> {
//! let authority = Arc::new(LocalCredentialAuthority::new(false, vec![]));
//! let credentials = Arc::new(ServerCredentialContext::new(authority));
//!
//! let factory = AuthFactory::builder(AuthConfig::default(), credentials).build()?;
//! println!("authentication: {}", factory.auth_type());
//! # Ok(())
//! # }
//! ```

// Test code is exempt via #[cfg(test)].
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod telemetry;
pub mod transport;

pub use auth::{AuthFactory, AuthStrategy, AuthType, DelegationTokenManager, TransportMode};
pub use config::{AuthConfig, ServerArgs, ServerConfig, TlsConfig};
pub use error::{AuthError, ClientStatus, Result};
