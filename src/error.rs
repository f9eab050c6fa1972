//! Error types for the authentication layer
//!
//! This module defines the error taxonomy used by strategy selection, Kerberos
//! login, delegation tokens and proxy authorization, and maps every variant to
//! the SQL-state code reported to clients.

use thiserror::Error;

/// Result type alias for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// SQL state reported for every authentication and token failure.
///
/// Clients match on this value, so it must not change.
pub const AUTH_SQL_STATE: &str = "08S01";

/// SQL state for failures that are not authentication related
pub const GENERAL_SQL_STATE: &str = "HY000";

/// Authentication layer errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Fatal configuration problem detected at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Delegation token operation attempted without Kerberos
    #[error("{0}")]
    AuthUnavailable(String),

    /// Token could not be issued
    #[error("Token issuance failed: {0}")]
    TokenIssuance(String),

    /// Token is malformed, forged, cancelled or expired
    #[error("Invalid delegation token: {0}")]
    TokenInvalid(String),

    /// Backing token store could not be reached
    #[error("Token store error: {0}")]
    TokenStore(String),

    /// Impersonation request denied
    #[error(
        "Failed to validate proxy privilege of {real_user} for {proxy_user} from {remote_address}: {reason}"
    )]
    ProxyAuthorization {
        real_user: String,
        proxy_user: String,
        remote_address: String,
        reason: String,
    },

    /// Login against the credential authority failed
    #[error("Login failed: {0}")]
    Login(String),

    /// SASL negotiation with a client failed
    #[error("SASL negotiation failed: {0}")]
    Negotiation(String),

    /// Credentials presented by a client were rejected
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    // ========== Error Context Builders ==========

    /// Create a configuration error for a specific setting
    ///
    /// # Example
    /// ```ignore
    /// AuthError::config("kerberos_keytab", "must not be empty")
    /// // produces: "Configuration error: kerberos_keytab: must not be empty"
    /// ```
    pub fn config(setting: &str, reason: impl Into<String>) -> Self {
        AuthError::Config(format!("{}: {}", setting, reason.into()))
    }

    /// Error returned by every token operation when Kerberos is not active
    pub fn tokens_unavailable() -> Self {
        AuthError::AuthUnavailable(
            "Delegation token only supported over kerberos authentication".to_string(),
        )
    }

    /// Create a token validation error
    pub fn token_invalid(reason: impl Into<String>) -> Self {
        AuthError::TokenInvalid(reason.into())
    }

    /// Create a token issuance error
    pub fn token_issuance(reason: impl Into<String>) -> Self {
        AuthError::TokenIssuance(reason.into())
    }

    /// Create a token store error with operation context
    pub fn token_store(operation: &str, detail: impl Into<String>) -> Self {
        AuthError::TokenStore(format!("{}: {}", operation, detail.into()))
    }

    /// Create a proxy authorization error
    pub fn proxy_denied(
        real_user: &str,
        proxy_user: &str,
        remote_address: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        AuthError::ProxyAuthorization {
            real_user: real_user.to_string(),
            proxy_user: proxy_user.to_string(),
            remote_address: remote_address.unwrap_or("unknown").to_string(),
            reason: reason.into(),
        }
    }

    // ========== Client Status Conversion ==========

    /// SQL state code reported to clients for this error
    pub fn sql_state(&self) -> &'static str {
        match self {
            AuthError::Config(_)
            | AuthError::AuthUnavailable(_)
            | AuthError::TokenIssuance(_)
            | AuthError::TokenInvalid(_)
            | AuthError::TokenStore(_)
            | AuthError::ProxyAuthorization { .. }
            | AuthError::Login(_)
            | AuthError::Negotiation(_)
            | AuthError::AuthenticationFailed(_) => AUTH_SQL_STATE,
            AuthError::Io(_) => GENERAL_SQL_STATE,
        }
    }

    /// Returns true if the server must not start after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthError::Config(_))
    }

    /// Returns true if the error concerns a single client request and the
    /// connection may continue
    pub fn is_connection_scoped(&self) -> bool {
        matches!(
            self,
            AuthError::AuthUnavailable(_)
                | AuthError::TokenIssuance(_)
                | AuthError::TokenInvalid(_)
                | AuthError::TokenStore(_)
                | AuthError::ProxyAuthorization { .. }
        )
    }

    /// Build the status returned to a client over RPC
    pub fn to_client_status(&self) -> ClientStatus {
        ClientStatus {
            sql_state: self.sql_state(),
            message: self.to_string(),
        }
    }
}

/// Error status sent back to RPC clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    /// SQL state code
    pub sql_state: &'static str,

    /// Human readable message
    pub message: String,
}

impl From<&AuthError> for ClientStatus {
    fn from(err: &AuthError) -> Self {
        err.to_client_status()
    }
}
