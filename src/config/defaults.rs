//! Default constants for the authentication configuration
//!
//! These constants define the default values used throughout the configuration
//! system when no explicit value is provided.

/// Default transport mode ("binary" or "http")
pub const DEFAULT_TRANSPORT_MODE: &str = "binary";

/// Default SASL quality of protection
pub const DEFAULT_SASL_QOP: &str = "auth";

/// Default bind host (wildcard)
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default Thrift port
pub const DEFAULT_PORT: u16 = 10000;

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Host placeholder replaced in Kerberos principals
pub const HOST_PLACEHOLDER: &str = "_HOST";

/// Session configuration key naming the identity to impersonate
pub const PROXY_USER_SESSION_KEY: &str = "spark.sql.thriftserver.proxy.user";

/// Service tag stamped into delegation tokens issued to SQL clients
pub const CLIENT_TOKEN_SERVICE: &str = "sparkserverClientToken";

/// Default delegation token max lifetime in milliseconds (7 days)
pub const DEFAULT_TOKEN_MAX_LIFETIME_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Default delegation token renew interval in milliseconds (1 day)
pub const DEFAULT_TOKEN_RENEW_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

/// Default master key rotation interval in milliseconds (1 day)
pub const DEFAULT_KEY_UPDATE_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

/// Default number of master keys kept for verification
pub const DEFAULT_RETAINED_MASTER_KEYS: usize = 8;

/// Default expired token sweep interval in milliseconds (1 hour)
pub const DEFAULT_TOKEN_GC_INTERVAL_MS: u64 = 60 * 60 * 1000;
