//! Authentication layer for the Thrift SQL server
//!
//! This module decides how connections authenticate and manages the
//! credentials that back that decision.
//!
//! ## Components
//!
//! - **Strategy selection**: maps the configured [`AuthType`] to transport and
//!   processor factories (`strategy`, `factory`)
//! - **Server credentials**: Kerberos keytab login with freshness checks
//!   (`login`, `credentials`, `principal`)
//! - **Delegation tokens**: HMAC-signed tokens with renewal, cancellation and
//!   master-key rotation (`delegation_token`, `token_store`)
//! - **Proxy users**: impersonation checks against the credential authority
//!   (`proxy`)
//! - **Sessions**: per-connection identity after negotiation (`session`)
//! - **SASL**: QOP, mechanisms and PLAIN password sub-strategies (`sasl`)

mod auth_type;
pub mod clock;
pub mod credentials;
pub mod delegation_token;
pub mod factory;
pub mod login;
pub mod principal;
pub mod proxy;
pub mod sasl;
pub mod session;
pub mod strategy;
pub mod token_store;

pub use auth_type::{AuthType, TransportMode};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{CredentialAuthority, LocalCredentialAuthority, LoginIdentity, ProxySubject};
pub use delegation_token::{
    spawn_maintenance_task, DelegationTokenConfig, DelegationTokenManager, DelegationTokenStats,
    TokenIdentifier, TokenInfo,
};
pub use factory::{AuthFactory, AuthFactoryBuilder};
pub use login::{
    login_from_keytab, login_from_spnego_keytab, needs_login, LoginOutcome,
    ServerCredentialContext, ServerLogin,
};
pub use principal::{server_principal, short_name, KerberosName};
pub use proxy::{ProxyAuthorizationRequest, ProxyAuthorizer};
pub use sasl::{
    AnonymousAuthenticator, PasswordAuthenticator, PasswordAuthenticators, SaslMechanism,
    SaslPlainAuthenticator, SaslProperties, SaslQop,
};
pub use session::{requested_proxy_user, ConnectionIdentity, SessionIdentityResolver};
pub use strategy::AuthStrategy;
pub use token_store::{FileTokenStore, MasterKeyRecord, MemoryTokenStore, TokenRecord, TokenStore};
