//! Authentication facade for the Thrift server
//!
//! [`AuthFactory`] is built once at startup. It selects the strategy, owns
//! the delegation token manager (Kerberos only) and answers the per-request
//! questions the RPC handlers ask: token operations, impersonation checks and
//! the effective session user.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::auth::clock::{Clock, SystemClock};
use crate::auth::delegation_token::{
    spawn_maintenance_task, DelegationTokenConfig, DelegationTokenManager,
};
use crate::auth::login::ServerCredentialContext;
use crate::auth::proxy::{ProxyAuthorizationRequest, ProxyAuthorizer};
use crate::auth::sasl::{PasswordAuthenticators, SaslProperties};
use crate::auth::session::{requested_proxy_user, SessionIdentityResolver};
use crate::auth::strategy::AuthStrategy;
use crate::auth::token_store::{MemoryTokenStore, TokenStore};
use crate::auth::AuthType;
use crate::config::{AuthConfig, CLIENT_TOKEN_SERVICE};
use crate::error::{AuthError, Result};
use crate::transport::{ProcessorFactory, SaslNegotiator, ServerTransport, TransportFactory};

/// Builder for [`AuthFactory`]
pub struct AuthFactoryBuilder {
    config: AuthConfig,
    credentials: Arc<ServerCredentialContext>,
    authenticators: PasswordAuthenticators,
    token_config: DelegationTokenConfig,
    token_store: Option<Arc<dyn TokenStore>>,
    clock: Arc<dyn Clock>,
}

impl AuthFactoryBuilder {
    /// Register the password backends for LDAP, PAM or CUSTOM
    pub fn authenticators(mut self, authenticators: PasswordAuthenticators) -> Self {
        self.authenticators = authenticators;
        self
    }

    pub fn token_config(mut self, config: DelegationTokenConfig) -> Self {
        self.token_config = config;
        self
    }

    /// Persist delegation tokens in `store` (in-memory by default)
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Select the strategy and, under Kerberos, start the token manager
    pub fn build(self) -> Result<AuthFactory> {
        let strategy =
            AuthStrategy::select(&self.config, &self.credentials, &self.authenticators)?;

        let tokens = if strategy.auth_type() == AuthType::Kerberos {
            let store = self
                .token_store
                .unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
            Some(Arc::new(DelegationTokenManager::new(
                self.token_config,
                store,
                self.clock,
            )?))
        } else {
            None
        };

        let authorizer = ProxyAuthorizer::new(Arc::clone(self.credentials.authority()));

        Ok(AuthFactory {
            config: self.config,
            strategy,
            credentials: self.credentials,
            authorizer,
            tokens,
        })
    }
}

/// Authentication facade
#[derive(Debug)]
pub struct AuthFactory {
    config: AuthConfig,
    strategy: AuthStrategy,
    credentials: Arc<ServerCredentialContext>,
    authorizer: ProxyAuthorizer,
    tokens: Option<Arc<DelegationTokenManager>>,
}

impl AuthFactory {
    /// Start building a factory for `config`
    pub fn builder(
        config: AuthConfig,
        credentials: Arc<ServerCredentialContext>,
    ) -> AuthFactoryBuilder {
        AuthFactoryBuilder {
            config,
            credentials,
            authenticators: PasswordAuthenticators::new(),
            token_config: DelegationTokenConfig::default(),
            token_store: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn strategy(&self) -> &AuthStrategy {
        &self.strategy
    }

    pub fn auth_type(&self) -> AuthType {
        self.strategy.auth_type()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<ServerCredentialContext> {
        &self.credentials
    }

    /// Transport factory for new connections
    pub fn transport_factory(
        &self,
        negotiator: Arc<dyn SaslNegotiator>,
    ) -> Arc<dyn TransportFactory> {
        self.strategy.transport_factory(negotiator)
    }

    /// Processor factory for new connections
    pub fn processor_factory(&self) -> Arc<dyn ProcessorFactory> {
        self.strategy.processor_factory()
    }

    /// SASL properties derived from the configured QOP
    pub fn sasl_properties(&self) -> Result<SaslProperties> {
        match self.strategy.sasl_properties() {
            Some(properties) => Ok(properties.clone()),
            None => SaslProperties::from_qop(&self.config.sasl_qop),
        }
    }

    /// The token manager, if delegation tokens are available
    pub fn token_manager(&self) -> Option<&Arc<DelegationTokenManager>> {
        self.tokens.as_ref()
    }

    /// Token manager behind a live Kerberos login
    fn tokens(&self) -> Result<&DelegationTokenManager> {
        match self.tokens.as_deref() {
            Some(manager) if self.credentials.is_established() => Ok(manager),
            _ => Err(AuthError::tokens_unavailable()),
        }
    }

    // ========== Delegation tokens ==========

    /// Issue a token for `owner`
    ///
    /// `caller` is the authenticated user making the request. A caller asking
    /// for another owner's token must be allowed to impersonate that owner.
    pub fn get_delegation_token(
        &self,
        owner: &str,
        renewer: &str,
        caller: &str,
        remote_address: Option<&str>,
    ) -> Result<String> {
        let tokens = self.tokens()?;
        self.verify_proxy_access(caller, owner, remote_address)?;

        tokens.issue(owner, renewer, caller, CLIENT_TOKEN_SERVICE)
    }

    /// Cancel a token; unknown tokens are ignored
    pub fn cancel_delegation_token(&self, token: &str) -> Result<()> {
        self.tokens()?.cancel(token)
    }

    /// Renew a token on behalf of `renewer`; returns the new expiry
    pub fn renew_delegation_token(&self, token: &str, renewer: &str) -> Result<u64> {
        self.tokens()?.renew(token, renewer)
    }

    /// Verify a token and return its owner
    pub fn verify_delegation_token(&self, token: &str) -> Result<String> {
        self.tokens()?.verify(token)
    }

    /// Owner of a valid token
    pub fn get_user_from_token(&self, token: &str) -> Result<String> {
        self.tokens()?.get_user_from_token(token)
    }

    /// Start the key-roll and expired-token sweep task
    ///
    /// Returns `None` when delegation tokens are unavailable.
    pub fn start_token_maintenance(&self) -> Option<tokio::task::JoinHandle<()>> {
        let manager = self.tokens.as_ref()?;
        let interval = Duration::from_millis(manager.config().gc_interval_ms.max(1));
        info!(
            interval_ms = interval.as_millis() as u64,
            "Starting delegation token maintenance"
        );
        Some(spawn_maintenance_task(Arc::clone(manager), interval))
    }

    // ========== Impersonation ==========

    /// Check that `real_user` may act as `proxy_user` from `remote_address`
    pub fn verify_proxy_access(
        &self,
        real_user: &str,
        proxy_user: &str,
        remote_address: Option<&str>,
    ) -> Result<()> {
        self.authorizer.authorize(&ProxyAuthorizationRequest::new(
            real_user,
            proxy_user,
            remote_address,
        ))
    }

    // ========== Sessions ==========

    /// Negotiate a new connection and record its identity in `session`
    pub fn accept_connection(
        &self,
        transport_factory: &dyn TransportFactory,
        transport: &mut dyn ServerTransport,
        session: &SessionIdentityResolver,
    ) -> Result<()> {
        let identity = transport_factory.accept(transport)?;
        session.establish(identity)
    }

    /// Effective user of a new session
    ///
    /// The negotiated remote user wins over the user name the client sent.
    /// When the session configuration asks for a proxy user, the switch is
    /// checked unless the server runs with `NONE` authentication.
    pub fn resolve_session_user(
        &self,
        session: &SessionIdentityResolver,
        client_user: &str,
        session_conf: &HashMap<String, String>,
    ) -> Result<String> {
        let real_user = session.remote_user().unwrap_or(client_user);
        let Some(proxy_user) = requested_proxy_user(session_conf) else {
            return Ok(real_user.to_string());
        };

        if self.auth_type() == AuthType::None {
            debug!(real_user = %real_user, proxy_user = %proxy_user, "Proxy user substituted");
            return Ok(proxy_user.to_string());
        }

        let remote_address = session.remote_address().map(|ip| ip.to_string());
        self.verify_proxy_access(real_user, proxy_user, remote_address.as_deref())?;
        Ok(proxy_user.to_string())
    }

    /// Release the server login on shutdown
    pub fn shutdown(&self) {
        self.credentials.teardown();
        info!("Authentication layer shut down");
    }
}
