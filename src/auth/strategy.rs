//! Authentication strategy selection
//!
//! Maps the configured [`AuthType`] to the transport and processor factories
//! handed to the RPC framework. Selection runs once at startup, before any
//! socket is bound, so an unsupported type stops the server there.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::auth::login::ServerCredentialContext;
use crate::auth::sasl::{
    PasswordAuthenticator, PasswordAuthenticators, SaslPlainAuthenticator, SaslProperties,
};
use crate::auth::AuthType;
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::transport::{
    KerberosTransportFactory, PassThroughTransportFactory, PlainProcessorFactory,
    PlainTransportFactory, ProcessorFactory, RemoteUserProcessorFactory, SaslNegotiator,
    TransportFactory,
};

/// The selected strategy, holding only what its variant needs
#[derive(Clone)]
pub enum AuthStrategy {
    /// No negotiation; the outer transport is trusted
    NoSasl,

    /// No negotiation; the in-band identity is trusted
    None,

    /// PLAIN negotiation checked by a password sub-strategy
    Plain {
        auth_type: AuthType,
        authenticator: Arc<dyn PasswordAuthenticator>,
    },

    /// GSSAPI negotiation under an established server login
    Kerberos {
        server_principal: String,
        properties: SaslProperties,
    },
}

impl AuthStrategy {
    /// Select the strategy for `config`
    ///
    /// Kerberos establishes (or reuses) the server login in `credentials`
    /// before returning. Password types need an authenticator registered in
    /// `authenticators`.
    pub fn select(
        config: &AuthConfig,
        credentials: &ServerCredentialContext,
        authenticators: &PasswordAuthenticators,
    ) -> Result<Self> {
        let auth_type = AuthType::resolve(config.auth_type.as_deref(), config.is_http())?;

        let strategy = match auth_type {
            AuthType::NoSasl => AuthStrategy::NoSasl,
            AuthType::None => AuthStrategy::None,
            AuthType::Ldap | AuthType::Pam | AuthType::Custom => AuthStrategy::Plain {
                auth_type,
                authenticator: authenticators.get(auth_type)?,
            },
            AuthType::Kerberos => Self::kerberos(config, credentials)?,
        };

        info!(
            auth_type = %strategy.auth_type(),
            transport_mode = %config.transport_mode,
            "Selected authentication strategy"
        );
        Ok(strategy)
    }

    fn kerberos(config: &AuthConfig, credentials: &ServerCredentialContext) -> Result<Self> {
        if config.kerberos_principal.trim().is_empty() {
            return Err(AuthError::config(
                "kerberos_principal",
                "must be set when auth_type is KERBEROS",
            ));
        }
        if config.kerberos_keytab.trim().is_empty() {
            return Err(AuthError::config(
                "kerberos_keytab",
                "must be set when auth_type is KERBEROS",
            ));
        }
        let properties = SaslProperties::from_qop(&config.sasl_qop)?;

        let outcome = credentials.ensure_login(
            config.kerberos_principal.trim(),
            config.kerberos_keytab.trim(),
            &config.bind_host,
        )?;

        Ok(AuthStrategy::Kerberos {
            server_principal: outcome.login.principal,
            properties,
        })
    }

    /// Authentication type this strategy implements
    pub fn auth_type(&self) -> AuthType {
        match self {
            AuthStrategy::NoSasl => AuthType::NoSasl,
            AuthStrategy::None => AuthType::None,
            AuthStrategy::Plain { auth_type, .. } => *auth_type,
            AuthStrategy::Kerberos { .. } => AuthType::Kerberos,
        }
    }

    /// SASL properties, present only for Kerberos
    pub fn sasl_properties(&self) -> Option<&SaslProperties> {
        match self {
            AuthStrategy::Kerberos { properties, .. } => Some(properties),
            _ => None,
        }
    }

    /// Transport factory for this strategy
    ///
    /// `negotiator` is the external SASL engine; pass-through strategies
    /// ignore it.
    pub fn transport_factory(
        &self,
        negotiator: Arc<dyn SaslNegotiator>,
    ) -> Arc<dyn TransportFactory> {
        match self {
            AuthStrategy::NoSasl | AuthStrategy::None => Arc::new(PassThroughTransportFactory),
            AuthStrategy::Plain {
                auth_type,
                authenticator,
            } => Arc::new(PlainTransportFactory::new(
                SaslPlainAuthenticator::new(*auth_type, Arc::clone(authenticator)),
                negotiator,
            )),
            AuthStrategy::Kerberos {
                server_principal,
                properties,
            } => Arc::new(KerberosTransportFactory::new(
                server_principal.clone(),
                properties.clone(),
                negotiator,
            )),
        }
    }

    /// Processor factory for this strategy
    pub fn processor_factory(&self) -> Arc<dyn ProcessorFactory> {
        match self {
            AuthStrategy::Kerberos { .. } => Arc::new(RemoteUserProcessorFactory),
            _ => Arc::new(PlainProcessorFactory),
        }
    }
}

impl fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStrategy::NoSasl => f.write_str("NoSasl"),
            AuthStrategy::None => f.write_str("None"),
            AuthStrategy::Plain { auth_type, .. } => {
                f.debug_struct("Plain").field("auth_type", auth_type).finish()
            }
            AuthStrategy::Kerberos {
                server_principal,
                properties,
            } => f
                .debug_struct("Kerberos")
                .field("server_principal", server_principal)
                .field("properties", properties)
                .finish(),
        }
    }
}
