//! Transport and processor seam
//!
//! The RPC framework owns sockets, framing and method dispatch. This module
//! defines the narrow interfaces it drives and the wrappers the strategy
//! selector hands it:
//!
//! - [`TransportFactory`] runs per-connection negotiation and yields the
//!   connection's [`ConnectionIdentity`]
//! - [`ProcessorFactory`] wraps the framework's RPC [`Processor`] for that
//!   connection
//! - [`SaslNegotiator`] is the external SASL engine; the handshake bytes are
//!   its business, not ours

use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use tracing::{debug, info_span, warn};

use crate::auth::sasl::{SaslMechanism, SaslPlainAuthenticator, SaslProperties};
use crate::auth::session::ConnectionIdentity;
use crate::error::{AuthError, Result};

/// A freshly accepted connection, before any negotiation
pub trait ServerTransport: Send {
    /// Address of the peer, if the transport can report it
    fn peer_addr(&self) -> Option<SocketAddr>;
}

impl ServerTransport for TcpStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        TcpStream::peer_addr(self).ok()
    }
}

/// Parameters for one server-side SASL negotiation
pub struct SaslServerRequest<'a> {
    pub mechanism: SaslMechanism,

    /// Server principal (GSSAPI only)
    pub server_principal: Option<&'a str>,

    /// Negotiation properties (GSSAPI only)
    pub properties: Option<&'a SaslProperties>,

    /// Validates the client's PLAIN response (PLAIN only)
    pub plain: Option<&'a SaslPlainAuthenticator>,
}

/// External SASL engine
pub trait SaslNegotiator: Send + Sync {
    /// Run the server side of the handshake and return the authenticated user
    fn negotiate(
        &self,
        request: &SaslServerRequest<'_>,
        transport: &mut dyn ServerTransport,
    ) -> Result<String>;
}

/// Builds the per-connection transport
pub trait TransportFactory: Send + Sync + fmt::Debug {
    /// Negotiate on a new connection and return who is on the other end
    fn accept(&self, transport: &mut dyn ServerTransport) -> Result<ConnectionIdentity>;

    /// SASL mechanism negotiated, `None` for pass-through
    fn mechanism(&self) -> Option<SaslMechanism>;
}

/// An RPC processor supplied by the framework
pub trait Processor: Send + Sync {
    fn process(&self, identity: &ConnectionIdentity, request: &[u8]) -> Result<Vec<u8>>;
}

/// Wraps the framework's processor for each connection
pub trait ProcessorFactory: Send + Sync + fmt::Debug {
    fn processor(&self, inner: Arc<dyn Processor>) -> Arc<dyn Processor>;

    /// Whether calls run as the negotiated remote user
    fn runs_as_remote_user(&self) -> bool;
}

// ========== Transports ==========

/// No negotiation; only the peer address is recorded
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughTransportFactory;

impl TransportFactory for PassThroughTransportFactory {
    fn accept(&self, transport: &mut dyn ServerTransport) -> Result<ConnectionIdentity> {
        Ok(ConnectionIdentity::anonymous(
            transport.peer_addr().map(|addr| addr.ip()),
        ))
    }

    fn mechanism(&self) -> Option<SaslMechanism> {
        None
    }
}

/// Kerberos (GSSAPI) negotiation under the server principal
pub struct KerberosTransportFactory {
    server_principal: String,
    properties: SaslProperties,
    negotiator: Arc<dyn SaslNegotiator>,
}

impl KerberosTransportFactory {
    pub fn new(
        server_principal: String,
        properties: SaslProperties,
        negotiator: Arc<dyn SaslNegotiator>,
    ) -> Self {
        Self {
            server_principal,
            properties,
            negotiator,
        }
    }

    pub fn server_principal(&self) -> &str {
        &self.server_principal
    }

    pub fn properties(&self) -> &SaslProperties {
        &self.properties
    }
}

impl TransportFactory for KerberosTransportFactory {
    fn accept(&self, transport: &mut dyn ServerTransport) -> Result<ConnectionIdentity> {
        let remote_address = transport.peer_addr().map(|addr| addr.ip());
        let request = SaslServerRequest {
            mechanism: SaslMechanism::Gssapi,
            server_principal: Some(&self.server_principal),
            properties: Some(&self.properties),
            plain: None,
        };
        let user = self.negotiator.negotiate(&request, transport).map_err(|e| {
            warn!(
                error = %e,
                mechanism = request.mechanism.name(),
                "Kerberos negotiation failed"
            );
            match e {
                AuthError::Negotiation(_) => e,
                other => AuthError::Negotiation(other.to_string()),
            }
        })?;
        debug!(user = %user, "Kerberos negotiation complete");
        Ok(ConnectionIdentity::authenticated(user, remote_address))
    }

    fn mechanism(&self) -> Option<SaslMechanism> {
        Some(SaslMechanism::Gssapi)
    }
}

impl fmt::Debug for KerberosTransportFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KerberosTransportFactory")
            .field("server_principal", &self.server_principal)
            .field("properties", &self.properties)
            .finish()
    }
}

/// PLAIN negotiation validated by one password sub-strategy
pub struct PlainTransportFactory {
    authenticator: SaslPlainAuthenticator,
    negotiator: Arc<dyn SaslNegotiator>,
}

impl PlainTransportFactory {
    pub fn new(authenticator: SaslPlainAuthenticator, negotiator: Arc<dyn SaslNegotiator>) -> Self {
        Self {
            authenticator,
            negotiator,
        }
    }

    pub fn authenticator(&self) -> &SaslPlainAuthenticator {
        &self.authenticator
    }
}

impl TransportFactory for PlainTransportFactory {
    fn accept(&self, transport: &mut dyn ServerTransport) -> Result<ConnectionIdentity> {
        let remote_address = transport.peer_addr().map(|addr| addr.ip());
        let request = SaslServerRequest {
            mechanism: SaslMechanism::Plain,
            server_principal: None,
            properties: None,
            plain: Some(&self.authenticator),
        };
        let user = self.negotiator.negotiate(&request, transport)?;
        debug!(
            user = %user,
            auth_type = %self.authenticator.auth_type(),
            "PLAIN negotiation complete"
        );
        Ok(ConnectionIdentity::authenticated(user, remote_address))
    }

    fn mechanism(&self) -> Option<SaslMechanism> {
        Some(SaslMechanism::Plain)
    }
}

impl fmt::Debug for PlainTransportFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainTransportFactory")
            .field("auth_type", &self.authenticator.auth_type())
            .finish()
    }
}

// ========== Processors ==========

/// Hands back the framework's processor unchanged
///
/// The connection identity still reaches it through every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainProcessorFactory;

impl ProcessorFactory for PlainProcessorFactory {
    fn processor(&self, inner: Arc<dyn Processor>) -> Arc<dyn Processor> {
        inner
    }

    fn runs_as_remote_user(&self) -> bool {
        false
    }
}

/// Runs every call as the negotiated remote user
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteUserProcessorFactory;

impl ProcessorFactory for RemoteUserProcessorFactory {
    fn processor(&self, inner: Arc<dyn Processor>) -> Arc<dyn Processor> {
        Arc::new(RemoteUserProcessor { inner })
    }

    fn runs_as_remote_user(&self) -> bool {
        true
    }
}

struct RemoteUserProcessor {
    inner: Arc<dyn Processor>,
}

impl Processor for RemoteUserProcessor {
    fn process(&self, identity: &ConnectionIdentity, request: &[u8]) -> Result<Vec<u8>> {
        let user = identity.remote_user().ok_or_else(|| {
            AuthError::Negotiation("call received before negotiation completed".to_string())
        })?;
        let span = info_span!("remote_user", user = %user);
        let _entered = span.enter();
        self.inner.process(identity, request)
    }
}
