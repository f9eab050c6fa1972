//! Per-connection identity after negotiation

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::OnceLock;

use tracing::debug;

use crate::config::PROXY_USER_SESSION_KEY;
use crate::error::{AuthError, Result};

/// Who is on the other end of a connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionIdentity {
    remote_user: Option<String>,
    remote_address: Option<IpAddr>,
}

impl ConnectionIdentity {
    /// Identity of a connection that negotiated a user
    pub fn authenticated(user: impl Into<String>, remote_address: Option<IpAddr>) -> Self {
        Self {
            remote_user: Some(user.into()),
            remote_address,
        }
    }

    /// Identity of a pass-through connection
    pub fn anonymous(remote_address: Option<IpAddr>) -> Self {
        Self {
            remote_user: None,
            remote_address,
        }
    }

    /// Authenticated user, `None` when no negotiation took place
    pub fn remote_user(&self) -> Option<&str> {
        self.remote_user.as_deref()
    }

    /// Peer address, `None` when the transport could not report it
    pub fn remote_address(&self) -> Option<IpAddr> {
        self.remote_address
    }
}

/// Read-only view of one connection's identity
///
/// The identity is set exactly once, when negotiation completes. Before that
/// both accessors report nothing.
#[derive(Debug, Default)]
pub struct SessionIdentityResolver {
    identity: OnceLock<ConnectionIdentity>,
}

impl SessionIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the negotiated identity; a second call is rejected
    pub fn establish(&self, identity: ConnectionIdentity) -> Result<()> {
        debug!(
            user = identity.remote_user().unwrap_or("<none>"),
            address = ?identity.remote_address(),
            "Connection identity established"
        );
        self.identity.set(identity).map_err(|_| {
            AuthError::Negotiation("connection identity already established".to_string())
        })
    }

    /// Whether negotiation has completed
    pub fn is_established(&self) -> bool {
        self.identity.get().is_some()
    }

    pub fn identity(&self) -> Option<&ConnectionIdentity> {
        self.identity.get()
    }

    pub fn remote_user(&self) -> Option<&str> {
        self.identity.get().and_then(ConnectionIdentity::remote_user)
    }

    pub fn remote_address(&self) -> Option<IpAddr> {
        self.identity.get().and_then(ConnectionIdentity::remote_address)
    }
}

/// Identity a client asked to impersonate in its session configuration
pub fn requested_proxy_user(session_conf: &HashMap<String, String>) -> Option<&str> {
    session_conf
        .get(PROXY_USER_SESSION_KEY)
        .map(|user| user.trim())
        .filter(|user| !user.is_empty())
}
