//! Server socket setup
//!
//! Resolves the bind address and binds the Thrift listener, with TLS when
//! configured. Framing and dispatch on accepted connections belong to the RPC
//! framework.

pub mod tls;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{AuthError, Result};

pub use tls::{enabled_protocols, filter_protocols, load_tls_config, ENGINE_PROTOCOLS};

/// Address the server socket binds for `host` and `port`
///
/// An empty host binds every interface. IP literals are used as-is; anything
/// else is treated as a host name and resolved at bind time.
pub fn server_address(host: &str, port: u16) -> String {
    let host = host.trim();
    if host.is_empty() {
        return SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port).to_string();
    }
    match host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{}:{}", host, port),
    }
}

/// A bound listener plus the TLS acceptor to wrap its connections with
pub struct ServerSocket {
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
}

impl ServerSocket {
    /// Bind the socket described by `config`
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let tls_acceptor = if config.tls.enabled {
            info!("TLS is enabled, loading TLS configuration");
            Some(tls::load_tls_config(&config.tls)?)
        } else {
            None
        };

        let addr = server_address(&config.bind_host, config.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                AuthError::config(
                    "port",
                    format!("{} is already in use by another process", addr),
                )
            } else {
                AuthError::Io(e)
            }
        })?;

        info!(
            addr = %listener.local_addr()?,
            tls = config.tls.enabled,
            "Thrift listener bound"
        );

        Ok(Self {
            listener,
            tls_acceptor,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn listener(&self) -> &TcpListener {
        &self.listener
    }

    /// Acceptor for TLS connections, `None` for plaintext sockets
    pub fn tls_acceptor(&self) -> Option<&TlsAcceptor> {
        self.tls_acceptor.as_ref()
    }

    pub fn into_parts(self) -> (TcpListener, Option<TlsAcceptor>) {
        (self.listener, self.tls_acceptor)
    }
}
