//! Proxy-user (impersonation) authorization
//!
//! Every impersonation attempt is checked against the credential authority.
//! Results are never cached since proxy-group membership can change between
//! calls.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::credentials::{CredentialAuthority, ProxySubject};
use crate::auth::principal::KerberosName;
use crate::error::{AuthError, Result};

/// One impersonation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAuthorizationRequest {
    /// Authenticated identity
    pub real_user: String,

    /// Identity to act as
    pub proxy_user: String,

    /// Network origin of the request
    pub remote_address: Option<String>,
}

impl ProxyAuthorizationRequest {
    pub fn new(real_user: &str, proxy_user: &str, remote_address: Option<&str>) -> Self {
        Self {
            real_user: real_user.to_string(),
            proxy_user: proxy_user.to_string(),
            remote_address: remote_address.map(str::to_string),
        }
    }

    /// True when the request names the caller itself (case-insensitive)
    pub fn is_self(&self) -> bool {
        self.real_user.eq_ignore_ascii_case(&self.proxy_user)
    }

    fn denied(&self, reason: impl Into<String>) -> AuthError {
        AuthError::proxy_denied(
            &self.real_user,
            &self.proxy_user,
            self.remote_address.as_deref(),
            reason,
        )
    }
}

/// Checks impersonation requests against the credential authority
#[derive(Clone)]
pub struct ProxyAuthorizer {
    authority: Arc<dyn CredentialAuthority>,
}

impl ProxyAuthorizer {
    pub fn new(authority: Arc<dyn CredentialAuthority>) -> Self {
        Self { authority }
    }

    /// Authorize `request`
    ///
    /// A request for the caller's own identity is allowed without asking the
    /// authority. Under Kerberos security the real user is reduced to the
    /// service name of its principal and bound as a proxy of the server login
    /// user.
    pub fn authorize(&self, request: &ProxyAuthorizationRequest) -> Result<()> {
        if request.is_self() {
            return Ok(());
        }

        let subject = self.resolve_subject(request)?;
        match self.authority.authorize_proxy(
            &subject,
            &request.proxy_user,
            request.remote_address.as_deref(),
        ) {
            Ok(()) => {
                debug!(
                    real_user = %request.real_user,
                    proxy_user = %request.proxy_user,
                    "Proxy access granted"
                );
                Ok(())
            }
            Err(reason) => {
                warn!(
                    real_user = %request.real_user,
                    proxy_user = %request.proxy_user,
                    remote_address = request.remote_address.as_deref().unwrap_or("unknown"),
                    reason = %reason,
                    "Proxy access denied"
                );
                Err(request.denied(reason))
            }
        }
    }

    fn resolve_subject(&self, request: &ProxyAuthorizationRequest) -> Result<ProxySubject> {
        if !self.authority.is_security_enabled() {
            return Ok(ProxySubject {
                user: request.real_user.clone(),
                via: None,
            });
        }

        let name = KerberosName::parse(&request.real_user)
            .map_err(|e| request.denied(e.to_string()))?;
        let login_user = self
            .authority
            .login_user()
            .map_err(|e| request.denied(e.to_string()))?;

        Ok(ProxySubject {
            user: name.service_name().to_string(),
            via: Some(login_user),
        })
    }
}

impl std::fmt::Debug for ProxyAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyAuthorizer")
            .field("security_enabled", &self.authority.is_security_enabled())
            .finish()
    }
}
