//! Pluggable server-trust policy.
//!
//! The dispatcher asks the configured policy to evaluate every request
//! before it reaches the transport, and the transport reads
//! `allows_invalid_certificates` when setting up TLS. Certificate validation
//! itself stays inside the HTTP stack.

use std::fmt;

use url::Url;

use crate::http::HttpRequest;

pub trait SecurityPolicy: fmt::Debug + Send + Sync {
    /// Accept or reject a fully built request. The error string ends up in
    /// `TransportError::Policy`.
    fn evaluate(&self, request: &HttpRequest) -> Result<(), String>;

    /// Whether the transport may skip certificate verification.
    fn allows_invalid_certificates(&self) -> bool {
        false
    }
}

/// Accepts every request. Certificate verification stays on unless
/// explicitly relaxed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSecurityPolicy {
    allow_invalid_certificates: bool,
}

impl DefaultSecurityPolicy {
    pub fn allowing_invalid_certificates() -> Self {
        Self {
            allow_invalid_certificates: true,
        }
    }
}

impl SecurityPolicy for DefaultSecurityPolicy {
    fn evaluate(&self, _request: &HttpRequest) -> Result<(), String> {
        Ok(())
    }

    fn allows_invalid_certificates(&self) -> bool {
        self.allow_invalid_certificates
    }
}

/// Only HTTPS requests to an allow-list of hosts.
#[derive(Debug, Clone, Default)]
pub struct PinnedHostPolicy {
    hosts: Vec<String>,
    allow_invalid_certificates: bool,
}

impl PinnedHostPolicy {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|host| host.into().to_ascii_lowercase())
                .collect(),
            allow_invalid_certificates: false,
        }
    }

    /// Accept self-signed or otherwise invalid certificates from the pinned
    /// hosts. Intended for development servers.
    pub fn allowing_invalid_certificates(mut self) -> Self {
        self.allow_invalid_certificates = true;
        self
    }
}

impl SecurityPolicy for PinnedHostPolicy {
    fn evaluate(&self, request: &HttpRequest) -> Result<(), String> {
        let url = Url::parse(&request.url).map_err(|e| e.to_string())?;
        if url.scheme() != "https" {
            return Err(format!("scheme `{}` is not allowed", url.scheme()));
        }
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if self.hosts.iter().any(|pinned| *pinned == host) {
            Ok(())
        } else {
            Err(format!("host `{host}` is not pinned"))
        }
    }

    fn allows_invalid_certificates(&self) -> bool {
        self.allow_invalid_certificates
    }
}
