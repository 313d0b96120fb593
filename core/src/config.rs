//! Client configuration shared by every request a dispatcher sends.
//!
//! # Design
//! `ClientConfig` is an immutable value. The dispatcher keeps the current
//! one behind an `Arc` and each request takes its own snapshot, so setters
//! only ever affect requests dispatched afterwards.

use std::env;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::security::{DefaultSecurityPolicy, SecurityPolicy};

pub const ENV_BASE_URL: &str = "TSNET_BASE_URL";
pub const ENV_USERNAME: &str = "TSNET_USERNAME";
pub const ENV_PASSWORD: &str = "TSNET_PASSWORD";
pub const ENV_PARAMETER_ENCODING: &str = "TSNET_PARAMETER_ENCODING";

/// HTTP basic-auth username and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn header_value(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How parameters are written into the body of POST, PUT and PATCH requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterEncoding {
    /// `application/x-www-form-urlencoded`
    #[default]
    Form,
    /// `application/json`
    Json,
}

impl ParameterEncoding {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "form" => Some(ParameterEncoding::Form),
            "json" => Some(ParameterEncoding::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    credentials: Option<Credentials>,
    security_policy: Arc<dyn SecurityPolicy>,
    parameter_encoding: ParameterEncoding,
    headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            credentials: None,
            security_policy: Arc::new(DefaultSecurityPolicy::default()),
            parameter_encoding: ParameterEncoding::default(),
            headers: vec![(
                "User-Agent".to_string(),
                concat!("tsnet/", env!("CARGO_PKG_VERSION")).to_string(),
            )],
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self::default().with_base_url(base_url)
    }

    /// Build a configuration from `TSNET_*` environment variables, loading a
    /// `.env` file first if one exists. Unset variables keep their defaults;
    /// credentials are only applied when both username and password are set.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::new(&env::var(ENV_BASE_URL).unwrap_or_default());
        if let (Ok(username), Ok(password)) = (env::var(ENV_USERNAME), env::var(ENV_PASSWORD)) {
            config = config.with_credentials(Some(Credentials::new(username, password)));
        }
        if let Ok(raw) = env::var(ENV_PARAMETER_ENCODING) {
            match ParameterEncoding::parse(&raw) {
                Some(encoding) => config = config.with_parameter_encoding(encoding),
                None => tracing::warn!(value = %raw, "ignoring unknown {ENV_PARAMETER_ENCODING}"),
            }
        }
        config
    }

    /// Trailing slashes are dropped so paths join with exactly one `/`.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_security_policy(mut self, policy: Arc<dyn SecurityPolicy>) -> Self {
        self.security_policy = policy;
        self
    }

    pub fn with_parameter_encoding(mut self, encoding: ParameterEncoding) -> Self {
        self.parameter_encoding = encoding;
        self
    }

    /// Add a header sent with every request. A header with the same name
    /// (case-insensitive) is replaced.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn security_policy(&self) -> &Arc<dyn SecurityPolicy> {
        &self.security_policy
    }

    pub fn parameter_encoding(&self) -> ParameterEncoding {
        self.parameter_encoding
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}
