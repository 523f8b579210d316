// ── Runtime session configuration ──
//
// Describes *how* to reach a Cherwell service. Carries credential data and
// transport tuning, but never touches disk: `cherwell-config` (or the
// caller) builds a `SessionConfig` and hands it to `Session::connect`.

use cherwell_api::TransportConfig;
use secrecy::SecretString;

/// Everything needed to open a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Service URL or path to a local WSDL file.
    pub url: String,
    /// Default user for [`Session::login`](crate::Session::login).
    pub username: Option<String>,
    /// Default password for [`Session::login`](crate::Session::login).
    pub password: Option<SecretString>,
    /// TLS and timeout settings for the HTTP client.
    pub transport: TransportConfig,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            transport: TransportConfig::default(),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.username = Some(username.into());
        self.password = Some(password);
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}
