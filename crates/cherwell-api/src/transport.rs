// Transport boundary and shared HTTP client configuration.
//
// The RPC client only needs two primitives from the wire: list the
// service's operations, and invoke one by name with a parameter map.
// `SoapTransport` is the production implementation; tests script their own.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;

use crate::catalog::OperationDescriptor;
use crate::error::{Error, TransportError};

/// TLS verification mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed on-prem servers).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// The client keeps no cookie store of its own: the session token is
    /// owned by the RPC client and attached explicitly on every call.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("cherwell-rs/", env!("CARGO_PKG_VERSION")));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

/// Opaque session credential (the `Cookie` header value captured at login).
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// A parsed response from the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Response structure, e.g. `{"LoginResponse": {"LoginResult": "true"}}`.
    pub body: serde_json::Value,
    /// Session credential issued with this response, if any.
    pub session_token: Option<SessionToken>,
}

impl Reply {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            body,
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: SessionToken) -> Self {
        self.session_token = Some(token);
        self
    }
}

/// Wire-level RPC primitive consumed by [`RpcClient`](crate::RpcClient).
pub trait Transport: Send + Sync {
    /// Discover the operations the service exposes.
    fn list_operations(
        &self,
    ) -> impl Future<Output = Result<Vec<OperationDescriptor>, TransportError>> + Send;

    /// Invoke `operation` with named parameters, attaching `session` when given.
    fn invoke(
        &self,
        operation: &str,
        params: &IndexMap<String, String>,
        session: Option<&SessionToken>,
    ) -> impl Future<Output = Result<Reply, TransportError>> + Send;
}
