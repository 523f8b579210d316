use thiserror::Error;

use crate::xml::XmlError;

/// Failure raised by a [`Transport`](crate::transport::Transport).
///
/// The RPC client never lets these escape bare: every transport failure
/// reaching a caller is wrapped in [`Error::Soap`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status without a SOAP fault in the body.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered with a SOAP fault.
    #[error("SOAP fault {code}: {message}")]
    Fault {
        code: String,
        message: String,
        detail: Option<String>,
    },

    /// The response (or service description) could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A local service description file could not be read.
    #[error("cannot read service description: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Fault detail text, if the service supplied one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Fault { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

impl From<XmlError> for TransportError {
    fn from(err: XmlError) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Top-level error type for the `cherwell-api` crate.
#[derive(Debug, Error)]
pub enum Error {
    // ── Catalog / dispatch ──────────────────────────────────────────
    /// The operation is not in the discovered catalog. No request was sent.
    #[error("Unknown Cherwell SOAP API method: {operation}")]
    UnknownOperation { operation: String },

    /// Positional arguments do not match the declared parameter count.
    #[error("{operation}: Wrong number of arguments ({got} for {expected})")]
    ArityMismatch {
        operation: String,
        expected: usize,
        got: usize,
    },

    // ── Transport ───────────────────────────────────────────────────
    /// The service description could not be loaded.
    #[error("service discovery failed: {0}")]
    Discovery(#[source] TransportError),

    /// Any transport-level failure, including SOAP faults.
    #[error("SOAPFault from method {operation}: {fault}")]
    Soap {
        operation: String,
        #[source]
        fault: TransportError,
    },

    /// The reply lacked the `<Operation>Response` wrapper.
    #[error("{operation}: response has no {expected} element")]
    MalformedResponse { operation: String, expected: String },

    /// Service URL is neither a local file nor an HTTP(S) URL.
    #[error("Invalid service URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// TLS or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// Fault detail attached to a [`Error::Soap`], if any.
    pub fn fault_detail(&self) -> Option<&str> {
        match self {
            Self::Soap { fault, .. } => fault.detail(),
            _ => None,
        }
    }

    /// Returns `true` if the failure happened before any request was sent.
    pub fn is_dispatch_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownOperation { .. } | Self::ArityMismatch { .. }
        )
    }
}
