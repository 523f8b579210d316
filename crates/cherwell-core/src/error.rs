// ── Core error types ──
//
// User-facing errors from cherwell-core. Consumers never see SOAP envelopes
// or HTTP status codes directly: the `From<cherwell_api::Error>` impl
// translates transport-layer errors into the domain taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Document errors ──────────────────────────────────────────────
    /// The text is not a well-shaped business object.
    #[error("Bad format: {0}")]
    BadFormat(String),

    /// A field that must carry a value is absent or empty.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// A timestamp field holds text that is not a date.
    #[error("Invalid date '{value}': {reason}")]
    InvalidDate { value: String, reason: String },

    // ── Dispatch errors ──────────────────────────────────────────────
    #[error("Unknown Cherwell SOAP API method: {operation}")]
    UnknownOperation { operation: String },

    #[error("{operation}: Wrong number of arguments ({got} for {expected})")]
    ArityMismatch {
        operation: String,
        expected: usize,
        got: usize,
    },

    // ── Remote errors ────────────────────────────────────────────────
    /// A transport-level fault, with whatever detail the service attached.
    #[error("{message}")]
    SoapError {
        message: String,
        detail: Option<String>,
    },

    #[error("Login failed: {message}")]
    LoginFailed { message: String },

    #[error("{object_type} not found: {message}")]
    NotFound {
        object_type: String,
        id: String,
        message: String,
    },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<cherwell_api::Error> for CoreError {
    fn from(err: cherwell_api::Error) -> Self {
        match err {
            cherwell_api::Error::UnknownOperation { operation } => {
                CoreError::UnknownOperation { operation }
            }
            cherwell_api::Error::ArityMismatch {
                operation,
                expected,
                got,
            } => CoreError::ArityMismatch {
                operation,
                expected,
                got,
            },
            ref soap @ cherwell_api::Error::Soap { ref fault, .. } => CoreError::SoapError {
                message: soap.to_string(),
                detail: fault.detail().map(str::to_owned),
            },
            cherwell_api::Error::Discovery(fault) => CoreError::SoapError {
                message: format!("service discovery failed: {fault}"),
                detail: fault.detail().map(str::to_owned),
            },
            err @ cherwell_api::Error::MalformedResponse { .. } => CoreError::Api {
                message: err.to_string(),
            },
            cherwell_api::Error::InvalidUrl { url, reason } => CoreError::Config {
                message: format!("Invalid service URL '{url}': {reason}"),
            },
            cherwell_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
        }
    }
}

impl From<cherwell_api::xml::XmlError> for CoreError {
    fn from(err: cherwell_api::xml::XmlError) -> Self {
        CoreError::BadFormat(err.to_string())
    }
}
