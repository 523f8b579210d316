//! Async client for the Cherwell SOAP service.
//!
//! - **[`RpcClient`]** validates calls against the [`OperationCatalog`]
//!   discovered from the service, dispatches them through a [`Transport`],
//!   unwraps `<Op>Response/<Op>Result`, and carries the session token.
//! - **[`SoapTransport`]** is the SOAP 1.1 over HTTP transport: WSDL
//!   discovery, envelope codec, fault decoding, cookie capture.
//! - **[`xml`]** is the owned element tree shared with the document model.

pub mod catalog;
pub mod error;
pub mod rpc;
pub mod soap;
pub mod transport;
pub mod xml;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// ── Primary re-exports ──────────────────────────────────────────────
pub use catalog::{Args, KnownOperation, OperationCatalog, OperationDescriptor};
pub use error::{Error, TransportError};
pub use rpc::{RpcClient, result_bool, result_text};
pub use soap::{ServiceLocation, SoapTransport, discovery_url};
pub use transport::{Reply, SessionToken, TlsMode, Transport, TransportConfig};
