// SOAP 1.1 transport: service description discovery, envelope codec, and
// the reqwest-backed `Transport` implementation.

pub mod client;
pub mod envelope;
pub mod wsdl;

pub use client::{ServiceLocation, SoapTransport, discovery_url};
pub use wsdl::ServiceDescription;
