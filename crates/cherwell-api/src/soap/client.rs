// SOAP HTTP transport
//
// Wraps `reqwest::Client` with service-description discovery, envelope
// building, and SOAP fault decoding. The session cookie is never stored
// here: it arrives per call from the RPC client and whatever the server
// sets comes back on the `Reply`.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, SET_COOKIE};
use tokio::sync::OnceCell;
use tracing::{debug, trace};
use url::Url;

use super::envelope;
use super::wsdl::{ServiceDescription, parse_wsdl};
use crate::catalog::OperationDescriptor;
use crate::error::{Error, TransportError};
use crate::transport::{Reply, SessionToken, Transport, TransportConfig};

const BODY_PREVIEW: usize = 200;

/// Where the service description lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceLocation {
    /// A WSDL file on local disk.
    File(PathBuf),
    /// A remote description, already suffixed with `?WSDL`.
    Url(Url),
}

impl ServiceLocation {
    /// Normalize a configured service URL.
    ///
    /// One trailing `/` is dropped. An existing local path is used as-is.
    /// Anything starting with `http` gets `?WSDL` appended unless it already
    /// ends with `?wsdl` in any letter case.
    pub fn discover(base_url: &str) -> Result<Self, Error> {
        let trimmed = base_url.strip_suffix('/').unwrap_or(base_url);

        if Path::new(trimmed).is_file() {
            return Ok(Self::File(PathBuf::from(trimmed)));
        }

        if trimmed.starts_with("http") {
            let full = if trimmed.to_ascii_lowercase().ends_with("?wsdl") {
                trimmed.to_owned()
            } else {
                format!("{trimmed}?WSDL")
            };
            let url = Url::parse(&full).map_err(|e| Error::InvalidUrl {
                url: base_url.to_owned(),
                reason: e.to_string(),
            })?;
            return Ok(Self::Url(url));
        }

        Err(Error::InvalidUrl {
            url: base_url.to_owned(),
            reason: "Client URL must be a local file, or begin with http".into(),
        })
    }
}

/// Normalized discovery location as a string.
pub fn discovery_url(base_url: &str) -> Result<String, Error> {
    Ok(match ServiceLocation::discover(base_url)? {
        ServiceLocation::File(path) => path.display().to_string(),
        ServiceLocation::Url(url) => url.to_string(),
    })
}

/// Production [`Transport`] speaking SOAP 1.1 over HTTP.
pub struct SoapTransport {
    http: reqwest::Client,
    location: ServiceLocation,
    service: OnceCell<ServiceDescription>,
}

impl SoapTransport {
    /// Create a transport from a configured service URL.
    pub fn new(base_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(http, base_url)
    }

    /// Create a transport with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, Error> {
        Ok(Self {
            http,
            location: ServiceLocation::discover(base_url)?,
            service: OnceCell::new(),
        })
    }

    pub fn location(&self) -> &ServiceLocation {
        &self.location
    }

    /// Fetch and parse the service description, once.
    async fn service(&self) -> Result<&ServiceDescription, TransportError> {
        self.service
            .get_or_try_init(|| async {
                let text = self.fetch_description().await?;
                let service = parse_wsdl(&text)?;
                debug!(
                    operations = service.operations.len(),
                    namespace = %service.target_namespace,
                    "service description loaded"
                );
                Ok::<_, TransportError>(service)
            })
            .await
    }

    async fn fetch_description(&self) -> Result<String, TransportError> {
        match &self.location {
            ServiceLocation::File(path) => {
                debug!("reading service description from {}", path.display());
                Ok(tokio::fs::read_to_string(path).await?)
            }
            ServiceLocation::Url(url) => {
                debug!("GET {}", url);
                let resp = self.http.get(url.clone()).send().await?;
                let status = resp.status();
                let body = resp.text().await?;
                if !status.is_success() {
                    return Err(TransportError::Status {
                        status: status.as_u16(),
                        body: preview(&body),
                    });
                }
                Ok(body)
            }
        }
    }

    /// The address requests are posted to.
    fn endpoint(&self, service: &ServiceDescription) -> Result<Url, TransportError> {
        if let Some(address) = &service.endpoint {
            return Url::parse(address).map_err(|e| {
                TransportError::Malformed(format!("bad endpoint address '{address}': {e}"))
            });
        }
        match &self.location {
            ServiceLocation::Url(url) => {
                let mut url = url.clone();
                url.set_query(None);
                Ok(url)
            }
            ServiceLocation::File(_) => Err(TransportError::Malformed(
                "service description has no endpoint address".into(),
            )),
        }
    }
}

impl Transport for SoapTransport {
    async fn list_operations(&self) -> Result<Vec<OperationDescriptor>, TransportError> {
        Ok(self.service().await?.operations.clone())
    }

    async fn invoke(
        &self,
        operation: &str,
        params: &IndexMap<String, String>,
        session: Option<&SessionToken>,
    ) -> Result<Reply, TransportError> {
        let service = self.service().await?;
        let endpoint = self.endpoint(service)?;
        let body = envelope::build_request(&service.target_namespace, operation, params)?;
        let action = envelope::soap_action(&service.target_namespace, operation);

        debug!(operation, "POST {}", endpoint);
        trace!(body = %body, "SOAP request");

        let mut builder = self
            .http
            .post(endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{action}\""))
            .body(body);
        if let Some(token) = session {
            builder = builder.header(COOKIE, token.as_str());
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let session_token = session_token_from(resp.headers());
        let text = resp.text().await?;

        // Faults usually arrive with HTTP 500; decode them before judging status.
        match envelope::parse_response(&text) {
            Err(fault @ TransportError::Fault { .. }) => Err(fault),
            Ok(body) if status.is_success() => Ok(Reply {
                body,
                session_token,
            }),
            Err(err) if status.is_success() => Err(err),
            _ => Err(TransportError::Status {
                status: status.as_u16(),
                body: preview(&text),
            }),
        }
    }
}

/// Collapse `Set-Cookie` headers into a `Cookie` header value.
fn session_token_from(headers: &HeaderMap) -> Option<SessionToken> {
    let pairs: Vec<&str> = headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect();
    if pairs.is_empty() {
        None
    } else {
        trace!("session cookie issued");
        Some(SessionToken::new(pairs.join("; ")))
    }
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn http_urls_get_wsdl_suffix() {
        assert_eq!(
            discovery_url("http://example.com/api.asmx").unwrap(),
            "http://example.com/api.asmx?WSDL"
        );
        assert_eq!(
            discovery_url("http://example.com/api.asmx/").unwrap(),
            "http://example.com/api.asmx?WSDL"
        );
    }

    #[test]
    fn existing_wsdl_suffix_is_kept_in_any_case() {
        assert_eq!(
            discovery_url("https://example.com/api.asmx?wsdl").unwrap(),
            "https://example.com/api.asmx?wsdl"
        );
        assert_eq!(
            discovery_url("https://example.com/api.asmx?Wsdl").unwrap(),
            "https://example.com/api.asmx?Wsdl"
        );
    }

    #[test]
    fn local_file_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cherwell.wsdl");
        std::fs::write(&path, "<definitions/>").unwrap();
        let location = ServiceLocation::discover(path.to_str().unwrap()).unwrap();
        assert_eq!(location, ServiceLocation::File(path));
    }

    #[test]
    fn other_urls_are_rejected() {
        let err = discovery_url("ftp://example.com/api.asmx").unwrap_err();
        assert!(
            err.to_string()
                .contains("Client URL must be a local file, or begin with http")
        );
    }

    #[test]
    fn set_cookie_headers_collapse_to_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("ASP.NET_SessionId=abc123; path=/; HttpOnly"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("lb=node2; path=/"));
        let token = session_token_from(&headers).unwrap();
        assert_eq!(token.as_str(), "ASP.NET_SessionId=abc123; lb=node2");

        assert!(session_token_from(&HeaderMap::new()).is_none());
    }
}
