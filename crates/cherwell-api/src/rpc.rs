// Dynamic RPC client
//
// Validates calls against the discovered operation catalog, dispatches them
// through a `Transport`, and strips the `<Op>Response/<Op>Result` wrapping so
// callers only ever see the innermost payload. Holds the session token.

use std::sync::RwLock;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, trace};

use crate::catalog::{Args, KnownOperation, OperationCatalog};
use crate::error::Error;
use crate::transport::{SessionToken, Transport};

/// Remote procedure client over a discovered operation catalog.
///
/// The catalog is fetched on first use and never refreshed. The session
/// token captured by [`login`](Self::login) is attached to every later call
/// until [`logout`](Self::logout). Nothing here re-authenticates on its own.
pub struct RpcClient<T> {
    transport: T,
    catalog: OnceCell<OperationCatalog>,
    session: RwLock<Option<SessionToken>>,
}

impl<T: Transport> RpcClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            catalog: OnceCell::new(),
            session: RwLock::new(None),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // ── Catalog ──────────────────────────────────────────────────────

    /// The operation catalog, discovering it on first use.
    pub async fn catalog(&self) -> Result<&OperationCatalog, Error> {
        self.catalog
            .get_or_try_init(|| async {
                let descriptors = self
                    .transport
                    .list_operations()
                    .await
                    .map_err(Error::Discovery)?;
                let catalog = OperationCatalog::from_descriptors(descriptors);
                debug!(operations = catalog.len(), "operation catalog loaded");
                Ok::<_, Error>(catalog)
            })
            .await
    }

    /// Sorted names of every operation the service exposes.
    pub async fn known_methods(&self) -> Result<Vec<String>, Error> {
        Ok(self.catalog().await?.names().map(str::to_owned).collect())
    }

    /// Declared parameter names of `operation` (empty when unknown).
    pub async fn params_for_method(&self, operation: &str) -> Result<Vec<String>, Error> {
        Ok(self.catalog().await?.parameters_for(operation).to_vec())
    }

    // ── Session token ────────────────────────────────────────────────

    pub fn session_token(&self) -> Option<SessionToken> {
        self.session.read().expect("session lock poisoned").clone()
    }

    pub fn set_session_token(&self, token: Option<SessionToken>) {
        *self.session.write().expect("session lock poisoned") = token;
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Invoke `operation` and return its innermost result.
    ///
    /// Unknown operations and arity mismatches fail before anything is sent.
    /// Transport failures come back as [`Error::Soap`]. A reply without a
    /// `<Op>Result` element yields `Value::Null`.
    pub async fn call(&self, operation: &str, args: Args) -> Result<Value, Error> {
        let (result, _) = self.dispatch(operation, args).await?;
        Ok(result)
    }

    /// Like [`call`](Self::call), also handing back any token the server issued.
    async fn dispatch(
        &self,
        operation: &str,
        args: Args,
    ) -> Result<(Value, Option<SessionToken>), Error> {
        let params = self.catalog().await?.bind(operation, args)?;
        let token = self.session_token();

        debug!(operation, params = params.len(), "dispatching");
        let reply = self
            .transport
            .invoke(operation, &params, token.as_ref())
            .await
            .map_err(|fault| Error::Soap {
                operation: operation.to_owned(),
                fault,
            })?;
        if reply.session_token.is_some() {
            trace!(operation, "server issued a session token");
        }

        let result = unwrap_result(operation, reply.body)?;
        Ok((result, reply.session_token))
    }

    async fn call_known(&self, operation: KnownOperation, args: Args) -> Result<Value, Error> {
        self.call(operation.as_ref(), args).await
    }

    // ── Typed wrappers ───────────────────────────────────────────────

    /// Authenticate. Returns the service's status flag; on `true` the
    /// session token issued with the reply (or none) replaces the old one.
    pub async fn login(&self, user_id: &str, password: &SecretString) -> Result<bool, Error> {
        let (result, issued) = self
            .dispatch(
                KnownOperation::Login.as_ref(),
                Args::positional([user_id, password.expose_secret()]),
            )
            .await?;
        let ok = result_bool(&result);
        if ok {
            info!(user_id, "logged in");
            self.set_session_token(issued);
        }
        Ok(ok)
    }

    /// End the session. The token is dropped whatever the service answers.
    pub async fn logout(&self) -> Result<bool, Error> {
        let result = self.call_known(KnownOperation::Logout, Args::none()).await;
        self.set_session_token(None);
        let ok = result_bool(&result?);
        info!(ok, "logged out");
        Ok(ok)
    }

    /// The service's last-error side channel, as raw text.
    pub async fn get_last_error(&self) -> Result<Option<String>, Error> {
        let result = self
            .call_known(KnownOperation::GetLastError, Args::none())
            .await?;
        Ok(result_text(&result))
    }

    /// Fetch by internal record id.
    pub async fn get_business_object(
        &self,
        object_type: &str,
        rec_id: &str,
    ) -> Result<Option<String>, Error> {
        let result = self
            .call_known(
                KnownOperation::GetBusinessObject,
                Args::named([("busObNameOrId", object_type), ("busObRecId", rec_id)]),
            )
            .await?;
        Ok(result_text(&result))
    }

    /// Fetch by public id.
    pub async fn get_business_object_by_public_id(
        &self,
        object_type: &str,
        public_id: &str,
    ) -> Result<Option<String>, Error> {
        let result = self
            .call_known(
                KnownOperation::GetBusinessObjectByPublicId,
                Args::named([("busObNameOrId", object_type), ("busObPublicId", public_id)]),
            )
            .await?;
        Ok(result_text(&result))
    }

    /// Replace a record wholesale. The result text is whatever the service
    /// returns; success must be judged through [`get_last_error`](Self::get_last_error).
    pub async fn update_business_object_by_public_id(
        &self,
        object_type: &str,
        public_id: &str,
        update_xml: &str,
    ) -> Result<Option<String>, Error> {
        let result = self
            .call_known(
                KnownOperation::UpdateBusinessObjectByPublicId,
                Args::named([
                    ("busObNameOrId", object_type),
                    ("busObPublicId", public_id),
                    ("updateXml", update_xml),
                ]),
            )
            .await?;
        Ok(result_text(&result))
    }

    /// Create a record. `None` means the service created nothing.
    pub async fn create_business_object(
        &self,
        object_type: &str,
        creation_xml: &str,
    ) -> Result<Option<String>, Error> {
        let result = self
            .call_known(
                KnownOperation::CreateBusinessObject,
                Args::named([("busObNameOrId", object_type), ("creationXml", creation_xml)]),
            )
            .await?;
        Ok(result_text(&result))
    }

    /// Raw `BusinessObjectDef` XML for a record type.
    pub async fn get_business_object_definition(
        &self,
        name_or_id: &str,
    ) -> Result<Option<String>, Error> {
        let result = self
            .call_known(
                KnownOperation::GetBusinessObjectDefinition,
                Args::named([("nameOrId", name_or_id)]),
            )
            .await?;
        Ok(result_text(&result))
    }
}

/// Strip `{"<op>Response": {"<op>Result": x}}` down to `x`.
fn unwrap_result(operation: &str, body: Value) -> Result<Value, Error> {
    let response_key = format!("{operation}Response");
    let malformed = || Error::MalformedResponse {
        operation: operation.to_owned(),
        expected: response_key.clone(),
    };

    let Value::Object(mut top) = body else {
        return Err(malformed());
    };
    let response = top.remove(&response_key).ok_or_else(malformed)?;

    let result_key = format!("{operation}Result");
    Ok(match response {
        Value::Object(mut inner) => inner.remove(&result_key).unwrap_or(Value::Null),
        _ => Value::Null,
    })
}

/// Text view of a result. `null` is absent; an empty string is kept.
pub fn result_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Boolean view of a result: `true` or `"true"` in any letter case.
pub fn result_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}
