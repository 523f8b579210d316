// ── Session facade ──
//
// The call surface applications use: login, fetch, save, create. Composes
// the RPC client with the record types and enforces the service's habit of
// reporting business failures through `GetLastError` instead of faults.

use std::fmt;
use std::iter;

use cherwell_api::xml::{self, Element};
use cherwell_api::{RpcClient, SoapTransport, Transport};
use indexmap::IndexMap;
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::document::{Document, FIELD_LIST};
use crate::error::CoreError;
use crate::record::{Incident, Record, Task};

/// Ids at least this long are internal record keys, not public ids.
pub const REC_ID_MIN_LEN: usize = 32;

/// How an id is looked up on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey<'a> {
    /// Internal key, fetched with `GetBusinessObject`.
    RecId(&'a str),
    /// Public id, fetched with `GetBusinessObjectByPublicId`.
    PublicId(&'a str),
}

impl<'a> LookupKey<'a> {
    pub fn classify(id: &'a str) -> Self {
        if id.chars().count() >= REC_ID_MIN_LEN {
            Self::RecId(id)
        } else {
            Self::PublicId(id)
        }
    }
}

/// A client session against one Cherwell service.
pub struct Session<T = SoapTransport> {
    rpc: RpcClient<T>,
    username: Option<String>,
    password: Option<SecretString>,
}

impl Session<SoapTransport> {
    /// Build the SOAP transport described by `config`. Nothing is sent
    /// until the first call.
    pub fn connect(config: &SessionConfig) -> Result<Self, CoreError> {
        let transport = SoapTransport::new(&config.url, &config.transport)?;
        debug!(url = %config.url, "session created");
        let mut session = Self::new(transport);
        session.username.clone_from(&config.username);
        session.password.clone_from(&config.password);
        Ok(session)
    }
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self {
            rpc: RpcClient::new(transport),
            username: None,
            password: None,
        }
    }

    /// Default credentials for [`login`](Self::login).
    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.username = Some(username.into());
        self.password = Some(password);
        self
    }

    /// The underlying RPC client, for operations without a wrapper here.
    pub fn rpc(&self) -> &RpcClient<T> {
        &self.rpc
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Log in, falling back to the session's default credentials.
    ///
    /// Fails with [`CoreError::LoginFailed`] on a transport error, on a
    /// false status, or when the last-error channel reports a problem
    /// right after a successful status.
    pub async fn login(
        &self,
        username: Option<&str>,
        password: Option<&SecretString>,
    ) -> Result<bool, CoreError> {
        let username = username.or(self.username.as_deref()).unwrap_or_default();
        let blank = SecretString::from(String::new());
        let password = password.or(self.password.as_ref()).unwrap_or(&blank);

        let login_failed = |message: String| CoreError::LoginFailed { message };

        let ok = self
            .rpc
            .login(username, password)
            .await
            .map_err(|e| login_failed(e.to_string()))?;
        if !ok {
            return Err(login_failed("Cherwell returned false status".into()));
        }

        let last_error = self
            .rpc
            .get_last_error()
            .await
            .map_err(|e| login_failed(e.to_string()))?;
        if let Some(error) = non_empty(last_error) {
            warn!(username, %error, "login reported success with an error");
            return Err(login_failed(format!("Cherwell returned error: {error}")));
        }

        info!(username, "login succeeded");
        Ok(true)
    }

    /// Log out; the session token is dropped either way.
    pub async fn logout(&self) -> Result<bool, CoreError> {
        Ok(self.rpc.logout().await?)
    }

    /// The service's last error, or `None` when it reports none.
    pub async fn last_error(&self) -> Result<Option<String>, CoreError> {
        let error = non_empty(self.rpc.get_last_error().await?);
        if let Some(error) = &error {
            warn!(%error, "Cherwell reported an error");
        }
        Ok(error)
    }

    // ── Fetch ────────────────────────────────────────────────────────

    /// Raw XML of a record. Ids of 32 characters or more are internal
    /// record keys; shorter ones are public ids.
    pub async fn get_object_xml(
        &self,
        object_type: &str,
        id: &str,
    ) -> Result<Option<String>, CoreError> {
        let key = LookupKey::classify(id);
        debug!(object_type, ?key, "fetching business object");
        let xml = match key {
            LookupKey::RecId(rec_id) => self.rpc.get_business_object(object_type, rec_id).await?,
            LookupKey::PublicId(public_id) => {
                self.rpc
                    .get_business_object_by_public_id(object_type, public_id)
                    .await?
            }
        };
        Ok(xml)
    }

    /// Fetch a record as a [`Document`].
    ///
    /// The payload and the last-error channel are checked together: an
    /// error report, or no payload at all, is [`CoreError::NotFound`].
    pub async fn get_business_object(&self, object_type: &str, id: &str) -> Result<Document, CoreError> {
        let xml = self.get_object_xml(object_type, id).await?;
        let error = self.last_error().await?;
        let not_found = |message: String| CoreError::NotFound {
            object_type: object_type.to_owned(),
            id: id.to_owned(),
            message,
        };
        match (xml, error) {
            (_, Some(error)) => Err(not_found(error)),
            (None, None) => Err(not_found("empty result".into())),
            (Some(xml), None) => Document::parse(&xml),
        }
    }

    /// Fetch a typed record.
    pub async fn fetch_record<R: Record>(&self, id: &str) -> Result<R, CoreError> {
        let document = self.get_business_object(R::KIND.object_name, id).await?;
        R::try_from_document(document)
    }

    pub async fn incident(&self, id: &str) -> Result<Incident, CoreError> {
        self.fetch_record(id).await
    }

    pub async fn task(&self, id: &str) -> Result<Task, CoreError> {
        self.fetch_record(id).await
    }

    // ── Save ─────────────────────────────────────────────────────────

    /// Replace a record with `xml`. Returns the last error afterwards:
    /// `None` means the update went through.
    pub async fn update_object_xml(
        &self,
        object_type: &str,
        public_id: &str,
        xml: &str,
    ) -> Result<Option<String>, CoreError> {
        debug!(object_type, public_id, "updating business object");
        self.rpc
            .update_business_object_by_public_id(object_type, public_id, xml)
            .await?;
        self.last_error().await
    }

    /// Save a record under its public id. See [`update_object_xml`](Self::update_object_xml).
    pub async fn save_record<R: Record>(&self, record: &R) -> Result<Option<String>, CoreError> {
        let kind = R::KIND;
        let id = non_empty(record.id()).ok_or_else(|| {
            CoreError::MissingData(format!("{} has no {}", kind.object_name, kind.id_field))
        })?;
        let xml = record.document().to_xml()?;
        self.update_object_xml(kind.object_name, &id, &xml).await
    }

    pub async fn save_incident(&self, incident: &Incident) -> Result<Option<String>, CoreError> {
        self.save_record(incident).await
    }

    pub async fn save_task(&self, task: &Task) -> Result<Option<String>, CoreError> {
        self.save_record(task).await
    }

    // ── Create ───────────────────────────────────────────────────────

    /// Create a record from `fields`.
    ///
    /// Returns `Ok(None)` when the service creates nothing; that is an
    /// expected outcome, not an error. On success the new id is written to
    /// the record's identity field.
    pub async fn create_record<R, I, K, V>(&self, fields: I) -> Result<Option<R>, CoreError>
    where
        R: Record,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: fmt::Display,
    {
        let mut record = R::create(fields);
        let xml = record.document().to_xml()?;
        let object_name = R::KIND.object_name;

        match self.rpc.create_business_object(object_name, &xml).await? {
            Some(id) => {
                info!(object_name, %id, "created business object");
                record.document_mut().set_field(R::KIND.id_field, id);
                Ok(Some(record))
            }
            None => {
                debug!(object_name, "create returned no id");
                Ok(None)
            }
        }
    }

    pub async fn create_incident<I, K, V>(&self, fields: I) -> Result<Option<Incident>, CoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: fmt::Display,
    {
        self.create_record(fields).await
    }

    // ── Schema ───────────────────────────────────────────────────────

    /// Field name -> description for a record type.
    pub async fn get_object_definition(
        &self,
        object_type: &str,
    ) -> Result<IndexMap<String, String>, CoreError> {
        let text = self
            .rpc
            .get_business_object_definition(object_type)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                object_type: object_type.to_owned(),
                id: String::new(),
                message: "no definition returned".into(),
            })?;
        let doc = xml::parse_document(&text)?;
        let definition = iter::once(&doc.root)
            .chain(doc.root.descendants())
            .find(|e| e.local_name() == "BusinessObjectDef")
            .ok_or_else(|| CoreError::BadFormat("missing 'BusinessObjectDef'".into()))?;

        Ok(definition
            .child(FIELD_LIST)
            .into_iter()
            .flat_map(Element::child_elements)
            .filter_map(|field| {
                let name = field.attr("Name")?;
                let description = field.child("Description").map(Element::text).unwrap_or_default();
                Some((name.to_owned(), description))
            })
            .collect())
    }
}

impl<T> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cherwell_api::test_utils::MockTransport;
    use serde_json::{Value, json};

    use super::*;

    fn session() -> Session<MockTransport> {
        Session::new(MockTransport::cherwell())
            .with_credentials("odo", SecretString::from("nerys".to_string()))
    }

    fn transport(session: &Session<MockTransport>) -> &MockTransport {
        session.rpc().transport()
    }

    // ── Login ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn login_uses_default_credentials() {
        let session = session();
        transport(&session).respond("Login", json!("true"));
        transport(&session).respond("GetLastError", Value::Null);

        assert!(session.login(None, None).await.unwrap());
        let call = &transport(&session).calls_to("Login")[0];
        assert_eq!(call.params["userId"], "odo");
        assert_eq!(call.params["password"], "nerys");
    }

    #[tokio::test]
    async fn explicit_credentials_override_defaults() {
        let session = session();
        transport(&session).respond("Login", json!("true"));
        transport(&session).respond("GetLastError", json!(""));

        let password = SecretString::from("kira".to_string());
        assert!(session.login(Some("quark"), Some(&password)).await.unwrap());
        let call = &transport(&session).calls_to("Login")[0];
        assert_eq!(call.params["userId"], "quark");
        assert_eq!(call.params["password"], "kira");
    }

    #[tokio::test]
    async fn false_status_fails_login() {
        let session = session();
        transport(&session).respond("Login", json!("false"));

        let err = session.login(None, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Login failed: Cherwell returned false status");
        assert!(transport(&session).calls_to("GetLastError").is_empty());
    }

    #[tokio::test]
    async fn last_error_after_true_status_fails_login() {
        let session = session();
        transport(&session).respond("Login", json!("true"));
        transport(&session).respond("GetLastError", json!("License exhausted"));

        let err = session.login(None, None).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Login failed: Cherwell returned error: License exhausted"
        );
    }

    #[tokio::test]
    async fn transport_error_fails_login() {
        let session = session();
        transport(&session).fault("Login", "Server is down");

        let err = session.login(None, None).await.unwrap_err();
        assert!(matches!(err, CoreError::LoginFailed { .. }));
    }

    // ── Last error ───────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_last_error_is_none() {
        let session = session();
        transport(&session).respond("GetLastError", json!(""));
        assert_eq!(session.last_error().await.unwrap(), None);
    }

    // ── Routing ──────────────────────────────────────────────────────

    #[test]
    fn lookup_key_boundary() {
        let rec_id = "a".repeat(32);
        let almost = "a".repeat(31);
        assert_eq!(LookupKey::classify(&rec_id), LookupKey::RecId(&rec_id));
        assert_eq!(LookupKey::classify(&almost), LookupKey::PublicId(&almost));
        assert_eq!(LookupKey::classify("51949"), LookupKey::PublicId("51949"));
    }

    #[tokio::test]
    async fn definition_maps_field_names_to_descriptions() {
        let session = session();
        let definition = r#"<Trebuchet>
  <BusinessObjectDef Name="Incident">
    <FieldList>
      <Field Name="IncidentID"><Description>Public id</Description></Field>
      <Field Name="Status"><Description>Lifecycle state</Description></Field>
      <Field Name="Notes"/>
    </FieldList>
  </BusinessObjectDef>
</Trebuchet>"#;
        transport(&session).respond("GetBusinessObjectDefinition", json!(definition));

        let fields = session.get_object_definition("Incident").await.unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields["IncidentID"], "Public id");
        assert_eq!(fields["Status"], "Lifecycle state");
        assert_eq!(fields["Notes"], "");
    }

    #[tokio::test]
    async fn definition_at_the_root_is_found() {
        let session = session();
        transport(&session).respond(
            "GetBusinessObjectDefinition",
            json!(r#"<BusinessObjectDef><FieldList><Field Name="A"><Description>a</Description></Field></FieldList></BusinessObjectDef>"#),
        );
        let fields = session.get_object_definition("Task").await.unwrap();
        assert_eq!(fields["A"], "a");
    }

    #[test]
    fn debug_redacts_password() {
        let rendered = format!("{:?}", session());
        assert!(rendered.contains("odo"));
        assert!(!rendered.contains("nerys"));
    }
}
