//! Session facade tests driven through a scripted transport.
//!
//! Every test runs the full path: catalog discovery, argument binding,
//! result unwrapping, last-error checks, and record conversion.
#![allow(clippy::unwrap_used)]

use cherwell_api::test_utils::MockTransport;
use cherwell_core::{CoreError, Incident, Record, Session, Task};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

const INCIDENT_XML: &str = include_str!("data/incident.xml");
const TASK_XML: &str = include_str!("data/task.xml");
const EMPTY_XML: &str = include_str!("data/empty.xml");

const REC_ID: &str = "12345678901234567890123456789012";

// ── Helpers ─────────────────────────────────────────────────────────

fn session() -> Session<MockTransport> {
    Session::new(MockTransport::cherwell())
}

fn mock(session: &Session<MockTransport>) -> &MockTransport {
    session.rpc().transport()
}

// ── Fetch ───────────────────────────────────────────────────────────

#[tokio::test]
async fn thirty_two_character_ids_fetch_by_rec_id() {
    let session = session();
    mock(&session).respond("GetBusinessObject", json!("<BusinessObject/>"));

    session.get_object_xml("Thing", REC_ID).await.unwrap();

    let calls = mock(&session).calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation, "GetBusinessObject");
    assert_eq!(calls[0].params["busObNameOrId"], "Thing");
    assert_eq!(calls[0].params["busObRecId"], REC_ID);
}

#[tokio::test]
async fn shorter_ids_fetch_by_public_id() {
    let session = session();
    mock(&session).respond("GetBusinessObjectByPublicId", json!("<BusinessObject/>"));

    session.get_object_xml("Thing", &REC_ID[..31]).await.unwrap();
    session.get_object_xml("Thing", "12345").await.unwrap();

    let calls = mock(&session).calls_to("GetBusinessObjectByPublicId");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].params["busObPublicId"], "12345");
    assert!(mock(&session).calls_to("GetBusinessObject").is_empty());
}

#[tokio::test]
async fn incident_is_fetched_and_typed() {
    let session = session();
    mock(&session).respond("GetBusinessObjectByPublicId", json!(INCIDENT_XML));
    mock(&session).respond("GetLastError", Value::Null);

    let incident = session.incident("51949").await.unwrap();
    assert_eq!(incident.id().as_deref(), Some("51949"));
    assert_eq!(incident.tasks().unwrap().len(), 5);

    let call = &mock(&session).calls_to("GetBusinessObjectByPublicId")[0];
    assert_eq!(call.params["busObNameOrId"], "Incident");
}

#[tokio::test]
async fn task_is_fetched_and_typed() {
    let session = session();
    mock(&session).respond("GetBusinessObjectByPublicId", json!(TASK_XML));
    mock(&session).respond("GetLastError", json!(""));

    let task: Task = session.task("12345").await.unwrap();
    assert_eq!(task.get_field("Status").as_deref(), Some("New"));
}

#[tokio::test]
async fn last_error_turns_a_payload_into_not_found() {
    let session = session();
    mock(&session).respond("GetBusinessObjectByPublicId", json!(EMPTY_XML));
    mock(&session).respond("GetLastError", json!("Specified Business Object not found"));

    let err = session.incident("99999").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { ref id, .. } if id == "99999"));
    assert!(err.to_string().contains("Specified Business Object not found"));
}

#[tokio::test]
async fn missing_payload_is_not_found() {
    let session = session();
    mock(&session).respond("GetBusinessObjectByPublicId", Value::Null);
    mock(&session).respond("GetLastError", Value::Null);

    let err = session.task("99999").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn malformed_payload_is_bad_format() {
    let session = session();
    mock(&session).respond("GetBusinessObjectByPublicId", json!("<Oops/>"));
    mock(&session).respond("GetLastError", Value::Null);

    let err = session.incident("51949").await.unwrap_err();
    assert!(matches!(err, CoreError::BadFormat(_)));
}

#[tokio::test]
async fn payload_of_another_type_is_bad_format() {
    let session = session();
    mock(&session).respond("GetBusinessObjectByPublicId", json!(TASK_XML));
    mock(&session).respond("GetLastError", Value::Null);

    let err = session.incident("12345").await.unwrap_err();
    assert!(matches!(err, CoreError::BadFormat(_)));
}

#[tokio::test]
async fn fault_surfaces_as_soap_error_with_detail() {
    let session = session();
    mock(&session).fault("GetBusinessObjectByPublicId", "Object reference not set");

    let err = session.incident("51949").await.unwrap_err();
    let CoreError::SoapError { detail, .. } = err else {
        panic!("expected SoapError, got {err:?}");
    };
    assert_eq!(detail.as_deref(), Some("Object reference not set"));
}

// ── Save ────────────────────────────────────────────────────────────

#[tokio::test]
async fn save_sends_the_whole_record_and_reports_last_error() {
    let session = session();
    mock(&session).respond("UpdateBusinessObjectByPublicId", json!(""));
    mock(&session).respond("GetLastError", Value::Null);

    let mut incident = Incident::parse(INCIDENT_XML).unwrap();
    incident.complete("Done");
    assert_eq!(session.save_incident(&incident).await.unwrap(), None);

    let call = &mock(&session).calls_to("UpdateBusinessObjectByPublicId")[0];
    assert_eq!(call.params["busObNameOrId"], "Incident");
    assert_eq!(call.params["busObPublicId"], "51949");
    let sent = Incident::parse(&call.params["updateXml"]).unwrap();
    assert_eq!(sent.get_field("ClosureCode").as_deref(), Some("Completed"));
}

#[tokio::test]
async fn save_returns_the_service_error() {
    let session = session();
    mock(&session).respond("UpdateBusinessObjectByPublicId", Value::Null);
    mock(&session).respond("GetLastError", json!("Field Status is read-only"));

    let task = Task::parse(TASK_XML).unwrap();
    assert_eq!(
        session.save_task(&task).await.unwrap().as_deref(),
        Some("Field Status is read-only")
    );
}

#[tokio::test]
async fn save_without_an_id_sends_nothing() {
    let session = session();
    let task = Task::create([("Status", "New")]);
    let err = session.save_task(&task).await.unwrap_err();
    assert!(matches!(err, CoreError::MissingData(_)));
    assert!(mock(&session).calls().is_empty());
}

// ── Create ──────────────────────────────────────────────────────────

#[tokio::test]
async fn create_sets_the_returned_id() {
    let session = session();
    mock(&session).respond("CreateBusinessObject", json!("52000"));

    let incident = session
        .create_incident([("Status", "New"), ("Description", "Printer on fire")])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(incident.id().as_deref(), Some("52000"));
    assert!(incident.exists());

    let call = &mock(&session).calls_to("CreateBusinessObject")[0];
    assert_eq!(call.params["busObNameOrId"], "Incident");
    let sent = Incident::parse(&call.params["creationXml"]).unwrap();
    assert_eq!(sent.get_field("Description").as_deref(), Some("Printer on fire"));
    assert_eq!(sent.id(), None);
}

#[tokio::test]
async fn create_with_nil_result_is_no_record() {
    let session = session();
    mock(&session).respond("CreateBusinessObject", Value::Null);

    let created = session
        .create_record::<Task, _, _, _>([("Status", "New")])
        .await
        .unwrap();
    assert!(created.is_none());
}

// ── Session lifecycle ───────────────────────────────────────────────

#[tokio::test]
async fn token_from_login_rides_along_until_logout() {
    use cherwell_api::{Reply, SessionToken};
    use secrecy::SecretString;

    let session = session().with_credentials("somebody", SecretString::from("somepass".to_string()));
    mock(&session).reply(
        "Login",
        Reply::new(json!({"LoginResponse": {"LoginResult": "true"}}))
            .with_session_token(SessionToken::new("ASP.NET_SessionId=xyz")),
    );
    mock(&session).respond("GetLastError", Value::Null);
    mock(&session).respond("Logout", json!("true"));

    assert!(session.login(None, None).await.unwrap());
    assert!(session.logout().await.unwrap());
    assert_eq!(session.last_error().await.unwrap(), None);

    let calls = mock(&session).calls();
    let operations: Vec<&str> = calls.iter().map(|c| c.operation.as_str()).collect();
    assert_eq!(operations, ["Login", "GetLastError", "Logout", "GetLastError"]);
    assert!(calls[0].session.is_none());
    assert!(calls[1].session.is_some());
    assert!(calls[2].session.is_some());
    assert!(calls[3].session.is_none());
}

#[tokio::test]
async fn logout_reports_false_status() {
    let session = session();
    mock(&session).respond("Logout", json!("false"));
    assert!(!session.logout().await.unwrap());
}
