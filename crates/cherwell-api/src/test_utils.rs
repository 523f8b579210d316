// Scripted in-memory transport for tests.
//
// Compiled for this crate's own tests and, behind the `test-utils` feature,
// for downstream crates that want to drive an `RpcClient` without a server.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use serde_json::Value;

use crate::catalog::{KnownOperation, OperationDescriptor};
use crate::error::TransportError;
use crate::transport::{Reply, SessionToken, Transport};

/// One invocation seen by a [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: String,
    pub params: IndexMap<String, String>,
    pub session: Option<SessionToken>,
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(Reply),
    Fault(String),
}

/// A [`Transport`] answering from per-operation scripts.
///
/// Responses queued for an operation are consumed in order; the last one
/// keeps answering once the queue is down to it. An operation with no
/// script fails with [`TransportError::Malformed`].
#[derive(Debug, Default)]
pub struct MockTransport {
    operations: Vec<OperationDescriptor>,
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
    discoveries: AtomicUsize,
}

impl MockTransport {
    pub fn new(operations: Vec<OperationDescriptor>) -> Self {
        Self {
            operations,
            ..Self::default()
        }
    }

    /// A transport exposing the Cherwell operations with typed wrappers.
    pub fn cherwell() -> Self {
        let op = |known: KnownOperation, params: &[&str]| {
            OperationDescriptor::new(known.as_ref(), params.iter().copied())
        };
        let operations = vec![
            op(KnownOperation::Login, &["userId", "password"]),
            op(KnownOperation::Logout, &[]),
            op(KnownOperation::GetLastError, &[]),
            op(
                KnownOperation::GetBusinessObject,
                &["busObNameOrId", "busObRecId"],
            ),
            op(
                KnownOperation::GetBusinessObjectByPublicId,
                &["busObNameOrId", "busObPublicId"],
            ),
            op(
                KnownOperation::UpdateBusinessObjectByPublicId,
                &["busObNameOrId", "busObPublicId", "updateXml"],
            ),
            op(
                KnownOperation::CreateBusinessObject,
                &["busObNameOrId", "creationXml"],
            ),
            op(KnownOperation::GetBusinessObjectDefinition, &["nameOrId"]),
        ];
        Self::new(operations)
    }

    /// Queue a full reply for `operation`.
    pub fn reply(&self, operation: &str, reply: Reply) {
        self.push(operation, Scripted::Reply(reply));
    }

    /// Queue `{"<op>Response": {"<op>Result": result}}` for `operation`.
    pub fn respond(&self, operation: &str, result: Value) {
        let mut response = serde_json::Map::new();
        if !result.is_null() {
            response.insert(format!("{operation}Result"), result);
        }
        let mut body = serde_json::Map::new();
        body.insert(format!("{operation}Response"), Value::Object(response));
        self.reply(operation, Reply::new(Value::Object(body)));
    }

    /// Queue a SOAP fault whose detail is `detail`.
    pub fn fault(&self, operation: &str, detail: &str) {
        self.push(operation, Scripted::Fault(detail.to_owned()));
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    /// Invocations of one operation.
    pub fn calls_to(&self, operation: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation == operation)
            .collect()
    }

    /// How many times the operation list was requested.
    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }

    fn push(&self, operation: &str, scripted: Scripted) {
        self.scripts
            .lock()
            .expect("scripts lock poisoned")
            .entry(operation.to_owned())
            .or_default()
            .push_back(scripted);
    }

    fn next(&self, operation: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock().expect("scripts lock poisoned");
        let queue = scripts.get_mut(operation)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Transport for MockTransport {
    async fn list_operations(&self) -> Result<Vec<OperationDescriptor>, TransportError> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        Ok(self.operations.clone())
    }

    async fn invoke(
        &self,
        operation: &str,
        params: &IndexMap<String, String>,
        session: Option<&SessionToken>,
    ) -> Result<Reply, TransportError> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(RecordedCall {
                operation: operation.to_owned(),
                params: params.clone(),
                session: session.cloned(),
            });

        match self.next(operation) {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fault(detail)) => Err(TransportError::Fault {
                code: "soap:Server".into(),
                message: "Server was unable to process request.".into(),
                detail: Some(detail),
            }),
            None => Err(TransportError::Malformed(format!(
                "no scripted response for {operation}"
            ))),
        }
    }
}
