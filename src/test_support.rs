//! In-memory transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::service::uri::file_uri;
use crate::service::{Operation, ServiceError, ServiceResult, Transport};

/// A request the mock received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub operation: Operation,
    pub body: Option<Value>,
    pub at: Instant,
}

struct Scripted {
    delay: Duration,
    reply: ServiceResult<Value>,
}

/// Records every request; answers with scripted replies (FIFO per
/// operation) or a plausible default.
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<RecordedCall>>,
    scripted: Mutex<HashMap<Operation, VecDeque<Scripted>>>,
    sticky_failures: Mutex<HashMap<Operation, ServiceError>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, operation: Operation, value: Value) {
        self.script(operation, Duration::ZERO, Ok(value));
    }

    pub fn reply_after(&self, operation: Operation, delay: Duration, value: Value) {
        self.script(operation, delay, Ok(value));
    }

    pub fn fail(&self, operation: Operation, err: ServiceError) {
        self.script(operation, Duration::ZERO, Err(err));
    }

    pub fn fail_after(&self, operation: Operation, delay: Duration, err: ServiceError) {
        self.script(operation, delay, Err(err));
    }

    /// Every future request for `operation` fails until cleared.
    pub fn fail_always(&self, operation: Operation, err: ServiceError) {
        self.sticky_failures.lock().unwrap().insert(operation, err);
    }

    pub fn clear_failures(&self) {
        self.sticky_failures.lock().unwrap().clear();
    }

    fn script(&self, operation: Operation, delay: Duration, reply: ServiceResult<Value>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(Scripted { delay, reply });
    }

    pub fn calls(&self, operation: Operation) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    pub fn bodies(&self, operation: Operation) -> Vec<Value> {
        self.calls(operation)
            .into_iter()
            .filter_map(|c| c.body)
            .collect()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.calls(operation).len()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn default_reply(operation: Operation, body: Option<&Value>) -> Value {
    let path = body
        .and_then(|b| b.get("filePath"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    match operation {
        Operation::Open => json!({"status": "opened", "uri": file_uri(path)}),
        Operation::Change => json!({"status": "changed", "uri": file_uri(path)}),
        Operation::Complete => json!({"results": []}),
        Operation::Hover | Operation::Definition | Operation::Signature => {
            json!({"jsonrpc": "2.0", "id": 1, "result": null})
        }
        Operation::Diagnostics => json!([]),
        _ => json!({"status": "ok"}),
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, operation: Operation, body: Option<Value>) -> ServiceResult<Value> {
        self.calls.lock().unwrap().push(RecordedCall {
            operation,
            body: body.clone(),
            at: Instant::now(),
        });

        if let Some(err) = self.sticky_failures.lock().unwrap().get(&operation) {
            return Err(err.clone());
        }

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);

        match scripted {
            Some(Scripted { delay, reply }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                reply
            }
            None => Ok(default_reply(operation, body.as_ref())),
        }
    }
}
