//! Analysis service client: document sync state plus capability requests.
//!
//! Wraps a [`Transport`] with per-document session tracking, in-flight
//! de-duplication of sync calls, and debounced changes. Capability
//! requests are stateless and return normalized shapes.

pub mod debounce;
pub mod error;
pub mod transport;
pub mod types;
pub mod uri;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use lsp_types::Position;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;

pub use debounce::DebouncedChange;
pub use error::{ServiceError, ServiceResult};
pub use transport::{HttpTransport, Operation, Transport};
pub use types::{
    CompletionEntry, DefinitionTarget, DiagnosticBatch, HoverInfo, ParameterInfo,
    SignatureHelpInfo, SignatureInfo, SyncResponse,
};

use types::{PathRequest, PositionRequest, SyncReply, SyncRequest};

/// Client-side record of a document's synchronization with the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSession {
    pub uri: String,
    pub version: i64,
    pub opened_at: Instant,
}

type SyncOutcome = ServiceResult<SyncResponse>;

pub(crate) struct ClientInner {
    transport: Arc<dyn Transport>,
    sessions: Mutex<HashMap<String, FileSession>>,
    in_flight: Mutex<HashMap<String, watch::Receiver<Option<SyncOutcome>>>>,
    debouncers: Mutex<HashMap<Duration, DebouncedChange>>,
}

/// Handle to the analysis service. Clones share sessions and timers.
#[derive(Clone)]
pub struct ServiceClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("sessions", &lock(&self.inner.sessions).len())
            .finish()
    }
}

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the in-flight marker however the leading sync ends.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<String, watch::Receiver<Option<SyncOutcome>>>>,
    path: &'a str,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(self.path);
    }
}

enum SyncRole {
    Leader(watch::Sender<Option<SyncOutcome>>),
    Follower(watch::Receiver<Option<SyncOutcome>>),
}

impl ServiceClient {
    /// Create a client over any transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                sessions: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                debouncers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create an HTTP client from configuration.
    pub fn from_config(config: &BridgeConfig) -> ServiceResult<Self> {
        let transport = HttpTransport::new(&config.service_url, config.request_timeout())?;
        Ok(Self::new(Arc::new(transport)))
    }

    pub(crate) fn from_inner(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    fn downgrade(&self) -> Weak<ClientInner> {
        Arc::downgrade(&self.inner)
    }

    async fn send<B: Serialize>(&self, operation: Operation, body: &B) -> ServiceResult<Value> {
        let body = serde_json::to_value(body)
            .map_err(|e| ServiceError::Validation(format!("unserializable request: {e}")))?;
        self.inner.transport.request(operation, Some(body)).await
    }

    // ── Session state ──

    /// Current session for a document, if it was ever opened.
    pub fn session(&self, path: &str) -> Option<FileSession> {
        lock(&self.inner.sessions).get(path).cloned()
    }

    /// Number of tracked sessions.
    pub fn session_count(&self) -> usize {
        lock(&self.inner.sessions).len()
    }

    // ── Document sync ──

    /// Open a document on the service, creating (or resetting) its session.
    pub async fn open_file(&self, path: &str, content: &str) -> ServiceResult<SyncResponse> {
        validate_path(path)?;

        let body = self
            .send(
                Operation::Open,
                &SyncRequest {
                    file_path: path,
                    file_content: content,
                },
            )
            .await
            .map_err(|e| ServiceError::sync(path, e))?;

        let reply = SyncReply::parse(&body);
        let uri = reply.uri.unwrap_or_else(|| uri::file_uri(path));
        let version = reply.version.unwrap_or(1);

        lock(&self.inner.sessions).insert(
            path.to_string(),
            FileSession {
                uri: uri.clone(),
                version,
                opened_at: Instant::now(),
            },
        );
        info!(path = %path, version, "document opened");
        Ok(SyncResponse { uri, version })
    }

    /// Push new content for a document.
    ///
    /// Attempted even without a session; the service is authoritative.
    /// The version follows the service when it reports one (never moving
    /// backward) and is incremented locally otherwise.
    pub async fn change_file(&self, path: &str, content: &str) -> ServiceResult<SyncResponse> {
        validate_path(path)?;

        let body = self
            .send(
                Operation::Change,
                &SyncRequest {
                    file_path: path,
                    file_content: content,
                },
            )
            .await
            .map_err(|e| ServiceError::sync(path, e))?;

        let reply = SyncReply::parse(&body);
        let mut sessions = lock(&self.inner.sessions);
        if !sessions.contains_key(path) {
            warn!(path = %path, "change for a document that was never opened");
        }
        let session = sessions
            .entry(path.to_string())
            .or_insert_with(|| FileSession {
                uri: uri::file_uri(path),
                version: 0,
                opened_at: Instant::now(),
            });

        if let Some(uri) = reply.uri {
            session.uri = uri;
        }
        session.version = match reply.version {
            Some(server) => session.version.max(server),
            None => session.version + 1,
        };
        debug!(path = %path, version = session.version, "document changed");

        Ok(SyncResponse {
            uri: session.uri.clone(),
            version: session.version,
        })
    }

    /// Debounced `change_file`, memoized per delay.
    ///
    /// Must be called from within a tokio runtime.
    pub fn change_file_debounced(&self, delay: Duration) -> DebouncedChange {
        let mut debouncers = lock(&self.inner.debouncers);
        if let Some(existing) = debouncers.get(&delay) {
            if !existing.is_cancelled() {
                return existing.clone();
            }
        }
        let debounced = DebouncedChange::spawn(self.downgrade(), delay);
        debouncers.insert(delay, debounced.clone());
        debounced
    }

    /// Open the document if it has no session, otherwise change it.
    ///
    /// Concurrent calls for the same document share one request and all
    /// observe its outcome.
    pub async fn ensure_open_and_sync(
        &self,
        path: &str,
        content: &str,
    ) -> ServiceResult<SyncResponse> {
        validate_path(path)?;

        let role = {
            let mut in_flight = lock(&self.inner.in_flight);
            match in_flight.get(path) {
                Some(rx) => SyncRole::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(path.to_string(), rx);
                    SyncRole::Leader(tx)
                }
            }
        };

        match role {
            SyncRole::Follower(mut rx) => {
                debug!(path = %path, "joining in-flight sync");
                match rx.wait_for(Option::is_some).await {
                    Ok(outcome) => outcome.clone().unwrap_or_else(|| {
                        Err(ServiceError::Cancelled(format!("sync for {path} produced no outcome")))
                    }),
                    Err(_) => Err(ServiceError::Cancelled(format!(
                        "sync for {path} was abandoned"
                    ))),
                }
            }
            SyncRole::Leader(tx) => {
                let _guard = InFlightGuard {
                    in_flight: &self.inner.in_flight,
                    path,
                };
                let outcome = if self.session(path).is_some() {
                    self.change_file(path, content).await
                } else {
                    self.open_file(path, content).await
                };
                tx.send_replace(Some(outcome.clone()));
                outcome
            }
        }
    }

    // ── Capability requests ──

    pub async fn complete(
        &self,
        path: &str,
        position: Position,
    ) -> ServiceResult<Vec<CompletionEntry>> {
        let body = self.position_request(Operation::Complete, path, position).await?;
        Ok(types::parse_completions(&body))
    }

    pub async fn hover(
        &self,
        path: &str,
        position: Position,
    ) -> ServiceResult<Option<HoverInfo>> {
        let body = self.position_request(Operation::Hover, path, position).await?;
        types::parse_hover(&body)
    }

    pub async fn definition(
        &self,
        path: &str,
        position: Position,
    ) -> ServiceResult<Vec<DefinitionTarget>> {
        let body = self.position_request(Operation::Definition, path, position).await?;
        Ok(types::parse_definition(&body))
    }

    pub async fn signature(
        &self,
        path: &str,
        position: Position,
    ) -> ServiceResult<Option<SignatureHelpInfo>> {
        let body = self.position_request(Operation::Signature, path, position).await?;
        types::parse_signature(&body)
    }

    /// Full diagnostics snapshot across every document the service knows.
    pub async fn diagnostics(&self) -> ServiceResult<Vec<DiagnosticBatch>> {
        let body = self
            .inner
            .transport
            .request(Operation::Diagnostics, None)
            .await?;
        types::parse_diagnostics(&body)
    }

    async fn position_request(
        &self,
        operation: Operation,
        path: &str,
        position: Position,
    ) -> ServiceResult<Value> {
        validate_path(path)?;
        self.send(
            operation,
            &PositionRequest {
                file_path: path,
                line: position.line,
                character: position.character,
            },
        )
        .await
    }

    // ── Service lifecycle ──

    /// Start the language server behind the service.
    pub async fn initialize(&self) -> ServiceResult<()> {
        self.send(Operation::Initialize, &serde_json::json!({})).await?;
        info!("analysis service initialized");
        Ok(())
    }

    pub async fn set_project_root(&self, path: &str) -> ServiceResult<()> {
        self.send(Operation::SetProjectRoot, &PathRequest { path }).await?;
        Ok(())
    }

    pub async fn set_python_path(&self, path: &str) -> ServiceResult<()> {
        self.send(Operation::SetPythonPath, &PathRequest { path }).await?;
        Ok(())
    }

    /// Stop the language server. The service forgets every document, so
    /// local sessions are cleared too.
    pub async fn dispose(&self) -> ServiceResult<()> {
        self.send(Operation::Dispose, &serde_json::json!({})).await?;
        lock(&self.inner.sessions).clear();
        info!("analysis service disposed");
        Ok(())
    }

    /// Cancel every debounce timer owned by this client.
    pub fn shutdown(&self) {
        let mut debouncers = lock(&self.inner.debouncers);
        for debounced in debouncers.values() {
            debounced.cancel();
        }
        debouncers.clear();
    }
}

fn validate_path(path: &str) -> ServiceResult<()> {
    if path.trim().is_empty() {
        return Err(ServiceError::Validation("filePath required".into()));
    }
    if path.contains('\0') {
        return Err(ServiceError::Validation(format!(
            "filePath contains a NUL byte: {path:?}"
        )));
    }
    Ok(())
}
