//! Periodic diagnostics polling into widget markers.
//!
//! The service publishes diagnostics on its own schedule, so the bridge
//! pulls the full snapshot on an interval and replaces the marker set of
//! every open document. Documents the snapshot does not mention get an
//! empty set, which clears markers for problems that were fixed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lsp_types::{Diagnostic, NumberOrString};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{EditorEngine, Marker, MarkerSeverity, WidgetRange, MARKER_OWNER};
use crate::service::uri::file_uri;
use crate::service::{ServiceClient, ServiceResult};

/// Background task feeding diagnostics to one engine. Stops on drop.
#[derive(Debug)]
pub struct DiagnosticsPoller {
    task: JoinHandle<()>,
}

impl DiagnosticsPoller {
    /// Spawn the polling loop. The first poll runs immediately.
    pub fn start(client: ServiceClient, engine: Arc<dyn EditorEngine>, interval: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match poll_once(&client, engine.as_ref()).await {
                    Ok(documents) => debug!(documents, "diagnostics applied"),
                    Err(err) => warn!(error = %err, "diagnostics poll failed"),
                }
            }
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for DiagnosticsPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Fetch one snapshot and apply it. Returns how many documents were
/// updated.
pub async fn poll_once(client: &ServiceClient, engine: &dyn EditorEngine) -> ServiceResult<usize> {
    let batches = client.diagnostics().await?;
    let by_uri: HashMap<String, Vec<Marker>> = batches
        .into_iter()
        .map(|batch| (batch.uri, to_markers(&batch.entries)))
        .collect();

    let documents = engine.open_documents();
    for path in &documents {
        let uri = client
            .session(path)
            .map(|session| session.uri)
            .unwrap_or_else(|| file_uri(path));
        let markers = by_uri.get(&uri).cloned().unwrap_or_default();
        engine.set_markers(path, MARKER_OWNER, markers);
    }
    Ok(documents.len())
}

/// Convert raw entries, skipping any that are not valid diagnostics.
pub fn to_markers(entries: &[Value]) -> Vec<Marker> {
    entries
        .iter()
        .filter_map(|entry| match to_marker(entry) {
            Some(marker) => Some(marker),
            None => {
                debug!(entry = %entry, "skipping malformed diagnostic");
                None
            }
        })
        .collect()
}

pub fn to_marker(entry: &Value) -> Option<Marker> {
    let diagnostic: Diagnostic = serde_json::from_value(entry.clone()).ok()?;
    Some(Marker {
        range: WidgetRange::from_lsp(diagnostic.range),
        severity: MarkerSeverity::from_lsp(diagnostic.severity),
        message: diagnostic.message,
        source: diagnostic.source,
        code: diagnostic.code.map(|code| match code {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::String(s) => s,
        }),
    })
}
