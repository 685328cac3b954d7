//! Trailing-edge debouncing of document changes.
//!
//! Each [`DebouncedChange`] owns one background task. Calls are queued
//! per document; a document's change fires once its quiet period has
//! elapsed, carrying only the most recent content.

use std::collections::HashMap;
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use super::{ClientInner, ServiceClient};

#[derive(Debug)]
struct QueuedChange {
    path: String,
    content: String,
}

/// Handle to a debounced `change_file`. Cheap to clone; all clones feed
/// the same timer.
#[derive(Debug, Clone)]
pub struct DebouncedChange {
    delay: Duration,
    tx: mpsc::UnboundedSender<QueuedChange>,
    task: AbortHandle,
}

impl DebouncedChange {
    pub(crate) fn spawn(client: Weak<ClientInner>, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(client, delay, rx)).abort_handle();
        Self { delay, tx, task }
    }

    /// Queue a change. Restarts the document's quiet period.
    pub fn call(&self, path: impl Into<String>, content: impl Into<String>) {
        let change = QueuedChange {
            path: path.into(),
            content: content.into(),
        };
        if self.tx.send(change).is_err() {
            warn!(
                delay_ms = self.delay.as_millis() as u64,
                "debounced change dropped: timer cancelled"
            );
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Stop the timer. Pending changes are discarded.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run(
    client: Weak<ClientInner>,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<QueuedChange>,
) {
    let mut queued: HashMap<String, (String, Instant)> = HashMap::new();

    loop {
        let next_deadline = queued.values().map(|(_, deadline)| *deadline).min();

        tokio::select! {
            change = rx.recv() => {
                let Some(change) = change else {
                    break;
                };
                queued.insert(change.path, (change.content, Instant::now() + delay));
            }
            _ = sleep_until(next_deadline.unwrap_or_else(Instant::now)),
                if next_deadline.is_some() =>
            {
                let now = Instant::now();
                let due: Vec<String> = queued
                    .iter()
                    .filter(|(_, (_, deadline))| *deadline <= now)
                    .map(|(path, _)| path.clone())
                    .collect();

                for path in due {
                    let Some((content, _)) = queued.remove(&path) else {
                        continue;
                    };
                    let Some(inner) = client.upgrade() else {
                        debug!("client dropped; debounce timer exiting");
                        return;
                    };
                    let client = ServiceClient::from_inner(inner);
                    tokio::spawn(async move {
                        if let Err(e) = client.change_file(&path, &content).await {
                            warn!(path = %path, "debounced change failed: {e}");
                        }
                    });
                }
            }
        }
    }
}
