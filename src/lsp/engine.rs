//! In-process editor engine.
//!
//! Keeps documents, registrations and markers in memory. The CLI host
//! drives it directly; tests use its counters to observe what the
//! registry and the diagnostics poller did.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lsp_types::Position;

use super::{offset_at, Capability, Disposable, EditorEngine, LanguageProviders, Marker, TextModel};
use crate::service::lock;

/// A document held by [`MemoryEngine`].
#[derive(Debug)]
pub struct MemoryDocument {
    path: String,
    text: Mutex<String>,
}

impl MemoryDocument {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: Mutex::new(text.into()),
        }
    }

    pub fn set_text(&self, text: impl Into<String>) {
        *lock(&self.text) = text.into();
    }
}

impl TextModel for MemoryDocument {
    fn path(&self) -> &str {
        &self.path
    }

    fn text(&self) -> String {
        lock(&self.text).clone()
    }

    fn offset_at(&self, position: Position) -> usize {
        offset_at(&lock(&self.text), position)
    }
}

#[derive(Default)]
struct EngineState {
    next_id: AtomicU64,
    registrations: Mutex<HashMap<u64, (Capability, Arc<LanguageProviders>)>>,
    registered: Mutex<HashMap<Capability, usize>>,
    disposed: Mutex<HashMap<Capability, usize>>,
    markers: Mutex<HashMap<String, Vec<Marker>>>,
    marker_updates: AtomicU64,
}

/// Handle for one registration on a [`MemoryEngine`].
struct Registration {
    id: u64,
    state: Arc<EngineState>,
}

impl Disposable for Registration {
    fn dispose(self: Box<Self>) {
        let removed = lock(&self.state.registrations).remove(&self.id);
        if let Some((capability, _)) = removed {
            *lock(&self.state.disposed).entry(capability).or_default() += 1;
        }
    }
}

#[derive(Default)]
pub struct MemoryEngine {
    documents: Mutex<BTreeMap<String, Arc<MemoryDocument>>>,
    state: Arc<EngineState>,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("documents", &lock(&self.documents).len())
            .field("registrations", &lock(&self.state.registrations).len())
            .finish()
    }
}

impl MemoryEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // ── Documents ──

    pub fn open_document(&self, path: &str, text: &str) -> Arc<MemoryDocument> {
        let document = Arc::new(MemoryDocument::new(path, text));
        lock(&self.documents).insert(path.to_string(), document.clone());
        document
    }

    pub fn document(&self, path: &str) -> Option<Arc<MemoryDocument>> {
        lock(&self.documents).get(path).cloned()
    }

    /// Close a document: its markers go and the providers forget it.
    pub fn close_document(&self, path: &str) {
        lock(&self.documents).remove(path);
        lock(&self.state.markers).remove(path);
        if let Some(providers) = self.providers(Capability::Hover) {
            providers.document_closed(path);
        }
    }

    // ── Registrations ──

    /// The providers currently registered for a capability.
    pub fn providers(&self, capability: Capability) -> Option<Arc<LanguageProviders>> {
        lock(&self.state.registrations)
            .values()
            .find(|(c, _)| *c == capability)
            .map(|(_, providers)| providers.clone())
    }

    pub fn active_registrations(&self) -> usize {
        lock(&self.state.registrations).len()
    }

    /// How many times a capability was ever registered.
    pub fn registered_count(&self, capability: Capability) -> usize {
        lock(&self.state.registered).get(&capability).copied().unwrap_or(0)
    }

    pub fn disposed_count(&self, capability: Capability) -> usize {
        lock(&self.state.disposed).get(&capability).copied().unwrap_or(0)
    }

    // ── Markers ──

    pub fn markers(&self, path: &str) -> Vec<Marker> {
        lock(&self.state.markers).get(path).cloned().unwrap_or_default()
    }

    /// Number of `set_markers` calls received.
    pub fn marker_updates(&self) -> u64 {
        self.state.marker_updates.load(Ordering::SeqCst)
    }
}

impl EditorEngine for MemoryEngine {
    fn register(
        &self,
        capability: Capability,
        providers: Arc<LanguageProviders>,
    ) -> Box<dyn Disposable> {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.registrations).insert(id, (capability, providers));
        *lock(&self.state.registered).entry(capability).or_default() += 1;
        Box::new(Registration {
            id,
            state: self.state.clone(),
        })
    }

    fn open_documents(&self) -> Vec<String> {
        lock(&self.documents).keys().cloned().collect()
    }

    fn set_markers(&self, path: &str, owner: &str, markers: Vec<Marker>) {
        tracing::trace!(path = %path, owner = %owner, count = markers.len(), "markers replaced");
        lock(&self.state.markers).insert(path.to_string(), markers);
        self.state.marker_updates.fetch_add(1, Ordering::SeqCst);
    }
}
