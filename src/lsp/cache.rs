//! Short-lived response caches for hover and signature help.
//!
//! Hover events fire repeatedly for the same position and signature help
//! re-triggers on every keystroke inside a call. Both caches absorb those
//! duplicates. Entries older than their window are misses, but the last
//! entry stays available as a fallback when a request fails.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::service::{HoverInfo, SignatureHelpInfo};

/// A cached payload and when it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub stored_at: Instant,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, window: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < window
    }
}

/// Hover results keyed by `(document, cursor offset)`.
#[derive(Debug)]
pub struct HoverCache {
    window: Duration,
    entries: HashMap<(String, usize), CacheEntry<Option<HoverInfo>>>,
}

impl HoverCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// The cached hover if it is still inside the freshness window.
    pub fn fresh(&self, path: &str, offset: usize, now: Instant) -> Option<Option<HoverInfo>> {
        self.entries
            .get(&(path.to_string(), offset))
            .filter(|entry| entry.is_fresh(self.window, now))
            .map(|entry| entry.payload.clone())
    }

    /// The last stored hover for this position, however old.
    pub fn last(&self, path: &str, offset: usize) -> Option<Option<HoverInfo>> {
        self.entries
            .get(&(path.to_string(), offset))
            .map(|entry| entry.payload.clone())
    }

    pub fn store(&mut self, path: &str, offset: usize, payload: Option<HoverInfo>, now: Instant) {
        self.entries.insert(
            (path.to_string(), offset),
            CacheEntry {
                stored_at: now,
                payload,
            },
        );
    }

    /// Drop every entry for a document.
    pub fn forget(&mut self, path: &str) {
        self.entries.retain(|(p, _), _| p != path);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
struct SignatureEntry {
    open_offset: usize,
    entry: CacheEntry<Option<SignatureHelpInfo>>,
}

/// Signature help keyed by document; one call context per document.
#[derive(Debug)]
pub struct SignatureCache {
    window: Duration,
    entries: HashMap<String, SignatureEntry>,
}

impl SignatureCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Fresh only for the same call-open offset and within the window.
    pub fn fresh(
        &self,
        path: &str,
        open_offset: usize,
        now: Instant,
    ) -> Option<Option<SignatureHelpInfo>> {
        self.entries
            .get(path)
            .filter(|e| e.open_offset == open_offset && e.entry.is_fresh(self.window, now))
            .map(|e| e.entry.payload.clone())
    }

    /// The last stored signature help for this document, whatever call it
    /// belonged to.
    pub fn last(&self, path: &str) -> Option<Option<SignatureHelpInfo>> {
        self.entries.get(path).map(|e| e.entry.payload.clone())
    }

    pub fn store(
        &mut self,
        path: &str,
        open_offset: usize,
        payload: Option<SignatureHelpInfo>,
        now: Instant,
    ) {
        self.entries.insert(
            path.to_string(),
            SignatureEntry {
                open_offset,
                entry: CacheEntry {
                    stored_at: now,
                    payload,
                },
            },
        );
    }

    pub fn forget(&mut self, path: &str) {
        self.entries.remove(path);
    }
}

/// Both caches, owned together by the shared providers.
#[derive(Debug)]
pub struct ResponseCache {
    pub hover: HoverCache,
    pub signature: SignatureCache,
}

impl ResponseCache {
    pub fn new(hover_window: Duration, signature_window: Duration) -> Self {
        Self {
            hover: HoverCache::new(hover_window),
            signature: SignatureCache::new(signature_window),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(1))
    }
}
