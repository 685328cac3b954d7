//! Per-engine provider registration with reference counting.
//!
//! Several widgets can sit on one editor engine. Providers and the
//! diagnostics poller are registered once per engine: the first widget
//! to acquire sets them up, the last one to release tears them down.
//! Records are keyed by the engine's identity (its allocation address);
//! the record keeps the engine alive, so the address cannot be reused
//! while it is a key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use super::diagnostics::DiagnosticsPoller;
use super::{Capability, Disposable, EditorEngine, LanguageProviders};
use crate::config::BridgeConfig;
use crate::service::{lock, ServiceClient};

type EngineKey = usize;

fn engine_key(engine: &Arc<dyn EditorEngine>) -> EngineKey {
    Arc::as_ptr(engine) as *const () as usize
}

struct ProviderRecord {
    engine: Arc<dyn EditorEngine>,
    count: usize,
    registrations: Vec<Box<dyn Disposable>>,
    poller: DiagnosticsPoller,
}

impl ProviderRecord {
    fn tear_down(self) {
        self.poller.stop();
        for registration in self.registrations {
            registration.dispose();
        }
    }
}

/// Proof that a widget holds a reference on an engine's providers.
///
/// Not `Clone`; [`ProviderRegistry::release`] consumes it, so each
/// acquisition is released at most once.
#[must_use = "a lease that is never released keeps the providers registered"]
#[derive(Debug)]
pub struct ProviderLease {
    key: EngineKey,
}

/// Host-owned table of per-engine provider records.
pub struct ProviderRegistry {
    client: ServiceClient,
    config: BridgeConfig,
    records: Mutex<HashMap<EngineKey, ProviderRecord>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("engines", &self.len())
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    pub fn new(client: ServiceClient, config: &BridgeConfig) -> Self {
        Self {
            client,
            config: config.clone(),
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    fn diagnostics_interval(&self) -> Duration {
        self.config.diagnostics_interval()
    }

    /// Take a reference on the engine's providers, registering them and
    /// starting diagnostics on first use. Must run inside a tokio runtime.
    pub fn acquire(&self, engine: Arc<dyn EditorEngine>) -> ProviderLease {
        let key = engine_key(&engine);
        let mut records = lock(&self.records);

        if let Some(record) = records.get_mut(&key) {
            record.count += 1;
            debug!(engine = key, count = record.count, "provider record shared");
            return ProviderLease { key };
        }

        let providers = Arc::new(LanguageProviders::new(self.client.clone(), &self.config));
        let registrations = Capability::ALL
            .iter()
            .map(|capability| engine.register(*capability, providers.clone()))
            .collect();
        let poller = DiagnosticsPoller::start(
            self.client.clone(),
            engine.clone(),
            self.diagnostics_interval(),
        );
        records.insert(
            key,
            ProviderRecord {
                engine,
                count: 1,
                registrations,
                poller,
            },
        );
        info!(engine = key, "language providers registered");
        ProviderLease { key }
    }

    /// Drop a reference; the last one disposes every registration and
    /// stops diagnostics.
    pub fn release(&self, lease: ProviderLease) {
        let removed = {
            let mut records = lock(&self.records);
            match records.get_mut(&lease.key) {
                Some(record) if record.count > 1 => {
                    record.count -= 1;
                    debug!(engine = lease.key, count = record.count, "provider reference released");
                    None
                }
                Some(_) => records.remove(&lease.key),
                None => {
                    debug!(engine = lease.key, "release after shutdown ignored");
                    None
                }
            }
        };

        if let Some(record) = removed {
            record.tear_down();
            info!(engine = lease.key, "language providers disposed");
        }
    }

    /// Outstanding leases on an engine.
    pub fn ref_count(&self, engine: &Arc<dyn EditorEngine>) -> usize {
        lock(&self.records)
            .get(&engine_key(engine))
            .map(|record| record.count)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }

    /// Tear down every record regardless of outstanding leases.
    pub fn shutdown(&self) {
        let records: Vec<ProviderRecord> = lock(&self.records).drain().map(|(_, r)| r).collect();
        let count = records.len();
        for record in records {
            record.tear_down();
        }
        self.client.shutdown();
        info!(engines = count, "provider registry shut down");
    }
}
