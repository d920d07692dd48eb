//! Scan session state machine
//!
//! One session per adapter, either `Idle` or `Scanning`. While scanning, the
//! backend's discovery path upserts advertisement snapshots into the result
//! map concurrently with the caller; the map lock guarantees readers never
//! see a torn snapshot, and any sighting published before a `results()` call
//! is visible to it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::backend::{Backend, DiscoverySink};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::peripheral::{Peripheral, PeripheralInfo};

pub(crate) struct ScanSession {
    adapter_id: String,
    backend: Arc<dyn Backend>,
    config: ClientConfig,
    active: AtomicBool,
    /// Keyed by peripheral address; recreated at the start of each scan
    results: Arc<Mutex<HashMap<String, PeripheralInfo>>>,
}

impl ScanSession {
    pub(crate) fn new(backend: Arc<dyn Backend>, config: ClientConfig, adapter_id: String) -> Self {
        Self {
            adapter_id,
            backend,
            config,
            active: AtomicBool::new(false),
            results: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Idle → Scanning. Benign no-op when already scanning.
    pub(crate) async fn start(&self) -> Result<()> {
        if self.active.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Fresh result set per scan invocation.
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let sink = DiscoverySink::new(Arc::clone(&self.results));
        self.backend.scan_start(&self.adapter_id, sink).await?;
        self.active.store(true, Ordering::SeqCst);
        debug!("Scan started on adapter {}", self.adapter_id);
        Ok(())
    }

    /// Scanning → Idle. No-op when idle.
    pub(crate) async fn stop(&self) -> Result<()> {
        if !self.active.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.backend.scan_stop(&self.adapter_id).await?;
        self.active.store(false, Ordering::SeqCst);
        debug!("Scan stopped on adapter {}", self.adapter_id);
        Ok(())
    }

    /// Blocking timed scan: start, wait out `duration`, stop, return the
    /// final result set. Returns no earlier than `duration` after invocation.
    pub(crate) async fn scan_for(&self, duration: Duration) -> Result<Vec<Peripheral>> {
        self.start().await?;
        sleep(duration).await;
        self.stop().await?;
        Ok(self.results())
    }

    /// Timed scan using the configured `scan_timeout`.
    pub(crate) async fn scan_for_default(&self) -> Result<Vec<Peripheral>> {
        self.scan_for(self.config.scan_timeout).await
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Snapshot of the accumulating result set: partial while scanning,
    /// final afterwards. No two entries share an address.
    pub(crate) fn results(&self) -> Vec<Peripheral> {
        let results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        results
            .values()
            .cloned()
            .map(|info| Peripheral::new(Arc::clone(&self.backend), self.config.clone(), info))
            .collect()
    }
}
