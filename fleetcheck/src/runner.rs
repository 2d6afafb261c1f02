//! Run orchestration
//!
//! Fans collection out across devices, then evaluation out across checks,
//! isolating every failure at the smallest unit that can absorb it. The
//! only fatal errors are configuration problems found before any
//! collection begins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::cache::CommandCache;
use crate::checks::{Check, CheckRun};
use crate::device::Device;
use crate::errors::FleetcheckError;
use crate::report::ResultStore;

/// Runner options
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Only bind checks to devices that answered the identity command
    pub established_only: bool,

    /// Bind checks only to devices carrying at least one of these tags
    pub tags: Option<Vec<String>>,

    /// Global deadline. When it expires no new collection is issued;
    /// in-flight collections finish under their own command timeouts.
    pub overall_timeout: Option<Duration>,

    /// Max devices collected concurrently
    pub max_concurrent_devices: usize,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            established_only: false,
            tags: None,
            overall_timeout: None,
            max_concurrent_devices: 16,
        }
    }
}

/// Orchestrates collection and evaluation across a device fleet
pub struct Runner {
    settings: RunnerSettings,
}

impl Runner {
    pub fn new(settings: RunnerSettings) -> Self {
        Self { settings }
    }

    /// Run the full catalog against the device set, appending one verdict
    /// record per (device, check) pair to the store.
    pub async fn run(
        &self,
        devices: Vec<Arc<dyn Device>>,
        catalog: Vec<Arc<dyn Check>>,
        store: Arc<ResultStore>,
    ) -> Result<(), FleetcheckError> {
        if devices.is_empty() {
            return Err(FleetcheckError::ConfigError(
                "cannot run with an empty device set".to_string(),
            ));
        }
        if catalog.is_empty() {
            return Err(FleetcheckError::ConfigError(
                "cannot run with an empty check catalog".to_string(),
            ));
        }

        info!(
            devices = devices.len(),
            checks = catalog.len(),
            "Refreshing devices"
        );
        join_all(devices.iter().map(|d| d.refresh())).await;

        let devices: Vec<Arc<dyn Device>> = devices
            .into_iter()
            .filter(|d| {
                let info = d.info();
                if let Some(tags) = &self.settings.tags {
                    if !info.has_any_tag(tags) {
                        debug!(device = %info.name, "Filtered out by tags");
                        return false;
                    }
                }
                if self.settings.established_only && !info.is_established {
                    debug!(device = %info.name, "Filtered out: not established");
                    return false;
                }
                true
            })
            .collect();

        if devices.is_empty() {
            warn!("No devices left after filtering; nothing to run");
            return Ok(());
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let timer = self.settings.overall_timeout.map(|timeout| {
            let cancelled = Arc::clone(&cancelled);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!("Global deadline reached; no further collection will be issued");
                cancelled.store(true, Ordering::SeqCst);
            })
        });

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_devices));
        let mut handles = Vec::with_capacity(devices.len());

        for device in devices {
            let catalog = catalog.clone();
            let store = Arc::clone(&store);
            let cancelled = Arc::clone(&cancelled);
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                run_device(device, catalog, &store, &cancelled).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                // A panicked device task never takes its siblings down
                error!("Device task aborted: {}", e);
            }
        }

        if let Some(timer) = timer {
            timer.abort();
        }

        info!(records = store.len(), "Run complete");
        Ok(())
    }
}

/// Collect and evaluate everything bound to one device.
///
/// Collection of the deduplicated command union strictly precedes
/// evaluation of every check on this device.
async fn run_device(
    device: Arc<dyn Device>,
    catalog: Vec<Arc<dyn Check>>,
    store: &ResultStore,
    cancelled: &AtomicBool,
) {
    let device_name = device.info().name;
    let cache = CommandCache::new();

    let mut runs: Vec<CheckRun> = catalog
        .into_iter()
        .map(|check| CheckRun::new(check, Arc::clone(&device)))
        .collect();
    for run in &mut runs {
        run.prepare(&cache);
    }

    if cancelled.load(Ordering::SeqCst) {
        warn!(device = %device_name, "Run cancelled; skipping collection");
    } else {
        let pending = cache.pending();
        debug!(
            device = %device_name,
            distinct = cache.len(),
            pending = pending.len(),
            "Collecting commands"
        );
        if !pending.is_empty() {
            device.collect(&pending).await;
        }
    }

    for run in &mut runs {
        run.evaluate();
        run.record_into(store);
    }
}
