//! Definition cache - last-known tool catalog per provider
//!
//! Snapshots live behind `Arc`s in a map guarded by a tokio `RwLock`. Fetches
//! run with no lock held; the write lock only covers swapping in the new
//! `Arc`, so readers always see a whole old or a whole new snapshot.

mod snapshot;

pub use snapshot::CatalogSnapshot;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::domain::ProviderEndpoint;
use crate::error::{GatewayError, Result};
use crate::tools::ProviderTransport;

/// Default background refresh period (30 minutes)
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Longest accepted refresh period (7 days)
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

pub struct DefinitionCache {
    endpoints: Vec<Arc<ProviderEndpoint>>,
    transport: Arc<dyn ProviderTransport>,
    snapshots: RwLock<HashMap<String, Arc<CatalogSnapshot>>>,
}

impl DefinitionCache {
    pub fn new(endpoints: Vec<Arc<ProviderEndpoint>>, transport: Arc<dyn ProviderTransport>) -> Self {
        let snapshots = endpoints
            .iter()
            .map(|e| (e.provider_id.clone(), Arc::new(CatalogSnapshot::empty(e.provider_id.clone()))))
            .collect();
        Self {
            endpoints,
            transport,
            snapshots: RwLock::new(snapshots),
        }
    }

    /// Configured endpoints, in configuration order
    pub fn endpoints(&self) -> &[Arc<ProviderEndpoint>] {
        &self.endpoints
    }

    pub fn endpoint(&self, provider_id: &str) -> Option<&Arc<ProviderEndpoint>> {
        self.endpoints.iter().find(|e| e.provider_id == provider_id)
    }

    pub fn transport(&self) -> Arc<dyn ProviderTransport> {
        Arc::clone(&self.transport)
    }

    /// Current snapshot for a provider. Never touches the network.
    pub async fn get(&self, provider_id: &str) -> Result<Arc<CatalogSnapshot>> {
        self.snapshots
            .read()
            .await
            .get(provider_id)
            .cloned()
            .ok_or_else(|| GatewayError::Configuration(format!("Unknown provider '{}'", provider_id)))
    }

    /// Fetch one provider's catalog and swap it in
    pub async fn refresh(&self, provider_id: &str) -> Result<Arc<CatalogSnapshot>> {
        let endpoint = self
            .endpoint(provider_id)
            .ok_or_else(|| GatewayError::Configuration(format!("Unknown provider '{}'", provider_id)))?;

        let fetched = self.transport.list_tools(endpoint).await;
        endpoint.observe(fetched.is_ok());

        // A failed fetch is built from whatever is current when the swap happens
        let mut snapshots = self.snapshots.write().await;
        let next = match fetched {
            Ok(tools) => {
                log::info!("Fetched {} tools from provider '{}'", tools.len(), provider_id);
                CatalogSnapshot::fetched(provider_id, tools, Utc::now())
            }
            Err(e) => {
                let previous = snapshots
                    .get(provider_id)
                    .cloned()
                    .ok_or_else(|| GatewayError::Configuration(format!("Unknown provider '{}'", provider_id)))?;
                if previous.fetched_at.is_some() {
                    log::warn!(
                        "Refresh of provider '{}' failed, keeping {} cached tools: {}",
                        provider_id,
                        previous.tools.len(),
                        e
                    );
                } else {
                    log::warn!("Provider '{}' has no catalog yet: {}", provider_id, e);
                }
                CatalogSnapshot::failed_after(&previous, e.to_string())
            }
        };

        let next = Arc::new(next);
        snapshots.insert(provider_id.to_string(), Arc::clone(&next));
        Ok(next)
    }

    /// Refresh every provider concurrently. One failure does not affect the others.
    pub async fn refresh_all(&self) -> Vec<Arc<CatalogSnapshot>> {
        let refreshes = self.endpoints.iter().map(|e| self.refresh(&e.provider_id));
        let results = join_all(refreshes).await;

        let mut snapshots = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => log::error!("Catalog refresh failed: {}", e),
            }
        }
        snapshots
    }

    /// Every provider's current snapshot, ordered by provider id
    pub async fn snapshot_all(&self) -> Vec<Arc<CatalogSnapshot>> {
        let mut snapshots: Vec<_> = self.snapshots.read().await.values().cloned().collect();
        snapshots.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        snapshots
    }
}

/// Run `refresh_all` every `period`, starting one period from now.
///
/// `period` is clamped to between one second and `MAX_REFRESH_INTERVAL`.
pub fn spawn_refresher(cache: Arc<DefinitionCache>, period: Duration) -> JoinHandle<()> {
    let period = period.clamp(MIN_REFRESH_INTERVAL, MAX_REFRESH_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            log::debug!("Periodic catalog refresh");
            let snapshots = cache.refresh_all().await;
            let stale = snapshots.iter().filter(|s| s.is_stale()).count();
            if stale > 0 {
                log::warn!("{} of {} providers are serving stale catalogs", stale, snapshots.len());
            }
        }
    })
}
