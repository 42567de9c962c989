//! Connection cache: at most one negotiated connection per backend address.
//!
//! Lookups resolve the language to an address first, so every language that
//! shares an address shares one connection. The map lock is only held long
//! enough to fetch the address's slot; dialing happens inside the slot's
//! `OnceCell`, which serializes concurrent dials for one address without
//! blocking callers of other addresses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use crate::client::endpoint::EndpointSpec;
use crate::client::protocol::Backend;
use crate::client::transport::Dialer;
use crate::config::ClientOptions;
use crate::error::Result;

type Slot = Arc<OnceCell<Arc<Backend>>>;

pub struct ConnectionPool {
    spec: EndpointSpec,
    options: ClientOptions,
    dialer: Arc<dyn Dialer>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConnectionPool {
    pub fn new(spec: EndpointSpec, options: ClientOptions, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            spec,
            options,
            dialer,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn spec(&self) -> &EndpointSpec {
        &self.spec
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Negotiated backend serving `language`, dialing on first use.
    pub async fn get(&self, language: &str) -> Result<Arc<Backend>> {
        let address = self.spec.resolve(language)?;
        self.get_address(&address).await
    }

    /// Negotiated backend for a literal address.
    pub async fn get_address(&self, address: &str) -> Result<Arc<Backend>> {
        let slot = self.slot(address);
        let backend = slot
            .get_or_try_init(|| self.establish(address))
            .await?
            .clone();
        if !backend.is_closed() {
            return Ok(backend);
        }

        tracing::info!(%address, "evicting dead backend connection");
        self.evict(address, &slot);
        let slot = self.slot(address);
        let backend = slot.get_or_try_init(|| self.establish(address)).await?;
        Ok(Arc::clone(backend))
    }

    /// Number of addresses with an established connection.
    pub fn len(&self) -> usize {
        self.lock_slots()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every cached connection and empty the cache.
    ///
    /// All connections are closed even when some fail; the last failure is
    /// returned.
    pub async fn close(&self) -> Result<()> {
        let drained: Vec<(String, Slot)> = self.lock_slots().drain().collect();
        let mut last_error = None;
        for (address, slot) in drained {
            let Some(backend) = slot.get() else {
                continue;
            };
            if let Err(e) = backend.close().await {
                tracing::warn!(%address, error = %e, "failed to close backend connection");
                last_error = Some(e);
            } else {
                tracing::debug!(%address, "backend connection closed");
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn establish(&self, address: &str) -> Result<Arc<Backend>> {
        tracing::debug!(%address, "dialing backend");
        let channel = self.dialer.dial(address, &self.options).await?;
        match Backend::establish(Arc::clone(&channel), self.options.protocol).await {
            Ok(backend) => Ok(Arc::new(backend)),
            Err(e) => {
                let _ = channel.close().await;
                Err(e)
            }
        }
    }

    fn slot(&self, address: &str) -> Slot {
        let mut slots = self.lock_slots();
        Arc::clone(slots.entry(address.to_string()).or_default())
    }

    /// Remove `stale` unless another caller already replaced it.
    fn evict(&self, address: &str, stale: &Slot) {
        let mut slots = self.lock_slots();
        if slots.get(address).is_some_and(|cur| Arc::ptr_eq(cur, stale)) {
            slots.remove(address);
        }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("spec", &self.spec)
            .field("options", &self.options)
            .field("connections", &self.len())
            .finish()
    }
}
