//! Remote storage tier: a wire-protocol connector plus inflight tracking.
//!
//! Grounded on `original_source/lmcache`'s `RemoteBackend` for the exact
//! put/get sequencing (refcount-up before enqueue, no refcount-down on put
//! completion — the serde owns the compressed object's lifetime) and on
//! the teacher's `cache::traits` `BoxFuture` convention.

pub mod connector;
pub mod server;

pub use connector::{create_connector, Connector, LmConnector};
pub use server::LmCacheServer;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::backend::{BackendOps, BoxFuture};
use crate::bridge::AsyncBridge;
use crate::error::CacheError;
use crate::key::CacheEngineKey;
use crate::memory_obj::{Allocator, MemoryObj};
use crate::serde::{create_serde, Deserializer, SerdeKind, Serializer};

/// Remote storage tier over a wire-protocol [`Connector`].
///
/// A per-instance `parking_lot::Mutex` guards the inflight-put set; the
/// transport connection itself is only ever touched from coroutines
/// running on the shared bridge's loop thread.
pub struct RemoteBackend {
    connector: Arc<dyn Connector>,
    inflight: Arc<Mutex<HashSet<CacheEngineKey>>>,
    bridge: Arc<AsyncBridge>,
    serializer: Arc<dyn Serializer>,
    deserializer: Arc<dyn Deserializer>,
    allocator: Arc<dyn Allocator>,
}

impl RemoteBackend {
    /// Resolve `remote_url`'s scheme, establish the transport, and wire up
    /// the configured serde flavour.
    pub async fn connect(
        remote_url: &str,
        serde_kind: SerdeKind,
        bridge: Arc<AsyncBridge>,
        allocator: Arc<dyn Allocator>,
    ) -> Result<Self, CacheError> {
        let connector = create_connector(remote_url).await?;
        let (serializer, deserializer) = create_serde(serde_kind);
        Ok(Self {
            connector: Arc::from(connector),
            inflight: Arc::new(Mutex::new(HashSet::new())),
            bridge,
            serializer: Arc::from(serializer),
            deserializer: Arc::from(deserializer),
            allocator,
        })
    }
}

impl BackendOps for RemoteBackend {
    fn contains(&self, key: &CacheEngineKey) -> BoxFuture<'_, bool> {
        let connector = Arc::clone(&self.connector);
        let key = key.clone();
        let present = self
            .bridge
            .block_on(async move { connector.exists(key).await })
            .ok()
            .and_then(|r| r.ok())
            .unwrap_or(false);
        Box::pin(std::future::ready(present))
    }

    fn exists_in_put_tasks(&self, key: &CacheEngineKey) -> bool {
        self.inflight.lock().contains(key)
    }

    fn submit_put(&self, key: CacheEngineKey, obj: MemoryObj) -> Option<BoxFuture<'static, ()>> {
        self.allocator.ref_count_up(&obj);
        self.inflight.lock().insert(key.clone());

        let compressed = match self.serializer.serialize(&obj) {
            Ok(c) => c,
            Err(e) => {
                warn!(key = %key, error = %e, "serialisation failed, put will not be submitted");
                self.inflight.lock().remove(&key);
                return None;
            }
        };

        let connector = Arc::clone(&self.connector);
        let inflight = Arc::clone(&self.inflight);
        let key_for_task = key.clone();

        let handle = self.bridge.submit(async move {
            if let Err(e) = connector.put(key_for_task.clone(), compressed).await {
                warn!(key = %key_for_task, error = %e, "remote put failed");
            }
            inflight.lock().remove(&key_for_task);
        });

        Some(Box::pin(async move {
            let _ = handle.await;
        }))
    }

    fn submit_prefetch(&self, key: CacheEngineKey) -> Option<BoxFuture<'static, Option<MemoryObj>>> {
        let connector = Arc::clone(&self.connector);
        let exists = self.bridge.block_on({
            let connector = Arc::clone(&connector);
            let key = key.clone();
            async move { connector.exists(key).await }
        });
        if !matches!(exists, Ok(Ok(true))) {
            return None;
        }

        let deserializer = Arc::clone(&self.deserializer);
        let handle = self.bridge.submit(async move {
            match connector.get(key).await {
                Ok(Some(compressed)) => deserializer.deserialize(&compressed).ok(),
                Ok(None) => None,
                Err(e) => {
                    warn!(error = %e, "remote prefetch failed");
                    None
                }
            }
        });
        Some(Box::pin(async move { handle.await.unwrap_or(None) }))
    }

    fn get_blocking(&self, key: &CacheEngineKey) -> Option<MemoryObj> {
        let connector = Arc::clone(&self.connector);
        let key = key.clone();
        let result = self
            .bridge
            .block_on(async move { connector.get(key).await });

        match result {
            Ok(Ok(Some(compressed))) => match self.deserializer.deserialize(&compressed) {
                Ok(plain) => Some(plain),
                Err(e) => {
                    warn!(error = %e, "deserialisation failed on remote get");
                    None
                }
            },
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(error = %e, "remote get failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "remote get task panicked");
                None
            }
        }
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        let connector = Arc::clone(&self.connector);
        if let Err(e) = self.bridge.block_on(async move { connector.close().await }) {
            warn!(error = %e, "error closing remote connection");
        }
        Box::pin(std::future::ready(()))
    }
}
