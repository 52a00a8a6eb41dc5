//! Local-disk storage tier.
//!
//! Grounded on the teacher's `ParallelDiskCache` (`spawn_blocking`-based
//! file I/O dispatched off the caller's thread) and on
//! `original_source/lmcache`'s `LocalDiskBackend` for the put/prefetch
//! sequencing (evict-then-write, snapshot-then-release-lock on read).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{BackendOps, BoxFuture};
use crate::bridge::AsyncBridge;
use crate::evictor::{DiskCacheMetadata, LruEvictor, PutStatus};
use crate::key::CacheEngineKey;
use crate::memory_obj::{Allocator, MemoryFormat, MemoryObj};

struct DiskState {
    index: IndexMap<CacheEngineKey, DiskCacheMetadata>,
    inflight: HashSet<CacheEngineKey>,
    evictor: LruEvictor,
}

/// Disk-backed storage tier.
///
/// A single `parking_lot::Mutex` guards `{index, inflight}`; all file I/O
/// happens outside the lock via the shared [`AsyncBridge`]. Files under
/// `root` are owned by this backend and must not be touched externally.
pub struct DiskBackend {
    root: PathBuf,
    state: Arc<Mutex<DiskState>>,
    bridge: Arc<AsyncBridge>,
    allocator: Arc<dyn Allocator>,
}

impl DiskBackend {
    /// Open (creating if missing) a disk backend rooted at `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        max_local_disk_size: u64,
        bridge: Arc<AsyncBridge>,
        allocator: Arc<dyn Allocator>,
    ) -> std::io::Result<Self> {
        let root = root.into();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
            info!(path = %root.display(), "created local disk cache directory");
        }
        Ok(Self {
            root,
            state: Arc::new(Mutex::new(DiskState {
                index: IndexMap::new(),
                inflight: HashSet::new(),
                evictor: LruEvictor::new(max_local_disk_size),
            })),
            bridge,
            allocator,
        })
    }

    /// Deterministic, injective filename mapping: `root/<key_with_/→->.pt`.
    fn path_for_key(&self, key: &CacheEngineKey) -> PathBuf {
        let filename = format!("{}.pt", key.to_string_canonical().replace('/', "-"));
        self.root.join(filename)
    }

    /// Total bytes currently accounted for by the index; always
    /// `<= max_local_disk_size`.
    pub fn allocated_bytes(&self) -> u64 {
        self.state.lock().evictor.allocated_bytes()
    }

    fn unlink_victim(state: &Arc<Mutex<DiskState>>, victim: &CacheEngineKey) {
        let removed = state.lock().index.shift_remove(victim);
        if let Some(meta) = removed {
            state.lock().evictor.record_evicted(meta.size_bytes as u64);
            if let Err(e) = std::fs::remove_file(&meta.path) {
                warn!(key = %victim, path = %meta.path, error = %e, "failed to unlink evicted file, keeping eviction committed in-memory");
            }
        }
    }
}

impl BackendOps for DiskBackend {
    fn contains(&self, key: &CacheEngineKey) -> BoxFuture<'_, bool> {
        let present = self.state.lock().index.contains_key(key);
        Box::pin(std::future::ready(present))
    }

    fn exists_in_put_tasks(&self, key: &CacheEngineKey) -> bool {
        self.state.lock().inflight.contains(key)
    }

    fn submit_put(&self, key: CacheEngineKey, obj: MemoryObj) -> Option<BoxFuture<'static, ()>> {
        let physical_size = obj.physical_size() as u64;

        let victims = {
            let state = self.state.lock();
            let (victims, status) = state.evictor.update_on_put(&state.index, physical_size);
            if status == PutStatus::Illegal {
                debug!(key = %key, size = physical_size, "put rejected: exceeds total capacity");
                return None;
            }
            victims
        };

        for victim in &victims {
            Self::unlink_victim(&self.state, victim);
        }

        self.allocator.ref_count_up(&obj);
        self.state.lock().inflight.insert(key.clone());

        let path = self.path_for_key(&key);
        let state = Arc::clone(&self.state);
        let allocator = Arc::clone(&self.allocator);

        let handle = self.bridge.submit(async move {
            write_and_commit(state, allocator, key, path, obj).await;
        });

        Some(Box::pin(async move {
            let _ = handle.await;
        }))
    }

    fn submit_prefetch(&self, key: CacheEngineKey) -> Option<BoxFuture<'static, Option<MemoryObj>>> {
        let snapshot = {
            let mut state = self.state.lock();
            let meta = state.index.get(&key)?.clone();
            state.evictor.update_on_hit(&key, &mut state.index);
            meta
        };

        let allocator = Arc::clone(&self.allocator);
        let handle = self.bridge.submit(async move {
            load_from_disk(allocator, &snapshot).await
        });

        Some(Box::pin(async move { handle.await.unwrap_or(None) }))
    }

    fn get_blocking(&self, key: &CacheEngineKey) -> Option<MemoryObj> {
        let snapshot = {
            let mut state = self.state.lock();
            let meta = state.index.get(key)?.clone();
            state.evictor.update_on_hit(key, &mut state.index);
            meta
        };

        let mut obj = self
            .allocator
            .allocate(snapshot.shape, snapshot.dtype, MemoryFormat::KV_BLOB)?;
        match std::fs::read(&snapshot.path) {
            Ok(bytes) => {
                *obj.byte_array_mut() = bytes;
                Some(obj)
            }
            Err(e) => {
                warn!(path = %snapshot.path, error = %e, "disk read failed, treating as miss");
                None
            }
        }
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(std::future::ready(()))
    }
}

async fn write_and_commit(
    state: Arc<Mutex<DiskState>>,
    allocator: Arc<dyn Allocator>,
    key: CacheEngineKey,
    path: PathBuf,
    obj: MemoryObj,
) {
    let metadata = obj.metadata();
    let size_bytes = obj.physical_size();

    let write_result = tokio::task::spawn_blocking({
        let path = path.clone();
        let bytes = obj.byte_array().to_vec();
        move || std::fs::write(&path, bytes)
    })
    .await;

    match write_result {
        Ok(Ok(())) => {
            let mut st = state.lock();
            if let Some(old) = st.index.shift_remove(&key) {
                st.evictor.record_evicted(old.size_bytes as u64);
            }
            st.index.insert(
                key.clone(),
                DiskCacheMetadata {
                    path: path_to_string(&path),
                    size_bytes,
                    shape: metadata.shape,
                    dtype: metadata.dtype,
                },
            );
            st.evictor.record_inserted(size_bytes as u64);
        }
        Ok(Err(e)) => {
            warn!(key = %key, error = %e, "disk write failed, put will be reported as a miss");
        }
        Err(e) => {
            warn!(key = %key, error = %e, "disk write task panicked");
        }
    }

    allocator.ref_count_down(&obj);
    state.lock().inflight.remove(&key);
}

async fn load_from_disk(allocator: Arc<dyn Allocator>, meta: &DiskCacheMetadata) -> Option<MemoryObj> {
    let mut obj = allocator.allocate(meta.shape, meta.dtype, MemoryFormat::KV_BLOB)?;
    let path = meta.path.clone();
    let bytes = tokio::task::spawn_blocking(move || std::fs::read(&path))
        .await
        .ok()?
        .ok()?;
    *obj.byte_array_mut() = bytes;
    Some(obj)
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_obj::{DType, HeapAllocator, ObjMetadata};

    fn backend(max_size: u64) -> (DiskBackend, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Arc::new(AsyncBridge::start().unwrap());
        let allocator: Arc<dyn Allocator> = Arc::new(HeapAllocator);
        let backend = DiskBackend::new(dir.path(), max_size, bridge, allocator).unwrap();
        (backend, dir)
    }

    fn obj(size: usize) -> MemoryObj {
        let metadata = ObjMetadata {
            shape: [size as u32, 0, 0, 0],
            dtype: DType::Uint8,
            fmt: MemoryFormat::BINARY,
        };
        MemoryObj::new(metadata, vec![7u8; size])
    }

    fn key(hash: &str) -> CacheEngineKey {
        CacheEngineKey::new("vllm", "m", 1, 0, hash).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips_bytes() {
        let (backend, _dir) = backend(1_000_000);
        let k = key("a");
        let fut = backend.submit_put(k.clone(), obj(64)).unwrap();
        fut.await;

        assert!(backend.contains(&k).await);
        let loaded = backend.get_blocking(&k).unwrap();
        assert_eq!(loaded.byte_array(), vec![7u8; 64].as_slice());
    }

    #[tokio::test]
    async fn inflight_set_tracks_lifecycle() {
        let (backend, _dir) = backend(1_000_000);
        let k = key("a");
        let fut = backend.submit_put(k.clone(), obj(64)).unwrap();
        assert!(backend.exists_in_put_tasks(&k));
        fut.await;
        assert!(!backend.exists_in_put_tasks(&k));
    }

    #[tokio::test]
    async fn re_put_of_existing_key_does_not_double_count_size() {
        let (backend, _dir) = backend(1_000_000);
        let k = key("a");
        backend.submit_put(k.clone(), obj(64)).unwrap().await;
        assert_eq!(backend.allocated_bytes(), 64);

        backend.submit_put(k.clone(), obj(64)).unwrap().await;
        assert_eq!(backend.allocated_bytes(), 64);
    }

    #[tokio::test]
    async fn oversized_put_is_rejected_without_mutating_index() {
        let (backend, _dir) = backend(100);
        let k = key("a");
        assert!(backend.submit_put(k.clone(), obj(200)).is_none());
        assert!(!backend.contains(&k).await);
    }

    #[tokio::test]
    async fn eviction_respects_capacity_and_recency() {
        let (backend, _dir) = backend(300);
        let keys: Vec<_> = (1..=5).map(|i| key(&format!("k{i}"))).collect();
        for k in &keys {
            backend.submit_put(k.clone(), obj(100)).unwrap().await;
        }

        assert!(!backend.contains(&keys[0]).await);
        assert!(!backend.contains(&keys[1]).await);
        for k in &keys[2..] {
            assert!(backend.contains(k).await);
        }
        assert_eq!(backend.allocated_bytes(), 300);
    }

    #[tokio::test]
    async fn hit_refreshes_recency() {
        let (backend, _dir) = backend(300);
        let k1 = key("k1");
        let k2 = key("k2");
        backend.submit_put(k1.clone(), obj(100)).unwrap().await;
        backend.submit_put(k2.clone(), obj(100)).unwrap().await;

        // k1 is now the least-recent entry; refresh it before k2 becomes
        // the eviction target.
        assert!(backend.get_blocking(&k1).is_some());

        backend.submit_put(key("k3"), obj(100)).unwrap().await;
        backend.submit_put(key("k4"), obj(100)).unwrap().await;

        assert!(backend.contains(&k1).await, "k1 should survive the refreshed hit");
        assert!(!backend.contains(&k2).await, "k2 should be evicted as the new least-recent entry");
    }

    #[tokio::test]
    async fn missing_key_prefetch_returns_none() {
        let (backend, _dir) = backend(1_000_000);
        assert!(backend.submit_prefetch(key("missing")).is_none());
    }
}
