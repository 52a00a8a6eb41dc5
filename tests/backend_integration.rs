//! End-to-end tests across the disk and remote tiers via the closed
//! `Backend` enum, exercising cross-cutting behavior a single
//! backend-level test doesn't already cover.
//!
//! Run with: `cargo test --test backend_integration`

use std::sync::Arc;

use kvchunk_cache::backend::remote::LmCacheServer;
use kvchunk_cache::backend::{Backend, BackendOps, DiskBackend, RemoteBackend};
use kvchunk_cache::memory_obj::{DType, HeapAllocator, MemoryFormat, MemoryObj, ObjMetadata};
use kvchunk_cache::{AsyncBridge, Allocator, CacheEngineKey, SerdeKind};

fn key(hash: &str) -> CacheEngineKey {
    CacheEngineKey::new("vllm", "llama-3-8b", 1, 0, hash).unwrap()
}

fn chunk(size: usize, fill: u8) -> MemoryObj {
    let metadata = ObjMetadata {
        shape: [size as u32, 0, 0, 0],
        dtype: DType::Uint8,
        fmt: MemoryFormat::BINARY,
    };
    MemoryObj::new(metadata, vec![fill; size])
}

#[tokio::test]
async fn disk_tier_survives_through_the_backend_enum() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = Arc::new(AsyncBridge::start().unwrap());
    let allocator: Arc<dyn Allocator> = Arc::new(HeapAllocator);
    let disk = DiskBackend::new(dir.path(), 1_000_000, bridge, allocator).unwrap();
    let backend = Backend::LocalDisk(disk);

    let k = key("a");
    backend
        .submit_put(k.clone(), chunk(128, 3))
        .unwrap()
        .await;

    assert!(backend.contains(&k).await);
    assert!(!backend.exists_in_put_tasks(&k));
    let loaded = backend.get_blocking(&k).unwrap();
    assert_eq!(loaded.byte_array(), vec![3u8; 128].as_slice());

    backend.close().await;
}

#[tokio::test]
async fn remote_tier_survives_through_the_backend_enum() {
    let server = LmCacheServer::bind("127.0.0.1:0").await.unwrap();
    let bridge = Arc::new(AsyncBridge::start().unwrap());
    let allocator: Arc<dyn Allocator> = Arc::new(HeapAllocator);
    let url = format!("lm://{}", server.local_addr());
    let remote = RemoteBackend::connect(&url, SerdeKind::Kivi, bridge, allocator)
        .await
        .unwrap();
    let backend = Backend::Remote(remote);

    let k = key("b");
    assert!(!backend.contains(&k).await);

    backend
        .submit_put(k.clone(), chunk(256, 9))
        .unwrap()
        .await;

    assert!(backend.contains(&k).await);
    let loaded = backend.get_blocking(&k).unwrap();
    assert_eq!(loaded.byte_array(), vec![9u8; 256].as_slice());
}

/// Concurrent puts of the same key both resolve, the final read is
/// byte-equal to one of the two writers, and inflight tracking clears.
#[tokio::test]
async fn concurrent_puts_to_the_same_key_both_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = Arc::new(AsyncBridge::start().unwrap());
    let allocator: Arc<dyn Allocator> = Arc::new(HeapAllocator);
    let disk = Arc::new(DiskBackend::new(dir.path(), 1_000_000, bridge, allocator).unwrap());

    let k = key("racy");
    let fut_a = disk.submit_put(k.clone(), chunk(64, 0xAA)).unwrap();
    let fut_b = disk.submit_put(k.clone(), chunk(64, 0xBB)).unwrap();
    tokio::join!(fut_a, fut_b);

    assert!(!disk.exists_in_put_tasks(&k));
    let loaded = disk.get_blocking(&k).unwrap();
    let bytes = loaded.byte_array();
    assert!(bytes == vec![0xAAu8; 64].as_slice() || bytes == vec![0xBBu8; 64].as_slice());
}

/// An object larger than total capacity is rejected synchronously and
/// never touches the index.
#[tokio::test]
async fn oversized_object_rejected_synchronously() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = Arc::new(AsyncBridge::start().unwrap());
    let allocator: Arc<dyn Allocator> = Arc::new(HeapAllocator);
    let disk = DiskBackend::new(dir.path(), 100, bridge, allocator).unwrap();
    let backend = Backend::LocalDisk(disk);

    let k = key("too-big");
    assert!(backend.submit_put(k.clone(), chunk(101, 1)).is_none());
    assert!(!backend.contains(&k).await);
}
