//! Storage-backend tier abstraction.
//!
//! Every tier implements the same operation set
//! ([`contains`](BackendOps::contains), [`submit_put`](BackendOps::submit_put),
//! [`submit_prefetch`](BackendOps::submit_prefetch), …) through [`BackendOps`].
//! Polymorphism is a small closed variant ([`Backend`]), not an open
//! `dyn Trait` hierarchy — `Backend` delegates to whichever concrete tier
//! it wraps via `match`.

pub mod disk;
pub mod remote;

use std::future::Future;
use std::pin::Pin;

pub use disk::DiskBackend;
pub use remote::RemoteBackend;

use crate::key::CacheEngineKey;
use crate::memory_obj::MemoryObj;

/// Boxed future type for dyn-compatible async methods, mirrored from the
/// teacher's `cache::traits::BoxFuture` convention.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Uniform operation set every storage tier implements.
///
/// `submit_put`/`submit_prefetch` return `None` synchronously when the
/// operation can be rejected without touching I/O (capacity exceeded,
/// key unknown); otherwise they return a future the caller may hold,
/// `.await`, or block on via [`crate::bridge::AsyncBridge::block_on`].
pub trait BackendOps {
    /// Whether `key` is currently present. Never affects recency.
    fn contains(&self, key: &CacheEngineKey) -> BoxFuture<'_, bool>;

    /// Whether `key` has an accepted-but-not-completed put.
    fn exists_in_put_tasks(&self, key: &CacheEngineKey) -> bool;

    /// Accept `obj` for asynchronous persistence under `key`.
    ///
    /// Returns `None` iff the evictor rejects the object as larger than
    /// total capacity. Otherwise refcount is incremented, `key` is added
    /// to the inflight set, and a write is enqueued on the shared bridge;
    /// both are undone by the completion hook regardless of success.
    fn submit_put(&self, key: CacheEngineKey, obj: MemoryObj) -> Option<BoxFuture<'static, ()>>;

    /// Asynchronously load `key`, updating recency on hit.
    ///
    /// Returns `None` synchronously iff `key` is unknown. The returned
    /// future yields `Some(obj)` on success or `None` on a failure that
    /// occurs after acceptance (allocation failure, missing file, transport
    /// error).
    fn submit_prefetch(&self, key: CacheEngineKey) -> Option<BoxFuture<'static, Option<MemoryObj>>>;

    /// Synchronously load `key`, updating recency iff present.
    fn get_blocking(&self, key: &CacheEngineKey) -> Option<MemoryObj>;

    /// Flush pending work and release resources. Idempotent.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Closed set of storage tiers a cache engine can be backed by.
pub enum Backend {
    LocalDisk(DiskBackend),
    Remote(RemoteBackend),
}

impl BackendOps for Backend {
    fn contains(&self, key: &CacheEngineKey) -> BoxFuture<'_, bool> {
        match self {
            Backend::LocalDisk(b) => b.contains(key),
            Backend::Remote(b) => b.contains(key),
        }
    }

    fn exists_in_put_tasks(&self, key: &CacheEngineKey) -> bool {
        match self {
            Backend::LocalDisk(b) => b.exists_in_put_tasks(key),
            Backend::Remote(b) => b.exists_in_put_tasks(key),
        }
    }

    fn submit_put(&self, key: CacheEngineKey, obj: MemoryObj) -> Option<BoxFuture<'static, ()>> {
        match self {
            Backend::LocalDisk(b) => b.submit_put(key, obj),
            Backend::Remote(b) => b.submit_put(key, obj),
        }
    }

    fn submit_prefetch(&self, key: CacheEngineKey) -> Option<BoxFuture<'static, Option<MemoryObj>>> {
        match self {
            Backend::LocalDisk(b) => b.submit_prefetch(key),
            Backend::Remote(b) => b.submit_prefetch(key),
        }
    }

    fn get_blocking(&self, key: &CacheEngineKey) -> Option<MemoryObj> {
        match self {
            Backend::LocalDisk(b) => b.get_blocking(key),
            Backend::Remote(b) => b.get_blocking(key),
        }
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        match self {
            Backend::LocalDisk(b) => b.close(),
            Backend::Remote(b) => b.close(),
        }
    }
}
