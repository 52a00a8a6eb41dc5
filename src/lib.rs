//! Multi-tier cache core for model-inference KV chunks.
//!
//! Three tightly coupled subsystems make up the core: a storage-backend
//! tier abstraction with local-disk and remote implementations
//! ([`backend`]), byte-bounded LRU admission/eviction ([`evictor`]), and the
//! wire protocol framing a remote connector speaks to a cache server
//! ([`wire`]). A dedicated-thread [`bridge`] turns the async I/O each
//! backend performs into something synchronous callers can block on.
//!
//! CLI parsing, logging setup, GPU transfer glue, and request routing into
//! the cache all live above this crate — it only carries the primitives
//! those layers are built from.

pub mod backend;
pub mod bridge;
pub mod config;
pub mod error;
pub mod evictor;
pub mod key;
pub mod memory_obj;
pub mod serde;
pub mod wire;

pub use backend::{Backend, BackendOps, BoxFuture};
pub use bridge::AsyncBridge;
pub use config::CacheConfig;
pub use error::{CacheError, ConfigError, ProtocolError};
pub use evictor::{DiskCacheMetadata, LruEvictor, PutStatus};
pub use key::CacheEngineKey;
pub use memory_obj::{Allocator, DType, HeapAllocator, MemoryFormat, MemoryObj, ObjMetadata, Shape};
pub use serde::{create_serde, SerdeKind};
