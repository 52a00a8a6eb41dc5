//! `lm://` connector: the one wire-protocol transport the core mandates.
//!
//! Grounded on `original_source/lmcache`'s `connector.py` abstraction (a
//! small `Connector` trait so `remote_url` scheme selects an implementation)
//! and on the teacher's `cache::traits::BoxFuture` convention for
//! dyn-compatible async methods.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

use crate::backend::BoxFuture;
use crate::error::CacheError;
use crate::key::CacheEngineKey;
use crate::memory_obj::{DType, MemoryFormat, MemoryObj, ObjMetadata};
use crate::wire::{ClientHeader, Code, Command, ServerHeader};

/// Transport-level contract a `remote_url` scheme resolves to.
///
/// Callers hold connectors behind an `Arc<dyn Connector>` and move the
/// clone into whatever `'static` future they dispatch onto the bridge, so
/// the futures these methods return only need to outlive the borrow of
/// `self` within that enclosing future, not `'static` themselves.
pub trait Connector: Send + Sync {
    fn put(&self, key: CacheEngineKey, payload: MemoryObj) -> BoxFuture<'_, Result<(), CacheError>>;
    fn get(&self, key: CacheEngineKey) -> BoxFuture<'_, Result<Option<MemoryObj>, CacheError>>;
    fn exists(&self, key: CacheEngineKey) -> BoxFuture<'_, Result<bool, CacheError>>;
    fn close(&self) -> BoxFuture<'_, Result<(), CacheError>>;
}

/// Resolve `remote_url`'s scheme to a connector implementation.
///
/// The core mandates only `lm://host:port`, implementing the wire protocol
/// in [`crate::wire`]. Other schemes (e.g. `redis://`) are left as an
/// extension point.
pub async fn create_connector(remote_url: &str) -> Result<Box<dyn Connector>, CacheError> {
    let (scheme, rest) = remote_url.split_once("://").ok_or_else(|| {
        CacheError::Connection(format!("remote_url {remote_url:?} is missing a scheme prefix"))
    })?;

    match scheme {
        "lm" => Ok(Box::new(LmConnector::connect(rest).await?)),
        other => Err(CacheError::Connection(format!(
            "unsupported remote scheme {other:?}"
        ))),
    }
}

/// Connector over a single TCP stream speaking the [`crate::wire`] protocol.
///
/// The connection is shared across coroutines on the bridge's loop thread
/// only; an internal async mutex serialises requests onto it one at a time
/// since the protocol has no request-ID multiplexing of its own — at most
/// one request is in flight on the wire at a time, though callers may queue
/// several concurrently.
pub struct LmConnector {
    stream: AsyncMutex<TcpStream>,
}

impl LmConnector {
    pub async fn connect(addr: &str) -> Result<Self, CacheError> {
        let stream = TcpStream::connect(addr).await.map_err(CacheError::Io)?;
        Ok(Self {
            stream: AsyncMutex::new(stream),
        })
    }
}

async fn read_server_header(stream: &mut TcpStream) -> Result<ServerHeader, CacheError> {
    let mut buf = vec![0u8; ServerHeader::packlength()];
    stream.read_exact(&mut buf).await.map_err(CacheError::Io)?;
    ServerHeader::deserialize(&buf).map_err(CacheError::from)
}

/// Placeholder fmt/dtype/shape for requests that carry no payload metadata
/// (`GET`/`EXIST`) — the server ignores these fields for those commands.
fn empty_metadata_fields() -> (MemoryFormat, DType, [u32; 4]) {
    (MemoryFormat(0), DType::Uint8, [0, 0, 0, 0])
}

impl Connector for LmConnector {
    fn put(&self, key: CacheEngineKey, payload: MemoryObj) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async move {
            let metadata = payload.metadata();
            let bytes = payload.byte_array().to_vec();
            let header = ClientHeader {
                command: Command::Put,
                length: bytes.len() as i32,
                fmt: metadata.fmt,
                dtype: metadata.dtype,
                shape: metadata.shape,
                key,
            };

            let mut guard = self.stream.lock().await;
            guard.write_all(&header.serialize()?).await.map_err(CacheError::Io)?;
            guard.write_all(&bytes).await.map_err(CacheError::Io)?;
            let resp = read_server_header(&mut guard).await?;
            match resp.code {
                Code::Success => Ok(()),
                Code::Fail => Err(CacheError::Connection("remote PUT failed".to_string())),
            }
        })
    }

    fn get(&self, key: CacheEngineKey) -> BoxFuture<'_, Result<Option<MemoryObj>, CacheError>> {
        Box::pin(async move {
            let (fmt, dtype, shape) = empty_metadata_fields();
            let header = ClientHeader {
                command: Command::Get,
                length: 0,
                fmt,
                dtype,
                shape,
                key,
            };

            let mut guard = self.stream.lock().await;
            guard.write_all(&header.serialize()?).await.map_err(CacheError::Io)?;
            let resp = read_server_header(&mut guard).await?;
            if resp.code == Code::Fail {
                return Ok(None);
            }

            let mut payload = vec![0u8; resp.length as usize];
            guard.read_exact(&mut payload).await.map_err(CacheError::Io)?;
            let metadata = ObjMetadata {
                shape: resp.shape,
                dtype: resp.dtype,
                fmt: resp.fmt,
            };
            Ok(Some(MemoryObj::new(metadata, payload)))
        })
    }

    fn exists(&self, key: CacheEngineKey) -> BoxFuture<'_, Result<bool, CacheError>> {
        Box::pin(async move {
            let (fmt, dtype, shape) = empty_metadata_fields();
            let header = ClientHeader {
                command: Command::Exist,
                length: 0,
                fmt,
                dtype,
                shape,
                key,
            };

            let mut guard = self.stream.lock().await;
            guard.write_all(&header.serialize()?).await.map_err(CacheError::Io)?;
            let resp = read_server_header(&mut guard).await?;
            Ok(resp.code == Code::Success)
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(async move {
            let mut guard = self.stream.lock().await;
            guard.shutdown().await.map_err(CacheError::Io)
        })
    }
}
