//! Minimal in-process server speaking the server side of the [`crate::wire`]
//! protocol.
//!
//! The core only specifies the client-side connector contract, but
//! `original_source/lmcache` implies a real process on the other end of
//! `lm://`, and a wire protocol with no way to exercise it end-to-end isn't
//! a credible deliverable. The teacher has no listener/accept-loop code of
//! its own to ground this on (it's a FUSE filesystem, not a network
//! service); the one-task-per-connection shape here follows the standard
//! `tokio::net::TcpListener` accept-loop idiom instead.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, warn};

use crate::memory_obj::{DType, MemoryFormat, ObjMetadata};
use crate::wire::{ClientHeader, Code, Command, ServerHeader};

struct StoredObj {
    metadata: ObjMetadata,
    bytes: Vec<u8>,
}

type Store = Arc<AsyncMutex<HashMap<String, StoredObj>>>;

/// A bound listener plus the background accept loop servicing it.
///
/// Dropping the server aborts the accept loop; in-flight connections are
/// dropped along with it (best-effort cache semantics, matching the core's
/// own non-durability stance).
pub struct LmCacheServer {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl LmCacheServer {
    /// Bind `addr` (e.g. `"127.0.0.1:0"` for an ephemeral port) and start
    /// servicing connections in the background.
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let store: Store = Arc::new(AsyncMutex::new(HashMap::new()));

        let task = tokio::spawn(accept_loop(listener, store, shutdown_rx));

        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for LmCacheServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, store: Store, mut shutdown: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut shutdown => return,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let store = Arc::clone(&store);
                        tokio::spawn(handle_connection(stream, store));
                    }
                    Err(e) => {
                        warn!(error = %e, "lm cache server accept failed, stopping");
                        return;
                    }
                }
            }
        }
    }
}

fn no_payload_header(code: Code) -> ServerHeader {
    ServerHeader {
        code,
        length: 0,
        fmt: MemoryFormat(0),
        dtype: DType::Uint8,
        shape: [0, 0, 0, 0],
    }
}

async fn handle_connection(mut stream: TcpStream, store: Store) {
    loop {
        let mut header_buf = vec![0u8; ClientHeader::packlength()];
        if stream.read_exact(&mut header_buf).await.is_err() {
            return;
        }
        let header = match ClientHeader::deserialize(&header_buf) {
            Ok(h) => h,
            Err(e) => {
                debug!(error = %e, "rejecting connection on malformed client header");
                return;
            }
        };

        match header.command {
            Command::Put => {
                let mut payload = vec![0u8; header.length as usize];
                if stream.read_exact(&mut payload).await.is_err() {
                    return;
                }
                store.lock().await.insert(
                    header.key.to_string_canonical().to_string(),
                    StoredObj {
                        metadata: ObjMetadata {
                            shape: header.shape,
                            dtype: header.dtype,
                            fmt: header.fmt,
                        },
                        bytes: payload,
                    },
                );
                if stream
                    .write_all(&no_payload_header(Code::Success).serialize())
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Command::Get => {
                let found = store
                    .lock()
                    .await
                    .get(header.key.to_string_canonical())
                    .map(|stored| (stored.metadata, stored.bytes.clone()));

                match found {
                    Some((metadata, bytes)) => {
                        let resp = ServerHeader {
                            code: Code::Success,
                            length: bytes.len() as i32,
                            fmt: metadata.fmt,
                            dtype: metadata.dtype,
                            shape: metadata.shape,
                        };
                        if stream.write_all(&resp.serialize()).await.is_err() {
                            return;
                        }
                        if stream.write_all(&bytes).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        if stream
                            .write_all(&no_payload_header(Code::Fail).serialize())
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            }
            Command::Exist => {
                let present = store
                    .lock()
                    .await
                    .contains_key(header.key.to_string_canonical());
                let code = if present { Code::Success } else { Code::Fail };
                if stream.write_all(&no_payload_header(code).serialize()).await.is_err() {
                    return;
                }
            }
            Command::List => {
                // LIST's payload format isn't pinned down by the source;
                // refuse it rather than guess.
                debug!("refusing LIST: unsupported by this server");
                let _ = stream.write_all(&no_payload_header(Code::Fail).serialize()).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::remote::connector::{Connector, LmConnector};
    use crate::key::CacheEngineKey;
    use crate::memory_obj::MemoryObj;

    fn key(hash: &str) -> CacheEngineKey {
        CacheEngineKey::new("vllm", "m", 1, 0, hash).unwrap()
    }

    #[tokio::test]
    async fn exist_is_false_then_true_after_put() {
        let server = LmCacheServer::bind("127.0.0.1:0").await.unwrap();
        let connector = LmConnector::connect(&server.local_addr().to_string())
            .await
            .unwrap();

        let k = key("exist-check");
        assert!(!connector.exists(k.clone()).await.unwrap());

        let obj = MemoryObj::new(
            ObjMetadata {
                shape: [4, 0, 0, 0],
                dtype: DType::Uint8,
                fmt: MemoryFormat::BINARY,
            },
            vec![1, 2, 3, 4],
        );
        connector.put(k.clone(), obj).await.unwrap();

        assert!(connector.exists(k).await.unwrap());
    }

    #[tokio::test]
    async fn get_round_trips_payload_bytes() {
        let server = LmCacheServer::bind("127.0.0.1:0").await.unwrap();
        let connector = LmConnector::connect(&server.local_addr().to_string())
            .await
            .unwrap();

        let k = key("roundtrip");
        let obj = MemoryObj::new(
            ObjMetadata {
                shape: [8, 0, 0, 0],
                dtype: DType::Uint8,
                fmt: MemoryFormat::BINARY,
            },
            vec![9; 8],
        );
        connector.put(k.clone(), obj).await.unwrap();

        let fetched = connector.get(k).await.unwrap().unwrap();
        assert_eq!(fetched.byte_array(), vec![9u8; 8].as_slice());
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let server = LmCacheServer::bind("127.0.0.1:0").await.unwrap();
        let connector = LmConnector::connect(&server.local_addr().to_string())
            .await
            .unwrap();

        let result = connector.get(key("missing")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn list_is_refused() {
        let server = LmCacheServer::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        let mut stream = stream;

        let header = ClientHeader {
            command: Command::List,
            length: 0,
            fmt: MemoryFormat(0),
            dtype: DType::Uint8,
            shape: [0, 0, 0, 0],
            key: key("list"),
        };
        stream.write_all(&header.serialize().unwrap()).await.unwrap();

        let mut buf = vec![0u8; ServerHeader::packlength()];
        stream.read_exact(&mut buf).await.unwrap();
        let resp = ServerHeader::deserialize(&buf).unwrap();
        assert_eq!(resp.code, Code::Fail);
    }
}
