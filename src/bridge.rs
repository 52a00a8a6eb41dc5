//! Dedicated-thread bridge between synchronous callers and the async I/O
//! coroutines backends enqueue.
//!
//! A single OS thread owns a single-threaded Tokio runtime and services all
//! backend I/O. Callers on arbitrary foreground threads dispatch work onto
//! it through a thread-safe handle and either hold the returned future or
//! block synchronously on it — mirroring the reference implementation's
//! single asyncio event loop plus `run_coroutine_threadsafe`, and grounded
//! in this crate's own `start_sync()` "owns its own runtime" convention.

use std::future::Future;
use std::thread::JoinHandle;

use tokio::runtime::{Builder, Handle};
use tokio::task::JoinError;
use tracing::info;

/// Owns the dedicated OS thread and its single-threaded Tokio runtime.
///
/// Dropping the bridge joins the thread after its runtime is shut down;
/// in-flight work submitted before drop is allowed to complete.
pub struct AsyncBridge {
    handle: Handle,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AsyncBridge {
    /// Spawn the dedicated thread and its runtime.
    pub fn start() -> std::io::Result<Self> {
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("kvchunk-cache-bridge".into())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e));
                        return;
                    }
                };
                let _ = handle_tx.send(Ok(runtime.handle().clone()));
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
            })
            .map_err(std::io::Error::other)?;

        let handle = handle_rx
            .recv()
            .map_err(std::io::Error::other)??;

        info!("async bridge thread started");

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Submit a future onto the bridge's runtime. The returned
    /// `JoinHandle` resolves with the future's output once it completes on
    /// the bridge thread; acceptance order is FIFO but completion is not.
    pub fn submit<F>(&self, fut: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(fut)
    }

    /// Submit a future and block the calling thread until it completes.
    pub fn block_on<F>(&self, fut: F) -> Result<F::Output, JoinError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self.submit(fut);
        futures::executor::block_on(handle)
    }
}

impl Drop for AsyncBridge {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
