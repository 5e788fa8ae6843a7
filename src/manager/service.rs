//! Owned execution context.
//!
//! The manager runs reservation deadlines and internally-driven transport
//! work on its own multi-threaded runtime so that it has a scheduler even
//! when the caller drives the public API from a single-threaded context.

use std::io;

use tokio::runtime::{Builder, Handle, Runtime};

/// A multi-threaded tokio runtime with explicit shutdown.
#[derive(Debug)]
pub(crate) struct AsyncService {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl AsyncService {
    /// Start a runtime with `thread_count` workers (at least one).
    pub fn new(thread_count: usize) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(thread_count.max(1))
            .thread_name("rudp-mesh-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    /// Handle for spawning onto this runtime.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Stop the runtime without waiting for in-flight tasks; spawned tasks
    /// holding only weak back-references are simply dropped.
    pub fn stop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for AsyncService {
    fn drop(&mut self) {
        self.stop();
    }
}
