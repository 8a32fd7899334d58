//! Small worker pool owned by a record for its setup jobs.

use std::future::Future;

use tokio::runtime::{Builder, Handle, Runtime};

/// Blocking workers available to one record. Several setup attempts (one per
/// reconnect) may be in flight when an earlier one stalled.
const MAX_SETUP_WORKERS: usize = 4;

pub(crate) struct WorkerPool {
    handle: Handle,
    runtime: Option<Runtime>,
}

impl WorkerPool {
    pub(crate) fn new(label: &str) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(MAX_SETUP_WORKERS)
            .thread_name(format!("tether-setup-{label}"))
            .enable_time()
            .build()?;

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Run a blocking job on the pool without waiting for it.
    pub(crate) fn spawn_blocking<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Completion is reported by the job itself.
        drop(self.handle.spawn_blocking(job));
    }

    /// Block the calling thread on `future`. Must not be called from inside
    /// an async runtime.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Jobs that stalled past the setup timeout must not hold up teardown.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
