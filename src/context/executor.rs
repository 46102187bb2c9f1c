//! Bounded worker pool for blocking handler work.
//!
//! # Responsibilities
//! - Run blocking handler invocations off the host's reactor threads
//! - Bound admitted work (running + queued) and reject the excess
//! - Name worker threads after the owning context
//! - Shut down with the context
//!
//! # Design Decisions
//! - Backed by a dedicated Tokio runtime: `core` sizes its async workers, `max` caps its
//!   blocking threads, `keep_alive` reaps idle blocking threads
//! - Admission is a semaphore of `max + queue_capacity` permits, released when the task ends
//! - Shutdown does not wait: in-flight tasks keep running to completion on detached threads,
//!   nothing new is admitted

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::config::ExecutorConfig;
use crate::observability::metrics;

/// Worker pool failures.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// Running and queued work already at capacity.
    #[error("worker pool saturated")]
    Saturated,

    /// The pool was shut down with its context.
    #[error("worker pool is shut down")]
    Shutdown,

    /// The backing runtime could not be created.
    #[error("failed to build worker pool: {0}")]
    Build(String),
}

/// Bounded pool executing blocking closures.
pub struct WorkerPool {
    name: String,
    runtime: Mutex<Option<Runtime>>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Build a pool for the context mounted at `context_path`.
    pub fn new(context_path: &str, config: &ExecutorConfig) -> Result<Self, PoolError> {
        let name = format!("bridge-worker-[context={}]", context_path);
        let counter = Arc::new(AtomicUsize::new(0));
        let thread_prefix = name.clone();

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.core.max(1))
            .max_blocking_threads(config.max.max(1))
            .thread_keep_alive(config.keep_alive.to_duration())
            .thread_name_fn(move || {
                let id = counter.fetch_add(1, Ordering::Relaxed) + 1;
                format!("{}-{}", thread_prefix, id)
            })
            .enable_all()
            .build()
            .map_err(|e| PoolError::Build(e.to_string()))?;

        let capacity = config.max.max(1).saturating_add(config.queue_capacity);

        tracing::info!(
            pool = %name,
            core = config.core,
            max = config.max,
            queue_capacity = config.queue_capacity,
            keep_alive = ?config.keep_alive.to_duration(),
            "Worker pool started"
        );

        Ok(Self {
            name,
            runtime: Mutex::new(Some(runtime)),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Submit a blocking task, returning a handle resolving to its output.
    pub fn submit<F, T>(&self, task: F) -> Result<JoinHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (handle, permit) = self.admit()?;
        let permits = self.permits.clone();
        let capacity = self.capacity;
        Ok(handle.spawn_blocking(move || {
            let output = task();
            drop(permit);
            metrics::record_pool_in_flight(capacity - permits.available_permits());
            output
        }))
    }

    /// Submit a task without observing its outcome.
    pub fn execute<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(task).map(|_| ())
    }

    /// Like `execute`, but hands the task back when it was not admitted.
    pub fn try_execute<F>(&self, task: F) -> Result<(), (PoolError, F)>
    where
        F: FnOnce() + Send + 'static,
    {
        match self.admit() {
            Ok((handle, permit)) => {
                let permits = self.permits.clone();
                let capacity = self.capacity;
                handle.spawn_blocking(move || {
                    task();
                    drop(permit);
                    metrics::record_pool_in_flight(capacity - permits.available_permits());
                });
                Ok(())
            }
            Err(e) => Err((e, task)),
        }
    }

    fn admit(&self) -> Result<(Handle, OwnedSemaphorePermit), PoolError> {
        let handle = self.handle().ok_or(PoolError::Shutdown)?;
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(pool = %self.name, capacity = self.capacity, "Worker pool saturated");
                metrics::record_pool_rejection();
                return Err(PoolError::Saturated);
            }
        };
        metrics::record_pool_in_flight(self.in_flight());
        Ok((handle, permit))
    }

    /// Tasks currently running or queued.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_shutdown(&self) -> bool {
        self.runtime
            .lock()
            .expect("worker pool mutex poisoned")
            .is_none()
    }

    /// Stop admitting work and release the backing runtime.
    pub fn shutdown(&self) {
        let runtime = self
            .runtime
            .lock()
            .expect("worker pool mutex poisoned")
            .take();
        if let Some(runtime) = runtime {
            self.permits.close();
            runtime.shutdown_background();
            tracing::info!(pool = %self.name, "Worker pool stopped");
        }
    }

    fn handle(&self) -> Option<Handle> {
        self.runtime
            .lock()
            .expect("worker pool mutex poisoned")
            .as_ref()
            .map(|rt| rt.handle().clone())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Dropping a Runtime from async code panics; shutdown_background never blocks.
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
