//! Fixed-size pool of named worker threads fed by a crossbeam channel.

use crate::error::MaintainerError;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Worker {
    worker_id: usize,
    thread_handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn<T, F>(
        name: &str,
        worker_id: usize,
        work_rx: Receiver<T>,
        shutdown_rx: Receiver<()>,
        active: Arc<AtomicUsize>,
        handler: Arc<F>,
    ) -> Result<Self, MaintainerError>
    where
        T: Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let thread_name = format!("{name}-{worker_id}");
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!("Worker {} started", thread_name);
                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        debug!("Worker {} received shutdown signal", thread_name);
                        break;
                    }

                    match work_rx.recv_timeout(POLL_INTERVAL) {
                        Ok(job) => {
                            active.fetch_add(1, Ordering::SeqCst);
                            handler(job);
                            active.fetch_sub(1, Ordering::SeqCst);
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            debug!("Worker {} channel disconnected", thread_name);
                            break;
                        }
                    }
                }
                debug!("Worker {} shutting down", thread_name);
            })?;

        Ok(Self {
            worker_id,
            thread_handle: Some(handle),
        })
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!("Waiting for worker {} to finish", self.worker_id);
            let _ = handle.join();
        }
    }
}

/// Pool of `workers` threads named `{name}-{n}`, each running `handler` per job.
///
/// The work channel is created by the caller so that job producers can hold a
/// sender without owning the pool.
pub(crate) struct WorkerPool<T> {
    name: String,
    workers: Vec<Worker>,
    work_rx: Receiver<T>,
    shutdown_tx: Sender<()>,
    active: Arc<AtomicUsize>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub(crate) fn spawn<F>(
        name: &str,
        workers: usize,
        work_rx: Receiver<T>,
        handler: F,
    ) -> Result<Self, MaintainerError>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let workers = workers.max(1);
        let (shutdown_tx, shutdown_rx) = bounded(workers);
        let handler = Arc::new(handler);

        let mut pool = Self {
            name: name.to_string(),
            workers: Vec::with_capacity(workers),
            work_rx,
            shutdown_tx,
            active: Arc::new(AtomicUsize::new(0)),
        };
        for worker_id in 0..workers {
            let worker = Worker::spawn(
                name,
                worker_id,
                pool.work_rx.clone(),
                shutdown_rx.clone(),
                Arc::clone(&pool.active),
                Arc::clone(&handler),
            )?;
            pool.workers.push(worker);
        }
        Ok(pool)
    }
}

impl<T> WorkerPool<T> {
    pub(crate) fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn active_jobs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn queued_jobs(&self) -> usize {
        self.work_rx.len()
    }

    /// Signal every worker and wait for in-flight jobs to finish.
    pub(crate) fn shutdown(&mut self) {
        if self.workers.iter().all(|w| w.thread_handle.is_none()) {
            return;
        }
        debug!(
            "Shutting down {} pool with {} workers",
            self.name,
            self.workers.len()
        );
        for _ in 0..self.workers.len() {
            let _ = self.shutdown_tx.send(());
        }
        for worker in &mut self.workers {
            worker.join();
        }
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
