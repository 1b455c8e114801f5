//! Shared worker pool dispatcher
//!
//! A fixed number of workers share one ready queue. Mailboxes signal
//! readiness through a `ReadyHook`; a cell is queued at most once (guarded by
//! its schedule flag), drained for at most `batch_size` deliveries by a
//! single worker, then released and re-queued if work remains.

use crate::activation::ActorCell;
use crate::dispatcher::{Attachment, Dispatcher};
use crate::mailbox::ReadyHook;
use anemone_core::config::DispatcherConfig;
use anemone_core::constants::{POOL_BATCH_SIZE_MAX, POOL_WORKERS_COUNT_MAX};
use anemone_core::error::{Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::{debug, instrument};

/// Dispatcher that multiplexes many actors over a few worker tasks
pub struct PoolDispatcher {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    workers_count: usize,
    batch_size: usize,
    ready: Mutex<VecDeque<Arc<ActorCell>>>,
    notify: Notify,
    /// Attached cells, keyed by cell id; keeps idle cells alive
    cells: DashMap<u64, Arc<ActorCell>>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl PoolDispatcher {
    /// Create a pool with `workers_count` workers draining `batch_size`
    /// deliveries per claim
    ///
    /// Workers start on the first attach.
    pub fn new(workers_count: usize, batch_size: usize) -> Result<Self> {
        if workers_count == 0 || workers_count > POOL_WORKERS_COUNT_MAX {
            return Err(Error::invalid_configuration(
                "pool_workers_count",
                format!("{} not in 1..={}", workers_count, POOL_WORKERS_COUNT_MAX),
            ));
        }
        if batch_size == 0 || batch_size > POOL_BATCH_SIZE_MAX {
            return Err(Error::invalid_configuration(
                "pool_batch_size",
                format!("{} not in 1..={}", batch_size, POOL_BATCH_SIZE_MAX),
            ));
        }

        Ok(Self {
            shared: Arc::new(PoolShared {
                workers_count,
                batch_size,
                ready: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                cells: DashMap::new(),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Create a pool from the dispatcher configuration section
    pub fn from_config(config: &DispatcherConfig) -> Result<Self> {
        Self::new(config.pool_workers_count, config.pool_batch_size)
    }

    /// Number of workers
    pub fn workers_count(&self) -> usize {
        self.shared.workers_count
    }

    /// Deliveries per claim
    pub fn batch_size(&self) -> usize {
        self.shared.batch_size
    }

    /// Number of live actors attached to the pool
    pub fn attached_count(&self) -> usize {
        self.shared.cells.len()
    }

    fn ensure_workers(&self) -> Result<()> {
        if self
            .shared
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.started.store(false, Ordering::Release);
                return Err(Error::internal(format!(
                    "pool dispatcher needs a tokio runtime: {}",
                    e
                )));
            }
        };

        for worker in 0..self.shared.workers_count {
            handle.spawn(self.shared.clone().work(worker));
        }
        debug!(workers = self.shared.workers_count, "Pool workers started");
        Ok(())
    }
}

impl Dispatcher for PoolDispatcher {
    fn name(&self) -> &str {
        "pool"
    }

    fn attach(&self, cell: Arc<ActorCell>) -> Result<Attachment> {
        self.ensure_workers()?;

        self.shared.cells.insert(cell.id(), cell.clone());
        cell.mailbox().set_ready_hook(Arc::new(PoolReadyHook {
            cell: Arc::downgrade(&cell),
            shared: Arc::downgrade(&self.shared),
        }));

        // First slice runs on_start
        self.shared.schedule(cell);
        Ok(Attachment::Scheduled)
    }
}

impl Drop for PoolDispatcher {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_waiters();
    }
}

impl std::fmt::Debug for PoolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolDispatcher")
            .field("workers_count", &self.shared.workers_count)
            .field("batch_size", &self.shared.batch_size)
            .field("attached", &self.shared.cells.len())
            .finish()
    }
}

impl PoolShared {
    fn schedule(&self, cell: Arc<ActorCell>) {
        if cell.try_schedule() {
            self.ready.lock().push_back(cell);
            self.notify.notify_one();
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn work(self: Arc<Self>, worker: usize) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = self.ready.lock().pop_front();
            match next {
                Some(cell) => {
                    cell.drive(self.batch_size).await;
                    cell.release_schedule();

                    if cell.is_finished() {
                        self.cells.remove(&cell.id());
                    } else if cell.has_work() {
                        self.schedule(cell);
                    }
                }
                None => {
                    if self.closed.load(Ordering::Acquire) {
                        break;
                    }
                    notified.await;
                }
            }
        }
        debug!("Pool worker exiting");
    }
}

struct PoolReadyHook {
    cell: Weak<ActorCell>,
    shared: Weak<PoolShared>,
}

impl ReadyHook for PoolReadyHook {
    fn notify_ready(&self) {
        if let (Some(cell), Some(shared)) = (self.cell.upgrade(), self.shared.upgrade()) {
            shared.schedule(cell);
        }
    }
}
