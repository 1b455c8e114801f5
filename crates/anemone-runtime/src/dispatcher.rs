//! Dispatchers decide where actor handlers run
//!
//! Every dispatcher drains a cell's mailbox through `ActorCell`, so ordering,
//! exclusivity and supervision are identical across them. They differ only
//! in which task executes `receive`:
//!
//! - [`InlineDispatcher`]: the task that asks, or `ActorSystem::run_until_idle`
//! - [`DedicatedDispatcher`]: one tokio task per actor
//! - [`PoolDispatcher`](crate::pool::PoolDispatcher): a fixed set of workers

use crate::activation::ActorCell;
use anemone_core::error::{Error, Result};
use std::sync::Arc;

/// How a cell was attached
#[derive(Debug)]
pub enum Attachment {
    /// The dispatcher runs the cell on its own tasks
    Scheduled,
    /// Nobody runs the cell until a caller drives it
    Driven(Arc<ActorCell>),
}

/// Binds actor cells to execution resources
pub trait Dispatcher: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Start executing a freshly spawned cell
    fn attach(&self, cell: Arc<ActorCell>) -> Result<Attachment>;
}

/// Processes envelopes on the calling task
///
/// Deterministic: nothing runs until `ask` on the actor or
/// `ActorSystem::run_until_idle` drives it.
#[derive(Debug, Default)]
pub struct InlineDispatcher;

impl InlineDispatcher {
    /// Create an inline dispatcher
    pub fn new() -> Self {
        Self
    }
}

impl Dispatcher for InlineDispatcher {
    fn name(&self) -> &str {
        "inline"
    }

    fn attach(&self, cell: Arc<ActorCell>) -> Result<Attachment> {
        Ok(Attachment::Driven(cell))
    }
}

/// Runs every actor on its own tokio task
#[derive(Debug, Default)]
pub struct DedicatedDispatcher;

impl DedicatedDispatcher {
    /// Create a dedicated-task dispatcher
    pub fn new() -> Self {
        Self
    }
}

impl Dispatcher for DedicatedDispatcher {
    fn name(&self) -> &str {
        "dedicated"
    }

    fn attach(&self, cell: Arc<ActorCell>) -> Result<Attachment> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::internal(format!("dedicated dispatcher needs a tokio runtime: {}", e)))?;

        handle.spawn(cell.run());
        Ok(Attachment::Scheduled)
    }
}
