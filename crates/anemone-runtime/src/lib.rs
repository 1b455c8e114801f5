//! Anemone Runtime
//!
//! Single-process actor runtime: bounded mailboxes, interchangeable
//! dispatchers, supervision and delayed delivery.
//!
//! # Overview
//!
//! The runtime provides:
//! - An [`ActorSystem`] registry with hierarchical `actor://` paths
//! - FIFO and priority mailboxes with a separate system lane
//! - Inline, dedicated-task and shared-pool dispatchers
//! - Restart / Stop / Escalate supervision with restart budgets
//! - One-shot scheduled messages with cancellation
//!
//! # Example
//!
//! ```no_run
//! use anemone_runtime::{async_trait, Actor, ActorSystem, Context, Message, Props, Result};
//! use std::time::Duration;
//!
//! #[derive(Clone, Default)]
//! struct Counter {
//!     count: u64,
//! }
//!
//! #[async_trait]
//! impl Actor for Counter {
//!     async fn receive(&mut self, _ctx: &Context, message: Message) -> Result<Message> {
//!         if message == "inc" {
//!             self.count += 1;
//!         }
//!         Ok(Message::text(self.count.to_string()))
//!     }
//! }
//!
//! # async fn run() -> Result<()> {
//! let system = ActorSystem::new(Default::default())?;
//! let counter = system.spawn(Props::from_prototype(Counter::default()).with_name("counter"))?;
//! counter.tell("inc")?;
//! let reply = counter.ask("get", Duration::from_secs(1)).await?;
//! assert_eq!(reply, "1");
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Guarantees
//! - One envelope at a time per actor, in mailbox order
//! - `tell` never waits; a full mailbox fails with `MailboxFull`
//! - A failure is supervised before the next envelope is taken

pub mod activation;
pub mod actor;
pub mod context;
pub mod dispatcher;
pub mod handle;
pub mod mailbox;
pub mod pool;
pub mod scheduler;
pub mod supervision;
pub mod system;

pub use activation::{ActorCell, ActorStats, LifecycleState};
pub use actor::{Actor, ActorFactory, CloneFactory, Props};
pub use context::Context;
pub use dispatcher::{Attachment, DedicatedDispatcher, Dispatcher, InlineDispatcher};
pub use handle::{ActorRef, ReplySlot};
pub use mailbox::{Delivery, Envelope, Mailbox, MailboxPhase, ReadyHook, SystemMessage};
pub use pool::PoolDispatcher;
pub use scheduler::{Cancellable, Scheduler};
pub use supervision::{RestartBackoff, RestartPolicy, SupervisorStrategy};
pub use system::{ActorSystem, ActorSystemBuilder};

pub use anemone_core::{
    DispatcherConfig, DispatcherKind, Error, MailboxConfig, MailboxDiscipline, Message, Result,
    SupervisionConfig, SupervisionKind, SystemConfig,
};
pub use async_trait::async_trait;
