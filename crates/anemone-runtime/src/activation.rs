//! Actor cells and lifecycle management
//!
//! An `ActorCell` owns one actor instance and everything needed to process
//! its mailbox: the factory for restarts, the supervisor strategy, and the
//! restart history. Dispatchers only decide *where* a cell runs; every
//! lifecycle rule lives here.
//!
//! ```text
//!   Starting ──► Running ──► Stopping ──► Stopped
//!      │            │            ▲
//!      ▼            ▼            │
//!      └──────►  Failed ─────────┤
//!                 │  ▲           │
//!                 ▼  │           │
//!              Restarting ──► Running
//! ```

use crate::actor::{Actor, ActorFactory};
use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::handle::ActorRef;
use crate::mailbox::{Delivery, Envelope, Mailbox, SystemMessage};
use crate::supervision::{Directive, RestartHistory, SupervisorStrategy};
use crate::system::SystemInner;
use anemone_core::error::{Error, Result};
use anemone_core::io::TimeProvider;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument, warn};

/// Actor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Spawned, `on_start` not yet completed
    #[default]
    Starting,
    /// Processing messages
    Running,
    /// A failure is being supervised
    Failed,
    /// Old instance discarded, new one being built
    Restarting,
    /// Running `on_stop` and releasing resources
    Stopping,
    /// Terminal
    Stopped,
}

impl LifecycleState {
    /// Check if the actor will still process messages
    pub fn is_alive(&self) -> bool {
        !matches!(self, LifecycleState::Stopping | LifecycleState::Stopped)
    }

    /// Check if `next` is a legal successor
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Starting, Running) | (Starting, Failed) | (Starting, Stopping) => true,
            (Running, Failed) | (Running, Stopping) => true,
            (Failed, Restarting) | (Failed, Stopping) => true,
            (Restarting, Running) | (Restarting, Failed) => true,
            (Stopping, Stopped) => true,
            _ if *self == next => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Starting => write!(f, "starting"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Failed => write!(f, "failed"),
            LifecycleState::Restarting => write!(f, "restarting"),
            LifecycleState::Stopping => write!(f, "stopping"),
            LifecycleState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Counters for one actor
///
/// Timestamps are monotonic milliseconds from the system's time provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorStats {
    /// When the current instance finished `on_start`
    pub activated_at_ms: Option<u64>,
    /// Last time a message was processed
    pub last_activity_at_ms: Option<u64>,
    /// Messages processed (including failed ones)
    pub processed_count: u64,
    /// Messages whose handler failed
    pub failed_count: u64,
    /// Restarts performed
    pub restart_count: u64,
    /// Total time spent in handlers
    pub total_processing_time_ms: u64,
}

impl ActorStats {
    /// Record one processed message
    pub fn record_message(&mut self, duration_ms: u64, is_error: bool, now_ms: u64) {
        self.last_activity_at_ms = Some(now_ms);
        self.processed_count = self.processed_count.wrapping_add(1);
        self.total_processing_time_ms = self.total_processing_time_ms.saturating_add(duration_ms);
        if is_error {
            self.failed_count = self.failed_count.wrapping_add(1);
        }
    }

    /// Time since the last message (or activation)
    pub fn idle_time_ms(&self, now_ms: u64) -> u64 {
        self.last_activity_at_ms
            .or(self.activated_at_ms)
            .map(|t| now_ms.saturating_sub(t))
            .unwrap_or(0)
    }

    /// Average handler time
    pub fn average_processing_time_ms(&self) -> u64 {
        if self.processed_count == 0 {
            0
        } else {
            self.total_processing_time_ms / self.processed_count
        }
    }
}

struct CellState {
    actor: Option<Box<dyn Actor>>,
    /// Current instance completed `on_start`
    started: bool,
    history: RestartHistory,
}

/// One actor instance plus the machinery to drive it
pub struct ActorCell {
    id: u64,
    self_ref: ActorRef,
    parent: Option<ActorRef>,
    factory: Arc<dyn ActorFactory>,
    supervisor: SupervisorStrategy,
    dispatcher: Arc<dyn Dispatcher>,
    system: Weak<SystemInner>,
    time: Arc<dyn TimeProvider>,
    state: tokio::sync::Mutex<CellState>,
    scheduled: AtomicBool,
}

impl ActorCell {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: u64,
        self_ref: ActorRef,
        parent: Option<ActorRef>,
        actor: Box<dyn Actor>,
        factory: Arc<dyn ActorFactory>,
        supervisor: SupervisorStrategy,
        dispatcher: Arc<dyn Dispatcher>,
        system: Weak<SystemInner>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            id,
            self_ref,
            parent,
            factory,
            supervisor,
            dispatcher,
            system,
            time,
            state: tokio::sync::Mutex::new(CellState {
                actor: Some(actor),
                started: false,
                history: RestartHistory::default(),
            }),
            scheduled: AtomicBool::new(false),
        }
    }

    /// Unique id of this incarnation (paths can be reused, ids are not)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reference to the actor
    pub fn actor_ref(&self) -> &ActorRef {
        &self.self_ref
    }

    /// The actor's mailbox
    pub fn mailbox(&self) -> &Mailbox {
        self.self_ref.mailbox()
    }

    /// Name of the dispatcher the cell is attached to
    pub fn dispatcher_name(&self) -> &str {
        self.dispatcher.name()
    }

    /// Check if the actor reached `Stopped`
    pub fn is_finished(&self) -> bool {
        self.self_ref.lifecycle() == LifecycleState::Stopped
    }

    /// Check if driving the cell would make progress
    pub fn has_work(&self) -> bool {
        match self.self_ref.lifecycle() {
            LifecycleState::Stopped => false,
            LifecycleState::Starting => true,
            _ => self.mailbox().has_pending() || !self.mailbox().is_open(),
        }
    }

    /// Mark the cell as queued for execution; false if it already is
    pub fn try_schedule(&self) -> bool {
        self.scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear the queued mark after a slice of work
    pub fn release_schedule(&self) {
        self.scheduled.store(false, Ordering::Release);
    }

    /// Process the mailbox until the actor stops
    ///
    /// Used by dispatchers that give each actor its own task.
    #[instrument(skip_all, fields(actor = %self.self_ref), level = "debug")]
    pub async fn run(self: Arc<Self>) {
        let mut state = self.state.lock().await;

        if self.self_ref.lifecycle() == LifecycleState::Starting {
            self.start(&mut state).await;
        }

        while !self.is_finished() {
            match self.mailbox().take().await {
                Some(delivery) => self.handle(&mut state, delivery).await,
                None => self.finish(&mut state).await,
            }
        }
    }

    /// Process up to `limit` deliveries without waiting for new ones
    ///
    /// Waits if another task is driving the cell. Returns deliveries processed.
    pub async fn drive(&self, limit: usize) -> usize {
        let mut state = self.state.lock().await;
        self.drive_locked(&mut state, limit).await
    }

    /// Like `drive`, but returns `None` immediately if another task is
    /// driving the cell
    pub async fn try_drive(&self, limit: usize) -> Option<usize> {
        match self.state.try_lock() {
            Ok(mut state) => Some(self.drive_locked(&mut state, limit).await),
            Err(_) => None,
        }
    }

    async fn drive_locked(&self, state: &mut CellState, limit: usize) -> usize {
        if self.is_finished() {
            return 0;
        }
        if self.self_ref.lifecycle() == LifecycleState::Starting {
            self.start(state).await;
        }

        let mut processed = 0;
        while processed < limit && !self.is_finished() {
            match self.mailbox().try_take() {
                Some(delivery) => {
                    self.handle(state, delivery).await;
                    processed += 1;
                }
                None => {
                    if !self.mailbox().is_open() {
                        self.finish(state).await;
                    }
                    break;
                }
            }
        }
        processed
    }

    async fn start(&self, state: &mut CellState) {
        if let Err(reason) = self.start_instance(state).await {
            warn!(actor = %self.self_ref, reason = %reason, "Actor failed to start");
            self.supervise(state, reason).await;
        }
    }

    async fn start_instance(&self, state: &mut CellState) -> std::result::Result<(), String> {
        let ctx = self.context(None);
        let actor = state
            .actor
            .as_mut()
            .ok_or_else(|| "no actor instance".to_string())?;

        guarded(actor.on_start(&ctx)).await?;

        state.started = true;
        self.self_ref.set_lifecycle(LifecycleState::Running);
        let now_ms = self.time.monotonic_ms();
        self.self_ref
            .update_stats(|stats| stats.activated_at_ms = Some(now_ms));
        debug!(actor = %self.self_ref, "Actor running");
        Ok(())
    }

    async fn handle(&self, state: &mut CellState, delivery: Delivery) {
        match delivery {
            Delivery::User(envelope) => self.handle_envelope(state, envelope).await,
            Delivery::System(SystemMessage::Escalated { child, reason }) => {
                warn!(
                    actor = %self.self_ref,
                    child = %child,
                    reason = %reason,
                    "Child escalated failure"
                );
                self.supervise(state, format!("child {} failed: {}", child, reason))
                    .await;
            }
        }
    }

    async fn handle_envelope(&self, state: &mut CellState, envelope: Envelope) {
        let (payload, sender, reply) = envelope.into_parts();
        let ctx = self.context(sender);
        let start_ms = self.time.monotonic_ms();

        let result = match state.actor.as_mut() {
            Some(actor) => guarded(actor.receive(&ctx, payload)).await,
            None => Err("no actor instance".to_string()),
        };

        let now_ms = self.time.monotonic_ms();
        let duration_ms = now_ms.saturating_sub(start_ms);
        self.self_ref
            .update_stats(|stats| stats.record_message(duration_ms, result.is_err(), now_ms));

        match result {
            Ok(response) => {
                if let Some(reply) = reply {
                    reply.fulfill(Ok(response));
                }
            }
            Err(reason) => {
                warn!(actor = %self.self_ref, reason = %reason, "Handler failed");
                // Supervision completes before the asker hears about the failure
                self.supervise(state, reason.clone()).await;
                if let Some(reply) = reply {
                    reply.fulfill(Err(Error::handler_failure(self.self_ref.path(), reason)));
                }
            }
        }
    }

    /// Apply the supervisor to one failure
    ///
    /// Iterates instead of recursing when a restarted instance fails again in
    /// `on_start`.
    async fn supervise(&self, state: &mut CellState, reason: String) {
        let mut reason = reason;
        loop {
            self.self_ref.set_lifecycle(LifecycleState::Failed);
            let directive = self
                .supervisor
                .decide(&mut state.history, self.time.monotonic_ms());
            debug!(actor = %self.self_ref, ?directive, "Supervision decision");

            match directive {
                Directive::Restart { delay } => {
                    self.self_ref.set_lifecycle(LifecycleState::Restarting);
                    self.stop_children();
                    state.actor = None;
                    state.started = false;

                    if !delay.is_zero() {
                        self.time.sleep_ms(delay.as_millis() as u64).await;
                    }

                    let factory = &self.factory;
                    match std::panic::catch_unwind(AssertUnwindSafe(|| factory.create())) {
                        Ok(actor) => state.actor = Some(actor),
                        Err(panic) => {
                            reason = panic_message(panic);
                            continue;
                        }
                    }

                    self.self_ref
                        .update_stats(|stats| stats.restart_count = stats.restart_count.wrapping_add(1));
                    info!(actor = %self.self_ref, reason = %reason, "Actor restarted");

                    match self.start_instance(state).await {
                        Ok(()) => return,
                        Err(next) => {
                            warn!(actor = %self.self_ref, reason = %next, "Restarted actor failed to start");
                            reason = next;
                        }
                    }
                }
                Directive::Stop => {
                    self.terminate(state, &reason, false).await;
                    return;
                }
                Directive::Escalate => {
                    self.terminate(state, &reason, true).await;
                    return;
                }
            }
        }
    }

    async fn terminate(&self, state: &mut CellState, reason: &str, escalate: bool) {
        self.self_ref.set_lifecycle(LifecycleState::Stopping);

        let discarded = self.mailbox().close();
        if !discarded.is_empty() {
            debug!(
                actor = %self.self_ref,
                discarded = discarded.len(),
                "Discarding pending envelopes"
            );
        }
        drop(discarded);

        self.finish(state).await;

        if escalate {
            match &self.parent {
                Some(parent) => {
                    let message = SystemMessage::Escalated {
                        child: self.self_ref.path().to_string(),
                        reason: reason.to_string(),
                    };
                    if let Err(e) = parent.mailbox().put_system(message) {
                        warn!(actor = %self.self_ref, parent = %parent, error = %e, "Escalation dropped");
                    }
                }
                None => {
                    warn!(actor = %self.self_ref, reason = %reason, "Failure escalated past the root");
                }
            }
        }
    }

    async fn finish(&self, state: &mut CellState) {
        if self.is_finished() {
            return;
        }
        self.self_ref.set_lifecycle(LifecycleState::Stopping);

        if let Some(mut actor) = state.actor.take() {
            if state.started {
                let ctx = self.context(None);
                if let Err(reason) = guarded(actor.on_stop(&ctx)).await {
                    warn!(actor = %self.self_ref, reason = %reason, "on_stop failed");
                }
            }
        }
        state.started = false;

        self.stop_children();
        drop(self.mailbox().close());

        if let Some(system) = self.system.upgrade() {
            system.release(self.id, self.self_ref.path());
        }

        self.self_ref.set_lifecycle(LifecycleState::Stopped);
        info!(actor = %self.self_ref, "Actor stopped");
    }

    fn stop_children(&self) {
        if let Some(system) = self.system.upgrade() {
            system.stop_children(self.id);
        }
    }

    fn context(&self, sender: Option<ActorRef>) -> Context {
        Context::new(self.self_ref.clone(), sender, self.system.clone())
    }
}

impl std::fmt::Debug for ActorCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorCell")
            .field("id", &self.id)
            .field("actor", &self.self_ref)
            .field("lifecycle", &self.self_ref.lifecycle())
            .field("dispatcher", &self.dispatcher.name())
            .finish()
    }
}

/// Run an actor hook, turning errors and panics into a failure reason
async fn guarded<T, F>(future: F) -> std::result::Result<T, String>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic_message(panic)),
    }
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    format!("panicked: {}", message)
}
