//! Actor mailbox implementation
//!
//! Bounded queues with explicit limits, no silent drops. A mailbox holds user
//! envelopes in FIFO or priority order plus an unbounded system lane that is
//! always drained first.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Arc, OnceLock};

use anemone_core::config::{MailboxConfig, MailboxDiscipline};
use anemone_core::constants::ENVELOPE_PRIORITY_DEFAULT;
use anemone_core::error::{Error, Result};
use anemone_core::io::TimeProvider;
use anemone_core::message::Message;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::handle::{ActorRef, ReplySlot};

/// A message in the mailbox
///
/// Built by the sender, consumed exactly once by the dispatcher.
#[derive(Debug)]
pub struct Envelope {
    payload: Message,
    sender: Option<ActorRef>,
    priority: i32,
    reply: Option<ReplySlot>,
    enqueued_at_ms: u64,
}

impl Envelope {
    /// Create an envelope with default priority and no sender
    pub fn new(payload: impl Into<Message>) -> Self {
        Self {
            payload: payload.into(),
            sender: None,
            priority: ENVELOPE_PRIORITY_DEFAULT,
            reply: None,
            enqueued_at_ms: 0,
        }
    }

    /// Record the sending actor
    pub fn with_sender(mut self, sender: ActorRef) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Set the priority (higher is delivered first in a priority mailbox)
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub(crate) fn with_reply(mut self, reply: ReplySlot) -> Self {
        self.reply = Some(reply);
        self
    }

    /// The payload
    pub fn payload(&self) -> &Message {
        &self.payload
    }

    /// The sending actor, if any
    pub fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    /// The priority
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Whether a reply is expected
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Monotonic time the envelope entered the mailbox
    pub fn enqueued_at_ms(&self) -> u64 {
        self.enqueued_at_ms
    }

    /// Time this envelope has been waiting
    pub fn wait_time_ms(&self, time: &dyn TimeProvider) -> u64 {
        time.monotonic_ms().saturating_sub(self.enqueued_at_ms)
    }

    pub(crate) fn into_parts(self) -> (Message, Option<ActorRef>, Option<ReplySlot>) {
        (self.payload, self.sender, self.reply)
    }
}

/// Control message carried on the system lane
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemMessage {
    /// A child stopped and handed its failure up
    Escalated {
        /// Path of the failed child
        child: String,
        /// Original cause
        reason: String,
    },
}

/// One unit of work taken from a mailbox
#[derive(Debug)]
pub enum Delivery {
    /// Control message
    System(SystemMessage),
    /// User envelope
    User(Envelope),
}

/// Mailbox phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxPhase {
    /// Accepting envelopes
    Open,
    /// Stop requested: rejects puts, queued envelopes still drain
    Sealed,
    /// Actor finished: everything rejected, nothing queued
    Closed,
}

/// Called whenever a mailbox gains work or changes phase
///
/// The shared pool dispatcher installs one to learn which actors are ready.
pub trait ReadyHook: Send + Sync {
    /// The mailbox has something for its actor to do
    fn notify_ready(&self);
}

struct Ranked {
    priority: i32,
    seq: u64,
    envelope: Envelope,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    // Max-heap: higher priority first, then lower sequence (earlier arrival)
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum Queue {
    Fifo(VecDeque<Envelope>),
    Priority(BinaryHeap<Ranked>),
}

impl Queue {
    fn len(&self) -> usize {
        match self {
            Queue::Fifo(q) => q.len(),
            Queue::Priority(q) => q.len(),
        }
    }

    fn push(&mut self, seq: u64, envelope: Envelope) {
        match self {
            Queue::Fifo(q) => q.push_back(envelope),
            Queue::Priority(q) => q.push(Ranked {
                priority: envelope.priority,
                seq,
                envelope,
            }),
        }
    }

    fn pop(&mut self) -> Option<Envelope> {
        match self {
            Queue::Fifo(q) => q.pop_front(),
            Queue::Priority(q) => q.pop().map(|r| r.envelope),
        }
    }

    fn drain(&mut self) -> Vec<Envelope> {
        match self {
            Queue::Fifo(q) => q.drain(..).collect(),
            Queue::Priority(q) => {
                let mut ranked: Vec<Ranked> = q.drain().collect();
                ranked.sort_by(|a, b| b.cmp(a));
                ranked.into_iter().map(|r| r.envelope).collect()
            }
        }
    }
}

struct MailboxState {
    queue: Queue,
    system: VecDeque<SystemMessage>,
    phase: MailboxPhase,
    next_seq: u64,
    enqueued_count: u64,
    processed_count: u64,
}

/// Bounded mailbox for one actor
///
/// `put` never suspends; `take` suspends until a delivery exists or the
/// mailbox is sealed and drained.
pub struct Mailbox {
    path: String,
    capacity: usize,
    discipline: MailboxDiscipline,
    state: Mutex<MailboxState>,
    notify: Notify,
    ready_hook: OnceLock<Arc<dyn ReadyHook>>,
    time: Arc<dyn TimeProvider>,
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .field("discipline", &self.discipline)
            .field("len", &self.len())
            .field("phase", &self.phase())
            .finish()
    }
}

impl Mailbox {
    /// Create a mailbox for the actor at `path`
    pub fn new(path: impl Into<String>, config: MailboxConfig, time: Arc<dyn TimeProvider>) -> Self {
        debug_assert!(config.capacity > 0, "capacity must be positive");

        let queue = match config.discipline {
            MailboxDiscipline::Fifo => Queue::Fifo(VecDeque::with_capacity(config.capacity.min(64))),
            MailboxDiscipline::Priority => Queue::Priority(BinaryHeap::new()),
        };

        Self {
            path: path.into(),
            capacity: config.capacity,
            discipline: config.discipline,
            state: Mutex::new(MailboxState {
                queue,
                system: VecDeque::new(),
                phase: MailboxPhase::Open,
                next_seq: 0,
                enqueued_count: 0,
                processed_count: 0,
            }),
            notify: Notify::new(),
            ready_hook: OnceLock::new(),
            time,
        }
    }

    /// Install the ready hook; only the first call has any effect
    pub fn set_ready_hook(&self, hook: Arc<dyn ReadyHook>) {
        let _ = self.ready_hook.set(hook);
    }

    /// Enqueue a user envelope
    ///
    /// Fails with `MailboxFull` at capacity and `ActorStopped` once sealed.
    pub fn put(&self, mut envelope: Envelope) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.phase != MailboxPhase::Open {
                return Err(Error::actor_stopped(&self.path));
            }

            let depth = state.queue.len();
            if depth >= self.capacity {
                return Err(Error::MailboxFull {
                    path: self.path.clone(),
                    depth,
                    capacity: self.capacity,
                });
            }

            envelope.enqueued_at_ms = self.time.monotonic_ms();
            let seq = state.next_seq;
            state.next_seq = state.next_seq.wrapping_add(1);
            state.queue.push(seq, envelope);
            state.enqueued_count = state.enqueued_count.wrapping_add(1);

            debug_assert!(state.queue.len() <= self.capacity);
        }

        self.wake();
        Ok(())
    }

    /// Enqueue a control message; only a closed mailbox rejects it
    pub(crate) fn put_system(&self, message: SystemMessage) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.phase == MailboxPhase::Closed {
                return Err(Error::actor_stopped(&self.path));
            }
            state.system.push_back(message);
        }

        self.wake();
        Ok(())
    }

    /// Take the next delivery without waiting
    pub fn try_take(&self) -> Option<Delivery> {
        let mut state = self.state.lock();

        if let Some(message) = state.system.pop_front() {
            return Some(Delivery::System(message));
        }

        let envelope = state.queue.pop()?;
        state.processed_count = state.processed_count.wrapping_add(1);
        Some(Delivery::User(envelope))
    }

    /// Take the next delivery, waiting for one to arrive
    ///
    /// Returns `None` once the mailbox is sealed (or closed) and empty.
    pub async fn take(&self) -> Option<Delivery> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_take() {
                return Some(delivery);
            }
            if self.phase() != MailboxPhase::Open {
                return None;
            }

            notified.await;
        }
    }

    /// Stop accepting user envelopes; returns false if already sealed or closed
    pub fn seal(&self) -> bool {
        let sealed = {
            let mut state = self.state.lock();
            if state.phase == MailboxPhase::Open {
                state.phase = MailboxPhase::Sealed;
                true
            } else {
                false
            }
        };

        if sealed {
            self.wake();
        }
        sealed
    }

    /// Reject everything from now on and return the envelopes still queued
    ///
    /// Dropping the returned envelopes drops their reply slots.
    pub fn close(&self) -> Vec<Envelope> {
        let drained = {
            let mut state = self.state.lock();
            state.phase = MailboxPhase::Closed;
            state.system.clear();
            state.queue.drain()
        };

        self.wake();
        drained
    }

    /// Current phase
    pub fn phase(&self) -> MailboxPhase {
        self.state.lock().phase
    }

    /// Check if the mailbox accepts user envelopes
    pub fn is_open(&self) -> bool {
        self.phase() == MailboxPhase::Open
    }

    /// Number of queued user envelopes
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Check if no user envelopes are queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if anything (user or system) is waiting
    pub fn has_pending(&self) -> bool {
        let state = self.state.lock();
        !state.system.is_empty() || state.queue.len() > 0
    }

    /// Mailbox capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ordering discipline
    pub fn discipline(&self) -> MailboxDiscipline {
        self.discipline
    }

    /// Total user envelopes accepted
    pub fn enqueued_count(&self) -> u64 {
        self.state.lock().enqueued_count
    }

    /// Total user envelopes handed to the actor
    pub fn processed_count(&self) -> u64 {
        self.state.lock().processed_count
    }

    fn wake(&self) {
        self.notify.notify_one();
        if let Some(hook) = self.ready_hook.get() {
            hook.notify_ready();
        }
    }
}
