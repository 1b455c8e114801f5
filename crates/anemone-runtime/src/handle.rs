//! Actor references
//!
//! An `ActorRef` is the only way to reach an actor. It is cheap to clone,
//! compares by path, and stays valid after the actor stops (sends then fail
//! with `ActorStopped`).

use crate::activation::{ActorCell, ActorStats, LifecycleState};
use crate::mailbox::{Envelope, Mailbox};
use anemone_core::error::{Error, Result};
use anemone_core::message::Message;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{oneshot, watch};

/// Single-assignment reply cell bound to one `ask`
///
/// Dropping it unfulfilled makes the asker observe `ActorStopped`.
#[derive(Debug)]
pub struct ReplySlot {
    tx: oneshot::Sender<Result<Message>>,
}

impl ReplySlot {
    /// Create a slot and the receiver the asker waits on
    pub fn channel() -> (Self, oneshot::Receiver<Result<Message>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Deliver the outcome; returns false if the asker has gone away
    pub fn fulfill(self, result: Result<Message>) -> bool {
        self.tx.send(result).is_ok()
    }
}

pub(crate) struct Endpoint {
    id: u64,
    path: String,
    mailbox: Mailbox,
    lifecycle: watch::Sender<LifecycleState>,
    stats: Mutex<ActorStats>,
    driver: OnceLock<Weak<ActorCell>>,
    ask_timeout: Duration,
}

/// Handle to an actor
#[derive(Clone)]
pub struct ActorRef {
    inner: Arc<Endpoint>,
}

impl ActorRef {
    pub(crate) fn new(id: u64, path: String, mailbox: Mailbox, ask_timeout: Duration) -> Self {
        let (lifecycle, _) = watch::channel(LifecycleState::Starting);
        Self {
            inner: Arc::new(Endpoint {
                id,
                path,
                mailbox,
                lifecycle,
                stats: Mutex::new(ActorStats::default()),
                driver: OnceLock::new(),
                ask_timeout,
            }),
        }
    }

    /// Full path, e.g. `actor://local/worker`
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.inner
            .path
            .rsplit('/')
            .next()
            .unwrap_or(self.inner.path.as_str())
    }

    /// Fire-and-forget send; never waits
    pub fn tell(&self, message: impl Into<Message>) -> Result<()> {
        self.send(Envelope::new(message))
    }

    /// Fire-and-forget send that records the sending actor
    pub fn tell_from(&self, message: impl Into<Message>, sender: &ActorRef) -> Result<()> {
        self.send(Envelope::new(message).with_sender(sender.clone()))
    }

    /// Send a prepared envelope
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        self.inner.mailbox.put(envelope)
    }

    /// Request/response with a timeout
    pub async fn ask(&self, message: impl Into<Message>, timeout: Duration) -> Result<Message> {
        self.ask_envelope(Envelope::new(message), timeout).await
    }

    /// Request/response with the system's default timeout
    pub async fn ask_default(&self, message: impl Into<Message>) -> Result<Message> {
        self.ask(message, self.inner.ask_timeout).await
    }

    /// Request/response with a prepared envelope
    ///
    /// On timeout the envelope stays queued and may still be processed; its
    /// result is discarded.
    ///
    /// Inline actors are driven on the calling task one delivery at a time,
    /// stopping as soon as the reply is in or the deadline has passed.
    pub async fn ask_envelope(&self, envelope: Envelope, timeout: Duration) -> Result<Message> {
        let deadline = tokio::time::Instant::now() + timeout;
        let (slot, mut rx) = ReplySlot::channel();
        self.send(envelope.with_reply(slot))?;

        if let Some(cell) = self.driver() {
            loop {
                match rx.try_recv() {
                    Ok(result) => return result,
                    Err(TryRecvError::Closed) => return Err(Error::actor_stopped(self.path())),
                    Err(TryRecvError::Empty) => {}
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(self.ask_timeout_error(timeout));
                }
                // Busy on another task, or nothing left to run here
                match cell.try_drive(1).await {
                    Some(0) | None => break,
                    Some(_) => {}
                }
            }
        }

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::actor_stopped(self.path())),
            Err(_) => Err(self.ask_timeout_error(timeout)),
        }
    }

    /// Typed request/response over JSON
    pub async fn ask_json<Req, Resp>(&self, request: &Req, timeout: Duration) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let reply = self.ask(Message::json(request)?, timeout).await?;
        reply.decode()
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> LifecycleState {
        *self.inner.lifecycle.borrow()
    }

    /// Check if the actor has fully stopped
    pub fn is_stopped(&self) -> bool {
        self.lifecycle() == LifecycleState::Stopped
    }

    /// Wait until the actor has fully stopped
    pub async fn stopped(&self) {
        let mut rx = self.inner.lifecycle.subscribe();
        let _ = rx.wait_for(|state| *state == LifecycleState::Stopped).await;
    }

    /// Snapshot of the actor's counters
    pub fn stats(&self) -> ActorStats {
        self.inner.stats.lock().clone()
    }

    /// Number of queued user envelopes
    pub fn mailbox_len(&self) -> usize {
        self.inner.mailbox.len()
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.inner.mailbox
    }

    pub(crate) fn set_lifecycle(&self, next: LifecycleState) {
        self.inner.lifecycle.send_modify(|current| {
            debug_assert!(
                current.can_transition_to(next),
                "invalid lifecycle transition {} -> {}",
                current,
                next
            );
            *current = next;
        });
    }

    pub(crate) fn update_stats(&self, update: impl FnOnce(&mut ActorStats)) {
        update(&mut self.inner.stats.lock());
    }

    pub(crate) fn set_driver(&self, cell: &Arc<ActorCell>) {
        let _ = self.inner.driver.set(Arc::downgrade(cell));
    }

    pub(crate) fn driver(&self) -> Option<Arc<ActorCell>> {
        self.inner.driver.get().and_then(Weak::upgrade)
    }

    fn ask_timeout_error(&self, timeout: Duration) -> Error {
        Error::AskTimeout {
            path: self.path().to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.inner.path == other.inner.path
    }
}

impl Eq for ActorRef {}

impl Hash for ActorRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.path.hash(state);
    }
}

impl std::fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ActorRef").field(&self.inner.path).finish()
    }
}

impl std::fmt::Display for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anemone_core::config::MailboxConfig;
    use anemone_core::io::WallClockTime;
    use std::collections::HashSet;

    fn detached_ref(id: u64, path: &str, capacity: usize) -> ActorRef {
        let mailbox = Mailbox::new(
            path,
            MailboxConfig::fifo(capacity),
            Arc::new(WallClockTime::new()),
        );
        ActorRef::new(id, path.to_string(), mailbox, Duration::from_secs(1))
    }

    #[test]
    fn test_actor_ref_equality_by_path() {
        let a = detached_ref(1, "actor://local/a", 4);
        let a_again = detached_ref(2, "actor://local/a", 4);
        let b = detached_ref(3, "actor://local/b", 4);

        assert_eq!(a, a_again);
        assert_ne!(a, b);

        let set: HashSet<ActorRef> = [a, a_again, b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_actor_ref_name() {
        let child = detached_ref(1, "actor://local/parent/child", 4);
        assert_eq!(child.name(), "child");
        assert_eq!(child.to_string(), "actor://local/parent/child");
    }

    #[test]
    fn test_tell_reports_mailbox_full() {
        let r = detached_ref(1, "actor://local/full", 1);
        r.tell("one").unwrap();
        assert!(matches!(r.tell("two"), Err(Error::MailboxFull { .. })));
        assert_eq!(r.mailbox_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ask_times_out_without_consumer() {
        let r = detached_ref(1, "actor://local/idle", 4);
        let result = r.ask("ping", Duration::from_millis(50)).await;
        match result {
            Err(Error::AskTimeout { path, timeout_ms }) => {
                assert_eq!(path, "actor://local/idle");
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("expected AskTimeout, got {:?}", other),
        }
        // The envelope is not retracted
        assert_eq!(r.mailbox_len(), 1);
    }

    #[tokio::test]
    async fn test_ask_observes_dropped_reply_slot() {
        let r = detached_ref(1, "actor://local/closing", 4);
        let asker = {
            let r = r.clone();
            tokio::spawn(async move { r.ask("ping", Duration::from_secs(5)).await })
        };

        while r.mailbox_len() == 0 {
            tokio::task::yield_now().await;
        }
        drop(r.mailbox().close());

        assert!(matches!(
            asker.await.unwrap(),
            Err(Error::ActorStopped { .. })
        ));
    }

    #[test]
    fn test_reply_slot_fulfill_once() {
        let (slot, mut rx) = ReplySlot::channel();
        assert!(slot.fulfill(Ok(Message::text("done"))));
        assert_eq!(rx.try_recv().unwrap().unwrap(), "done");
    }
}
