//! Per-delivery actor context

use crate::actor::Props;
use crate::handle::ActorRef;
use crate::scheduler::Cancellable;
use crate::system::{ActorSystem, SystemInner};
use anemone_core::error::{Error, Result};
use anemone_core::message::Message;
use std::sync::Weak;
use std::time::Duration;

/// Context handed to an actor with every message
///
/// Built fresh for each delivery; `sender` belongs to that delivery only.
pub struct Context {
    self_ref: ActorRef,
    sender: Option<ActorRef>,
    system: Weak<SystemInner>,
}

impl Context {
    pub(crate) fn new(
        self_ref: ActorRef,
        sender: Option<ActorRef>,
        system: Weak<SystemInner>,
    ) -> Self {
        Self {
            self_ref,
            sender,
            system,
        }
    }

    /// Reference to the actor being run
    pub fn self_ref(&self) -> &ActorRef {
        &self.self_ref
    }

    /// Sender of the current message, if it recorded one
    pub fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    /// The owning actor system, unless it has been dropped
    pub fn system(&self) -> Option<ActorSystem> {
        self.system.upgrade().map(ActorSystem::from_inner)
    }

    /// Spawn a child of this actor
    pub fn spawn(&self, props: Props) -> Result<ActorRef> {
        self.live_system()?.spawn_child(props, Some(&self.self_ref))
    }

    /// Deliver `message` to `target` after `delay`
    pub fn schedule(
        &self,
        delay: Duration,
        target: &ActorRef,
        message: impl Into<Message>,
    ) -> Result<Cancellable> {
        self.live_system()?.schedule(delay, target, message)
    }

    /// Stop another actor (or this one)
    pub fn stop(&self, target: &ActorRef) -> Result<()> {
        self.live_system()?.stop(target)
    }

    /// Stop this actor after the envelopes already queued
    pub fn stop_self(&self) -> Result<()> {
        self.stop(&self.self_ref)
    }

    fn live_system(&self) -> Result<ActorSystem> {
        self.system()
            .ok_or_else(|| Error::actor_stopped(self.self_ref.path()))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("self_ref", &self.self_ref)
            .field("sender", &self.sender)
            .finish()
    }
}
