//! Actor system: registry, spawning, routing and shutdown
//!
//! The system owns the path registry and the defaults every spawn falls back
//! to. Cells only hold a `Weak` back-reference, so dropping the last
//! `ActorSystem` clone seals every mailbox and lets actors wind down.

use crate::activation::{panic_message, ActorCell};
use crate::actor::Props;
use crate::dispatcher::{Attachment, DedicatedDispatcher, Dispatcher, InlineDispatcher};
use crate::handle::ActorRef;
use crate::mailbox::Mailbox;
use crate::pool::PoolDispatcher;
use crate::scheduler::{Cancellable, Scheduler};
use crate::supervision::SupervisorStrategy;
use anemone_core::config::{DispatcherKind, SystemConfig};
use anemone_core::constants::{
    ACTOR_NAME_LENGTH_BYTES_MAX, ACTOR_PATH_LENGTH_BYTES_MAX, ACTOR_PATH_SCHEME,
};
use anemone_core::error::{Error, Result};
use anemone_core::io::{IoContext, TimeProvider};
use anemone_core::message::Message;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Registry entry for one live actor
#[derive(Debug, Clone)]
struct ActorRecord {
    actor_ref: ActorRef,
    parent_id: Option<u64>,
    dispatcher: String,
}

pub(crate) struct SystemInner {
    config: SystemConfig,
    io: IoContext,
    scheduler: Scheduler,
    default_dispatcher: Arc<dyn Dispatcher>,
    default_supervisor: SupervisorStrategy,
    /// Path -> record; removed as soon as an actor is asked to stop
    registry: DashMap<String, ActorRecord>,
    /// Cell id -> ref; removed once the actor reaches `Stopped`
    live: DashMap<u64, ActorRef>,
    /// Cells nobody runs unless driven
    inline_cells: Mutex<Vec<Arc<ActorCell>>>,
    next_cell_id: AtomicU64,
}

impl SystemInner {
    /// Forget a finished cell
    pub(crate) fn release(&self, cell_id: u64, path: &str) {
        self.registry
            .remove_if(path, |_, record| record.actor_ref.id() == cell_id);
        self.live.remove(&cell_id);
        self.inline_cells.lock().retain(|cell| cell.id() != cell_id);
    }

    /// Stop every registered child of `parent_id`
    pub(crate) fn stop_children(&self, parent_id: u64) {
        let children: Vec<ActorRef> = self
            .registry
            .iter()
            .filter(|entry| entry.value().parent_id == Some(parent_id))
            .map(|entry| entry.value().actor_ref.clone())
            .collect();

        for child in children {
            // Already gone if it raced with its own stop
            let _ = self.stop_actor(&child);
        }
    }

    fn stop_actor(&self, actor: &ActorRef) -> Result<()> {
        let removed = self
            .registry
            .remove_if(actor.path(), |_, record| record.actor_ref.id() == actor.id());
        if removed.is_none() {
            return Err(Error::actor_stopped(actor.path()));
        }

        actor.mailbox().seal();
        debug!(actor = %actor, "Actor stop requested");
        Ok(())
    }
}

impl Drop for SystemInner {
    fn drop(&mut self) {
        for entry in self.live.iter() {
            entry.value().mailbox().seal();
        }
    }
}

/// Handle to an actor system
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl ActorSystem {
    /// Create a system from a configuration
    pub fn new(config: SystemConfig) -> Result<Self> {
        Self::builder().with_config(config).build()
    }

    /// Start building a system
    pub fn builder() -> ActorSystemBuilder {
        ActorSystemBuilder::new()
    }

    pub(crate) fn from_inner(inner: Arc<SystemInner>) -> Self {
        Self { inner }
    }

    /// System name (first path segment)
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Configuration the system was built with
    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    /// Time and randomness providers
    pub fn io(&self) -> &IoContext {
        &self.inner.io
    }

    /// Spawn a top-level actor
    pub fn spawn(&self, props: Props) -> Result<ActorRef> {
        self.spawn_child(props, None)
    }

    #[instrument(skip(self, props, parent), fields(system = %self.inner.config.name))]
    pub(crate) fn spawn_child(&self, props: Props, parent: Option<&ActorRef>) -> Result<ActorRef> {
        let inner = &self.inner;
        let Props {
            factory,
            name,
            mailbox,
            dispatcher,
            supervisor,
        } = props;

        let name = name.unwrap_or_else(|| inner.io.gen_uuid());
        validate_name(&name)?;

        let path = match parent {
            Some(parent) => format!("{}/{}", parent.path(), name),
            None => format!("{}{}/{}", ACTOR_PATH_SCHEME, inner.config.name, name),
        };
        if path.len() > ACTOR_PATH_LENGTH_BYTES_MAX {
            return Err(Error::InvalidActorName {
                name,
                reason: format!("path exceeds {} bytes", ACTOR_PATH_LENGTH_BYTES_MAX),
            });
        }

        let mailbox_config = mailbox.unwrap_or(inner.config.mailbox);
        mailbox_config.validate()?;
        let dispatcher = dispatcher.unwrap_or_else(|| inner.default_dispatcher.clone());
        let supervisor = supervisor.unwrap_or_else(|| inner.default_supervisor.clone());

        if inner.registry.contains_key(&path) {
            return Err(Error::duplicate_name(path));
        }
        let actor = std::panic::catch_unwind(AssertUnwindSafe(|| factory.create()))
            .map_err(|panic| Error::handler_failure(path.clone(), panic_message(panic)))?;

        let id = inner.next_cell_id.fetch_add(1, Ordering::Relaxed);
        let actor_ref = ActorRef::new(
            id,
            path.clone(),
            Mailbox::new(path.clone(), mailbox_config, inner.io.time.clone()),
            Duration::from_millis(inner.config.ask_timeout_ms),
        );

        // Another spawn may have claimed the path while the factory ran
        match inner.registry.entry(path.clone()) {
            Entry::Occupied(_) => return Err(Error::duplicate_name(path)),
            Entry::Vacant(slot) => {
                slot.insert(ActorRecord {
                    actor_ref: actor_ref.clone(),
                    parent_id: parent.map(|p| p.id()),
                    dispatcher: dispatcher.name().to_string(),
                });
            }
        }

        let cell = Arc::new(ActorCell::new(
            id,
            actor_ref.clone(),
            parent.cloned(),
            actor,
            factory,
            supervisor,
            dispatcher.clone(),
            Arc::downgrade(inner),
            inner.io.time.clone(),
        ));
        inner.live.insert(id, actor_ref.clone());

        match dispatcher.attach(cell) {
            Ok(Attachment::Scheduled) => {}
            Ok(Attachment::Driven(cell)) => {
                actor_ref.set_driver(&cell);
                inner.inline_cells.lock().push(cell);
            }
            Err(e) => {
                inner.registry.remove_if(&path, |_, record| record.actor_ref.id() == id);
                inner.live.remove(&id);
                return Err(e);
            }
        }

        info!(actor = %actor_ref, dispatcher = dispatcher.name(), "Actor spawned");
        Ok(actor_ref)
    }

    /// Stop an actor after the envelopes already queued
    ///
    /// The path is free for reuse as soon as this returns.
    pub fn stop(&self, actor: &ActorRef) -> Result<()> {
        self.inner.stop_actor(actor)
    }

    /// Fire-and-forget send, optionally recording the sending actor
    pub fn tell(
        &self,
        actor: &ActorRef,
        message: impl Into<Message>,
        sender: Option<&ActorRef>,
    ) -> Result<()> {
        match sender {
            Some(sender) => actor.tell_from(message, sender),
            None => actor.tell(message),
        }
    }

    /// Request/response with a timeout
    pub async fn ask(
        &self,
        actor: &ActorRef,
        message: impl Into<Message>,
        timeout: Duration,
    ) -> Result<Message> {
        actor.ask(message, timeout).await
    }

    /// Deliver `message` to `target` after `delay`
    pub fn schedule(
        &self,
        delay: Duration,
        target: &ActorRef,
        message: impl Into<Message>,
    ) -> Result<Cancellable> {
        let target = target.clone();
        let message = message.into();
        self.inner.scheduler.schedule_once(delay, move || {
            if let Err(e) = target.tell(message) {
                debug!(actor = %target, error = %e, "Scheduled message not delivered");
            }
        })
    }

    /// Run `callback` once after `delay`
    pub fn schedule_once<F>(&self, delay: Duration, callback: F) -> Result<Cancellable>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.scheduler.schedule_once(delay, callback)
    }

    /// Find a registered actor by path
    pub fn lookup(&self, path: &str) -> Option<ActorRef> {
        self.inner
            .registry
            .get(path)
            .map(|record| record.actor_ref.clone())
    }

    /// Registered children of `parent`
    pub fn children(&self, parent: &ActorRef) -> Vec<ActorRef> {
        self.inner
            .registry
            .iter()
            .filter(|entry| entry.value().parent_id == Some(parent.id()))
            .map(|entry| entry.value().actor_ref.clone())
            .collect()
    }

    /// Name of the dispatcher a registered actor runs on
    pub fn dispatcher_of(&self, actor: &ActorRef) -> Option<String> {
        self.inner
            .registry
            .get(actor.path())
            .filter(|record| record.actor_ref.id() == actor.id())
            .map(|record| record.dispatcher.clone())
    }

    /// Number of registered actors
    pub fn actor_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Number of actors that have not yet reached `Stopped`
    pub fn live_count(&self) -> usize {
        self.inner.live.len()
    }

    /// Drive inline actors on this task until none can make progress
    ///
    /// Returns the number of deliveries processed. Cells busy on another
    /// task are left to that task.
    pub async fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let cells: Vec<Arc<ActorCell>> = self.inner.inline_cells.lock().clone();
            let mut idle = Vec::with_capacity(cells.len());

            for cell in &cells {
                if let Some(processed) = cell.try_drive(usize::MAX).await {
                    total += processed;
                    idle.push(cell.clone());
                }
            }

            // Work handed between inline actors during the pass
            if !idle.iter().any(|cell| cell.has_work()) {
                break;
            }
        }
        total
    }

    /// Stop every actor and wait until all have reached `Stopped`
    #[instrument(skip(self), fields(system = %self.inner.config.name))]
    pub async fn shutdown(&self) {
        info!("Actor system shutting down");
        loop {
            let registered: Vec<ActorRef> = self
                .inner
                .registry
                .iter()
                .map(|entry| entry.value().actor_ref.clone())
                .collect();
            for actor in &registered {
                let _ = self.stop(actor);
            }

            self.run_until_idle().await;

            let live: Vec<ActorRef> = self
                .inner
                .live
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            if live.is_empty() {
                break;
            }

            for actor in live.iter().filter(|actor| actor.driver().is_none()) {
                actor.stopped().await;
            }
            tokio::task::yield_now().await;
        }
        info!("Actor system shut down");
    }
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("name", &self.inner.config.name)
            .field("actors", &self.inner.registry.len())
            .field("dispatcher", &self.inner.default_dispatcher.name())
            .finish()
    }
}

/// Builder for an [`ActorSystem`]
pub struct ActorSystemBuilder {
    config: SystemConfig,
    io: Option<IoContext>,
    time: Option<Arc<dyn TimeProvider>>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    supervisor: Option<SupervisorStrategy>,
}

impl ActorSystemBuilder {
    /// Builder with default configuration
    pub fn new() -> Self {
        Self {
            config: SystemConfig::default(),
            io: None,
            time: None,
            dispatcher: None,
            supervisor: None,
        }
    }

    /// Set the configuration
    pub fn with_config(mut self, config: SystemConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the system name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the time and randomness providers
    pub fn with_io(mut self, io: IoContext) -> Self {
        self.io = Some(io);
        self
    }

    /// Replace only the time provider
    pub fn with_time(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time = Some(time);
        self
    }

    /// Dispatcher used when `Props` names none
    pub fn with_default_dispatcher<D: Dispatcher>(mut self, dispatcher: Arc<D>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Supervisor used when `Props` names none
    pub fn with_default_supervisor(mut self, supervisor: SupervisorStrategy) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    /// Validate the configuration and build the system
    pub fn build(self) -> Result<ActorSystem> {
        self.config.validate()?;

        let mut io = self.io.unwrap_or_default();
        if let Some(time) = self.time {
            io.time = time;
        }

        let default_dispatcher: Arc<dyn Dispatcher> = match self.dispatcher {
            Some(dispatcher) => dispatcher,
            None => match self.config.dispatcher.kind {
                DispatcherKind::Inline => Arc::new(InlineDispatcher::new()),
                DispatcherKind::Dedicated => Arc::new(DedicatedDispatcher::new()),
                DispatcherKind::Pool => {
                    Arc::new(PoolDispatcher::from_config(&self.config.dispatcher)?)
                }
            },
        };
        let default_supervisor = self
            .supervisor
            .unwrap_or_else(|| SupervisorStrategy::from_config(&self.config.supervision));

        info!(
            system = %self.config.name,
            dispatcher = default_dispatcher.name(),
            "Actor system created"
        );

        Ok(ActorSystem::from_inner(Arc::new(SystemInner {
            scheduler: Scheduler::new(io.time.clone()),
            config: self.config,
            io,
            default_dispatcher,
            default_supervisor,
            registry: DashMap::new(),
            live: DashMap::new(),
            inline_cells: Mutex::new(Vec::new()),
            next_cell_id: AtomicU64::new(1),
        })))
    }
}

impl Default for ActorSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidActorName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("must not be empty".into()));
    }
    if name.len() > ACTOR_NAME_LENGTH_BYTES_MAX {
        return Err(invalid(format!(
            "exceeds {} bytes",
            ACTOR_NAME_LENGTH_BYTES_MAX
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| *c == '/' || c.is_whitespace() || c.is_control())
    {
        return Err(invalid(format!("contains {:?}", c)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Actor;
    use crate::context::Context;
    use crate::mailbox::Delivery;
    use anemone_core::config::MailboxConfig;
    use async_trait::async_trait;

    #[derive(Clone, Default)]
    struct Echo;

    #[async_trait]
    impl Actor for Echo {
        async fn receive(&mut self, _ctx: &Context, message: Message) -> Result<Message> {
            Ok(message)
        }
    }

    fn inline_system() -> ActorSystem {
        ActorSystem::builder()
            .with_name("test")
            .with_default_dispatcher(Arc::new(InlineDispatcher::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("worker-1").is_ok());
        assert!(validate_name("a.b_c").is_ok());
        assert!(matches!(
            validate_name(""),
            Err(Error::InvalidActorName { .. })
        ));
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("with space").is_err());
        assert!(validate_name(&"x".repeat(ACTOR_NAME_LENGTH_BYTES_MAX + 1)).is_err());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = SystemConfig::default();
        config.mailbox = MailboxConfig::fifo(0);
        assert!(matches!(
            ActorSystem::new(config),
            Err(Error::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn test_spawn_path_and_lookup() {
        let system = inline_system();
        let actor = system.spawn(Props::from_prototype(Echo).with_name("echo")).unwrap();

        assert_eq!(actor.path(), "actor://test/echo");
        assert_eq!(system.lookup("actor://test/echo"), Some(actor.clone()));
        assert_eq!(system.actor_count(), 1);
        assert_eq!(system.dispatcher_of(&actor).as_deref(), Some("inline"));
    }

    #[tokio::test]
    async fn test_spawn_generates_name() {
        let system = inline_system();
        let a = system.spawn(Props::from_prototype(Echo)).unwrap();
        let b = system.spawn(Props::from_prototype(Echo)).unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with("actor://test/"));
    }

    #[tokio::test]
    async fn test_spawn_duplicate_name() {
        let system = inline_system();
        system.spawn(Props::from_prototype(Echo).with_name("dup")).unwrap();

        let result = system.spawn(Props::from_prototype(Echo).with_name("dup"));
        assert!(matches!(result, Err(Error::DuplicateName { .. })));
        assert_eq!(system.actor_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_spawn_builds_no_instance() {
        let system = inline_system();
        let created = Arc::new(AtomicU64::new(0));
        let props = {
            let created = created.clone();
            Props::new(move || {
                created.fetch_add(1, Ordering::SeqCst);
                Echo
            })
            .with_name("once")
        };

        system.spawn(props.clone()).unwrap();
        assert!(matches!(
            system.spawn(props),
            Err(Error::DuplicateName { .. })
        ));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_reports_factory_panic() {
        let system = inline_system();
        let result = system.spawn(
            Props::new(|| -> Echo { panic!("no instance") }).with_name("broken"),
        );

        match result {
            Err(Error::HandlerFailure { path, reason }) => {
                assert_eq!(path, "actor://test/broken");
                assert!(reason.contains("no instance"), "reason: {}", reason);
            }
            other => panic!("expected handler failure, got {:?}", other),
        }
        assert_eq!(system.actor_count(), 0);
        assert_eq!(system.live_count(), 0);
    }

    #[tokio::test]
    async fn test_system_tell_records_sender() {
        let system = inline_system();
        let target = system.spawn(Props::from_prototype(Echo)).unwrap();
        let sender = system.spawn(Props::from_prototype(Echo)).unwrap();

        system.tell(&target, "a", Some(&sender)).unwrap();
        system.tell(&target, "b", None).unwrap();

        let first = target.mailbox().try_take();
        let second = target.mailbox().try_take();
        match (first, second) {
            (Some(Delivery::User(a)), Some(Delivery::User(b))) => {
                assert_eq!(a.sender(), Some(&sender));
                assert!(b.sender().is_none());
            }
            other => panic!("unexpected deliveries: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_frees_path_immediately() {
        let system = inline_system();
        let first = system.spawn(Props::from_prototype(Echo).with_name("again")).unwrap();

        system.stop(&first).unwrap();
        assert!(system.lookup(first.path()).is_none());

        let second = system.spawn(Props::from_prototype(Echo).with_name("again")).unwrap();
        assert_eq!(first, second);

        // The stale ref no longer owns the path
        assert!(matches!(system.stop(&first), Err(Error::ActorStopped { .. })));

        system.run_until_idle().await;
        assert!(first.is_stopped());
        assert!(!second.is_stopped());
        assert!(system.lookup(second.path()).is_some());
    }

    #[tokio::test]
    async fn test_run_until_idle_counts_deliveries() {
        let system = inline_system();
        let actor = system.spawn(Props::from_prototype(Echo)).unwrap();

        actor.tell("a").unwrap();
        actor.tell("b").unwrap();
        assert_eq!(system.run_until_idle().await, 2);
        assert_eq!(system.run_until_idle().await, 0);
        assert_eq!(actor.stats().processed_count, 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let system = inline_system();
        let a = system.spawn(Props::from_prototype(Echo)).unwrap();
        let b = system.spawn(Props::from_prototype(Echo)).unwrap();

        system.shutdown().await;

        assert!(a.is_stopped());
        assert!(b.is_stopped());
        assert_eq!(system.actor_count(), 0);
        assert_eq!(system.live_count(), 0);
    }
}
