//! Dispatcher integration tests
//!
//! Ordering, exclusivity and determinism across the inline, dedicated and
//! shared pool dispatchers.

mod common;

use anemone_runtime::{
    async_trait, Actor, ActorRef, ActorSystem, Context, DispatcherConfig, DispatcherKind,
    Envelope, Error, InlineDispatcher, MailboxConfig, Message, PoolDispatcher, Props, Result,
    SystemConfig,
};
use common::{dedicated_system, inline_system, text, Counter, Recorder};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Mailbox Ordering
// =============================================================================

#[tokio::test]
async fn test_priority_mailbox_orders_delivery() {
    let system = inline_system();
    let recorder = Recorder::default();
    let actor = system
        .spawn(Props::from_prototype(recorder.clone()).with_mailbox(MailboxConfig::priority(16)))
        .unwrap();

    actor.send(Envelope::new("low").with_priority(1)).unwrap();
    actor.send(Envelope::new("high-1").with_priority(10)).unwrap();
    actor.send(Envelope::new("mid").with_priority(5)).unwrap();
    actor.send(Envelope::new("high-2").with_priority(10)).unwrap();

    system.run_until_idle().await;
    assert_eq!(recorder.entries(), vec!["high-1", "high-2", "mid", "low"]);
}

#[tokio::test]
async fn test_priority_mailbox_on_dedicated_task() {
    let system = dedicated_system();
    let recorder = Recorder::default();
    let actor = system
        .spawn(Props::from_prototype(recorder.clone()).with_mailbox(MailboxConfig::priority(16)))
        .unwrap();

    // Queued before the actor's task gets to run
    actor.send(Envelope::new("b").with_priority(1)).unwrap();
    actor.send(Envelope::new("a").with_priority(2)).unwrap();

    let count = actor
        .ask_envelope(Envelope::new("count").with_priority(0), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(count, "2");
    assert_eq!(recorder.entries(), vec!["a", "b"]);
}

// =============================================================================
// Inline
// =============================================================================

#[tokio::test]
async fn test_inline_runs_only_when_driven() {
    let system = inline_system();
    let recorder = Recorder::default();
    let actor = system.spawn(Props::from_prototype(recorder.clone())).unwrap();

    actor.tell("a").unwrap();
    actor.tell("b").unwrap();
    tokio::task::yield_now().await;
    assert!(recorder.entries().is_empty());
    assert_eq!(actor.mailbox_len(), 2);

    // Asking drives the actor on this task
    let count = actor.ask("count", TIMEOUT).await.unwrap();
    assert_eq!(count, "2");
    assert_eq!(recorder.entries(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_inline_is_deterministic() {
    async fn run_once() -> Vec<String> {
        let system = inline_system();
        let recorder = Recorder::default();
        let sink = system.spawn(Props::from_prototype(recorder.clone())).unwrap();
        let relays: Vec<ActorRef> = (0..3)
            .map(|_| system.spawn(Props::from_prototype(Relay)).unwrap())
            .collect();

        for (i, relay) in relays.iter().enumerate() {
            relay.tell_from(format!("m{}", i), &sink).unwrap();
            relay.tell_from(format!("n{}", i), &sink).unwrap();
        }
        system.run_until_idle().await;
        recorder.entries()
    }

    let first = run_once().await;
    assert_eq!(first.len(), 6);
    assert_eq!(first, run_once().await);
}

#[tokio::test]
async fn test_inline_ask_on_busy_actor_times_out() {
    #[derive(Clone)]
    struct SelfAsker;

    #[async_trait]
    impl Actor for SelfAsker {
        async fn receive(&mut self, ctx: &Context, message: Message) -> Result<Message> {
            if message == "outer" {
                // The cell is busy with this very delivery
                return ctx.self_ref().ask("inner", Duration::from_millis(50)).await;
            }
            Ok(message)
        }
    }

    let system = inline_system();
    let actor = system.spawn(Props::from_prototype(SelfAsker)).unwrap();

    match actor.ask("outer", TIMEOUT).await {
        Err(Error::HandlerFailure { reason, .. }) => {
            assert!(reason.contains("timed out"), "reason: {}", reason)
        }
        other => panic!("expected handler failure, got {:?}", other),
    }
}

/// Answers "ping" right away, queueing follow-up work behind the reply
#[derive(Clone, Default)]
struct Busy {
    slow_done: u64,
}

#[async_trait]
impl Actor for Busy {
    async fn receive(&mut self, ctx: &Context, message: Message) -> Result<Message> {
        match message.as_str() {
            Some("ping") => {
                for _ in 0..5 {
                    ctx.self_ref().tell("slow")?;
                }
                Ok(Message::text("pong"))
            }
            Some("slow") => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.slow_done += 1;
                Ok(Message::empty())
            }
            // Re-queues itself forever
            Some("spin") => {
                ctx.self_ref().tell("spin")?;
                Ok(Message::empty())
            }
            _ => Ok(Message::text(self.slow_done.to_string())),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_inline_ask_returns_before_later_work() {
    let system = inline_system();
    let actor = system.spawn(Props::from_prototype(Busy::default())).unwrap();

    let started = tokio::time::Instant::now();
    let reply = actor.ask("ping", Duration::from_millis(100)).await.unwrap();
    assert_eq!(reply, "pong");
    assert!(started.elapsed() < Duration::from_millis(50));
    assert_eq!(actor.mailbox_len(), 5);

    // The queued work still runs when driven
    assert_eq!(system.run_until_idle().await, 5);
    assert_eq!(text(&actor.ask("get", TIMEOUT).await.unwrap()), "5");
}

#[tokio::test]
async fn test_inline_ask_returns_while_actor_feeds_itself() {
    let system = inline_system();
    let actor = system.spawn(Props::from_prototype(Busy::default())).unwrap();

    actor.tell("spin").unwrap();
    assert_eq!(text(&actor.ask("get", TIMEOUT).await.unwrap()), "0");
    assert_eq!(actor.mailbox_len(), 1);
}

/// Passes every message on to its sender
#[derive(Clone)]
struct Relay;

#[async_trait]
impl Actor for Relay {
    async fn receive(&mut self, ctx: &Context, message: Message) -> Result<Message> {
        if let Some(sender) = ctx.sender() {
            sender.tell(message)?;
        }
        Ok(Message::empty())
    }
}

// =============================================================================
// Shared Pool
// =============================================================================

/// Detects concurrent `receive` calls and per-producer reordering
#[derive(Clone)]
struct Exclusive {
    in_flight: Arc<AtomicUsize>,
    violations: Arc<AtomicUsize>,
    last_seen: HashMap<String, u64>,
    processed: u64,
}

impl Exclusive {
    fn new(violations: Arc<AtomicUsize>) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            violations,
            last_seen: HashMap::new(),
            processed: 0,
        }
    }
}

#[async_trait]
impl Actor for Exclusive {
    async fn receive(&mut self, _ctx: &Context, message: Message) -> Result<Message> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        tokio::task::yield_now().await;

        let body = text(&message);
        if body != "count" {
            // "<producer>:<seq>"
            if let Some((producer, seq)) = body.split_once(':') {
                let seq: u64 = seq.parse().unwrap_or_default();
                if let Some(previous) = self.last_seen.insert(producer.to_string(), seq) {
                    if previous >= seq {
                        self.violations.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
            self.processed += 1;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Message::text(self.processed.to_string()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_exclusivity_under_load() {
    const ACTORS: usize = 8;
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: u64 = 100;

    let system = dedicated_system();
    let pool = Arc::new(PoolDispatcher::new(3, 4).unwrap());
    let violations = Arc::new(AtomicUsize::new(0));

    let actors: Vec<ActorRef> = (0..ACTORS)
        .map(|_| {
            system
                .spawn(
                    Props::from_prototype(Exclusive::new(violations.clone()))
                        .with_dispatcher(pool.clone()),
                )
                .unwrap()
        })
        .collect();
    assert_eq!(pool.attached_count(), ACTORS);

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let actors = actors.clone();
            tokio::spawn(async move {
                for seq in 0..PER_PRODUCER {
                    for actor in &actors {
                        actor.tell(format!("p{}:{}", producer, seq)).unwrap();
                    }
                    if seq % 10 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    let expected = (PRODUCERS as u64 * PER_PRODUCER).to_string();
    for actor in &actors {
        let processed = actor.ask("count", TIMEOUT).await.unwrap();
        assert_eq!(text(&processed), expected);
    }
    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_pool_actor_restarts_after_failure() {
    let system = dedicated_system();
    let pool = Arc::new(PoolDispatcher::new(2, 1).unwrap());
    let counter = system
        .spawn(Props::from_prototype(Counter::default()).with_dispatcher(pool.clone()))
        .unwrap();

    counter.tell("inc").unwrap();
    assert!(counter.ask("boom", TIMEOUT).await.is_err());
    assert_eq!(text(&counter.ask("inc", TIMEOUT).await.unwrap()), "1");
    assert_eq!(system.dispatcher_of(&counter).as_deref(), Some("pool"));

    system.stop(&counter).unwrap();
    tokio::time::timeout(TIMEOUT, counter.stopped()).await.unwrap();
}

#[tokio::test]
async fn test_pool_from_system_config() {
    let config = SystemConfig {
        name: "pooled".to_string(),
        dispatcher: DispatcherConfig {
            kind: DispatcherKind::Pool,
            pool_workers_count: 2,
            pool_batch_size: 8,
        },
        ..Default::default()
    };
    let system = ActorSystem::new(config).unwrap();
    let counter = system.spawn(Props::from_prototype(Counter::default())).unwrap();

    for _ in 0..20 {
        counter.tell("inc").unwrap();
    }
    assert_eq!(text(&counter.ask("get", TIMEOUT).await.unwrap()), "20");

    tokio::time::timeout(TIMEOUT, system.shutdown()).await.unwrap();
    assert!(counter.is_stopped());
}

#[tokio::test]
async fn test_mixed_dispatchers_in_one_system() {
    let system = dedicated_system();
    let inline = system
        .spawn(
            Props::from_prototype(Counter::default())
                .with_dispatcher(Arc::new(InlineDispatcher::new())),
        )
        .unwrap();
    let pooled = system
        .spawn(
            Props::from_prototype(Counter::default())
                .with_dispatcher(Arc::new(PoolDispatcher::new(1, 1).unwrap())),
        )
        .unwrap();
    let dedicated = system.spawn(Props::from_prototype(Counter::default())).unwrap();

    for actor in [&inline, &pooled, &dedicated] {
        actor.tell("inc").unwrap();
        assert_eq!(text(&actor.ask("inc", TIMEOUT).await.unwrap()), "2");
    }

    tokio::time::timeout(TIMEOUT, system.shutdown()).await.unwrap();
    assert!(inline.is_stopped() && pooled.is_stopped() && dedicated.is_stopped());
}
