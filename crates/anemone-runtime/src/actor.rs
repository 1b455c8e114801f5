//! Actor trait, factories and spawn properties

use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::supervision::SupervisorStrategy;
use anemone_core::config::MailboxConfig;
use anemone_core::error::Result;
use anemone_core::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// An isolated unit of state driven by messages
///
/// `receive` is never called concurrently for one actor. Returning an error
/// (or panicking) hands the failure to the actor's supervisor.
#[async_trait]
pub trait Actor: Send + 'static {
    /// Called before the first message, and again after every restart
    async fn on_start(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    /// Handle one message; the returned value answers an `ask`
    async fn receive(&mut self, ctx: &Context, message: Message) -> Result<Message>;

    /// Called once when the actor stops
    async fn on_stop(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// Builds fresh actor instances, at spawn and on every restart
pub trait ActorFactory: Send + Sync + 'static {
    /// Create a new actor instance
    fn create(&self) -> Box<dyn Actor>;
}

impl<F, A> ActorFactory for F
where
    F: Fn() -> A + Send + Sync + 'static,
    A: Actor,
{
    fn create(&self) -> Box<dyn Actor> {
        Box::new(self())
    }
}

/// Factory that clones a prototype actor
pub struct CloneFactory<A> {
    prototype: A,
}

impl<A> CloneFactory<A>
where
    A: Actor + Clone + Sync,
{
    /// Create a new clone factory
    pub fn new(prototype: A) -> Self {
        Self { prototype }
    }
}

impl<A> ActorFactory for CloneFactory<A>
where
    A: Actor + Clone + Sync,
{
    fn create(&self) -> Box<dyn Actor> {
        Box::new(self.prototype.clone())
    }
}

/// Everything needed to spawn an actor
///
/// Unset options fall back to the system defaults.
#[derive(Clone)]
pub struct Props {
    pub(crate) factory: Arc<dyn ActorFactory>,
    pub(crate) name: Option<String>,
    pub(crate) mailbox: Option<MailboxConfig>,
    pub(crate) dispatcher: Option<Arc<dyn Dispatcher>>,
    pub(crate) supervisor: Option<SupervisorStrategy>,
}

impl Props {
    /// Props for the given factory
    pub fn new(factory: impl ActorFactory) -> Self {
        Self::from_factory(Arc::new(factory))
    }

    /// Props for a shared factory
    pub fn from_factory(factory: Arc<dyn ActorFactory>) -> Self {
        Self {
            factory,
            name: None,
            mailbox: None,
            dispatcher: None,
            supervisor: None,
        }
    }

    /// Props that clone a prototype for each instance
    pub fn from_prototype<A>(prototype: A) -> Self
    where
        A: Actor + Clone + Sync,
    {
        Self::new(CloneFactory::new(prototype))
    }

    /// Set the name (last path segment); a UUID token is used otherwise
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set mailbox discipline and capacity
    pub fn with_mailbox(mut self, mailbox: MailboxConfig) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    /// Set the dispatcher
    pub fn with_dispatcher<D: Dispatcher>(mut self, dispatcher: Arc<D>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Set the supervisor strategy
    pub fn with_supervisor(mut self, supervisor: SupervisorStrategy) -> Self {
        self.supervisor = Some(supervisor);
        self
    }
}

impl std::fmt::Debug for Props {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Props")
            .field("name", &self.name)
            .field("mailbox", &self.mailbox)
            .field("dispatcher", &self.dispatcher.as_ref().map(|d| d.name()))
            .field("supervisor", &self.supervisor)
            .finish()
    }
}
