//! Shared test actors

#![allow(dead_code)]

use anemone_runtime::{async_trait, Actor, ActorSystem, Context, InlineDispatcher, Message, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Counts "inc" messages; fails on "boom", panics on "panic"
#[derive(Clone, Default)]
pub struct Counter {
    count: u64,
}

#[async_trait]
impl Actor for Counter {
    async fn receive(&mut self, _ctx: &Context, message: Message) -> Result<Message> {
        match message.as_str() {
            Some("inc") => self.count += 1,
            Some("boom") => return Err(anyhow::anyhow!("boom").into()),
            Some("panic") => panic!("kaboom"),
            _ => {}
        }
        Ok(Message::text(self.count.to_string()))
    }
}

/// Appends every text message to a shared log; "count" reports the log size
#[derive(Clone, Default)]
pub struct Recorder {
    pub log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl Actor for Recorder {
    async fn receive(&mut self, _ctx: &Context, message: Message) -> Result<Message> {
        let text = message.as_str().unwrap_or_default().to_string();
        if text == "count" {
            return Ok(Message::text(self.log.lock().len().to_string()));
        }
        self.log.lock().push(text);
        Ok(Message::empty())
    }
}

pub fn inline_system() -> ActorSystem {
    ActorSystem::builder()
        .with_name("test")
        .with_default_dispatcher(Arc::new(InlineDispatcher::new()))
        .build()
        .unwrap()
}

pub fn dedicated_system() -> ActorSystem {
    ActorSystem::builder().with_name("test").build().unwrap()
}

pub fn text(message: &Message) -> String {
    message.as_str().unwrap_or_default().to_string()
}
