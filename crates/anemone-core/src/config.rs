//! Configuration for Anemone
//!
//! Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Main configuration for an actor system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// System name (appears in every actor path)
    #[serde(default = "default_system_name")]
    pub name: String,

    /// Default ask timeout used by `ActorRef::ask_default` (milliseconds)
    #[serde(default = "default_ask_timeout_ms")]
    pub ask_timeout_ms: u64,

    /// Default mailbox settings for spawned actors
    #[serde(default)]
    pub mailbox: MailboxConfig,

    /// Default dispatcher settings
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Default supervision settings
    #[serde(default)]
    pub supervision: SupervisionConfig,
}

fn default_system_name() -> String {
    SYSTEM_NAME_DEFAULT.to_string()
}

fn default_ask_timeout_ms() -> u64 {
    ASK_TIMEOUT_MS_DEFAULT
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: default_system_name(),
            ask_timeout_ms: default_ask_timeout_ms(),
            mailbox: MailboxConfig::default(),
            dispatcher: DispatcherConfig::default(),
            supervision: SupervisionConfig::default(),
        }
    }
}

impl SystemConfig {
    /// Parse a configuration from JSON, filling omitted fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::InvalidConfiguration {
            field: "<root>".into(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(Error::invalid_configuration(
                "name",
                "must be non-empty and must not contain '/'",
            ));
        }

        if self.ask_timeout_ms == 0 || self.ask_timeout_ms > ASK_TIMEOUT_MS_MAX {
            return Err(Error::invalid_configuration(
                "ask_timeout_ms",
                format!("must be in 1..={}", ASK_TIMEOUT_MS_MAX),
            ));
        }

        self.mailbox.validate()?;
        self.dispatcher.validate()?;
        self.supervision.validate()?;
        Ok(())
    }
}

/// Ordering discipline of a mailbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxDiscipline {
    /// Strict arrival order
    #[default]
    Fifo,
    /// Descending priority, arrival order among equal priorities
    Priority,
}

/// Mailbox configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Ordering discipline
    #[serde(default)]
    pub discipline: MailboxDiscipline,

    /// Maximum number of queued user envelopes
    #[serde(default = "default_mailbox_capacity")]
    pub capacity: usize,
}

fn default_mailbox_capacity() -> usize {
    MAILBOX_CAPACITY_DEFAULT
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            discipline: MailboxDiscipline::Fifo,
            capacity: default_mailbox_capacity(),
        }
    }
}

impl MailboxConfig {
    /// FIFO mailbox with the given capacity
    pub fn fifo(capacity: usize) -> Self {
        Self {
            discipline: MailboxDiscipline::Fifo,
            capacity,
        }
    }

    /// Priority mailbox with the given capacity
    pub fn priority(capacity: usize) -> Self {
        Self {
            discipline: MailboxDiscipline::Priority,
            capacity,
        }
    }

    /// Validate the mailbox settings
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.capacity > MAILBOX_CAPACITY_MAX {
            return Err(Error::invalid_configuration(
                "mailbox.capacity",
                format!("{} not in 1..={}", self.capacity, MAILBOX_CAPACITY_MAX),
            ));
        }
        Ok(())
    }
}

/// Which execution resource drains mailboxes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherKind {
    /// Processed on the calling task
    Inline,
    /// One task per actor
    #[default]
    Dedicated,
    /// Fixed worker pool shared by many actors
    Pool,
}

/// Default dispatcher configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Dispatcher used when a spawn does not choose one
    #[serde(default)]
    pub kind: DispatcherKind,

    /// Worker count for the shared pool
    #[serde(default = "default_pool_workers")]
    pub pool_workers_count: usize,

    /// Envelopes drained per claim by a pool worker
    #[serde(default = "default_pool_batch_size")]
    pub pool_batch_size: usize,
}

fn default_pool_workers() -> usize {
    POOL_WORKERS_COUNT_DEFAULT
}

fn default_pool_batch_size() -> usize {
    POOL_BATCH_SIZE_DEFAULT
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            kind: DispatcherKind::Dedicated,
            pool_workers_count: default_pool_workers(),
            pool_batch_size: default_pool_batch_size(),
        }
    }
}

impl DispatcherConfig {
    fn validate(&self) -> Result<()> {
        if self.pool_workers_count == 0 || self.pool_workers_count > POOL_WORKERS_COUNT_MAX {
            return Err(Error::invalid_configuration(
                "dispatcher.pool_workers_count",
                format!(
                    "{} not in 1..={}",
                    self.pool_workers_count, POOL_WORKERS_COUNT_MAX
                ),
            ));
        }

        if self.pool_batch_size == 0 || self.pool_batch_size > POOL_BATCH_SIZE_MAX {
            return Err(Error::invalid_configuration(
                "dispatcher.pool_batch_size",
                format!("{} not in 1..={}", self.pool_batch_size, POOL_BATCH_SIZE_MAX),
            ));
        }

        Ok(())
    }
}

/// Default supervision directive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisionKind {
    /// Recreate the actor from its factory
    #[default]
    Restart,
    /// Stop the actor
    Stop,
    /// Hand the failure to the parent
    Escalate,
}

/// Default supervision configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisionConfig {
    /// Strategy applied when a spawn does not choose one
    #[serde(default)]
    pub kind: SupervisionKind,

    /// Restarts allowed inside `restart_window_ms`
    #[serde(default = "default_max_restarts")]
    pub max_restarts_count: u32,

    /// Sliding window for the restart budget (milliseconds)
    #[serde(default = "default_restart_window_ms")]
    pub restart_window_ms: u64,
}

fn default_max_restarts() -> u32 {
    RESTART_COUNT_MAX_DEFAULT
}

fn default_restart_window_ms() -> u64 {
    RESTART_WINDOW_MS_DEFAULT
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            kind: SupervisionKind::Restart,
            max_restarts_count: default_max_restarts(),
            restart_window_ms: default_restart_window_ms(),
        }
    }
}

impl SupervisionConfig {
    fn validate(&self) -> Result<()> {
        if self.restart_window_ms == 0 {
            return Err(Error::invalid_configuration(
                "supervision.restart_window_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
