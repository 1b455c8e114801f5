//! Anemone Core
//!
//! Core types, errors, limits and configuration for the Anemone actor
//! runtime.
//!
//! # Overview
//!
//! Anemone is a single-process actor runtime: actors own private state,
//! exchange immutable messages through bounded mailboxes, and are supervised
//! in a parent/child tree. This crate holds the pieces that do not depend on
//! the execution machinery:
//!
//! - [`Message`]: the immutable payload type
//! - [`Error`]: every failure the runtime reports
//! - [`SystemConfig`]: defaults for mailboxes, dispatchers and supervision
//! - [`IoContext`]: clock and RNG providers
//! - limits and defaults in [`constants`]

pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod message;
pub mod telemetry;

pub use config::{
    DispatcherConfig, DispatcherKind, MailboxConfig, MailboxDiscipline, SupervisionConfig,
    SupervisionKind, SystemConfig,
};
pub use constants::*;
pub use error::{Error, Result};
pub use io::{IoContext, ManualClock, RngProvider, StdRngProvider, TimeProvider, WallClockTime};
pub use message::Message;
pub use telemetry::{init_telemetry, TelemetryConfig};
