//! Limits and defaults for Anemone
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Actor Limits
// =============================================================================

/// Maximum length of a user-supplied actor name in bytes
pub const ACTOR_NAME_LENGTH_BYTES_MAX: usize = 128;

/// Maximum length of a full actor path in bytes
pub const ACTOR_PATH_LENGTH_BYTES_MAX: usize = 1024;

/// URI scheme prefix for actor paths
pub const ACTOR_PATH_SCHEME: &str = "actor://";

/// Default actor system name (appears in every path)
pub const SYSTEM_NAME_DEFAULT: &str = "local";

// =============================================================================
// Mailbox Limits
// =============================================================================

/// Default mailbox capacity (user envelopes)
pub const MAILBOX_CAPACITY_DEFAULT: usize = 1024;

/// Maximum mailbox capacity
pub const MAILBOX_CAPACITY_MAX: usize = 1_000_000;

/// Default priority for envelopes sent without one
pub const ENVELOPE_PRIORITY_DEFAULT: i32 = 0;

// =============================================================================
// Ask Limits
// =============================================================================

/// Default ask timeout in milliseconds (5 sec)
pub const ASK_TIMEOUT_MS_DEFAULT: u64 = 5 * 1000;

/// Maximum ask timeout in milliseconds (10 min)
pub const ASK_TIMEOUT_MS_MAX: u64 = 10 * 60 * 1000;

// =============================================================================
// Supervision Limits
// =============================================================================

/// Default number of restarts allowed inside one window
pub const RESTART_COUNT_MAX_DEFAULT: u32 = 10;

/// Default restart window in milliseconds (1 min)
pub const RESTART_WINDOW_MS_DEFAULT: u64 = 60 * 1000;

/// Upper bound for any restart backoff delay in milliseconds (1 min)
pub const RESTART_BACKOFF_MS_MAX: u64 = 60 * 1000;

// =============================================================================
// Dispatcher Limits
// =============================================================================

/// Default number of shared pool workers
pub const POOL_WORKERS_COUNT_DEFAULT: usize = 4;

/// Maximum number of shared pool workers
pub const POOL_WORKERS_COUNT_MAX: usize = 1024;

/// Default number of envelopes a pool worker drains per claim
pub const POOL_BATCH_SIZE_DEFAULT: usize = 1;

/// Maximum number of envelopes a pool worker drains per claim
pub const POOL_BATCH_SIZE_MAX: usize = 1024;

// =============================================================================
// Scheduler Limits
// =============================================================================

/// Maximum delay for a scheduled message in milliseconds (1 hour)
pub const SCHEDULE_DELAY_MS_MAX: u64 = 60 * 60 * 1000;

// Compile-time assertions for constant validity
const _: () = {
    assert!(MAILBOX_CAPACITY_DEFAULT > 0);
    assert!(MAILBOX_CAPACITY_DEFAULT <= MAILBOX_CAPACITY_MAX);
    assert!(ASK_TIMEOUT_MS_DEFAULT <= ASK_TIMEOUT_MS_MAX);
    assert!(POOL_WORKERS_COUNT_DEFAULT <= POOL_WORKERS_COUNT_MAX);
    assert!(POOL_BATCH_SIZE_DEFAULT >= 1);
    assert!(POOL_BATCH_SIZE_DEFAULT <= POOL_BATCH_SIZE_MAX);
    assert!(ACTOR_NAME_LENGTH_BYTES_MAX < ACTOR_PATH_LENGTH_BYTES_MAX);
};
