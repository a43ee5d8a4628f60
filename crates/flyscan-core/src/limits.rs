//! Shared timing limits for parameter I/O and trigger lifecycles.
//!
//! This module centralizes the default deadlines so that strategies, derived
//! parameters and the settings layer agree on them. Override them per
//! deployment through [`crate::config::TimeoutSettings`].

use std::time::Duration;

// =============================================================================
// Timeout Constants
// =============================================================================

/// Default deadline for a single `set()` (10 seconds).
///
/// Applies to primitive and derived parameter writes when the caller does
/// not supply an explicit timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a trigger block to report `active` after being enabled (1 second).
pub const ARM_TIMEOUT: Duration = Duration::from_secs(1);

/// Deadline for a trigger block to report inactive after being disabled (1 second).
pub const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Sampling period used by `wait_for_value` when the backend cannot push updates.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// Size Limits
// =============================================================================

/// Maximum number of rows a sequencer block can hold.
pub const MAX_SEQ_TABLE_ROWS: usize = 4096;
