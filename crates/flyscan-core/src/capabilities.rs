//! Capability traits
//!
//! Instead of one monolithic device trait, values and controllers implement
//! the small capabilities they actually support:
//!
//! - A primitive [`Parameter`](crate::parameter::Parameter) is `Readable + Settable`
//! - A [`DerivedParameter`](crate::derived::DerivedParameter) is `Readable + Settable`
//! - A trigger strategy is a `FlyerController<Config>`
//!
//! Generic code (`wait_for_value`, the fan-out helpers, scan orchestration)
//! is written against these bounds, so a derived value can stand in anywhere
//! a primitive one is expected.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Returns [`FlyscanResult`]
//! - Focuses on ONE thing

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

use crate::backend::ParamValue;
use crate::error::FlyscanResult;
use crate::limits::DEFAULT_TIMEOUT;

// =============================================================================
// Value Capabilities
// =============================================================================

/// Capability: Readable value
///
/// # Contract
/// - `get_value` fetches a fresh value from the backend(s), not a cache
/// - `subscribe` returns a change stream when updates can be pushed
#[async_trait]
pub trait Readable<T: ParamValue>: Send + Sync {
    /// Name used in logs and error reports.
    fn name(&self) -> String;

    /// Fetch the current value.
    async fn get_value(&self) -> FlyscanResult<T>;

    /// Subscribe to pushed changes.
    ///
    /// # Default Implementation
    /// Returns `None`; consumers then sample `get_value` periodically.
    fn subscribe(&self) -> Option<watch::Receiver<T>> {
        None
    }

    /// Record a value delivered through `subscribe` rather than `get_value`.
    ///
    /// # Default Implementation
    /// Does nothing. Implementors that cache the last value refresh it here.
    fn observed(&self, _value: &T) {}
}

/// Capability: Settable value
///
/// # Contract
/// - Returns only once the hardware acknowledged the write (or it failed)
/// - With a timeout, a write that is not acknowledged in time is abandoned and
///   reported as `Timeout` naming what did not complete
/// - `None` waits indefinitely
#[async_trait]
pub trait Settable<T: ParamValue>: Readable<T> {
    /// Write `value`, giving up after `timeout`.
    async fn set_with_timeout(&self, value: T, timeout: Option<Duration>) -> FlyscanResult<()>;

    /// Write `value` with the default deadline of [`DEFAULT_TIMEOUT`].
    async fn set(&self, value: T) -> FlyscanResult<()> {
        self.set_with_timeout(value, Some(DEFAULT_TIMEOUT)).await
    }
}

// =============================================================================
// Trigger Capabilities
// =============================================================================

/// Capability: Hardware-triggered flyscan
///
/// A strategy that turns a validated configuration `C` into parameter writes
/// on one hardware trigger block.
///
/// # Contract
/// - `prepare` forces the block's enable input to disabled BEFORE writing the
///   configuration, so configuration cannot race an active trigger
/// - `kickoff` enables the block and waits (bounded) until it reports active
/// - `complete` waits until the block reports inactive on its own
/// - `stop` disables the block and waits (bounded) until it reports inactive;
///   calling it repeatedly is harmless
/// - Every call awaits all of its writes before returning, so sequential calls
///   have strict happens-before ordering
/// - Nothing is rolled back on failure; `stop` is the recovery path
#[async_trait]
pub trait FlyerController<C: Send + Sync>: Send + Sync {
    /// Write the configuration to the (disabled) block.
    async fn prepare(&self, value: &C) -> FlyscanResult<()>;

    /// Arm the block.
    async fn kickoff(&self) -> FlyscanResult<()>;

    /// Wait for the hardware-driven sequence to finish.
    async fn complete(&self) -> FlyscanResult<()>;

    /// Disarm the block.
    async fn stop(&self) -> FlyscanResult<()>;
}
