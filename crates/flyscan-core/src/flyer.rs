//! StandardFlyer - Trigger lifecycle state machine
//!
//! Wraps a trigger strategy ([`FlyerController`]) and enforces the order of
//! lifecycle calls. The strategy decides WHAT gets written; the flyer decides
//! WHEN a call is allowed and tracks where the hardware is.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ prepare ┌──────────┐ kickoff ┌───────┐ complete ┌──────────┐
//! │ Idle │────────▶│ Prepared │────────▶│ Armed │─────────▶│ Complete │
//! └──────┘         └──────────┘         └───────┘          └──────────┘
//!                        ▲                  │                    │
//!                        │ prepare          │ stop / failure     │ prepare
//!                   ┌─────────┐◀────────────┘                    │
//!                   │ Stopped │◀─────── stop (any state) ─────────┘
//!                   └─────────┘
//! ```
//!
//! - `prepare` is accepted from every state except `Armed`
//! - Any failed call leaves the flyer `Stopped`; prepare again to continue
//! - `stop` is accepted from every state and aborts a pending `complete`
//!
//! # Usage
//!
//! ```rust,ignore
//! let flyer = StandardFlyer::new("seq1", StaticSeqTableTriggerLogic::new(block));
//!
//! flyer.prepare(&seq_table_info).await?;
//! flyer.kickoff().await?;
//!
//! // Run detectors/motors here, then wait for the hardware to finish
//! flyer.complete().await?;
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::marker::PhantomData;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::capabilities::FlyerController;
use crate::error::{FlyscanError, FlyscanResult};

/// Lifecycle state of a trigger controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerState {
    /// Created, nothing written yet
    Idle,
    /// Configuration written, block disabled
    Prepared,
    /// Block enabled and reporting active
    Armed,
    /// Hardware sequence finished on its own
    Complete,
    /// Disarmed by `stop()` or after a failure
    Stopped,
}

impl std::fmt::Display for TriggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerState::Idle => write!(f, "idle"),
            TriggerState::Prepared => write!(f, "prepared"),
            TriggerState::Armed => write!(f, "armed"),
            TriggerState::Complete => write!(f, "complete"),
            TriggerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Trigger controller enforcing the lifecycle around strategy `L`.
///
/// All methods take `&self`, so a flyer can be shared (e.g. in an `Arc`)
/// between the task awaiting `complete()` and the one issuing `stop()`.
pub struct StandardFlyer<C, L> {
    name: String,
    logic: L,
    state: Mutex<TriggerState>,
    /// Bumped by every `stop()`; wakes a pending `complete()`.
    stop_signal: watch::Sender<u64>,
    _config: PhantomData<fn(&C)>,
}

impl<C, L> std::fmt::Debug for StandardFlyer<C, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardFlyer")
            .field("name", &self.name)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl<C, L> StandardFlyer<C, L>
where
    C: Send + Sync,
    L: FlyerController<C>,
{
    /// Wrap `logic` under `name` (used in logs and errors).
    pub fn new(name: impl Into<String>, logic: L) -> Self {
        let (stop_signal, _) = watch::channel(0);
        Self {
            name: name.into(),
            logic,
            state: Mutex::new(TriggerState::Idle),
            stop_signal,
            _config: PhantomData,
        }
    }

    /// Name of this flyer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TriggerState {
        *self.state.lock()
    }

    /// The wrapped strategy.
    pub fn logic(&self) -> &L {
        &self.logic
    }

    /// Write `config` to the disabled block.
    pub async fn prepare(&self, config: &C) -> FlyscanResult<()> {
        self.require("prepare", |s| s != TriggerState::Armed)?;
        info!(flyer = %self.name, "prepare");
        let result = self.logic.prepare(config).await;
        self.finish("prepare", result, TriggerState::Prepared)
    }

    /// Enable the block and wait until it reports active.
    pub async fn kickoff(&self) -> FlyscanResult<()> {
        self.require("kickoff", |s| s == TriggerState::Prepared)?;
        info!(flyer = %self.name, "kickoff");
        let result = self.logic.kickoff().await;
        self.finish("kickoff", result, TriggerState::Armed)
    }

    /// Wait for the hardware sequence to end.
    ///
    /// Returns `Cancelled` if `stop()` is called while waiting.
    pub async fn complete(&self) -> FlyscanResult<()> {
        // Subscribe before the state check so a racing stop() is not missed.
        let mut stopped = self.stop_signal.subscribe();
        self.require("complete", |s| s == TriggerState::Armed)?;
        info!(flyer = %self.name, "waiting for completion");

        let result = tokio::select! {
            result = self.logic.complete() => result,
            _ = stopped.changed() => Err(FlyscanError::Cancelled {
                operation: format!("{}.complete", self.name),
            }),
        };

        match result {
            Ok(()) => {
                let mut state = self.state.lock();
                // A stop() that landed after the hardware finished wins.
                if *state == TriggerState::Armed {
                    *state = TriggerState::Complete;
                }
                info!(flyer = %self.name, state = %*state, "complete");
                Ok(())
            }
            Err(err) => {
                warn!(flyer = %self.name, error = %err, "complete failed");
                *self.state.lock() = TriggerState::Stopped;
                Err(err)
            }
        }
    }

    /// Disable the block and wait until it reports inactive.
    ///
    /// Allowed from every state and safe to repeat.
    pub async fn stop(&self) -> FlyscanResult<()> {
        info!(flyer = %self.name, from = %self.state(), "stop");
        self.stop_signal.send_modify(|generation| *generation += 1);
        let result = self.logic.stop().await;
        *self.state.lock() = TriggerState::Stopped;
        if let Err(err) = &result {
            warn!(flyer = %self.name, error = %err, "stop failed");
        }
        result
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: impl Fn(TriggerState) -> bool,
    ) -> FlyscanResult<()> {
        let from = self.state();
        if allowed(from) {
            Ok(())
        } else {
            warn!(flyer = %self.name, %from, operation, "rejected lifecycle call");
            Err(FlyscanError::InvalidTransition { from, operation })
        }
    }

    fn finish(
        &self,
        operation: &'static str,
        result: FlyscanResult<()>,
        next: TriggerState,
    ) -> FlyscanResult<()> {
        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                *state = next;
                Ok(())
            }
            Err(err) => {
                warn!(flyer = %self.name, operation, error = %err, "lifecycle call failed");
                *state = TriggerState::Stopped;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<C, L> FlyerController<C> for StandardFlyer<C, L>
where
    C: Send + Sync,
    L: FlyerController<C>,
{
    async fn prepare(&self, value: &C) -> FlyscanResult<()> {
        StandardFlyer::prepare(self, value).await
    }

    async fn kickoff(&self) -> FlyscanResult<()> {
        StandardFlyer::kickoff(self).await
    }

    async fn complete(&self) -> FlyscanResult<()> {
        StandardFlyer::complete(self).await
    }

    async fn stop(&self) -> FlyscanResult<()> {
        StandardFlyer::stop(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Settable;
    use crate::parameter::Parameter;
    use crate::wait::wait_for_value;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Minimal strategy over two soft parameters.
    struct Toggle {
        enable: Parameter<bool>,
        active: Parameter<bool>,
        fail_kickoff: AtomicBool,
        stops: AtomicU32,
    }

    impl Toggle {
        fn new() -> Self {
            Self {
                enable: Parameter::soft("blk.enable", false),
                active: Parameter::soft("blk.active", false),
                fail_kickoff: AtomicBool::new(false),
                stops: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl FlyerController<u32> for Toggle {
        async fn prepare(&self, _value: &u32) -> FlyscanResult<()> {
            self.enable.set(false).await
        }

        async fn kickoff(&self) -> FlyscanResult<()> {
            if self.fail_kickoff.load(Ordering::SeqCst) {
                return Err(FlyscanError::Backend("refused".into()));
            }
            self.enable.set(true).await?;
            self.active.set(true).await
        }

        async fn complete(&self) -> FlyscanResult<()> {
            wait_for_value(&self.active, false, None).await
        }

        async fn stop(&self) -> FlyscanResult<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.enable.set(false).await
        }
    }

    #[tokio::test]
    async fn test_happy_path() {
        let flyer = StandardFlyer::new("blk", Toggle::new());
        assert_eq!(flyer.state(), TriggerState::Idle);

        flyer.prepare(&1).await.unwrap();
        assert_eq!(flyer.state(), TriggerState::Prepared);
        flyer.kickoff().await.unwrap();
        assert_eq!(flyer.state(), TriggerState::Armed);

        flyer.logic().active.set(false).await.unwrap();
        flyer.complete().await.unwrap();
        assert_eq!(flyer.state(), TriggerState::Complete);

        // Re-prepare from Complete is allowed.
        flyer.prepare(&2).await.unwrap();
        assert_eq!(flyer.state(), TriggerState::Prepared);
    }

    #[tokio::test]
    async fn test_kickoff_requires_prepare() {
        let flyer = StandardFlyer::new("blk", Toggle::new());
        let err = flyer.kickoff().await.unwrap_err();
        assert!(matches!(
            err,
            FlyscanError::InvalidTransition {
                from: TriggerState::Idle,
                operation: "kickoff"
            }
        ));
    }

    #[tokio::test]
    async fn test_prepare_rejected_while_armed() {
        let flyer = StandardFlyer::new("blk", Toggle::new());
        flyer.prepare(&1).await.unwrap();
        flyer.kickoff().await.unwrap();
        let err = flyer.prepare(&1).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot prepare while armed");
        assert_eq!(flyer.state(), TriggerState::Armed);
    }

    #[tokio::test]
    async fn test_failure_leaves_stopped() {
        let flyer = StandardFlyer::new("blk", Toggle::new());
        flyer.prepare(&1).await.unwrap();
        flyer.logic().fail_kickoff.store(true, Ordering::SeqCst);
        assert!(flyer.kickoff().await.is_err());
        assert_eq!(flyer.state(), TriggerState::Stopped);

        // Must prepare again before arming.
        flyer.logic().fail_kickoff.store(false, Ordering::SeqCst);
        assert!(flyer.kickoff().await.is_err());
        flyer.prepare(&1).await.unwrap();
        flyer.kickoff().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let flyer = StandardFlyer::new("blk", Toggle::new());
        flyer.stop().await.unwrap();
        flyer.stop().await.unwrap();
        assert_eq!(flyer.state(), TriggerState::Stopped);
        assert_eq!(flyer.logic().stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_complete() {
        let flyer = Arc::new(StandardFlyer::new("blk", Toggle::new()));
        flyer.prepare(&1).await.unwrap();
        flyer.kickoff().await.unwrap();

        let waiter = {
            let flyer = flyer.clone();
            tokio::spawn(async move { flyer.complete().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        flyer.stop().await.unwrap();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, FlyscanError::Cancelled { ref operation } if operation == "blk.complete"));
        assert_eq!(flyer.state(), TriggerState::Stopped);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TriggerState::Prepared.to_string(), "prepared");
        assert_eq!(TriggerState::Stopped.to_string(), "stopped");
    }
}
