//! Trigger strategies for flyscanning with a PandA.
//!
//! Two strategies implement [`FlyerController`]:
//!
//! - [`StaticSeqTableTriggerLogic`] plays a fixed pulse table on a SEQ block
//! - [`StaticPcompTriggerLogic`] fires pulses at encoder positions on a PCOMP block
//!
//! Both follow the same lifecycle against their block:
//!
//! ```text
//! prepare   enable := ZERO, then write configuration (concurrently)
//! kickoff   enable := ONE,  wait active == true  (arm timeout)
//! complete                  wait active == false (no timeout by default)
//! stop      enable := ZERO, wait active == false (stop timeout)
//! ```
//!
//! Configuration is passed as validated value objects ([`SeqTableInfo`],
//! [`PcompInfo`]); an invalid configuration is rejected when it is built,
//! before any parameter is written.

use async_trait::async_trait;
use flyscan_core::fanout::{gather, Operation};
use flyscan_core::limits::{ARM_TIMEOUT, DEFAULT_TIMEOUT, POLL_INTERVAL, STOP_TIMEOUT};
use flyscan_core::{
    wait_for_value_with, FlyerController, FlyscanError, FlyscanResult, ParamValue, Parameter,
    Settable, TimeoutSettings, WaitOptions,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::block::{BitMux, PcompBlock, PcompDirection, SeqBlock, TimeUnits};
use crate::table::SeqTable;

// =============================================================================
// Timing
// =============================================================================

/// Deadlines used by the trigger strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerTiming {
    /// Deadline for each configuration or enable write
    pub write_timeout: Duration,
    /// Deadline for `active` to rise after kickoff
    pub arm_timeout: Duration,
    /// Deadline for `active` to fall after stop
    pub stop_timeout: Duration,
    /// Sampling period for `active` when it cannot be monitored
    pub poll_interval: Duration,
}

impl Default for TriggerTiming {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_TIMEOUT,
            arm_timeout: ARM_TIMEOUT,
            stop_timeout: STOP_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl From<&TimeoutSettings> for TriggerTiming {
    fn from(settings: &TimeoutSettings) -> Self {
        Self {
            write_timeout: settings.default_timeout,
            arm_timeout: settings.arm_timeout,
            stop_timeout: settings.stop_timeout,
            poll_interval: settings.poll_interval,
        }
    }
}

impl TriggerTiming {
    fn set_op<T: ParamValue>(&self, param: &Parameter<T>, value: T) -> Operation<'static, ()> {
        let param = param.clone();
        let timeout = self.write_timeout;
        Operation::new(param.name(), async move {
            param.set_with_timeout(value, Some(timeout)).await
        })
    }

    async fn set<T: ParamValue>(&self, param: &Parameter<T>, value: T) -> FlyscanResult<()> {
        param.set_with_timeout(value, Some(self.write_timeout)).await
    }

    async fn wait_active(
        &self,
        active: &Parameter<bool>,
        expected: bool,
        timeout: Option<Duration>,
    ) -> FlyscanResult<()> {
        let options = WaitOptions::within(timeout).with_poll_interval(self.poll_interval);
        wait_for_value_with(active, move |v| *v == expected, options)
            .await
            .map(|_| ())
    }

    /// enable := ONE, then wait for the block to report active.
    async fn arm(&self, enable: &Parameter<BitMux>, active: &Parameter<bool>) -> FlyscanResult<()> {
        self.set(enable, BitMux::One).await?;
        match self.wait_active(active, true, Some(self.arm_timeout)).await {
            Err(FlyscanError::Timeout {
                operation,
                last_value,
                elapsed,
                ..
            }) => Err(FlyscanError::ArmTimeout {
                parameter: operation,
                last_value,
                elapsed,
            }),
            other => other,
        }
    }

    /// enable := ZERO, then wait for the block to report inactive.
    async fn disarm(
        &self,
        enable: &Parameter<BitMux>,
        active: &Parameter<bool>,
    ) -> FlyscanResult<()> {
        self.set(enable, BitMux::Zero).await?;
        self.wait_active(active, false, Some(self.stop_timeout)).await
    }
}

// =============================================================================
// Sequence table
// =============================================================================

fn default_prescale() -> f64 {
    1.0
}

#[derive(Deserialize)]
struct RawSeqTableInfo {
    sequence_table: SeqTable,
    repeats: i64,
    #[serde(default = "default_prescale")]
    prescale_as_us: f64,
}

/// Configuration for [`StaticSeqTableTriggerLogic`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeqTableInfo")]
pub struct SeqTableInfo {
    sequence_table: SeqTable,
    repeats: u32,
    prescale_as_us: f64,
}

impl SeqTableInfo {
    /// Validate and build.
    ///
    /// `repeats` must be `>= 0` (0 plays the table forever) and
    /// `prescale_as_us` must be finite and `>= 0`. Every violation is reported.
    pub fn new(sequence_table: SeqTable, repeats: i64, prescale_as_us: f64) -> FlyscanResult<Self> {
        let mut violations = Vec::new();
        let repeats = match u32::try_from(repeats) {
            Ok(r) => Some(r),
            Err(_) if repeats < 0 => {
                violations.push(format!("repeats must be >= 0 (got {repeats})"));
                None
            }
            Err(_) => {
                violations.push(format!("repeats must be <= {} (got {repeats})", u32::MAX));
                None
            }
        };
        if !(prescale_as_us.is_finite() && prescale_as_us >= 0.0) {
            violations.push(format!(
                "prescale_as_us must be a finite number >= 0 (got {prescale_as_us})"
            ));
        }

        match repeats {
            Some(repeats) if violations.is_empty() => Ok(Self {
                sequence_table,
                repeats,
                prescale_as_us,
            }),
            _ => Err(FlyscanError::validation("SeqTableInfo", violations)),
        }
    }

    /// Build with the default prescale of 1 µs.
    pub fn with_default_prescale(sequence_table: SeqTable, repeats: i64) -> FlyscanResult<Self> {
        Self::new(sequence_table, repeats, default_prescale())
    }

    /// Pulse table to play.
    pub fn sequence_table(&self) -> &SeqTable {
        &self.sequence_table
    }

    /// Number of times the table is played.
    pub fn repeats(&self) -> u32 {
        self.repeats
    }

    /// Tick length in microseconds.
    pub fn prescale_as_us(&self) -> f64 {
        self.prescale_as_us
    }
}

impl TryFrom<RawSeqTableInfo> for SeqTableInfo {
    type Error = FlyscanError;

    fn try_from(raw: RawSeqTableInfo) -> Result<Self, Self::Error> {
        Self::new(raw.sequence_table, raw.repeats, raw.prescale_as_us)
    }
}

/// Plays a fixed pulse table on a SEQ block.
#[derive(Debug, Clone)]
pub struct StaticSeqTableTriggerLogic {
    seq: SeqBlock,
    timing: TriggerTiming,
}

impl StaticSeqTableTriggerLogic {
    /// Drive `seq` with the default timing.
    pub fn new(seq: SeqBlock) -> Self {
        Self {
            seq,
            timing: TriggerTiming::default(),
        }
    }

    /// Override the deadlines.
    pub fn with_timing(mut self, timing: TriggerTiming) -> Self {
        self.timing = timing;
        self
    }

    /// The driven block.
    pub fn block(&self) -> &SeqBlock {
        &self.seq
    }
}

#[async_trait]
impl FlyerController<SeqTableInfo> for StaticSeqTableTriggerLogic {
    async fn prepare(&self, value: &SeqTableInfo) -> FlyscanResult<()> {
        info!(
            rows = value.sequence_table.len(),
            repeats = value.repeats,
            prescale_us = value.prescale_as_us,
            "preparing sequence table"
        );
        let t = &self.timing;
        gather(vec![
            t.set_op(&self.seq.prescale_units, TimeUnits::Us),
            t.set_op(&self.seq.enable, BitMux::Zero),
        ])
        .await?;
        gather(vec![
            t.set_op(&self.seq.prescale, value.prescale_as_us),
            t.set_op(&self.seq.repeats, value.repeats),
            t.set_op(&self.seq.table, value.sequence_table.clone()),
        ])
        .await?;
        Ok(())
    }

    async fn kickoff(&self) -> FlyscanResult<()> {
        debug!(block = %self.seq.enable.name(), "arming sequencer");
        self.timing.arm(&self.seq.enable, &self.seq.active).await
    }

    async fn complete(&self) -> FlyscanResult<()> {
        self.timing.wait_active(&self.seq.active, false, None).await
    }

    async fn stop(&self) -> FlyscanResult<()> {
        self.timing.disarm(&self.seq.enable, &self.seq.active).await
    }
}

// =============================================================================
// Position compare
// =============================================================================

#[derive(Deserialize)]
struct RawPcompInfo {
    start_position: i64,
    pulse_width: i64,
    rising_edge_step: i64,
    number_of_pulses: i64,
    direction: PcompDirection,
}

/// Configuration for [`StaticPcompTriggerLogic`]. Positions are in encoder counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPcompInfo")]
pub struct PcompInfo {
    start_position: i64,
    pulse_width: i64,
    rising_edge_step: i64,
    number_of_pulses: u32,
    direction: PcompDirection,
}

impl PcompInfo {
    /// Validate and build.
    ///
    /// `pulse_width` and `rising_edge_step` must be `> 0`;
    /// `number_of_pulses` must be `>= 0` (0 = infinite). Every violation is
    /// reported.
    pub fn new(
        start_position: i64,
        pulse_width: i64,
        rising_edge_step: i64,
        number_of_pulses: i64,
        direction: PcompDirection,
    ) -> FlyscanResult<Self> {
        let mut violations = Vec::new();
        if pulse_width <= 0 {
            violations.push(format!("pulse_width must be > 0 (got {pulse_width})"));
        }
        if rising_edge_step <= 0 {
            violations.push(format!(
                "rising_edge_step must be > 0 (got {rising_edge_step})"
            ));
        }
        let pulses = match u32::try_from(number_of_pulses) {
            Ok(n) => Some(n),
            Err(_) if number_of_pulses < 0 => {
                violations.push(format!(
                    "number_of_pulses must be >= 0 (got {number_of_pulses})"
                ));
                None
            }
            Err(_) => {
                violations.push(format!(
                    "number_of_pulses must be <= {} (got {number_of_pulses})",
                    u32::MAX
                ));
                None
            }
        };

        match pulses {
            Some(number_of_pulses) if violations.is_empty() => Ok(Self {
                start_position,
                pulse_width,
                rising_edge_step,
                number_of_pulses,
                direction,
            }),
            _ => Err(FlyscanError::validation("PcompInfo", violations)),
        }
    }

    /// Position of the first pulse.
    pub fn start_position(&self) -> i64 {
        self.start_position
    }

    /// Width of each pulse.
    pub fn pulse_width(&self) -> i64 {
        self.pulse_width
    }

    /// Distance between rising edges.
    pub fn rising_edge_step(&self) -> i64 {
        self.rising_edge_step
    }

    /// Pulses before the block disarms itself (0 = infinite).
    pub fn number_of_pulses(&self) -> u32 {
        self.number_of_pulses
    }

    /// Required direction of travel.
    pub fn direction(&self) -> PcompDirection {
        self.direction
    }
}

impl TryFrom<RawPcompInfo> for PcompInfo {
    type Error = FlyscanError;

    fn try_from(raw: RawPcompInfo) -> Result<Self, Self::Error> {
        Self::new(
            raw.start_position,
            raw.pulse_width,
            raw.rising_edge_step,
            raw.number_of_pulses,
            raw.direction,
        )
    }
}

/// Fires pulses at encoder positions on a PCOMP block.
#[derive(Debug, Clone)]
pub struct StaticPcompTriggerLogic {
    pcomp: PcompBlock,
    timing: TriggerTiming,
    complete_timeout: Option<Duration>,
}

impl StaticPcompTriggerLogic {
    /// Drive `pcomp` with the default timing and no completion deadline.
    pub fn new(pcomp: PcompBlock) -> Self {
        Self {
            pcomp,
            timing: TriggerTiming::default(),
            complete_timeout: None,
        }
    }

    /// Override the deadlines.
    pub fn with_timing(mut self, timing: TriggerTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Deadline applied by `complete()`; `None` waits indefinitely.
    pub fn with_complete_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.complete_timeout = timeout;
        self
    }

    /// The driven block.
    pub fn block(&self) -> &PcompBlock {
        &self.pcomp
    }

    /// Wait for the block to report inactive, giving up after `timeout`.
    pub async fn complete_within(&self, timeout: Option<Duration>) -> FlyscanResult<()> {
        self.timing
            .wait_active(&self.pcomp.active, false, timeout)
            .await
    }
}

#[async_trait]
impl FlyerController<PcompInfo> for StaticPcompTriggerLogic {
    async fn prepare(&self, value: &PcompInfo) -> FlyscanResult<()> {
        info!(
            start = value.start_position,
            width = value.pulse_width,
            step = value.rising_edge_step,
            pulses = value.number_of_pulses,
            direction = ?value.direction,
            "preparing position compare"
        );
        let t = &self.timing;
        t.set(&self.pcomp.enable, BitMux::Zero).await?;
        gather(vec![
            t.set_op(&self.pcomp.start, value.start_position),
            t.set_op(&self.pcomp.width, value.pulse_width),
            t.set_op(&self.pcomp.step, value.rising_edge_step),
            t.set_op(&self.pcomp.pulses, value.number_of_pulses),
            t.set_op(&self.pcomp.dir, value.direction),
        ])
        .await?;
        Ok(())
    }

    async fn kickoff(&self) -> FlyscanResult<()> {
        debug!(block = %self.pcomp.enable.name(), "arming position compare");
        self.timing.arm(&self.pcomp.enable, &self.pcomp.active).await
    }

    async fn complete(&self) -> FlyscanResult<()> {
        self.complete_within(self.complete_timeout).await
    }

    async fn stop(&self) -> FlyscanResult<()> {
        self.timing.disarm(&self.pcomp.enable, &self.pcomp.active).await
    }
}
