//! PandA blocks used for flyscanning.
//!
//! Each block is a plain struct of [`Parameter`] handles named
//! `<prefix>.<field>`, created through a [`Connector`] so the same definition
//! runs against soft, mock or real backends.
//!
//! `active` is reported by the hardware and is read-only from this side.

use flyscan_core::{Connector, FlyscanError, FlyscanResult, Parameter};
use serde::{Deserialize, Serialize};

use crate::table::SeqTable;

/// Value of a bit-mux input such as `enable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BitMux {
    /// Constant low
    #[default]
    #[serde(rename = "ZERO")]
    Zero,
    /// Constant high
    #[serde(rename = "ONE")]
    One,
}

/// Unit selector for the sequencer prescaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeUnits {
    /// Minutes
    #[serde(rename = "min")]
    Min,
    /// Seconds
    #[default]
    #[serde(rename = "s")]
    S,
    /// Milliseconds
    #[serde(rename = "ms")]
    Ms,
    /// Microseconds
    #[serde(rename = "us")]
    Us,
}

/// Direction the encoder must move for position-compare pulses to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PcompDirection {
    /// Counts increasing
    #[default]
    Positive,
    /// Counts decreasing
    Negative,
}

fn field(prefix: &str, name: &str) -> String {
    format!("{prefix}.{name}")
}

/// Sequencer (SEQ) block.
#[derive(Debug, Clone)]
pub struct SeqBlock {
    /// Enable input; the table runs while high
    pub enable: Parameter<BitMux>,
    /// Whether the table is running
    pub active: Parameter<bool>,
    /// Pulse table
    pub table: Parameter<SeqTable>,
    /// Number of times the whole table is played (0 = forever)
    pub repeats: Parameter<u32>,
    /// Tick length in `prescale_units`
    pub prescale: Parameter<f64>,
    /// Unit of `prescale`
    pub prescale_units: Parameter<TimeUnits>,
}

impl SeqBlock {
    /// Connect every parameter of the block at `prefix` (e.g. `"seq1"`).
    pub fn new(connector: &impl Connector, prefix: &str) -> Self {
        let prescale = field(prefix, "prescale");
        let prescale_name = prescale.clone();
        Self {
            enable: Parameter::connect(connector, field(prefix, "enable"), BitMux::Zero),
            active: Parameter::connect(connector, field(prefix, "active"), false).read_only(),
            table: Parameter::connect(connector, field(prefix, "table"), SeqTable::empty()),
            repeats: Parameter::connect(connector, field(prefix, "repeats"), 1),
            prescale: Parameter::connect(connector, prescale, 1.0)
                .with_validator(move |v: &f64| non_negative(&prescale_name, *v)),
            prescale_units: Parameter::connect(
                connector,
                field(prefix, "prescale_units"),
                TimeUnits::default(),
            ),
        }
    }
}

/// Position-compare (PCOMP) block.
#[derive(Debug, Clone)]
pub struct PcompBlock {
    /// Enable input; pulses fire while high
    pub enable: Parameter<BitMux>,
    /// Whether the block is armed or producing pulses
    pub active: Parameter<bool>,
    /// Position of the first pulse
    pub start: Parameter<i64>,
    /// Width of each pulse
    pub width: Parameter<i64>,
    /// Distance between rising edges
    pub step: Parameter<i64>,
    /// Number of pulses (0 = infinite)
    pub pulses: Parameter<u32>,
    /// Required direction of travel
    pub dir: Parameter<PcompDirection>,
}

impl PcompBlock {
    /// Connect every parameter of the block at `prefix` (e.g. `"pcomp1"`).
    pub fn new(connector: &impl Connector, prefix: &str) -> Self {
        Self {
            enable: Parameter::connect(connector, field(prefix, "enable"), BitMux::Zero),
            active: Parameter::connect(connector, field(prefix, "active"), false).read_only(),
            start: Parameter::connect(connector, field(prefix, "start"), 0).with_unit("counts"),
            width: Parameter::connect(connector, field(prefix, "width"), 1).with_unit("counts"),
            step: Parameter::connect(connector, field(prefix, "step"), 1).with_unit("counts"),
            pulses: Parameter::connect(connector, field(prefix, "pulses"), 0),
            dir: Parameter::connect(connector, field(prefix, "dir"), PcompDirection::default()),
        }
    }
}

fn non_negative(name: &str, value: f64) -> FlyscanResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FlyscanError::validation(
            name,
            vec![format!("{value} is not a finite, non-negative number")],
        ))
    }
}
