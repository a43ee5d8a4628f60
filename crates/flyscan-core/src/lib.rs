//! `flyscan-core`
//!
//! Core primitives for coordinating hardware-triggered flyscans.
//!
//! This crate provides the building blocks used by the trigger strategies in
//! `flyscan-panda` and by scan orchestrators: typed parameters bound to a
//! backend, concurrent fan-out of parameter operations, waiting for a
//! parameter to reach a value, derived composite parameters, and the trigger
//! lifecycle state machine.
//!
//! ## Key Types
//!
//! - [`Parameter`]: Named, typed, cached device value backed by a [`ParameterBackend`]
//! - [`DerivedParameter`]: Logical value computed from several parameters
//! - [`gather`] / [`Operation`]: All-or-nothing concurrent fan-out
//! - [`wait_for_value`]: Wait (bounded or not) until a parameter reads a target
//! - [`StandardFlyer`]: prepare → kickoff → complete → stop state machine
//! - [`FlyscanError`]: Error type naming the parameter or operation at fault
//!
//! ## Example
//!
//! ```rust,ignore
//! use flyscan_core::{gather, wait_for_value, Parameter};
//!
//! let enable = Parameter::soft("seq1.enable", false);
//! let active = Parameter::soft("seq1.active", false);
//!
//! gather(vec![enable.write_op(true)]).await?;
//! wait_for_value(&active, true, Some(std::time::Duration::from_secs(1))).await?;
//! ```

pub mod backend;
pub mod capabilities;
pub mod config;
pub mod derived;
pub mod error;
pub mod fanout;
pub mod flyer;
pub mod limits;
pub mod observable;
pub mod parameter;
pub mod wait;

pub use backend::{Connector, ParamValue, ParameterBackend, PutCallback, SoftBackend, SoftConnector};
pub use capabilities::{FlyerController, Readable, Settable};
pub use config::{FlyscanSettings, TimeoutSettings};
pub use derived::DerivedParameter;
pub use error::{FlyscanError, FlyscanResult};
pub use fanout::{gather, gather_tracked, get_all, set_all, InFlight, Operation};
pub use flyer::{StandardFlyer, TriggerState};
pub use observable::{Observable, ObservableMetadata};
pub use parameter::Parameter;
pub use wait::{wait_for_value, wait_for_value_with, WaitOptions};
