//! # Rust Flyscan
//!
//! Facade over the flyscan workspace crates, plus logging setup for
//! applications that drive hardware-triggered scans.
//!
//! ## Crate Structure
//!
//! - **`flyscan-core`**: Parameters, concurrent fan-out, `wait_for_value`,
//!   derived parameters, the trigger state machine, settings and errors.
//! - **`flyscan-panda`**: PandA SEQ and PCOMP blocks and the two trigger
//!   strategies built on them.
//! - **`flyscan-mock`** (feature `mock`): Scriptable backends with write logs
//!   and error injection, for test suites.
//! - **`logging`**: `tracing-subscriber` initialization driven by
//!   [`FlyscanSettings`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use rust_flyscan::{panda::*, FlyscanSettings, StandardFlyer};
//!
//! let settings = FlyscanSettings::load()?;
//! rust_flyscan::logging::init_from_settings(&settings)?;
//!
//! let logic = StaticPcompTriggerLogic::new(PcompBlock::new(&connector, "pcomp1"))
//!     .with_timing(TriggerTiming::from(&settings.timeouts));
//! let flyer = StandardFlyer::new("pcomp1", logic);
//!
//! flyer.prepare(&PcompInfo::new(0, 1, 100, 50, PcompDirection::Positive)?).await?;
//! flyer.kickoff().await?;
//! flyer.complete().await?;
//! ```

pub mod logging;

pub use flyscan_core::*;

/// PandA blocks and trigger strategies.
pub mod panda {
    pub use flyscan_panda::*;
}

/// Mock backends for tests.
#[cfg(feature = "mock")]
pub mod mock {
    pub use flyscan_mock::*;
}
