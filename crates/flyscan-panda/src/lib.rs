//! `flyscan-panda`
//!
//! PandA blocks and the trigger strategies that drive them during a flyscan.
//!
//! ## Key Types
//!
//! - [`SeqBlock`] / [`PcompBlock`]: Parameter handles of a SEQ or PCOMP block
//! - [`SeqTable`]: Validated sequencer pulse table
//! - [`SeqTableInfo`] / [`PcompInfo`]: Validated flyscan configurations
//! - [`StaticSeqTableTriggerLogic`] / [`StaticPcompTriggerLogic`]: Strategies
//!   to wrap in a [`flyscan_core::StandardFlyer`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use flyscan_core::StandardFlyer;
//! use flyscan_panda::{SeqBlock, SeqTable, SeqTableInfo, StaticSeqTableTriggerLogic};
//!
//! let block = SeqBlock::new(&connector, "seq1");
//! let flyer = StandardFlyer::new("seq1", StaticSeqTableTriggerLogic::new(block));
//!
//! let info = SeqTableInfo::new(SeqTable::new(rows)?, 1, 0.5)?;
//! flyer.prepare(&info).await?;
//! flyer.kickoff().await?;
//! flyer.complete().await?;
//! ```

pub mod block;
pub mod table;
pub mod trigger;

pub use block::{BitMux, PcompBlock, PcompDirection, SeqBlock, TimeUnits};
pub use table::{SeqTable, SeqTableRow, SeqTrigger};
pub use trigger::{
    PcompInfo, SeqTableInfo, StaticPcompTriggerLogic, StaticSeqTableTriggerLogic, TriggerTiming,
};
