//! Mock Parameter Backends for rust-flyscan
//!
//! This crate provides simulated parameter backends for testing trigger
//! strategies and composite parameters without a controller on the network.
//! All delays use `tokio::time`, so tests can run on a paused clock.
//!
//! # Available Types
//!
//! - [`MockBackend`] - Instrumented in-memory backend (write log, read
//!   counter, scripted reads, put callbacks, latency, fault injection)
//! - [`MockConnector`] - Builds blocks on mock backends and finds them again by name
//! - [`ErrorConfig`] - Seeded, reproducible fault injection
//!
//! # Usage
//!
//! ```rust,ignore
//! use flyscan_mock::MockConnector;
//! use flyscan_panda::SeqBlock;
//!
//! let connector = MockConnector::new();
//! let block = SeqBlock::new(&connector, "seq1");
//!
//! // Make the block report active once enabled
//! let active = connector.get::<bool>("seq1.active").unwrap();
//! connector
//!     .get::<BitMux>("seq1.enable")
//!     .unwrap()
//!     .on_put(move |v| active.set_mock_value(*v == BitMux::One));
//! ```

mod backend;
pub mod common;
mod connector;

// Re-export common types
pub use common::{ErrorConfig, ErrorScenario, Injected, MockOp, MockRng};

pub use backend::MockBackend;
pub use connector::MockConnector;
