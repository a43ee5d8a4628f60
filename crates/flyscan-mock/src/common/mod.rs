//! Common infrastructure for mock backends.
//!
//! - **errors**: Error injection framework
//! - **rng**: Seeded dice for random failures

pub mod errors;
pub mod rng;

// Re-export commonly used types
pub use errors::{ErrorConfig, ErrorScenario, Injected, MockOp};
pub use rng::MockRng;
