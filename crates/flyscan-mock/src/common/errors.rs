//! Error injection framework for mock backends.
//!
//! Enables configurable failures and stalls for resilience testing. Injected
//! failures surface as the same `FlyscanError` variants a real backend would
//! produce, always naming the parameter involved.

use super::rng::MockRng;
use flyscan_core::FlyscanError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Backend operation subject to injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// `ParameterBackend::read`
    Read,
    /// `ParameterBackend::write`
    Write,
}

impl MockOp {
    fn failure(self, parameter: &str, reason: String) -> FlyscanError {
        match self {
            MockOp::Read => FlyscanError::ReadFailure {
                parameter: parameter.to_string(),
                reason,
            },
            MockOp::Write => FlyscanError::WriteFailure {
                parameter: parameter.to_string(),
                reason,
            },
        }
    }
}

/// What the backend should do with an operation that passed injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injected {
    /// Perform the operation normally
    Proceed,
    /// Never complete (the hardware never acknowledges)
    Hang,
}

/// Error injection configuration for mock backends
///
/// Clones share scenario state, so one config can be handed to every
/// backend of a block to model a device-wide fault.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Failure probability applied to every operation (0.0 to 1.0)
    failure_rate: f64,
    /// Specific failure scenarios
    scenarios: Arc<Vec<ErrorScenario>>,
    /// RNG for failure decisions
    rng: Arc<MockRng>,
    /// State tracking for scenarios
    state: Arc<Mutex<ErrorState>>,
}

/// A scripted fault
#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// Fail every operation of this kind after N successful ones
    FailAfterN {
        /// Operation kind counted
        operation: MockOp,
        /// Successful operations before failures start
        count: u32,
    },
    /// Operations of this kind never complete
    Hang {
        /// Operation kind that stalls
        operation: MockOp,
    },
    /// Simulate communication loss (every later operation fails too)
    CommunicationLoss,
    /// Hardware fault with specific code (every later operation fails too)
    HardwareFault {
        /// Fault code reported in the error
        code: u32,
    },
}

#[derive(Default, Debug)]
struct ErrorState {
    /// Operation counters for FailAfterN scenarios
    operation_counts: HashMap<MockOp, u32>,
    /// Whether communication is lost
    communication_lost: bool,
    /// Hardware fault code (0 = no fault)
    hardware_fault_code: u32,
}

impl ErrorConfig {
    /// Create error config with no errors (default)
    pub fn none() -> Self {
        Self::scenarios(Vec::new())
    }

    /// Create error config with uniform random failures and specific seed
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        Self {
            failure_rate: rate,
            scenarios: Arc::new(Vec::new()),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Create error config with a single scenario
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Create error config with multiple scenarios
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self {
            failure_rate: 0.0,
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(None)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Decide the fate of `operation` on `parameter`.
    pub fn check_operation(
        &self,
        parameter: &str,
        operation: MockOp,
    ) -> Result<Injected, FlyscanError> {
        let mut state = self.state.lock();

        if state.communication_lost {
            return Err(operation.failure(parameter, "communication lost".into()));
        }

        if state.hardware_fault_code != 0 {
            return Err(operation.failure(
                parameter,
                format!("hardware fault: {}", state.hardware_fault_code),
            ));
        }

        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation => {
                    let current = state.operation_counts.entry(operation).or_insert(0);
                    *current += 1;
                    if *current > *count {
                        return Err(operation.failure(
                            parameter,
                            format!("injected failure after {count} operations"),
                        ));
                    }
                }
                ErrorScenario::Hang { operation: op } if *op == operation => {
                    return Ok(Injected::Hang);
                }
                ErrorScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(operation.failure(parameter, "communication lost".into()));
                }
                ErrorScenario::HardwareFault { code } => {
                    state.hardware_fault_code = *code;
                    return Err(operation.failure(parameter, format!("hardware fault: {code}")));
                }
                _ => {}
            }
        }

        if self.rng.should_fail(self.failure_rate) {
            return Err(operation.failure(parameter, "random injected failure".into()));
        }

        Ok(Injected::Proceed)
    }

    /// Reset error state (clear counters, faults)
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}
