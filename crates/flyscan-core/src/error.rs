//! Error types for flyscan coordination.
//!
//! This module defines the primary error type, `FlyscanError`. Using the
//! `thiserror` crate, it provides a single place where every failure a
//! lifecycle call can surface is described, from configuration rejection to
//! backend write failures and poll deadlines.
//!
//! ## Error Hierarchy
//!
//! - **`Validation`**: A configuration value object was rejected. Raised before
//!   any hardware interaction, so no parameter has been written.
//! - **`WriteFailure` / `ReadFailure`**: The backend rejected or lost a single
//!   parameter operation. Always names the parameter.
//! - **`Timeout` / `ArmTimeout`**: A poll or write deadline expired. Carries the
//!   operation name, the labels that never completed, the last observed value
//!   and the elapsed time.
//! - **`Cancelled`**: The operation was aborted by an out-of-band `stop()`.
//! - **`FanOut`**: One or more operations of a concurrent fan-out failed.
//!
//! No error is retried inside this workspace. Partial hardware state after a
//! failed `prepare`/`kickoff` is possible; callers recover with `stop()`.

use std::time::Duration;

use thiserror::Error;

use crate::flyer::TriggerState;

/// Convenience alias for results using the flyscan error type.
pub type FlyscanResult<T> = std::result::Result<T, FlyscanError>;

/// Primary error type for flyscan coordination.
///
/// # Error Categories
///
/// 1. **Configuration Errors** - `Validation`, `Config`
///    - Occur before any hardware write (value objects, parameter validators)
///    - Recovery: fix the configuration and call `prepare` again
///
/// 2. **Backend Errors** - `WriteFailure`, `ReadFailure`, `ReadOnly`
///    - Occur during parameter I/O, may leave partial hardware state
///    - Recovery: `stop()`, then re-`prepare`
///
/// 3. **Timing Errors** - `Timeout`, `ArmTimeout`, `Cancelled`, `FanOut`
///    - Occur when hardware does not reach the expected state in time
///    - Recovery: `stop()`; the orchestrator decides whether to retry the step
#[derive(Error, Debug)]
pub enum FlyscanError {
    /// A configuration value object or a parameter value failed validation.
    ///
    /// `violations` enumerates every violated constraint, not just the first.
    /// Nothing was written to hardware.
    #[error("Invalid {model}: {}", .violations.join("; "))]
    Validation {
        /// Rejected model (e.g. `"PcompInfo"`) or parameter (e.g. `"seq1.prescale"`).
        model: String,
        /// Human-readable description of each violated constraint.
        violations: Vec<String>,
    },

    /// The backend rejected or lost a write.
    #[error("Write to '{parameter}' failed: {reason}")]
    WriteFailure {
        /// Parameter that could not be written.
        parameter: String,
        /// Backend-provided reason.
        reason: String,
    },

    /// The backend failed to return a value.
    #[error("Read of '{parameter}' failed: {reason}")]
    ReadFailure {
        /// Parameter that could not be read.
        parameter: String,
        /// Backend-provided reason.
        reason: String,
    },

    /// Attempted to modify a read-only parameter.
    #[error("Parameter '{0}' is read-only")]
    ReadOnly(String),

    /// A deadline expired before the operation finished.
    ///
    /// `pending` lists the labels (parameter names) that had not completed
    /// when the deadline expired.
    #[error(
        "Timed out after {elapsed:?} waiting for '{operation}' (pending: [{}], last value: {})",
        .pending.join(", "),
        .last_value.as_deref().unwrap_or("<none>")
    )]
    Timeout {
        /// Operation or parameter that timed out.
        operation: String,
        /// Underlying operations that never completed.
        pending: Vec<String>,
        /// Debug representation of the last observed value, if any.
        last_value: Option<String>,
        /// Time spent before giving up.
        elapsed: Duration,
    },

    /// The trigger block did not report `active` after being enabled.
    #[error(
        "Trigger did not arm: '{parameter}' not active after {elapsed:?} (last value: {})",
        .last_value.as_deref().unwrap_or("<none>")
    )]
    ArmTimeout {
        /// The `active` parameter that was polled.
        parameter: String,
        /// Debug representation of the last observed value, if any.
        last_value: Option<String>,
        /// Time spent before giving up.
        elapsed: Duration,
    },

    /// The operation was cancelled by an enclosing scope.
    #[error("Operation '{operation}' was cancelled")]
    Cancelled {
        /// Operation that was cancelled.
        operation: String,
    },

    /// One or more operations of a concurrent fan-out failed.
    ///
    /// Operations that were still running when the first failure arrived are
    /// listed in `cancelled`. Their side effects are not rolled back.
    #[error("Fan-out failed for [{}]", failed_labels(.failures))]
    FanOut {
        /// `(label, error)` for each failed operation.
        failures: Vec<(String, FlyscanError)>,
        /// Labels of operations cancelled because a sibling failed.
        cancelled: Vec<String>,
    },

    /// A lifecycle call was made from a state that does not allow it.
    #[error("Cannot {operation} while {from}")]
    InvalidTransition {
        /// State the controller was in.
        from: TriggerState,
        /// Rejected lifecycle call.
        operation: &'static str,
    },

    /// A backend was misused or is in a state that cannot serve the request.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Settings could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),
}

fn failed_labels(failures: &[(String, FlyscanError)]) -> String {
    failures
        .iter()
        .map(|(label, err)| format!("{label}: {err}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl FlyscanError {
    /// Build a validation error for `model` from a list of violations.
    pub fn validation(model: impl Into<String>, violations: Vec<String>) -> Self {
        Self::Validation {
            model: model.into(),
            violations,
        }
    }

    /// Whether this error, or any error nested in a fan-out, is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ArmTimeout { .. } => true,
            Self::FanOut { failures, .. } => failures.iter().any(|(_, e)| e.is_timeout()),
            _ => false,
        }
    }

    /// Whether this error names `parameter` as the failing or stalled operation.
    ///
    /// Looks through fan-out failures so callers can ask "did `y` stall?"
    /// without matching on the nesting.
    pub fn involves(&self, parameter: &str) -> bool {
        match self {
            Self::WriteFailure { parameter: p, .. }
            | Self::ReadFailure { parameter: p, .. }
            | Self::ArmTimeout { parameter: p, .. } => p == parameter,
            Self::ReadOnly(p) => p == parameter,
            Self::Validation { model, .. } => model == parameter,
            Self::Timeout {
                operation, pending, ..
            } => operation == parameter || pending.iter().any(|p| p == parameter),
            Self::Cancelled { operation } => operation == parameter,
            Self::FanOut {
                failures,
                cancelled,
            } => {
                failures
                    .iter()
                    .any(|(label, e)| label == parameter || e.involves(parameter))
                    || cancelled.iter().any(|c| c == parameter)
            }
            _ => false,
        }
    }
}

impl From<figment::Error> for FlyscanError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
