//! Mock parameter backend.
//!
//! Stands in for one hardware parameter. Besides holding a value it records
//! what the code under test did to it (write log, read counter, writes still
//! in progress) and can be scripted to behave like a device: reads that
//! return a prepared sequence, put callbacks that change other parameters,
//! latency, stalls and injected failures.
//!
//! # Example
//!
//! ```rust,ignore
//! let enable = Arc::new(MockBackend::new("seq1.enable", BitMux::Zero));
//! let active = Arc::new(MockBackend::new("seq1.active", false));
//!
//! // Enabling the block makes it report active
//! let a = active.clone();
//! enable.on_put(move |v| a.set_mock_value(*v == BitMux::One));
//! ```

use async_trait::async_trait;
use flyscan_core::{FlyscanResult, ParamValue, ParameterBackend, PutCallback};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::common::{ErrorConfig, Injected, MockOp};

struct MockState<T> {
    writes: Vec<T>,
    reads: usize,
    read_script: VecDeque<T>,
    callbacks: Vec<PutCallback<T>>,
    polling_only: bool,
    latency: Duration,
    errors: ErrorConfig,
}

/// Decrements the in-progress counter when a write finishes or is dropped.
struct InProgress<'a>(&'a AtomicUsize);

impl<'a> InProgress<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory backend with instrumentation and fault injection.
pub struct MockBackend<T: ParamValue> {
    name: String,
    value: watch::Sender<T>,
    in_progress: AtomicUsize,
    state: Mutex<MockState<T>>,
}

impl<T: ParamValue> std::fmt::Debug for MockBackend<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("name", &self.name)
            .field("value", &*self.value.borrow())
            .finish_non_exhaustive()
    }
}

impl<T: ParamValue> MockBackend<T> {
    /// Create a mock backend for `name` holding `initial`.
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        let (value, _) = watch::channel(initial);
        Self {
            name: name.into(),
            value,
            in_progress: AtomicUsize::new(0),
            state: Mutex::new(MockState {
                writes: Vec::new(),
                reads: 0,
                read_script: VecDeque::new(),
                callbacks: Vec::new(),
                polling_only: false,
                latency: Duration::ZERO,
                errors: ErrorConfig::none(),
            }),
        }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    pub fn value(&self) -> T {
        self.value.borrow().clone()
    }

    /// Change the value as the device would, bypassing the write log and callbacks.
    pub fn set_mock_value(&self, value: T) {
        trace!(parameter = %self.name, ?value, "mock value");
        self.value.send_replace(value);
    }

    /// Register a callback run after every acknowledged write.
    pub fn on_put(&self, callback: impl Fn(&T) + Send + Sync + 'static) {
        self.state.lock().callbacks.push(Arc::new(callback));
    }

    /// Values acknowledged by `write`, oldest first.
    pub fn writes(&self) -> Vec<T> {
        self.state.lock().writes.clone()
    }

    /// Most recent acknowledged write.
    pub fn last_write(&self) -> Option<T> {
        self.state.lock().writes.last().cloned()
    }

    /// Number of acknowledged writes.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }

    /// Number of `read` calls, including failed ones.
    pub fn read_count(&self) -> usize {
        self.state.lock().reads
    }

    /// Writes that started but have neither finished nor been dropped.
    pub fn pending_writes(&self) -> usize {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Forget recorded writes and reads.
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.writes.clear();
        state.reads = 0;
    }

    /// Make the next reads return `values` in order.
    ///
    /// Each scripted read also becomes the current value. Once the script is
    /// exhausted, reads return the current value again.
    pub fn set_read_script(&self, values: impl IntoIterator<Item = T>) {
        self.state.lock().read_script = values.into_iter().collect();
    }

    /// Scripted reads not yet consumed.
    pub fn remaining_script(&self) -> usize {
        self.state.lock().read_script.len()
    }

    /// Withhold the subscription so consumers must sample `read`.
    pub fn set_polling_only(&self, polling_only: bool) {
        self.state.lock().polling_only = polling_only;
    }

    /// Delay every read and write by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Replace the fault injection configuration.
    pub fn set_error_config(&self, errors: ErrorConfig) {
        self.state.lock().errors = errors;
    }

    fn admit(&self, operation: MockOp) -> FlyscanResult<(Injected, Duration)> {
        let state = self.state.lock();
        let injected = state.errors.check_operation(&self.name, operation)?;
        Ok((injected, state.latency))
    }
}

#[async_trait]
impl<T: ParamValue> ParameterBackend<T> for MockBackend<T> {
    fn source(&self) -> String {
        format!("mock://{}", self.name)
    }

    async fn read(&self) -> FlyscanResult<T> {
        self.state.lock().reads += 1;
        let (injected, latency) = self.admit(MockOp::Read)?;
        if injected == Injected::Hang {
            debug!(parameter = %self.name, "read hangs");
            std::future::pending::<()>().await;
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.state.lock().read_script.pop_front();
        match scripted {
            Some(value) => {
                self.value.send_replace(value.clone());
                Ok(value)
            }
            None => Ok(self.value()),
        }
    }

    async fn write(&self, value: T) -> FlyscanResult<()> {
        let _in_progress = InProgress::enter(&self.in_progress);
        let (injected, latency) = self.admit(MockOp::Write)?;
        if injected == Injected::Hang {
            debug!(parameter = %self.name, ?value, "write hangs");
            std::future::pending::<()>().await;
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        trace!(parameter = %self.name, ?value, "mock write");
        let callbacks = {
            let mut state = self.state.lock();
            state.writes.push(value.clone());
            state.callbacks.clone()
        };
        self.value.send_replace(value.clone());
        for callback in callbacks {
            callback(&value);
        }
        Ok(())
    }

    fn subscribe(&self) -> Option<watch::Receiver<T>> {
        if self.state.lock().polling_only {
            None
        } else {
            Some(self.value.subscribe())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorScenario;
    use flyscan_core::FlyscanError;

    #[tokio::test]
    async fn test_write_log_and_callbacks() {
        let enable = MockBackend::new("seq1.enable", 0u8);
        let active = Arc::new(MockBackend::new("seq1.active", false));
        let a = active.clone();
        enable.on_put(move |v| a.set_mock_value(*v == 1));

        enable.write(1).await.unwrap();
        enable.write(0).await.unwrap();
        enable.write(1).await.unwrap();

        assert_eq!(enable.writes(), vec![1, 0, 1]);
        assert_eq!(enable.last_write(), Some(1));
        assert!(active.value());
        // Device-side changes are not logged as writes.
        assert_eq!(active.write_count(), 0);
    }

    #[tokio::test]
    async fn test_read_script_then_current_value() {
        let active = MockBackend::new("seq1.active", true);
        active.set_read_script([true, true, false]);

        assert!(active.read().await.unwrap());
        assert!(active.read().await.unwrap());
        assert!(!active.read().await.unwrap());
        assert!(!active.read().await.unwrap());
        assert_eq!(active.read_count(), 4);
        assert_eq!(active.remaining_script(), 0);
    }

    #[tokio::test]
    async fn test_polling_only_withholds_subscription() {
        let backend = MockBackend::new("x", 0.0);
        assert!(backend.subscribe().is_some());
        backend.set_polling_only(true);
        assert!(backend.subscribe().is_none());
        assert_eq!(backend.source(), "mock://x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_write_is_pending_until_dropped() {
        let backend = MockBackend::new("y", 0.0);
        backend.set_error_config(ErrorConfig::scenario(ErrorScenario::Hang {
            operation: MockOp::Write,
        }));

        let result =
            tokio::time::timeout(Duration::from_millis(100), backend.write(1.0)).await;
        assert!(result.is_err());
        assert_eq!(backend.pending_writes(), 0);
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_acknowledgement() {
        let backend = MockBackend::new("x", 0u32);
        backend.set_latency(Duration::from_millis(50));
        let start = tokio::time::Instant::now();
        backend.write(3).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(backend.value(), 3);
    }

    #[tokio::test]
    async fn test_injected_failure_is_not_logged() {
        let backend = MockBackend::new("pcomp1.width", 0i64);
        backend.set_error_config(ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: MockOp::Write,
            count: 0,
        }));
        let err = backend.write(5).await.unwrap_err();
        assert!(matches!(err, FlyscanError::WriteFailure { ref parameter, .. } if parameter == "pcomp1.width"));
        assert_eq!(backend.write_count(), 0);
        assert_eq!(backend.value(), 0);
    }
}
