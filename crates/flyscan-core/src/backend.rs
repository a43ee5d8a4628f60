//! Parameter backends
//!
//! A backend performs the actual read/write of a single parameter. Real
//! transports (PVA, TCP control ports, ...) live outside this workspace and
//! only need to implement [`ParameterBackend`]. This module ships the
//! in-memory [`SoftBackend`] and the [`Connector`] seam used by blocks to
//! create one backend per named parameter.
//!
//! # Shared state
//!
//! Backends are handed out as `Arc<dyn ParameterBackend<T>>` and shared by
//! every parameter handle, controller and derived parameter that references
//! them. There is no locking across operations: the hardware serializes
//! access, and callers must not run two `prepare`/`kickoff` cycles against
//! the same block concurrently.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

use crate::error::{FlyscanError, FlyscanResult};
use crate::observable::Observable;

/// Bound shared by every value a parameter can carry.
///
/// `PartialEq` is required for `wait_for_value` (exact match) and `Debug`
/// for error reporting of the last observed value.
pub trait ParamValue: Clone + Send + Sync + PartialEq + Debug + 'static {}

impl<T> ParamValue for T where T: Clone + Send + Sync + PartialEq + Debug + 'static {}

/// Backend performing I/O for a single parameter.
///
/// # Contract
/// - `read` returns the current hardware value (suspending)
/// - `write` returns once the hardware acknowledged the value
/// - `subscribe` returns a change stream if the backend can push updates;
///   callers fall back to sampling `read` when it returns `None`
#[async_trait]
pub trait ParameterBackend<T: ParamValue>: Send + Sync {
    /// Address of the parameter on its transport (e.g. `soft://seq1.enable`).
    fn source(&self) -> String;

    /// Read the current value from hardware.
    async fn read(&self) -> FlyscanResult<T>;

    /// Write a value and wait for the acknowledgement.
    async fn write(&self, value: T) -> FlyscanResult<()>;

    /// Subscribe to pushed value changes, if supported.
    fn subscribe(&self) -> Option<watch::Receiver<T>> {
        None
    }
}

/// Callback invoked with every value written to a [`SoftBackend`].
pub type PutCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// In-memory backend holding its value in an [`Observable`].
///
/// Writes are acknowledged immediately and pushed to subscribers. At most one
/// put callback can be registered at a time.
pub struct SoftBackend<T: ParamValue> {
    value: Observable<T>,
    callback: Mutex<Option<PutCallback<T>>>,
}

impl<T: ParamValue> SoftBackend<T> {
    /// Create a soft backend for `name` holding `initial`.
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        Self {
            value: Observable::new(name, initial),
            callback: Mutex::new(None),
        }
    }

    /// Replace the stored value without going through `write`.
    ///
    /// Models the device changing a value on its own (e.g. `active` dropping
    /// when a sequence ends). The put callback is not invoked.
    pub fn set_value(&self, value: T) {
        self.value.set_unchecked(value);
    }

    /// Current stored value.
    pub fn value(&self) -> T {
        self.value.get()
    }

    /// Register or clear the put callback.
    ///
    /// Registering a callback while one is already set is an error; clear it
    /// first with `set_callback(None)`.
    pub fn set_callback(&self, callback: Option<PutCallback<T>>) -> FlyscanResult<()> {
        let mut slot = self.callback.lock();
        if callback.is_some() && slot.is_some() {
            return Err(FlyscanError::Backend(format!(
                "Cannot set a callback on '{}' when one is already set",
                self.value.name()
            )));
        }
        *slot = callback;
        Ok(())
    }

    /// Whether a put callback is registered.
    pub fn has_callback(&self) -> bool {
        self.callback.lock().is_some()
    }
}

#[async_trait]
impl<T: ParamValue> ParameterBackend<T> for SoftBackend<T> {
    fn source(&self) -> String {
        format!("soft://{}", self.value.name())
    }

    async fn read(&self) -> FlyscanResult<T> {
        Ok(self.value.get())
    }

    async fn write(&self, value: T) -> FlyscanResult<()> {
        trace!(source = %self.source(), ?value, "soft write");
        self.value.set_unchecked(value.clone());
        // Clone out of the lock so the callback may touch this backend.
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(&value);
        }
        Ok(())
    }

    fn subscribe(&self) -> Option<watch::Receiver<T>> {
        Some(self.value.subscribe())
    }
}

/// Creates backends for named parameters.
///
/// Blocks are built against a connector so the same block definition can be
/// wired to soft, mock or real transports.
pub trait Connector {
    /// Create the backend for parameter `name`, starting from `initial`.
    fn connect<T: ParamValue>(&self, name: &str, initial: T) -> Arc<dyn ParameterBackend<T>>;
}

/// Connector producing [`SoftBackend`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftConnector;

impl Connector for SoftConnector {
    fn connect<T: ParamValue>(&self, name: &str, initial: T) -> Arc<dyn ParameterBackend<T>> {
        Arc::new(SoftBackend::new(name, initial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_soft_backend_get_put_monitor() {
        let backend = SoftBackend::new("x", 0.0);
        let mut rx = backend.subscribe().unwrap();
        assert_eq!(*rx.borrow(), 0.0);

        backend.write(43.5).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 43.5);
        assert_eq!(backend.read().await.unwrap(), 43.5);
        assert_eq!(backend.source(), "soft://x");
    }

    #[tokio::test]
    async fn test_soft_backend_set_callback() {
        let backend = SoftBackend::new("table", Vec::<f64>::new());
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        backend
            .set_callback(Some(Arc::new(move |_v: &Vec<f64>| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })))
            .unwrap();
        assert!(backend.has_callback());

        let second = backend.set_callback(Some(Arc::new(|_v: &Vec<f64>| {})));
        assert!(matches!(second, Err(FlyscanError::Backend(msg)) if msg.contains("already set")));

        backend.write(vec![1.0, 2.0]).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        backend.set_callback(None).unwrap();
        assert!(!backend.has_callback());
    }

    #[tokio::test]
    async fn test_set_value_bypasses_callback() {
        let backend = SoftBackend::new("active", false);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        backend
            .set_callback(Some(Arc::new(move |_v: &bool| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })))
            .unwrap();

        backend.set_value(true);
        assert!(backend.value());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
