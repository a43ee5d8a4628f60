//! Parameter<T> - Backend-connected device parameter
//!
//! A parameter is an addressable, independently settable/gettable unit of
//! device state: a name, a value type, a cached value and a backend handle.
//!
//! # Architecture
//!
//! Parameter<T> **composes** Observable<T> to avoid code duplication:
//! - Observable<T> handles: cached value, watch channel, validation, metadata
//! - Parameter<T> adds: backend I/O, timeouts, fan-out operations
//!
//! # Example
//!
//! ```rust,ignore
//! use flyscan_core::{Parameter, Settable, Readable};
//!
//! let prescale = Parameter::soft("seq1.prescale", 1.0)
//!     .with_unit("us")
//!     .with_range(0.0, 1.0e6);
//!
//! // Validates, writes to the backend, updates the cache
//! prescale.set(2.5).await?;
//!
//! // Fresh read from the backend
//! let current = prescale.get_value().await?;
//! ```
//!
//! # Data Flow
//!
//! ```text
//! caller: param.set_with_timeout(value, timeout)
//!         │
//!         ▼
//! ┌───────────────────────────────────────────────────┐
//! │ 1. Validate (read-only, range, custom validator)  │
//! └───────────────────────────────────────────────────┘
//!         │ (fails here if invalid, backend untouched)
//!         ▼
//! ┌───────────────────────────────────────────────────┐
//! │ 2. backend.write(value), bounded by timeout       │
//! └───────────────────────────────────────────────────┘
//!         │ (Timeout names this parameter)
//!         ▼
//! ┌───────────────────────────────────────────────────┐
//! │ 3. Update cached value, notify cache subscribers  │
//! └───────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::{Connector, ParamValue, ParameterBackend, SoftBackend};
use crate::capabilities::{Readable, Settable};
use crate::error::{FlyscanError, FlyscanResult};
use crate::fanout::Operation;
use crate::observable::Observable;

/// Typed parameter bound to a backend.
///
/// Cloning is cheap and yields another handle to the same cache and backend.
///
/// ```text
/// Parameter<T>
///   ├─ inner: Observable<T>                  (cache, validation, metadata)
///   └─ backend: Arc<dyn ParameterBackend<T>> (shared, no implicit locking)
/// ```
#[derive(Clone)]
pub struct Parameter<T: ParamValue> {
    inner: Observable<T>,
    backend: Arc<dyn ParameterBackend<T>>,
}

impl<T: ParamValue> Debug for Parameter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.inner.name())
            .field("source", &self.backend.source())
            .field("cached", &self.inner.get())
            .finish()
    }
}

impl<T: ParamValue> Parameter<T> {
    /// Create a parameter over an existing backend.
    ///
    /// `initial` seeds the cache until the first read or write.
    pub fn new(
        name: impl Into<String>,
        initial: T,
        backend: Arc<dyn ParameterBackend<T>>,
    ) -> Self {
        Self {
            inner: Observable::new(name, initial),
            backend,
        }
    }

    /// Create a parameter backed by an in-memory [`SoftBackend`].
    pub fn soft(name: impl Into<String>, initial: T) -> Self {
        let name = name.into();
        let backend = Arc::new(SoftBackend::new(name.clone(), initial.clone()));
        Self::new(name, initial, backend)
    }

    /// Create a parameter whose backend comes from `connector`.
    pub fn connect(connector: &impl Connector, name: impl Into<String>, initial: T) -> Self {
        let name = name.into();
        let backend = connector.connect(&name, initial.clone());
        Self::new(name, initial, backend)
    }

    /// Set parameter description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.inner = self.inner.with_description(description);
        self
    }

    /// Set parameter unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.inner = self.inner.with_units(unit);
        self
    }

    /// Set numeric range constraints
    pub fn with_range(mut self, min: T, max: T) -> Self
    where
        T: PartialOrd,
    {
        self.inner = self.inner.with_range(min, max);
        self
    }

    /// Set custom validation function
    pub fn with_validator(
        mut self,
        validator: impl Fn(&T) -> FlyscanResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.inner = self.inner.with_validator(validator);
        self
    }

    /// Make parameter read-only (hardware-reported values such as `active`)
    pub fn read_only(mut self) -> Self {
        self.inner = self.inner.read_only();
        self
    }

    /// Parameter name
    pub fn name(&self) -> String {
        self.inner.name()
    }

    /// Backend address
    pub fn source(&self) -> String {
        self.backend.source()
    }

    /// Parameter unit of measurement
    pub fn unit(&self) -> Option<String> {
        self.inner.metadata().units
    }

    /// Whether writes are rejected
    pub fn is_read_only(&self) -> bool {
        self.inner.metadata().read_only
    }

    /// Last value read from or written to the backend
    pub fn cached(&self) -> T {
        self.inner.get()
    }

    /// Subscribe to changes of the cached value
    pub fn subscribe_cache(&self) -> watch::Receiver<T> {
        self.inner.subscribe()
    }

    /// Shared backend handle
    pub fn backend(&self) -> &Arc<dyn ParameterBackend<T>> {
        &self.backend
    }

    /// Validate and write without a deadline.
    ///
    /// Validation happens BEFORE the backend is touched so an invalid value
    /// never reaches the hardware.
    pub async fn write(&self, value: T) -> FlyscanResult<()> {
        self.inner.validate(&value)?;
        debug!(parameter = %self.inner.name(), ?value, "write");
        self.backend.write(value.clone()).await?;
        self.inner.set_unchecked(value);
        Ok(())
    }

    /// Labelled, untimed write suitable for [`crate::fanout::gather`].
    pub fn write_op(&self, value: T) -> Operation<'static, ()> {
        let param = self.clone();
        Operation::new(self.name(), async move { param.write(value).await })
    }

    /// Labelled read suitable for [`crate::fanout::gather`].
    pub fn read_op(&self) -> Operation<'static, T> {
        let param = self.clone();
        Operation::new(self.name(), async move { param.get_value().await })
    }
}

#[async_trait]
impl<T: ParamValue> Readable<T> for Parameter<T> {
    fn name(&self) -> String {
        self.inner.name()
    }

    async fn get_value(&self) -> FlyscanResult<T> {
        let value = self.backend.read().await?;
        // Hardware is the source of truth, no validation on read.
        self.inner.set_unchecked(value.clone());
        Ok(value)
    }

    fn subscribe(&self) -> Option<watch::Receiver<T>> {
        self.backend.subscribe()
    }

    fn observed(&self, value: &T) {
        self.inner.set_unchecked(value.clone());
    }
}

#[async_trait]
impl<T: ParamValue> Settable<T> for Parameter<T> {
    async fn set_with_timeout(&self, value: T, timeout: Option<Duration>) -> FlyscanResult<()> {
        let Some(limit) = timeout else {
            return self.write(value).await;
        };

        let start = Instant::now();
        match tokio::time::timeout(limit, self.write(value)).await {
            Ok(result) => result,
            Err(_) => {
                let name = self.inner.name();
                let elapsed = start.elapsed();
                warn!(parameter = %name, ?elapsed, "write not acknowledged in time");
                Err(FlyscanError::Timeout {
                    operation: name.clone(),
                    pending: vec![name],
                    last_value: Some(format!("{:?}", self.inner.get())),
                    elapsed,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StallingBackend;

    #[async_trait]
    impl ParameterBackend<f64> for StallingBackend {
        fn source(&self) -> String {
            "test://stall".into()
        }

        async fn read(&self) -> FlyscanResult<f64> {
            Ok(0.0)
        }

        async fn write(&self, _value: f64) -> FlyscanResult<()> {
            std::future::pending().await
        }
    }

    struct RecordingBackend {
        written: AtomicBool,
    }

    #[async_trait]
    impl ParameterBackend<f64> for RecordingBackend {
        fn source(&self) -> String {
            "test://record".into()
        }

        async fn read(&self) -> FlyscanResult<f64> {
            Ok(3.0)
        }

        async fn write(&self, _value: f64) -> FlyscanResult<()> {
            self.written.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_parameter_basic() {
        let param = Parameter::soft("test", 42.0);
        assert_eq!(param.cached(), 42.0);

        param.set(100.0).await.unwrap();
        assert_eq!(param.cached(), 100.0);
        assert_eq!(param.get_value().await.unwrap(), 100.0);
        assert_eq!(param.source(), "soft://test");
    }

    #[tokio::test]
    async fn test_get_value_refreshes_cache() {
        let backend = Arc::new(RecordingBackend {
            written: AtomicBool::new(false),
        });
        let param = Parameter::new("x", 0.0, backend);
        assert_eq!(param.get_value().await.unwrap(), 3.0);
        assert_eq!(param.cached(), 3.0);
    }

    /// Validation MUST happen before the backend write.
    #[tokio::test]
    async fn test_parameter_validates_before_backend_write() {
        let backend = Arc::new(RecordingBackend {
            written: AtomicBool::new(false),
        });
        let param = Parameter::new("prescale", 1.0, backend.clone()).with_range(0.0, 10.0);

        let err = param.set(150.0).await.unwrap_err();
        assert!(matches!(err, FlyscanError::Validation { ref model, .. } if model == "prescale"));
        assert!(!backend.written.load(Ordering::SeqCst));
        assert_eq!(param.cached(), 1.0);

        param.set(5.0).await.unwrap();
        assert!(backend.written.load(Ordering::SeqCst));
        assert_eq!(param.cached(), 5.0);
    }

    #[tokio::test]
    async fn test_read_only_rejects_set() {
        let param = Parameter::soft("seq1.active", false).read_only();
        let err = param.set(true).await.unwrap_err();
        assert!(matches!(err, FlyscanError::ReadOnly(ref name) if name == "seq1.active"));
        assert!(!param.cached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_times_out_naming_parameter() {
        let param = Parameter::new("y", 0.0, Arc::new(StallingBackend));
        let err = param
            .set_with_timeout(5.0, Some(Duration::from_secs(2)))
            .await
            .unwrap_err();

        match err {
            FlyscanError::Timeout {
                operation,
                pending,
                last_value,
                elapsed,
            } => {
                assert_eq!(operation, "y");
                assert_eq!(pending, vec!["y".to_string()]);
                assert_eq!(last_value.as_deref(), Some("0.0"));
                assert!(elapsed >= Duration::from_secs(2));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        // Cache untouched since the write never acknowledged.
        assert_eq!(param.cached(), 0.0);
    }

    #[tokio::test]
    async fn test_subscribe_delegates_to_backend() {
        let param = Parameter::soft("seq1.enable", 0u8);
        let mut rx = param.subscribe().unwrap();
        param.set(1).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }

    #[tokio::test]
    async fn test_connect_uses_connector() {
        let param = Parameter::connect(&crate::backend::SoftConnector, "pcomp1.width", 1i64)
            .with_unit("counts");
        assert_eq!(param.source(), "soft://pcomp1.width");
        assert_eq!(param.unit().as_deref(), Some("counts"));
    }
}
