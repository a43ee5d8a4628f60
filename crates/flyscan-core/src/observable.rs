//! Observable values
//!
//! Reactive value cell using `tokio::sync::watch` for multi-subscriber
//! notifications. Every [`crate::parameter::Parameter`] keeps its cached value
//! in an `Observable`, and the in-memory [`crate::backend::SoftBackend`] uses
//! one as its storage, which is what lets `wait_for_value` react to changes
//! instead of sampling.
//!
//! # Example
//!
//! ```rust,ignore
//! let active = Observable::new("seq1.active", false);
//!
//! let mut rx = active.subscribe();
//! tokio::spawn(async move {
//!     while rx.changed().await.is_ok() {
//!         println!("active is now {}", *rx.borrow());
//!     }
//! });
//!
//! active.set(true)?;
//! ```

use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{FlyscanError, FlyscanResult};

/// Validator callback type.
///
/// A function that validates a value and returns an error if invalid.
pub type Validator<T> = Arc<dyn Fn(&T) -> FlyscanResult<()> + Send + Sync>;

/// Shared state for Observable that propagates to all clones.
///
/// Uses `parking_lot::RwLock` (not tokio) because metadata access is fast and
/// must be usable from synchronous code such as `name()`.
struct ObservableSharedState<T> {
    metadata: ObservableMetadata,
    validator: Option<Validator<T>>,
}

/// Descriptive metadata for an observable value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservableMetadata {
    /// Unique name, conventionally `<block>.<field>`.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Physical units (e.g. "us", "counts").
    pub units: Option<String>,
    /// Read-only values reject `set()`.
    pub read_only: bool,
}

/// A thread-safe, observable value with change notifications.
///
/// Clones share the same watch channel and the same metadata.
pub struct Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    sender: watch::Sender<T>,
    shared: Arc<RwLock<ObservableSharedState<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.read();
        f.debug_struct("Observable")
            .field("metadata", &shared.metadata)
            .field("has_validator", &shared.validator.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new observable with an initial value.
    pub fn new(name: impl Into<String>, initial_value: T) -> Self {
        let (sender, _) = watch::channel(initial_value);
        Self {
            sender,
            shared: Arc::new(RwLock::new(ObservableSharedState {
                metadata: ObservableMetadata {
                    name: name.into(),
                    ..Default::default()
                },
                validator: None,
            })),
        }
    }

    /// Add a description to this observable.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.shared.write().metadata.description = Some(description.into());
        self
    }

    /// Add units to this observable.
    pub fn with_units(self, units: impl Into<String>) -> Self {
        self.shared.write().metadata.units = Some(units.into());
        self
    }

    /// Mark this observable as read-only.
    pub fn read_only(self) -> Self {
        self.shared.write().metadata.read_only = true;
        self
    }

    /// Add a custom validator function.
    pub fn with_validator<F>(self, validator: F) -> Self
    where
        F: Fn(&T) -> FlyscanResult<()> + Send + Sync + 'static,
    {
        self.shared.write().validator = Some(Arc::new(validator));
        self
    }

    /// Get the current value (clone).
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Get the name.
    pub fn name(&self) -> String {
        self.shared.read().metadata.name.clone()
    }

    /// Get the metadata (returns a clone for thread safety).
    pub fn metadata(&self) -> ObservableMetadata {
        self.shared.read().metadata.clone()
    }

    /// Validate a value without setting it.
    ///
    /// Fails if the observable is read-only or the validator rejects the value.
    /// Parameters call this BEFORE touching the backend.
    pub fn validate(&self, value: &T) -> FlyscanResult<()> {
        let guard = self.shared.read();
        if guard.metadata.read_only {
            return Err(FlyscanError::ReadOnly(guard.metadata.name.clone()));
        }

        if let Some(validator) = &guard.validator {
            validator(value)?;
        }

        Ok(())
    }

    /// Set a new value, notifying all subscribers.
    pub fn set(&self, value: T) -> FlyscanResult<()> {
        self.validate(&value)?;
        self.sender.send_replace(value);
        Ok(())
    }

    /// Set value without validation.
    ///
    /// Used when the value comes from hardware, which is the source of truth.
    pub fn set_unchecked(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Subscribe to value changes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + PartialOrd + Debug + 'static,
{
    /// Add min/max range validation (inclusive).
    pub fn with_range(self, min: T, max: T) -> Self {
        let name = self.name();
        self.with_validator(move |value: &T| {
            if value < &min || value > &max {
                Err(FlyscanError::validation(
                    name.as_str(),
                    vec![format!("value {value:?} out of range [{min:?}, {max:?}]")],
                ))
            } else {
                Ok(())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observable_basic() {
        let obs = Observable::new("test", 42.0);
        assert_eq!(obs.get(), 42.0);

        obs.set(100.0).unwrap();
        assert_eq!(obs.get(), 100.0);
    }

    #[test]
    fn test_observable_range_rejects_without_changing_value() {
        let obs = Observable::new("prescale", 1.0).with_range(0.0, 10.0);
        assert!(obs.set(5.0).is_ok());
        let err = obs.set(11.0).unwrap_err();
        assert!(matches!(err, FlyscanError::Validation { ref model, .. } if model == "prescale"));
        assert!(err.involves("prescale"));
        assert_eq!(obs.get(), 5.0);
    }

    #[test]
    fn test_observable_read_only() {
        let obs = Observable::new("seq1.active", false).read_only();
        assert!(matches!(obs.set(true), Err(FlyscanError::ReadOnly(name)) if name == "seq1.active"));
        obs.set_unchecked(true);
        assert!(obs.get());
    }

    #[tokio::test]
    async fn test_observable_subscription() {
        let obs = Observable::new("test", 0u32);
        let mut rx = obs.subscribe();
        assert_eq!(obs.subscriber_count(), 1);

        obs.set(7).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 7);
    }

    #[test]
    fn test_clones_share_metadata() {
        let obs = Observable::new("width", 1i64).with_units("counts");
        let clone = obs.clone();
        assert_eq!(clone.metadata().units.as_deref(), Some("counts"));
        clone.set(5).unwrap();
        assert_eq!(obs.get(), 5);
    }
}
