//! Mock connector and backend registry.
//!
//! Blocks are built against a [`Connector`]; handing them a
//! [`MockConnector`] wires every parameter to a [`MockBackend`] that tests
//! can later look up by name to script it or inspect what was written.

use flyscan_core::{Connector, ParamValue, ParameterBackend};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::MockBackend;
use crate::common::ErrorConfig;

/// Type-erased view used for registry-wide queries.
trait Probe: Send + Sync {
    fn write_count(&self) -> usize;
    fn pending_writes(&self) -> usize;
    fn clear_log(&self);
}

impl<T: ParamValue> Probe for MockBackend<T> {
    fn write_count(&self) -> usize {
        MockBackend::write_count(self)
    }

    fn pending_writes(&self) -> usize {
        MockBackend::pending_writes(self)
    }

    fn clear_log(&self) {
        MockBackend::clear_log(self);
    }
}

struct Entry {
    backend: Arc<dyn Any + Send + Sync>,
    probe: Arc<dyn Probe>,
}

/// Connector producing [`MockBackend`]s and remembering them by name.
///
/// Clones share the registry.
#[derive(Clone, Default)]
pub struct MockConnector {
    registry: Arc<Mutex<BTreeMap<String, Entry>>>,
    errors: Option<ErrorConfig>,
}

impl std::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnector")
            .field("parameters", &self.names())
            .finish_non_exhaustive()
    }
}

impl MockConnector {
    /// Create an empty connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `errors` to every backend connected from now on.
    ///
    /// The config is shared, so a sticky fault on one parameter affects all.
    pub fn with_error_config(mut self, errors: ErrorConfig) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Look up the backend of parameter `name`.
    ///
    /// Returns `None` if nothing was connected under that name or it carries
    /// a different value type.
    pub fn get<T: ParamValue>(&self, name: &str) -> Option<Arc<MockBackend<T>>> {
        let backend = self.registry.lock().get(name)?.backend.clone();
        backend.downcast::<MockBackend<T>>().ok()
    }

    /// Names of every connected parameter, sorted.
    pub fn names(&self) -> Vec<String> {
        self.registry.lock().keys().cloned().collect()
    }

    /// Acknowledged writes across every backend.
    pub fn total_writes(&self) -> usize {
        self.registry
            .lock()
            .values()
            .map(|e| e.probe.write_count())
            .sum()
    }

    /// Writes still in progress across every backend.
    pub fn pending_writes(&self) -> usize {
        self.registry
            .lock()
            .values()
            .map(|e| e.probe.pending_writes())
            .sum()
    }

    /// Clear the logs of every backend.
    pub fn clear_logs(&self) {
        for entry in self.registry.lock().values() {
            entry.probe.clear_log();
        }
    }
}

impl Connector for MockConnector {
    fn connect<T: ParamValue>(&self, name: &str, initial: T) -> Arc<dyn ParameterBackend<T>> {
        let backend = Arc::new(MockBackend::new(name, initial));
        if let Some(errors) = &self.errors {
            backend.set_error_config(errors.clone());
        }
        self.registry.lock().insert(
            name.to_string(),
            Entry {
                backend: backend.clone(),
                probe: backend.clone(),
            },
        );
        backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flyscan_core::{Parameter, Readable, Settable};

    #[tokio::test]
    async fn test_connected_parameters_are_registered() {
        let connector = MockConnector::new();
        let width = Parameter::connect(&connector, "pcomp1.width", 0i64);
        let dir = Parameter::connect(&connector, "pcomp1.dir", String::from("Positive"));

        width.set(4).await.unwrap();
        assert_eq!(connector.names(), vec!["pcomp1.dir", "pcomp1.width"]);

        let backend = connector.get::<i64>("pcomp1.width").unwrap();
        assert_eq!(backend.writes(), vec![4]);
        assert!(connector.get::<bool>("pcomp1.width").is_none());
        assert!(connector.get::<i64>("missing").is_none());

        backend.set_mock_value(9);
        assert_eq!(width.get_value().await.unwrap(), 9);
        assert_eq!(dir.source(), "mock://pcomp1.dir");
        assert_eq!(connector.total_writes(), 1);

        connector.clear_logs();
        assert_eq!(connector.total_writes(), 0);
    }
}
