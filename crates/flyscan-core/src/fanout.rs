//! Concurrent fan-out of parameter operations.
//!
//! Lifecycle calls write several parameters "at once". The hardware accepts
//! the writes independently, so they are issued concurrently and the caller
//! resumes only after every one of them acknowledged, or as soon as one failed.
//!
//! # Structured concurrency
//!
//! Operations are polled on the caller's task through a `FuturesUnordered`;
//! nothing is spawned. Dropping the future returned by [`gather`] (for example
//! because an enclosing `tokio::time::timeout` expired) drops every operation
//! it owns, so no write outlives its coordinator.
//!
//! # Failure semantics
//!
//! The first failure ends the fan-out. Operations still running at that point
//! are dropped and reported as `cancelled`. Writes that already succeeded are
//! NOT rolled back; callers recover through the trigger `stop()` path.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::ParamValue;
use crate::capabilities::{Readable, Settable};
use crate::error::{FlyscanError, FlyscanResult};

/// A labelled unit of work for [`gather`].
///
/// The label is normally the name of the parameter the operation touches and
/// is what error reports refer to.
pub struct Operation<'a, T> {
    label: String,
    future: BoxFuture<'a, FlyscanResult<T>>,
}

impl<T> Debug for Operation<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl<'a, T> Operation<'a, T> {
    /// Wrap `future` under `label`.
    pub fn new(
        label: impl Into<String>,
        future: impl Future<Output = FlyscanResult<T>> + Send + 'a,
    ) -> Self {
        Self {
            label: label.into(),
            future: Box::pin(future),
        }
    }

    /// Label used in error reports.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Registry of operation labels that have started but not completed.
///
/// Shared between a fan-out and whoever bounds it in time: when the enclosing
/// timeout drops the fan-out, the registry still holds the labels that never
/// finished. Cloning yields another handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    labels: Arc<Mutex<Vec<String>>>,
}

impl InFlight {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `label` as started.
    pub fn insert(&self, label: impl Into<String>) {
        self.labels.lock().push(label.into());
    }

    /// Record one occurrence of `label` as finished.
    pub fn remove(&self, label: &str) {
        let mut labels = self.labels.lock();
        if let Some(idx) = labels.iter().position(|l| l == label) {
            labels.remove(idx);
        }
    }

    /// Labels still outstanding, in start order.
    pub fn snapshot(&self) -> Vec<String> {
        self.labels.lock().clone()
    }

    /// Whether every started operation finished.
    pub fn is_empty(&self) -> bool {
        self.labels.lock().is_empty()
    }
}

/// Run `ops` concurrently and collect their results in caller order.
///
/// Returns `FanOut` on the first failure, after dropping the operations that
/// were still running.
pub async fn gather<'a, T: Send + 'a>(ops: Vec<Operation<'a, T>>) -> FlyscanResult<Vec<T>> {
    gather_tracked(ops, &InFlight::new()).await
}

/// Like [`gather`], additionally maintaining `in_flight`.
///
/// Labels are inserted before the first poll and removed as each operation
/// finishes. If this future is dropped before completion, the labels of the
/// unfinished operations stay in the registry.
pub async fn gather_tracked<'a, T: Send + 'a>(
    ops: Vec<Operation<'a, T>>,
    in_flight: &InFlight,
) -> FlyscanResult<Vec<T>> {
    let labels: Vec<String> = ops.iter().map(|op| op.label.clone()).collect();
    for label in &labels {
        in_flight.insert(label.clone());
    }
    debug!(operations = ?labels, "fan-out started");

    let mut running: FuturesUnordered<_> = ops
        .into_iter()
        .enumerate()
        .map(|(idx, op)| async move { (idx, op.future.await) })
        .collect();
    let mut results: Vec<Option<T>> = labels.iter().map(|_| None).collect();

    while let Some((idx, result)) = running.next().await {
        in_flight.remove(&labels[idx]);
        match result {
            Ok(value) => results[idx] = Some(value),
            Err(err) => {
                // Drop the remaining operations before reporting.
                drop(running);
                let cancelled: Vec<String> = results
                    .iter()
                    .enumerate()
                    .filter(|(i, slot)| *i != idx && slot.is_none())
                    .map(|(i, _)| labels[i].clone())
                    .collect();
                for label in &cancelled {
                    in_flight.remove(label);
                }
                warn!(
                    failed = %labels[idx],
                    error = %err,
                    cancelled = ?cancelled,
                    "fan-out aborted"
                );
                return Err(FlyscanError::FanOut {
                    failures: vec![(labels[idx].clone(), err)],
                    cancelled,
                });
            }
        }
    }

    Ok(results.into_iter().flatten().collect())
}

/// Write every `(parameter, value)` pair concurrently, without a deadline.
///
/// Writes of differently-typed parameters are combined by building
/// [`Operation`]s directly (e.g. `Parameter::write_op`) and calling [`gather`].
pub async fn set_all<'a, T, S>(writes: impl IntoIterator<Item = (&'a S, T)>) -> FlyscanResult<()>
where
    T: ParamValue,
    S: Settable<T> + ?Sized + 'a,
{
    let ops = writes
        .into_iter()
        .map(|(param, value)| Operation::new(param.name(), param.set_with_timeout(value, None)))
        .collect();
    gather(ops).await.map(|_| ())
}

/// Read every parameter concurrently; values come back in `params` order.
pub async fn get_all<T, R>(params: &[R]) -> FlyscanResult<Vec<T>>
where
    T: ParamValue,
    R: Readable<T>,
{
    let ops = params
        .iter()
        .map(|param| Operation::new(param.name(), param.get_value()))
        .collect();
    gather(ops).await
}
