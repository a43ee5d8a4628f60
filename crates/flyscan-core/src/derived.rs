//! Derived composite parameters.
//!
//! A derived parameter presents one logical value computed from several
//! underlying parameters: reading it reads all of them and combines the
//! results, writing it decomposes the value into underlying writes that are
//! issued concurrently.
//!
//! # Example
//!
//! ```rust,ignore
//! // Polar view over two cartesian stage axes.
//! let (xc, yc) = (x.clone(), y.clone());
//! let polar = DerivedParameter::new(
//!     "r_theta",
//!     vec![x, y],
//!     |xy: &[f64]| (xy[0].hypot(xy[1]), xy[1].atan2(xy[0])),
//!     move |(r, theta): (f64, f64)| {
//!         let (xc, yc) = (xc.clone(), yc.clone());
//!         async move {
//!             Ok(vec![
//!                 xc.write_op(r * theta.cos()),
//!                 yc.write_op(r * theta.sin()),
//!             ])
//!         }
//!     },
//! );
//!
//! polar.set((10.0, 30f64.to_radians())).await?;
//! ```
//!
//! # Timeouts
//!
//! The deadline passed to `set_with_timeout` bounds the whole composite write,
//! including the planning stage (`set_fn`, which may itself read other
//! parameters). Underlying writes carry no deadline of their own. When the
//! deadline expires, every unfinished underlying write is dropped and the
//! `Timeout` error lists exactly those writes as `pending`.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::ParamValue;
use crate::capabilities::{Readable, Settable};
use crate::error::{FlyscanError, FlyscanResult};
use crate::fanout::{gather_tracked, get_all, InFlight, Operation};
use crate::parameter::Parameter;

/// Combines the underlying values (in construction order) into the derived value.
pub type GetFn<U, T> = Arc<dyn Fn(&[U]) -> T + Send + Sync>;

/// Plans the underlying writes for a derived value.
pub type SetFn<T> =
    Arc<dyn Fn(T) -> BoxFuture<'static, FlyscanResult<Vec<Operation<'static, ()>>>> + Send + Sync>;

/// Logical value `T` backed by parameters of type `U`.
///
/// Holds no state of its own beyond handles to the underlying parameters.
#[derive(Clone)]
pub struct DerivedParameter<T, U: ParamValue> {
    name: String,
    underlying: Vec<Parameter<U>>,
    get_fn: GetFn<U, T>,
    set_fn: SetFn<T>,
}

impl<T, U: ParamValue> Debug for DerivedParameter<T, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedParameter")
            .field("name", &self.name)
            .field(
                "underlying",
                &self.underlying.iter().map(Parameter::name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<T: ParamValue, U: ParamValue> DerivedParameter<T, U> {
    /// Create a derived parameter.
    ///
    /// `get_fn` receives the underlying values in the order of `underlying`.
    /// `set_fn` returns the writes to perform; it is awaited inside the
    /// caller's deadline.
    pub fn new<G, S, Fut>(
        name: impl Into<String>,
        underlying: Vec<Parameter<U>>,
        get_fn: G,
        set_fn: S,
    ) -> Self
    where
        G: Fn(&[U]) -> T + Send + Sync + 'static,
        S: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FlyscanResult<Vec<Operation<'static, ()>>>> + Send + 'static,
    {
        Self {
            name: name.into(),
            underlying,
            get_fn: Arc::new(get_fn),
            set_fn: Arc::new(move |value| Box::pin(set_fn(value))),
        }
    }

    /// Underlying parameters, in the order `get_fn` sees their values.
    pub fn underlying(&self) -> &[Parameter<U>] {
        &self.underlying
    }

    async fn apply(&self, value: T, in_flight: &InFlight) -> FlyscanResult<()> {
        // Planning counts as outstanding work until set_fn returns.
        in_flight.insert(self.name.clone());
        let planned = (self.set_fn)(value).await;
        in_flight.remove(&self.name);

        let ops = planned?;
        debug!(
            parameter = %self.name,
            writes = ?ops.iter().map(Operation::label).collect::<Vec<_>>(),
            "applying derived write"
        );
        gather_tracked(ops, in_flight).await.map(|_| ())
    }
}

#[async_trait]
impl<T: ParamValue, U: ParamValue> Readable<T> for DerivedParameter<T, U> {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn get_value(&self) -> FlyscanResult<T> {
        let values = get_all(&self.underlying).await?;
        Ok((self.get_fn)(&values))
    }
}

#[async_trait]
impl<T: ParamValue, U: ParamValue> Settable<T> for DerivedParameter<T, U> {
    async fn set_with_timeout(&self, value: T, timeout: Option<Duration>) -> FlyscanResult<()> {
        let in_flight = InFlight::new();
        let apply = self.apply(value, &in_flight);
        let Some(limit) = timeout else {
            return apply.await;
        };

        let start = Instant::now();
        match tokio::time::timeout(limit, apply).await {
            Ok(result) => result,
            Err(_) => {
                let pending = in_flight.snapshot();
                let elapsed = start.elapsed();
                warn!(parameter = %self.name, ?pending, ?elapsed, "derived write timed out");
                Err(FlyscanError::Timeout {
                    operation: self.name.clone(),
                    pending,
                    last_value: None,
                    elapsed,
                })
            }
        }
    }
}
