//! Waiting for a parameter to reach a value.
//!
//! [`wait_for_value`] is how trigger strategies observe hardware progress:
//! a block reports `active == true` once armed and `active == false` once its
//! sequence ended. The wait reacts to pushed updates when the parameter offers
//! a subscription and samples `get_value` periodically otherwise.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::ParamValue;
use crate::capabilities::Readable;
use crate::error::{FlyscanError, FlyscanResult};
use crate::limits::POLL_INTERVAL;

/// Tuning for [`wait_for_value_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Give up after this long; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Sampling period when no subscription is available.
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl WaitOptions {
    /// Options with the given deadline and the default poll interval.
    pub fn within(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Override the sampling period.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Wait until `param` reads exactly `target`.
///
/// Returns immediately if the current value already matches. On expiry the
/// error is `Timeout` naming the parameter and carrying the last value seen.
pub async fn wait_for_value<T, R>(
    param: &R,
    target: T,
    timeout: Option<Duration>,
) -> FlyscanResult<()>
where
    T: ParamValue,
    R: Readable<T> + ?Sized,
{
    wait_for_value_with(param, move |value| *value == target, WaitOptions::within(timeout))
        .await
        .map(|_| ())
}

/// Wait until `predicate` holds for the value of `param`, returning that value.
pub async fn wait_for_value_with<T, R, P>(
    param: &R,
    predicate: P,
    options: WaitOptions,
) -> FlyscanResult<T>
where
    T: ParamValue,
    R: Readable<T> + ?Sized,
    P: Fn(&T) -> bool + Send + Sync,
{
    let name = param.name();
    // Lives outside the timed future so it survives cancellation.
    let last_seen: Mutex<Option<T>> = Mutex::new(None);
    let start = Instant::now();
    debug!(parameter = %name, timeout = ?options.timeout, "waiting for value");

    let watch = watch_until(param, &predicate, options.poll_interval, &last_seen);
    let Some(limit) = options.timeout else {
        return watch.await;
    };

    match tokio::time::timeout(limit, watch).await {
        Ok(result) => result,
        Err(_) => {
            let last_value = last_seen.lock().as_ref().map(|v| format!("{v:?}"));
            let elapsed = start.elapsed();
            warn!(
                parameter = %name,
                last_value = last_value.as_deref().unwrap_or("<none>"),
                ?elapsed,
                "wait for value timed out"
            );
            Err(FlyscanError::Timeout {
                operation: name.clone(),
                pending: vec![name],
                last_value,
                elapsed,
            })
        }
    }
}

async fn watch_until<T, R, P>(
    param: &R,
    predicate: &P,
    poll_interval: Duration,
    last_seen: &Mutex<Option<T>>,
) -> FlyscanResult<T>
where
    T: ParamValue,
    R: Readable<T> + ?Sized,
    P: Fn(&T) -> bool + Send + Sync,
{
    if let Some(mut rx) = param.subscribe() {
        loop {
            let current = rx.borrow_and_update().clone();
            param.observed(&current);
            *last_seen.lock() = Some(current.clone());
            if predicate(&current) {
                return Ok(current);
            }
            if rx.changed().await.is_err() {
                debug!(parameter = %param.name(), "subscription closed, sampling instead");
                break;
            }
        }
    }

    loop {
        let current = param.get_value().await?;
        *last_seen.lock() = Some(current.clone());
        if predicate(&current) {
            return Ok(current);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftBackend;
    use crate::parameter::Parameter;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Readable without push support that reports `true` for its first
    /// `flips_after` samples.
    struct Sampled {
        reads: AtomicUsize,
        flips_after: usize,
    }

    #[async_trait]
    impl Readable<bool> for Sampled {
        fn name(&self) -> String {
            "pcomp1.active".into()
        }

        async fn get_value(&self) -> FlyscanResult<bool> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(n < self.flips_after)
        }
    }

    #[tokio::test]
    async fn test_returns_immediately_when_matching() {
        let param = Parameter::soft("seq1.active", false);
        wait_for_value(&param, false, Some(Duration::ZERO)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reacts_to_subscription() {
        let param = Parameter::soft("seq1.active", false);
        let setter = param.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            setter.write(true).await.unwrap();
        });
        wait_for_value(&param, true, Some(Duration::from_secs(1)))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pushed_value_refreshes_cache() {
        let backend = Arc::new(SoftBackend::new("seq1.active", true));
        let param = Parameter::new("seq1.active", true, backend.clone()).read_only();
        let device = backend.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            device.set_value(false);
        });

        wait_for_value(&param, false, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(!param.cached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_sampling() {
        let param = Sampled {
            reads: AtomicUsize::new(0),
            flips_after: 3,
        };
        wait_for_value(&param, false, None).await.unwrap();
        assert_eq!(param.reads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_last_value() {
        let param = Parameter::soft("seq1.active", false);
        let err = wait_for_value(&param, true, Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        match err {
            FlyscanError::Timeout {
                operation,
                pending,
                last_value,
                elapsed,
            } => {
                assert_eq!(operation, "seq1.active");
                assert_eq!(pending, vec!["seq1.active".to_string()]);
                assert_eq!(last_value.as_deref(), Some("false"));
                assert!(elapsed >= Duration::from_secs(1));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_returns_matching_value() {
        let param = Parameter::soft("pcomp1.pulses", 0u32);
        let setter = param.clone();
        tokio::spawn(async move {
            for n in 1..=5 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                setter.write(n).await.unwrap();
            }
        });
        let value = wait_for_value_with(
            &param,
            |n| *n >= 3,
            WaitOptions::within(Some(Duration::from_secs(1)))
                .with_poll_interval(Duration::from_millis(5)),
        )
        .await
        .unwrap();
        assert!((3..=5).contains(&value));
    }
}
