//! Derived parameters over mock backends.
//!
//! `r` is the radius of a polar coordinate backed by cartesian `x`/`y`
//! axes; the angle is read from a separate `theta` parameter at set time.

use flyscan_mock::{ErrorConfig, ErrorScenario, MockConnector, MockOp};
use rust_flyscan::{DerivedParameter, FlyscanError, Parameter, Readable, Settable};
use tokio::time::{Duration, Instant};

struct Polar {
    connector: MockConnector,
    theta: Parameter<f64>,
    r: DerivedParameter<f64, f64>,
}

fn polar(theta_deg: f64) -> Polar {
    let connector = MockConnector::new();
    let x = Parameter::connect(&connector, "x", 0.0);
    let y = Parameter::connect(&connector, "y", 0.0);
    let theta = Parameter::soft("theta", theta_deg);

    let t = theta.clone();
    let (wx, wy) = (x.clone(), y.clone());
    let r = DerivedParameter::new(
        "r",
        vec![x, y],
        |v: &[f64]| v[0].hypot(v[1]),
        move |r: f64| {
            let (theta, x, y) = (t.clone(), wx.clone(), wy.clone());
            async move {
                let angle = theta.get_value().await?.to_radians();
                Ok::<_, FlyscanError>(vec![
                    x.write_op(r * angle.cos()),
                    y.write_op(r * angle.sin()),
                ])
            }
        },
    );

    Polar {
        connector,
        theta,
        r,
    }
}

#[tokio::test]
async fn test_set_writes_both_axes() {
    let rig = polar(30.0);
    rig.r.set(10.0).await.unwrap();

    let x = rig.connector.get::<f64>("x").unwrap().last_write().unwrap();
    let y = rig.connector.get::<f64>("y").unwrap().last_write().unwrap();
    assert!((x - 10.0 * 30f64.to_radians().cos()).abs() < 1e-9);
    assert!((y - 5.0).abs() < 1e-9);

    let r = rig.r.get_value().await.unwrap();
    assert!((r - 10.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_angle_read_at_set_time() {
    let rig = polar(30.0);
    rig.theta.set(90.0).await.unwrap();
    rig.r.set(2.0).await.unwrap();

    let x = rig.connector.get::<f64>("x").unwrap().last_write().unwrap();
    let y = rig.connector.get::<f64>("y").unwrap().last_write().unwrap();
    assert!(x.abs() < 1e-9);
    assert!((y - 2.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_axis_times_out_and_is_named() {
    let rig = polar(30.0);
    rig.connector
        .get::<f64>("y")
        .unwrap()
        .set_error_config(ErrorConfig::scenario(ErrorScenario::Hang {
            operation: MockOp::Write,
        }));

    let start = Instant::now();
    let err = rig
        .r
        .set_with_timeout(10.0, Some(Duration::from_secs(1)))
        .await
        .unwrap_err();

    match &err {
        FlyscanError::Timeout {
            operation,
            pending,
            elapsed,
            ..
        } => {
            assert_eq!(operation, "r");
            assert_eq!(pending, &vec!["y".to_string()]);
            assert!(*elapsed >= Duration::from_secs(1));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
    assert!(err.involves("y"));
    assert!(!err.involves("x"));
    assert!(start.elapsed() < Duration::from_secs(15));

    // x completed, the stuck y write was dropped with the timeout.
    assert_eq!(rig.connector.get::<f64>("x").unwrap().write_count(), 1);
    assert_eq!(rig.connector.get::<f64>("y").unwrap().write_count(), 0);
    assert_eq!(rig.connector.pending_writes(), 0);
}

#[tokio::test]
async fn test_read_fails_when_one_axis_fails() {
    let rig = polar(30.0);
    rig.connector
        .get::<f64>("y")
        .unwrap()
        .set_error_config(ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: MockOp::Read,
            count: 0,
        }));

    let err = rig.r.get_value().await.unwrap_err();
    assert!(matches!(err, FlyscanError::FanOut { .. }));
    assert!(err.involves("y"));
}

#[tokio::test]
async fn test_failed_axis_reports_fan_out() {
    let rig = polar(0.0);
    rig.connector
        .get::<f64>("x")
        .unwrap()
        .set_error_config(ErrorConfig::scenario(ErrorScenario::CommunicationLoss));

    let err = rig.r.set(1.0).await.unwrap_err();
    assert!(matches!(err, FlyscanError::FanOut { .. }));
    assert!(err.involves("x"));
}
