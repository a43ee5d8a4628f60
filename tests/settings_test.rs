use rust_flyscan::panda::TriggerTiming;
use rust_flyscan::{logging::TracingConfig, FlyscanError, FlyscanSettings};
use std::io::Write;
use std::time::Duration;
use tracing::Level;

#[test]
fn test_file_settings_reach_trigger_timing() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
log_level = "debug"

[timeouts]
arm_timeout = "2s"
poll_interval = "50ms"
"#
    )?;

    let settings = FlyscanSettings::load_from(file.path())?;
    let timing = TriggerTiming::from(&settings.timeouts);
    assert_eq!(timing.arm_timeout, Duration::from_secs(2));
    assert_eq!(timing.poll_interval, Duration::from_millis(50));
    assert_eq!(timing.stop_timeout, TriggerTiming::default().stop_timeout);

    let tracing = TracingConfig::from_settings(&settings)?;
    assert_eq!(tracing.level, Level::DEBUG);
    Ok(())
}

#[test]
fn test_invalid_file_is_config_error() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "[timeouts]\narm_timeout = \"0s\"")?;

    let err = FlyscanSettings::load_from(file.path()).unwrap_err();
    assert!(matches!(err, FlyscanError::Config(ref msg) if msg.contains("arm_timeout")));
    Ok(())
}
