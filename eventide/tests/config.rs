use eventide::LoopBuilder;
use eventide::config::LoopConfig;
use eventide::error::ConfigError;

use std::io::Write;
use std::time::Duration;

#[test]
fn test_builder_reads_a_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "poll_batch_limit = 16").unwrap();
    writeln!(file, "min_interval_ms = 2").unwrap();
    writeln!(file, "object_high_water_mark = 4").unwrap();

    let event_loop = LoopBuilder::from_file(file.path()).unwrap().build();
    let config = event_loop.config();

    assert_eq!(config.poll_batch_limit, 16);
    assert_eq!(config.min_interval(), Duration::from_millis(2));
    assert_eq!(config.object_high_water_mark, 4);
    assert_eq!(event_loop.handle().config(), *config);
}

#[test]
fn test_builder_rejects_an_invalid_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "microtask_budget = 0").unwrap();

    assert!(matches!(
        LoopBuilder::from_file(file.path()),
        Err(ConfigError::Zero {
            field: "microtask_budget"
        })
    ));
}

#[test]
fn test_builder_overrides_win_over_the_file() {
    let config = LoopConfig::from_toml_str("poll_batch_limit = 16").unwrap();
    let event_loop = LoopBuilder::from_config(config)
        .unwrap()
        .poll_batch_limit(3)
        .microtask_budget(50)
        .build();

    assert_eq!(event_loop.config().poll_batch_limit, 3);
    assert_eq!(event_loop.config().microtask_budget, Some(50));
}
