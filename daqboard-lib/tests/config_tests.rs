mod common;

use daqboard_lib::config::{BoardConfig, RegisterScript};
use daqboard_lib::device::{PID, VID};
use daqboard_lib::error::DaqError;
use std::time::Duration;

#[test]
fn test_board_config_defaults() {
    let config = BoardConfig::default();
    assert_eq!(config.vendor_id, VID);
    assert_eq!(config.product_id, PID);
    assert_eq!(config.ack_timeout(), Duration::from_secs(1));
    assert!(config.purge_on_open);
    assert!(config.validate().is_ok());
}

#[test]
fn test_board_config_partial_toml() {
    let config = BoardConfig::from_toml(
        r#"
        adc_read_len = 8192
        skip_reset = true
        bus_number = 3
        "#,
    )
    .unwrap();
    assert_eq!(config.adc_read_len, 8192);
    assert!(config.skip_reset);
    assert_eq!(config.bus_number, Some(3));
    assert_eq!(config.device_address, None);
    assert_eq!(config.write_timeout_ms, 1000);
}

#[test]
fn test_board_config_rejects_zero_sizes() {
    common::init_tracing();
    let err = BoardConfig::from_toml("adc_read_len = 0").unwrap_err();
    assert!(matches!(err, DaqError::Config(_)));
    let err = BoardConfig::from_toml("ack_timeout_ms = 0").unwrap_err();
    assert!(matches!(err, DaqError::Config(_)));
    let err = BoardConfig::from_toml("adc_read_len = \"lots\"").unwrap_err();
    assert!(matches!(err, DaqError::Toml(_)));
}

#[test]
fn test_board_config_builder() {
    let config = BoardConfig::default()
        .with_location(2, 17)
        .with_timeouts(Duration::from_millis(250), Duration::from_millis(300))
        .with_adc_read(1024, Duration::from_millis(40))
        .skip_reset(true)
        .purge_on_open(false);
    assert_eq!(config.bus_number, Some(2));
    assert_eq!(config.device_address, Some(17));
    assert_eq!(config.write_timeout(), Duration::from_millis(250));
    assert_eq!(config.ack_timeout(), Duration::from_millis(300));
    assert_eq!(config.adc_timeout(), Duration::from_millis(40));
    assert_eq!(config.adc_read_len, 1024);
    assert!(config.skip_reset);
    assert!(!config.purge_on_open);
}

#[test]
fn test_script_ordering_is_stable_within_a_priority() {
    let script = RegisterScript::from_toml(
        r#"
        [[write]]
        module = 1
        register = 0
        value = 1
        priority = 1

        [[write]]
        module = 1
        register = 1
        value = 2

        [[write]]
        module = 1
        register = 2
        value = 3
        priority = 1

        [[write]]
        module = 1
        register = 3
        value = 4
        priority = -1
        active = false
        "#,
    )
    .unwrap();

    assert_eq!(script.writes.len(), 4);
    assert!(script.writes[0].active);
    let order: Vec<u32> = script.ordered_writes().iter().map(|w| w.value).collect();
    assert_eq!(order, vec![2, 1, 3]);
}

#[test]
fn test_script_rejects_wide_module() {
    common::init_tracing();
    let err = RegisterScript::from_toml(
        r#"
        [[write]]
        module = 16
        register = 0
        value = 1
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, DaqError::Config(_)));

    let err = RegisterScript::from_toml(
        r#"
        [[write]]
        module = 1
        register = 256
        value = 1
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, DaqError::Toml(_)));
}

#[test]
fn test_empty_script() {
    let script = RegisterScript::from_toml("").unwrap();
    assert!(script.ordered_writes().is_empty());
}

#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("daqboard-script-{}.toml", std::process::id()));
    std::fs::write(&path, "[[write]]\nmodule = 7\nregister = 1\nvalue = 13\n").unwrap();
    let script = RegisterScript::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(script.writes[0].module, 7);

    let err = RegisterScript::load(&path).unwrap_err();
    assert!(matches!(err, DaqError::Io { .. }));
}

#[test]
fn test_demo_files_parse() {
    let script = RegisterScript::from_toml(include_str!("../../demos/adc_stream.toml")).unwrap();
    let values: Vec<u32> = script.ordered_writes().iter().map(|w| w.value).collect();
    assert_eq!(values, vec![8, 100, 0x071F_4064]);

    let config = BoardConfig::from_toml(include_str!("../../demos/board.toml")).unwrap();
    assert_eq!(config, BoardConfig::default());
}
