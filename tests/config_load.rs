// tests/config_load.rs
use serial_test::serial;
use std::{env, fs};
use stock_sentinel::config::{MonitorConfig, ENV_CONFIG_PATH};

const MINIMAL: &str = r#"
probe_timeout_secs = 30

[[products]]
name = "RTX 5090"
aliases = ["5090"]

[cadence]
intensive_secs = 90
"#;

fn clear_env() {
    for k in [
        ENV_CONFIG_PATH,
        "INTENSIVE_CHECK_INTERVAL",
        "NORMAL_CHECK_INTERVAL",
        "EXTENDED_CHECK_INTERVAL",
        "REDDIT_CHECK_INTERVAL",
        "OPENAI_API_KEY",
    ] {
        env::remove_var(k);
    }
}

#[serial]
#[test]
fn explicit_path_wins_and_env_overrides_apply() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("monitor.toml");
    fs::write(&p, MINIMAL).unwrap();

    env::set_var("NORMAL_CHECK_INTERVAL", "120");
    let cfg = MonitorConfig::load(Some(&p)).unwrap();
    env::remove_var("NORMAL_CHECK_INTERVAL");

    assert_eq!(cfg.probe_timeout_secs, 30);
    assert_eq!(cfg.products.len(), 1);
    assert_eq!(cfg.cadence.intensive_secs, 90);
    assert_eq!(cfg.cadence.normal_secs, 120);
    assert_eq!(cfg.cadence.extended_secs, 3600);
}

#[serial]
#[test]
fn env_path_then_cwd_fallback_then_defaults() {
    clear_env();
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();

    // 1) Nothing on disk -> built-in defaults
    let cfg = MonitorConfig::load(None).unwrap();
    assert_eq!(cfg.products.len(), 2);

    // 2) ./config/monitor.toml
    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::write(tmp.path().join("config/monitor.toml"), MINIMAL).unwrap();
    let cfg = MonitorConfig::load(None).unwrap();
    assert_eq!(cfg.products.len(), 1);

    // 3) $MONITOR_CONFIG_PATH takes precedence
    let other = tmp.path().join("other.toml");
    fs::write(&other, "probe_timeout_secs = 7\n").unwrap();
    env::set_var(ENV_CONFIG_PATH, other.display().to_string());
    let cfg = MonitorConfig::load(None).unwrap();
    assert_eq!(cfg.probe_timeout_secs, 7);

    // 4) ...and must exist
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(MonitorConfig::load(None).is_err());
    env::remove_var(ENV_CONFIG_PATH);

    env::set_current_dir(&old).unwrap();
}

#[serial]
#[test]
fn invalid_cadence_from_env_is_fatal() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("monitor.toml");
    fs::write(&p, MINIMAL).unwrap();

    // Peak slower than midday violates the non-increasing table.
    env::set_var("INTENSIVE_CHECK_INTERVAL", "900");
    let err = MonitorConfig::load(Some(&p)).unwrap_err();
    env::remove_var("INTENSIVE_CHECK_INTERVAL");

    assert_eq!(err.kind(), "configuration");
}

#[serial]
#[test]
fn missing_explicit_file_is_fatal() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    assert!(MonitorConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
}
