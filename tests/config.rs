use std::{net::SocketAddr, path::PathBuf};

use obs_scheduler::config::{ConfigError, Settings};

#[test]
fn defaults_match_a_local_install() {
    let settings = Settings::default();
    assert_eq!(settings.database_path, PathBuf::from("data.db"));
    assert_eq!(settings.bind_addr, SocketAddr::from(([127, 0, 0, 1], 8000)));
    assert_eq!(settings.control.host, "localhost");
    assert_eq!(settings.control.port, 4455);
    assert!(settings.runtime_config().flush_every_op);
}

#[test]
fn prefixed_environment_overrides_apply() {
    let mut settings = Settings::default();
    settings
        .apply_overrides([
            ("OBS_SCHEDULER_DATABASE_PATH", "/var/lib/sched.db"),
            ("OBS_SCHEDULER_BIND_ADDR", "0.0.0.0:9000"),
            ("OBS_SCHEDULER_OBS_HOST", "obs.local"),
            ("OBS_SCHEDULER_OBS_PORT", "4456"),
            ("OBS_SCHEDULER_OBS_PASSWORD", "secret"),
            ("PATH", "/usr/bin"),
            ("OBS_SCHEDULER_UNKNOWN", "ignored"),
        ])
        .expect("overrides");

    assert_eq!(settings.database_path, PathBuf::from("/var/lib/sched.db"));
    assert_eq!(settings.bind_addr, SocketAddr::from(([0, 0, 0, 0], 9000)));
    assert_eq!(settings.control.host, "obs.local");
    assert_eq!(settings.control.port, 4456);
}

#[test]
fn control_section_holds_only_the_endpoint() {
    let mut settings = Settings::default();
    settings
        .apply_overrides([
            ("OBS_SCHEDULER_OBS_PASSWORD", "secret"),
            ("OBS_SCHEDULER_SERVER_VIDEO_DIR", "/srv/media"),
            ("OBS_SCHEDULER_OBS_VIDEO_DIR", "C:/media"),
        ])
        .expect("overrides");
    assert_eq!(settings, Settings::default());

    let parsed = toml::from_str::<Settings>("[control]\npassword = \"secret\"\n");
    assert!(parsed.is_ok(), "unknown keys are ignored: {parsed:?}");
    let rendered = toml::to_string(&settings).expect("serialize");
    assert!(!rendered.contains("password"));
    assert!(!rendered.contains("video_dir"));
}

#[test]
fn unparsable_override_is_rejected() {
    let mut settings = Settings::default();
    let err = settings
        .apply_overrides([("OBS_SCHEDULER_OBS_PORT", "not-a-port")])
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "OBS_SCHEDULER_OBS_PORT"));
    assert_eq!(settings.control.port, 4455);
}

#[test]
fn toml_file_fills_missing_keys_with_defaults() {
    let tmp = tempfile::TempDir::new().expect("tmp");
    let path = tmp.path().join("obs-scheduler.toml");
    std::fs::write(
        &path,
        r#"
database_path = "contest.db"

[runtime]
flush_every_op = false
batch_max_ops = 0

[control]
port = 4460
"#,
    )
    .expect("write");

    let settings = Settings::from_file(&path).expect("load");
    assert_eq!(settings.database_path, PathBuf::from("contest.db"));
    assert_eq!(settings.bind_addr, Settings::default().bind_addr);
    assert_eq!(settings.control.port, 4460);
    assert_eq!(settings.control.host, "localhost");

    let rc = settings.runtime_config();
    assert!(!rc.flush_every_op);
    assert_eq!(rc.batch_max_ops, 1);
}

#[test]
fn broken_files_report_read_and_parse_errors() {
    let tmp = tempfile::TempDir::new().expect("tmp");

    let err = Settings::from_file(tmp.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));

    let path = tmp.path().join("bad.toml");
    std::fs::write(&path, "database_path = [").expect("write");
    let err = Settings::from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}
