// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serial_test::serial;
use yare::parameterized;

use super::*;

const FULL: &str = r#"
listen_tcp = "127.0.0.1:7001"
listen_unix = "/run/ampd.sock"
log_dir = "/var/log/ampd"
idle_timeout_ms = 30000

[tls]
cert = "server.pem"
key = "server.key"
"#;

fn clear_env() {
    for var in ["AMPD_CONFIG", "AMPD_TCP", "AMPD_UNIX", "AMPD_LOG_DIR", "AMPD_IDLE_TIMEOUT_MS", "AMPD_DRAIN_TIMEOUT_MS"] {
        std::env::remove_var(var);
    }
}

#[test]
fn parses_every_field() {
    let config = Config::parse(FULL).unwrap();
    assert_eq!(config.listen_tcp, Some("127.0.0.1:7001".parse().unwrap()));
    assert_eq!(config.listen_unix, Some(PathBuf::from("/run/ampd.sock")));
    assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/ampd")));
    assert_eq!(config.idle_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(config.drain_timeout(), env::DEFAULT_DRAIN_TIMEOUT);
    assert_eq!(
        config.tls,
        Some(TlsConfig { cert: PathBuf::from("server.pem"), key: PathBuf::from("server.key") })
    );
}

#[test]
fn empty_file_is_all_defaults() {
    assert_eq!(Config::parse("").unwrap(), Config::default());
}

#[parameterized(
    unknown_key = { "listen = \"x\"" },
    bad_address = { "listen_tcp = \"nowhere\"" },
    tls_without_key = { "[tls]\ncert = \"a.pem\"" },
)]
fn rejects_invalid_files(text: &str) {
    assert!(Config::parse(text).is_err());
}

#[test]
fn zero_idle_timeout_disables_it() {
    let config = Config { idle_timeout_ms: Some(0), ..Config::default() };
    assert_eq!(config.idle_timeout(), None);
}

#[test]
#[serial]
fn environment_overrides_the_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ampd.toml");
    std::fs::write(&path, FULL).unwrap();
    std::env::set_var("AMPD_TCP", "0.0.0.0:9000");
    std::env::set_var("AMPD_DRAIN_TIMEOUT_MS", "250");

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.listen_tcp, Some("0.0.0.0:9000".parse().unwrap()));
    assert_eq!(config.listen_unix, Some(PathBuf::from("/run/ampd.sock")));
    assert_eq!(config.drain_timeout(), Duration::from_millis(250));
    clear_env();
}

#[test]
#[serial]
fn config_path_comes_from_the_environment() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ampd.toml");
    std::fs::write(&path, "listen_tcp = \"127.0.0.1:7002\"").unwrap();
    std::env::set_var("AMPD_CONFIG", &path);

    let config = Config::load(None).unwrap();
    assert_eq!(config.listen_tcp, Some("127.0.0.1:7002".parse().unwrap()));
    assert_eq!(config.listen_unix, None);
    clear_env();
}

#[test]
#[serial]
fn defaults_to_a_unix_socket_in_the_state_dir() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("AMPD_STATE_DIR", dir.path());

    let config = Config::load(None).unwrap();
    assert_eq!(config.listen_unix, Some(dir.path().join("ampd.sock")));
    std::env::remove_var("AMPD_STATE_DIR");
}

#[test]
#[serial]
fn missing_file_names_the_path() {
    clear_env();
    let err = Config::load(Some(Path::new("/nonexistent/ampd.toml"))).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/ampd.toml"));
}

#[test]
fn flags_win_over_everything() {
    let config = Config::parse(FULL)
        .unwrap()
        .with_flags(Some("127.0.0.1:1".parse().unwrap()), None);
    assert_eq!(config.listen_tcp, Some("127.0.0.1:1".parse().unwrap()));
    assert_eq!(config.listen_unix, Some(PathBuf::from("/run/ampd.sock")));
}
