use std::io::Write;

use serial_test::serial;

use super::{DEFAULT_MAX_FRAME_SIZE, Settings, load_config_from};
use crate::codec::{PayloadEncoding, WireProfile};

fn write_toml(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.name, "topicbus");
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.server.port, 9090);
    assert_eq!(settings.server.wire_profile, WireProfile::Raw);
    assert_eq!(settings.server.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    assert_eq!(settings.client.host, "127.0.0.1");
    assert_eq!(settings.client.port, 9090);
    assert_eq!(settings.client.payload_encoding, PayloadEncoding::Binary);
    assert_eq!(settings.logging.level, "info");
}

#[test]
#[serial]
fn test_missing_file_gives_defaults() {
    let settings = load_config_from("does/not/exist").unwrap();
    assert_eq!(settings, Settings::default());
}

#[test]
#[serial]
fn test_partial_file_is_merged_with_defaults() {
    let file = write_toml(
        r#"
[server]
port = 7000
wire_profile = "structured"

[client]
payload_encoding = "json"
"#,
    );

    let settings = load_config_from(file.path().to_str().unwrap()).unwrap();
    assert_eq!(settings.server.port, 7000);
    assert_eq!(settings.server.wire_profile, WireProfile::Structured);
    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.client.payload_encoding, PayloadEncoding::Json);
    assert_eq!(settings.client.port, 9090);
    assert_eq!(settings.logging.level, "info");
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = write_toml(
        r#"
[server]
port = 7000
name = "from-file"
"#,
    );

    temp_env::with_vars(
        [
            ("TOPICBUS__SERVER__PORT", Some("9500")),
            ("TOPICBUS__LOGGING__LEVEL", Some("debug")),
        ],
        || {
            let settings = load_config_from(file.path().to_str().unwrap()).unwrap();
            assert_eq!(settings.server.port, 9500);
            assert_eq!(settings.server.name, "from-file");
            assert_eq!(settings.logging.level, "debug");
        },
    );
}

#[test]
#[serial]
fn test_invalid_profile_is_an_error() {
    temp_env::with_var("TOPICBUS__SERVER__WIRE_PROFILE", Some("compressed"), || {
        assert!(load_config_from("does/not/exist").is_err());
    });
}
