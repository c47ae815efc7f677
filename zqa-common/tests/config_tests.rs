//! Unit tests for configuration resolution and graceful degradation
//!
//! Tests that touch XDG_CONFIG_HOME are marked #[serial] so they never
//! race each other on the process environment.

use serial_test::serial;
use std::path::PathBuf;
use zqa_common::config::{
    load_toml_config, BlobBackend, CompiledDefaults, ConfigOverrides, ServiceConfig, TomlConfig,
    DEFAULT_ACCEPTED_EXTENSION, DEFAULT_BIND_ADDR, DEFAULT_MAX_UNCOMPRESSED_BYTES,
    DEFAULT_MAX_UPLOAD_BYTES,
};
use zqa_common::Error;

fn test_defaults() -> CompiledDefaults {
    CompiledDefaults {
        data_dir: PathBuf::from("/var/lib/zqa-test"),
        bind_addr: DEFAULT_BIND_ADDR.to_string(),
        log_level: "info".to_string(),
    }
}

#[test]
fn test_compiled_defaults_when_nothing_configured() {
    let config =
        ServiceConfig::merge(&ConfigOverrides::default(), TomlConfig::default(), test_defaults())
            .unwrap();

    assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
    assert_eq!(config.database_path, PathBuf::from("/var/lib/zqa-test/zqa.db"));
    assert_eq!(config.blob_root, PathBuf::from("/var/lib/zqa-test/blobs"));
    assert_eq!(config.blob_backend, BlobBackend::Fs);
    assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    assert_eq!(config.max_upload_bytes, 104_857_600);
    assert_eq!(config.max_uncompressed_bytes, DEFAULT_MAX_UNCOMPRESSED_BYTES);
    assert_eq!(config.accepted_extension, DEFAULT_ACCEPTED_EXTENSION);
    assert!(config.auth_tokens.is_empty());
    assert!(!config.auth_enabled());
    assert_eq!(config.log_level, "info");
}

#[test]
fn test_overrides_take_priority_over_toml() {
    let toml_config = TomlConfig {
        bind_addr: Some("127.0.0.1:9000".to_string()),
        max_upload_bytes: Some(1024),
        auth_tokens: Some(vec!["from-toml".to_string()]),
        ..Default::default()
    };
    let overrides = ConfigOverrides {
        bind_addr: Some("0.0.0.0:8000".to_string()),
        auth_tokens: Some(vec!["from-cli".to_string()]),
        ..Default::default()
    };

    let config = ServiceConfig::merge(&overrides, toml_config, test_defaults()).unwrap();

    assert_eq!(config.bind_addr, "0.0.0.0:8000");
    // Not overridden: TOML value wins over the default
    assert_eq!(config.max_upload_bytes, 1024);
    assert_eq!(config.auth_tokens, vec!["from-cli".to_string()]);
    assert!(config.auth_enabled());
}

#[test]
fn test_accepted_extension_is_normalized() {
    let toml_config = TomlConfig {
        accepted_extension: Some(" .ZIP ".to_string()),
        ..Default::default()
    };

    let config =
        ServiceConfig::merge(&ConfigOverrides::default(), toml_config, test_defaults()).unwrap();

    assert_eq!(config.accepted_extension, "zip");
}

#[test]
fn test_blank_auth_tokens_are_dropped() {
    let overrides = ConfigOverrides {
        auth_tokens: Some(vec!["  ".to_string(), String::new()]),
        ..Default::default()
    };

    let config = ServiceConfig::merge(&overrides, TomlConfig::default(), test_defaults()).unwrap();

    assert!(!config.auth_enabled());
}

#[test]
fn test_invalid_bind_addr_rejected() {
    let overrides = ConfigOverrides {
        bind_addr: Some("not-an-address".to_string()),
        ..Default::default()
    };

    let result = ServiceConfig::merge(&overrides, TomlConfig::default(), test_defaults());

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_zero_upload_cap_rejected() {
    let overrides = ConfigOverrides {
        max_upload_bytes: Some(0),
        ..Default::default()
    };

    let result = ServiceConfig::merge(&overrides, TomlConfig::default(), test_defaults());

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_zero_uncompressed_ceiling_rejected() {
    let toml_config = TomlConfig {
        max_uncompressed_bytes: Some(0),
        ..Default::default()
    };

    let result = ServiceConfig::merge(&ConfigOverrides::default(), toml_config, test_defaults());

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_blob_backend_from_str() {
    assert_eq!("fs".parse::<BlobBackend>().unwrap(), BlobBackend::Fs);
    assert_eq!("Memory".parse::<BlobBackend>().unwrap(), BlobBackend::Memory);
    assert!("s3".parse::<BlobBackend>().is_err());
}

#[test]
fn test_load_toml_config_parses_all_sections() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("zqa-ts.toml");
    std::fs::write(
        &path,
        r#"
bind_addr = "127.0.0.1:6000"
blob_backend = "memory"
max_upload_bytes = 2048
max_uncompressed_bytes = 8192
auth_tokens = ["a", "b"]

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.bind_addr.as_deref(), Some("127.0.0.1:6000"));
    assert_eq!(config.blob_backend, Some(BlobBackend::Memory));
    assert_eq!(config.max_upload_bytes, Some(2048));
    assert_eq!(config.max_uncompressed_bytes, Some(8192));
    assert_eq!(config.auth_tokens, Some(vec!["a".to_string(), "b".to_string()]));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "bind_addr = [unterminated").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
fn test_explicit_missing_config_file_is_error() {
    let overrides = ConfigOverrides {
        config_path: Some(PathBuf::from("/nonexistent/zqa-ts.toml")),
        ..Default::default()
    };

    assert!(matches!(ServiceConfig::resolve(&overrides), Err(Error::Config(_))));
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_resolve_without_config_file_uses_defaults() {
    let temp_dir = tempfile::tempdir().unwrap();
    std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());

    let config = ServiceConfig::resolve(&ConfigOverrides::default()).unwrap();

    assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
    assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);

    std::env::remove_var("XDG_CONFIG_HOME");
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_resolve_reads_default_config_location() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_dir = temp_dir.path().join("zqa");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("zqa-ts.toml"), "max_upload_bytes = 4096\n").unwrap();
    std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());

    let config = ServiceConfig::resolve(&ConfigOverrides::default()).unwrap();

    assert_eq!(config.max_upload_bytes, 4096);

    std::env::remove_var("XDG_CONFIG_HOME");
}
