use std::fs;

use fancy_record::{Config, ConfigBase, Error, FileConfig, MappingConfig, Record, Value};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Record)]
#[record(extends(ConfigBase))]
struct ScopedSettings {
    level: i64,
}

impl Config for ScopedSettings {}

#[derive(Debug, Clone, PartialEq, Record)]
#[record(extends(ConfigBase))]
struct ClearedSettings {
    level: i64,
}

impl Config for ClearedSettings {}

#[derive(Debug, Clone, PartialEq, Record)]
#[record(extends(ConfigBase))]
struct AppConfig {
    name: String,
    #[record(default = 4)]
    workers: i64,
    debug: Option<bool>,
}

impl Config for AppConfig {}

fn write(dir: &TempDir, file: &str, text: &str) -> std::path::PathBuf {
    let path = dir.path().join(file);
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn guards_restore_the_previous_value() {
    ScopedSettings { level: 1 }.update_config();
    {
        let guard = ScopedSettings { level: 2 }.as_config();
        assert_eq!(guard.level, 2);
        assert_eq!(ScopedSettings::get_config().unwrap().level, 2);
        {
            let _inner = ScopedSettings { level: 3 }.as_config();
            assert_eq!(ScopedSettings::get_config().unwrap().level, 3);
        }
        assert_eq!(ScopedSettings::get_config().unwrap().level, 2);
    }
    assert_eq!(ScopedSettings::get_config().unwrap().level, 1);
}

#[test]
fn snapshots_outlive_updates() {
    let before = ClearedSettings { level: 1 }.update_config();
    ClearedSettings { level: 2 }.update_config();
    assert_eq!(before.level, 1);
    assert_eq!(ClearedSettings::get_config().unwrap().level, 2);

    ClearedSettings::clear_config();
    assert!(ClearedSettings::get_config().is_none());
    {
        let _guard = ClearedSettings { level: 5 }.as_config();
        assert_eq!(ClearedSettings::get_config().unwrap().level, 5);
    }
    assert!(ClearedSettings::get_config().is_none());
}

#[test]
fn records_load_from_json_and_toml() {
    let dir = TempDir::new().unwrap();
    let json = write(&dir, "app.json", r#"{"name": "svc", "debug": true}"#);
    let toml = write(&dir, "app.TOML", "name = \"svc\"\nworkers = 8\n");

    let from_json = AppConfig::read_config_file(&json).unwrap();
    assert_eq!(
        from_json,
        AppConfig {
            name: "svc".to_string(),
            workers: 4,
            debug: Some(true),
        }
    );

    let loaded = AppConfig::load_config(&toml).unwrap();
    assert_eq!(loaded.workers, 8);
    assert_eq!(loaded.debug, None);
    assert_eq!(AppConfig::get_config().unwrap().workers, 8);
}

#[test]
fn unknown_extensions_are_rejected() {
    let dir = TempDir::new().unwrap();
    let yaml = write(&dir, "app.yaml", "name: svc\n");
    let err = AppConfig::read_config_file(&yaml).unwrap_err();
    assert!(matches!(&err, Error::ConfigFormat { .. }), "{err}");
    assert!(err.to_string().contains("unknown extension `.yaml`"), "{err}");

    let bare = write(&dir, "app", "{}");
    assert!(matches!(
        AppConfig::read_config_file(&bare),
        Err(Error::ConfigFormat { .. })
    ));
}

#[test]
fn missing_files_are_io_errors() {
    let dir = TempDir::new().unwrap();
    let err = AppConfig::read_config_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, Error::Io(_)), "{err}");
}

#[test]
fn untyped_configuration_keeps_the_whole_mapping() {
    let dir = TempDir::new().unwrap();
    let toml = write(&dir, "raw.toml", "answer = 42\n\n[nested]\nflag = true\n");
    let config = MappingConfig::load_config(&toml).unwrap();
    assert_eq!(config["answer"], Value::Int(42));
    assert_eq!(
        config.get("nested").and_then(|nested| nested.get("flag")),
        Some(&Value::Bool(true))
    );
    assert_eq!(MappingConfig::get_config().unwrap().len(), 2);

    let list = write(&dir, "raw.json", "[1, 2]");
    let err = MappingConfig::read_config_file(&list).unwrap_err();
    assert!(err.to_string().contains("top level is a list"), "{err}");
}
