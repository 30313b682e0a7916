//! DRIVE_DEDUPE_CONFIG resolution. Every test mutates process env, so all run serially.

use drive_dedupe::config::{CONFIG_ENV, LoadResult, config_path, load_or_init};
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

fn set_env(value: &std::path::Path) {
    unsafe {
        std::env::set_var(CONFIG_ENV, value);
    }
}

fn clear_env() {
    unsafe {
        std::env::remove_var(CONFIG_ENV);
    }
}

#[test]
#[serial]
fn env_override_directory_appends_config_xml() {
    let td = tempdir().unwrap();
    let base = fs::canonicalize(td.path()).unwrap();
    set_env(&base);

    let cfg_path = config_path().expect("config_path");
    assert!(
        cfg_path.ends_with("config.xml"),
        "expected config.xml appended; got {}",
        cfg_path.display()
    );
    assert_eq!(cfg_path.parent().unwrap(), base.as_path());

    clear_env();
}

#[test]
#[serial]
fn relative_env_path_is_taken_against_cwd() {
    let td = tempdir().unwrap();
    let base = fs::canonicalize(td.path()).unwrap();
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(&base).expect("chdir to temp base");
    set_env(std::path::Path::new("rel_config.xml"));

    let cfg_path = config_path().expect("config_path");
    std::env::set_current_dir(prev).unwrap();
    clear_env();

    assert_eq!(cfg_path, base.join("rel_config.xml"));
}

#[test]
#[serial]
fn env_file_is_loaded() {
    let td = tempdir().unwrap();
    let cfg_file = td.path().join("custom.xml");
    fs::write(
        &cfg_file,
        "<config><quarantine_path>/_review</quarantine_path><batch_size>7</batch_size></config>",
    )
    .unwrap();
    set_env(&cfg_file);

    let result = load_or_init();
    clear_env();

    match result.expect("load_or_init") {
        LoadResult::Loaded(cfg, path) => {
            assert_eq!(path, cfg_file);
            assert_eq!(cfg.quarantine_path, "/_review");
            assert_eq!(cfg.batch_size, 7);
        }
        other => panic!("expected Loaded, got {other:?}"),
    }
}

#[test]
#[serial]
fn missing_env_file_is_an_error_and_no_template_is_written() {
    let td = tempdir().unwrap();
    let cfg_file = td.path().join("nope").join("config.xml");
    set_env(&cfg_file);

    let result = load_or_init();
    clear_env();

    let err = result.expect_err("missing explicit config must fail");
    assert!(format!("{err}").contains(CONFIG_ENV), "{err}");
    assert!(!cfg_file.exists());
}
