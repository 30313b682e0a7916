//! Verify XML config is parsed and used without touching user state.

use std::fs;
use std::time::Duration;
use tempfile::tempdir;

use drive_dedupe::{LogLevel, load_config_from_xml_path};

#[test]
fn reads_config_xml_and_applies_values() {
    let td = tempdir().expect("create tempdir");

    let cfg_path = td.path().join("config.xml");
    let output_dir = td.path().join("out");
    let snapshot = td.path().join("drive.json");
    let log_file = td.path().join("drive_dedupe.log");

    let xml = format!(
        r#"
<config>
  <output_dir>{}</output_dir>
  <quarantine_path>/Trash/dupes</quarantine_path>
  <batch_size> 25 </batch_size>
  <exclude>/Backups</exclude>
  <exclude>/Shared/Old</exclude>
  <scan_path>/Photos</scan_path>
  <root_id>0AbCdEf</root_id>
  <store_snapshot>{}</store_snapshot>
  <retry_attempts>3</retry_attempts>
  <retry_base_ms>250</retry_base_ms>
  <batch_window_ms>2000</batch_window_ms>
  <log_level>info</log_level>
  <log_file>{}</log_file>
</config>
"#,
        output_dir.display(),
        snapshot.display(),
        log_file.display()
    );
    fs::write(&cfg_path, xml).expect("write config.xml");

    let cfg = load_config_from_xml_path(&cfg_path).expect("load_config_from_xml_path");

    assert_eq!(cfg.output_dir, output_dir);
    assert_eq!(cfg.quarantine_path, "/Trash/dupes");
    assert_eq!(cfg.batch_size, 25, "numeric fields tolerate whitespace");
    assert_eq!(cfg.exclude, vec!["/Backups".to_string(), "/Shared/Old".to_string()]);
    assert_eq!(cfg.scan_path.as_deref(), Some("/Photos"));
    assert_eq!(cfg.root_id, "0AbCdEf");
    assert_eq!(cfg.store_snapshot.as_deref(), Some(snapshot.as_path()));
    assert_eq!(cfg.retry_attempts, 3);
    assert_eq!(cfg.retry_base, Duration::from_millis(250));
    assert_eq!(cfg.batch_window, Duration::from_secs(2));
    assert_eq!(cfg.log_level, LogLevel::Info);
    assert_eq!(cfg.log_file.as_deref(), Some(log_file.as_path()));

    let policy = cfg.retry_policy();
    assert_eq!(policy.max_attempts, 3);
    let filter = cfg.scan_scope().filter();
    assert!(filter.is_excluded("/Backups/x.jpg"));
    assert!(!filter.in_scope("/Music/a.mp3"));
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");
    fs::write(&cfg_path, "<config><quarantine_path>/q</quarantine_path></config>").unwrap();

    let cfg = load_config_from_xml_path(&cfg_path).unwrap();
    assert_eq!(cfg.quarantine_path, "/q");
    assert_eq!(cfg.batch_size, 100);
    assert_eq!(cfg.root_id, "root");
    assert!(cfg.exclude.is_empty());
    assert!(cfg.store_snapshot.is_none());
    assert_eq!(cfg.log_level, LogLevel::Normal);
}

#[test]
fn malformed_xml_names_the_file() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("broken.xml");
    fs::write(&cfg_path, "<config><batch_size>1</config>").unwrap();

    let err = load_config_from_xml_path(&cfg_path).unwrap_err();
    assert!(format!("{err:#}").contains("broken.xml"), "{err:#}");
}

#[test]
fn invalid_log_level_is_rejected() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");
    fs::write(&cfg_path, "<config><log_level>chatty</log_level></config>").unwrap();
    assert!(load_config_from_xml_path(&cfg_path).is_err());
}
