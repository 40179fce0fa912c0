use backdrop_sync::config::Configuration;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
folder-name: "Wallpapers"
folder-owner: "bob"
change-interval: 90m
cache-ttl: 2days
min-ratio: 130
max-ratio: 250
seed: 42
sync: true
config-dir: /etc/backdrop
cache-dir: /var/cache/backdrop
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.folder_name, "Wallpapers");
    assert_eq!(cfg.folder_owner.as_deref(), Some("bob"));
    assert_eq!(cfg.change_interval, Duration::from_secs(90 * 60));
    assert_eq!(cfg.cache_ttl, Duration::from_secs(2 * 24 * 60 * 60));
    assert_eq!((cfg.min_ratio, cfg.max_ratio), (130, 250));
    assert_eq!(cfg.seed, Some(42));
    assert!(cfg.sync);
    assert_eq!(cfg.config_dir, PathBuf::from("/etc/backdrop"));
    assert_eq!(cfg.cache_dir, PathBuf::from("/var/cache/backdrop"));
}

#[test]
fn options_are_derived_from_config() {
    let yaml = r#"
change-interval: 1h
cache-ttl: 6h
min-ratio: 150
seed: 3
sync: true
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let run = cfg.run_options(true, false);
    assert_eq!(run.pick.expiry, Duration::from_secs(3600));
    assert_eq!(run.pick.min_ratio, 150);
    assert!(run.pick.force);
    assert!(!run.refresh_cache);
    assert_eq!(run.cache_ttl, Duration::from_secs(6 * 3600));
    assert_eq!(run.seed, Some(3));
    assert!(run.sync);
}

#[test]
fn zero_interval_is_rejected() {
    let cfg: Configuration = serde_yaml::from_str("change-interval: 0s").unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(err.to_string().contains("change-interval"));
}

#[test]
fn callback_path_must_be_absolute() {
    let yaml = r#"
auth:
  callback-path: oauthcallback
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn unknown_duration_is_a_parse_error() {
    assert!(serde_yaml::from_str::<Configuration>("cache-ttl: soon").is_err());
}

#[test]
fn missing_file_yields_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = Configuration::from_yaml_file(tmp.path().join("absent.yaml")).unwrap();
    assert_eq!(cfg.folder_name, "desktop backgrounds");
    assert_eq!(cfg.seed, None);
    assert!(!cfg.sync);
}

#[test]
fn file_is_read_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.yaml");
    std::fs::write(&path, "folder-name: Space\nauth:\n  client-id: xyz\n").unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap().validated().unwrap();
    assert_eq!(cfg.folder_name, "Space");
    assert_eq!(cfg.auth.client_id, "xyz");
}

#[test]
fn connect_requires_a_client_id() {
    let Err(err) = Configuration::default().connect() else {
        panic!("connected without a client id");
    };
    assert!(err.to_string().contains("client-id"), "{err}");
}
