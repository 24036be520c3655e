//! Config loading, validation and live reload.

mod common;

use std::io::Write;
use std::sync::Arc;

use common::Recorder;
use sw_core::config::Config;
use sw_scheduler::handler::Handlers;
use sw_scheduler::{ActiveScans, ConfigStore, Scheduler, SchedulerContext};

fn write_config(file: &tempfile::NamedTempFile, json: &str) {
    std::fs::write(file.path(), json).unwrap();
}

#[test]
fn empty_file_yields_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{}").unwrap();

    let config = Config::load_or_default(Some(file.path()));
    assert_eq!(config, Config::default());
    assert!(config.validate().is_empty());
}

#[test]
fn partial_file_keeps_other_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"{"scheduler": {"primary_capacity": 3, "cooldown_secs": 10}}"#)
        .unwrap();

    let config = Config::load_or_default(Some(file.path()));
    assert_eq!(config.scheduler.primary_capacity, 3);
    assert_eq!(config.scheduler.throttle_secs, 30);
    assert!(config.stages.media_info);
    assert_eq!(config.scheduler.cooldown_for(config.scheduler.primary()), None);
    assert!(config
        .validate()
        .iter()
        .any(|w| w.contains("cooldown_secs")));
}

#[test]
fn invalid_file_falls_back_to_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{ not json").unwrap();
    assert_eq!(Config::load_or_default(Some(file.path())), Config::default());
}

#[tokio::test]
async fn reload_applies_secondary_capacity_live() {
    let file = tempfile::NamedTempFile::new().unwrap();
    write_config(&file, "{}");

    let store = Arc::new(ConfigStore::new(
        &Config::default(),
        Some(file.path().to_path_buf()),
    ));
    let handlers = Handlers::uniform(Arc::new(Recorder::new()));
    let ctx = SchedulerContext::new(store, handlers, Arc::new(ActiveScans::new()));
    let scheduler = Scheduler::new(ctx.clone());

    write_config(
        &file,
        r#"{
            "scheduler": {"primary_capacity": 2, "secondary_capacity": 4},
            "stages": {"episode_refresh": true}
        }"#,
    );
    assert!(scheduler.reload_config());

    assert_eq!(ctx.secondary.capacity(), 4);
    assert_eq!(ctx.primary.capacity(), 1);
    assert!(ctx.config.stages().episode_refresh);

    write_config(&file, "{ broken");
    assert!(!scheduler.reload_config());
    assert_eq!(ctx.config.scheduler().secondary_capacity, 4);
}
