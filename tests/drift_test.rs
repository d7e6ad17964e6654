//! Drift across runs
//!
//! Snapshots are persisted per run, so a later process opening the same
//! data directory compares against what the previous one captured.

mod common;

use std::sync::Arc;

use common::*;
use posture::{BaselineRegistry, Engine, InMemorySource, RemediationMode, RunRequest, SettingValue};

fn engine_on_disk(env: &TestEnv, source: Arc<InMemorySource>) -> Engine {
    let mut registry = BaselineRegistry::new();
    registry.insert(strict_baseline()).unwrap();
    Engine::new(source, registry)
        .unwrap()
        .with_retry(fast_retry())
        .with_store(env.reopen_store().unwrap())
}

#[tokio::test]
async fn test_drift_survives_reopening_the_store() {
    let env = TestEnv::new().unwrap();
    let source = Arc::new(
        InMemorySource::new()
            .with_scope(site("hr"), open_site_settings())
            .with_scope(site("legal"), locked_site_settings()),
    );
    let request = RunRequest::new("strict", RemediationMode::ReportOnly)
        .with_sites([site_url("hr"), site_url("legal")]);

    let first = engine_on_disk(&env, source.clone()).run(&request).await.unwrap();
    assert!(first.drift.is_empty());

    source.set_value(&site("hr"), "externalResharing", SettingValue::Bool(false));
    source.set_value(&site("hr"), "customScriptsAllowed", SettingValue::Bool(true));

    let second = engine_on_disk(&env, source).run(&request).await.unwrap();

    // One report per scope with a previous snapshot, in scope order
    assert_eq!(second.drift.len(), 2);
    let hr = second.drift.iter().find(|d| d.scope == site("hr")).unwrap();
    assert!(hr.has_drift());
    assert_eq!(hr.changed.len(), 1);
    assert_eq!(hr.changed[0].key, "externalResharing");
    assert_eq!(hr.changed[0].before, SettingValue::Bool(true));
    assert_eq!(hr.changed[0].after, SettingValue::Bool(false));
    assert_eq!(hr.added, vec![("customScriptsAllowed".to_string(), SettingValue::Bool(true))]);
    assert!(hr.removed.is_empty());

    let legal = second.drift.iter().find(|d| d.scope == site("legal")).unwrap();
    assert!(!legal.has_drift());
}

#[tokio::test]
async fn test_unreachable_scope_keeps_older_snapshot() {
    let env = TestEnv::new().unwrap();
    let source = Arc::new(InMemorySource::new().with_scope(site("hr"), open_site_settings()));
    let request = RunRequest::new("strict", RemediationMode::ReportOnly).with_sites([site_url("hr")]);

    engine_on_disk(&env, source.clone()).run(&request).await.unwrap();

    source.set_unreachable(&site("hr"));
    let second = engine_on_disk(&env, source.clone()).run(&request).await.unwrap();
    assert!(second.drift.is_empty());
    assert!(!second.site_results[0].reachable);

    // Third run compares against the first run's capture
    let source = Arc::new(
        InMemorySource::new().with_scope(site("hr"), {
            let mut settings = open_site_settings();
            settings.retain(|(key, _)| *key != "anonymousLinkExpirationInDays");
            settings
        }),
    );
    let third = engine_on_disk(&env, source).run(&request).await.unwrap();
    assert_eq!(third.drift.len(), 1);
    let removed: Vec<&str> = third.drift[0].removed.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(removed, vec!["anonymousLinkExpirationInDays"]);
}
