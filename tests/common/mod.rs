//! Common test helpers for integration tests
//!
//! This module provides utilities for setting up isolated test environments,
//! building baselines and sources, and asserting on audit-store state across
//! all integration tests.

#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use posture::{
    AuditStore, Baseline, BaselineBuilder, BaselineEntry, BaselineRegistry, CompareMode, Engine,
    InMemorySource, RetryPolicy, Scope, ScopeKind, SettingValue,
};

pub const TENANT: &str = "contoso";

/// Test environment with an isolated data directory
///
/// Each TestEnv creates a unique temporary directory holding the audit
/// database and any baseline documents. Everything is removed when the
/// TestEnv is dropped.
pub struct TestEnv {
    /// Temporary directory (kept alive until drop)
    temp_dir: TempDir,

    /// File-backed audit store inside the temp dir
    store: AuditStore,
}

impl TestEnv {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let store = AuditStore::open(temp_dir.path())?;
        Ok(Self { temp_dir, store })
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store(&self) -> AuditStore {
        self.store.clone()
    }

    /// Reopen the database from disk, as a later process would
    pub fn reopen_store(&self) -> Result<AuditStore> {
        AuditStore::open(self.temp_dir.path())
    }

    /// Write a baseline document under `<data dir>/baselines`
    pub fn write_baseline(&self, file_name: &str, content: &str) -> Result<PathBuf> {
        let dir = self.baseline_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(file_name);
        fs::write(&path, content)?;
        Ok(path)
    }

    pub fn baseline_dir(&self) -> PathBuf {
        self.temp_dir.path().join("baselines")
    }

    /// Engine over `source` with the given baseline registered and this env's store attached
    pub fn engine(&self, source: Arc<InMemorySource>, baseline: Baseline) -> Engine {
        let mut registry = BaselineRegistry::new();
        registry.insert(baseline).unwrap();
        Engine::new(source, registry)
            .unwrap()
            .with_retry(fast_retry())
            .with_store(self.store())
    }
}

pub fn tenant() -> Scope {
    Scope::tenant(TENANT)
}

pub fn site_url(name: &str) -> String {
    format!("https://contoso.sharepoint.com/sites/{}", name)
}

pub fn site(name: &str) -> Scope {
    Scope::site(site_url(name))
}

pub fn enum_value(s: &str) -> SettingValue {
    SettingValue::Enum(s.to_string())
}

/// Retries quickly so failure-path tests stay fast
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    }
}

/// Tenant and site expectations exercising every comparison mode and risk rule shape
pub fn strict_baseline() -> Baseline {
    BaselineBuilder::new("strict", "2.1")
        .tenant("sharingCapability", enum_value("Disabled"), CompareMode::Equals, 10.0)
        .tenant("legacyAuthProtocolsEnabled", SettingValue::Bool(false), CompareMode::Equals, 5.0)
        .site("externalResharing", SettingValue::Bool(false), CompareMode::Equals, 2.0)
        .site("anonymousLinkExpirationInDays", SettingValue::Int(30), CompareMode::MaxBound, 3.0)
        .entry(
            BaselineEntry::new(
                ScopeKind::Site,
                "sharingCapability",
                enum_value("Disabled"),
                CompareMode::Equals,
                5.0,
            )
            .depends_on("sharingCapability"),
        )
        .build()
        .unwrap()
}

/// Site settings violating every site entry of `strict_baseline`
pub fn open_site_settings() -> Vec<(&'static str, SettingValue)> {
    vec![
        ("sharingCapability", enum_value("ExternalUserAndGuestSharing")),
        ("externalResharing", SettingValue::Bool(true)),
        ("anonymousLinkExpirationInDays", SettingValue::Int(365)),
    ]
}

/// Site settings satisfying every site entry of `strict_baseline`
pub fn locked_site_settings() -> Vec<(&'static str, SettingValue)> {
    vec![
        ("sharingCapability", enum_value("Disabled")),
        ("externalResharing", SettingValue::Bool(false)),
        ("anonymousLinkExpirationInDays", SettingValue::Int(7)),
    ]
}

pub fn open_tenant_settings() -> Vec<(&'static str, SettingValue)> {
    vec![
        ("sharingCapability", enum_value("ExternalUserAndGuestSharing")),
        ("legacyAuthProtocolsEnabled", SettingValue::Bool(true)),
    ]
}
