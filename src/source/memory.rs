//! In-memory setting source
//!
//! Backs the binary's offline mode (settings loaded from a JSON state file)
//! and the test suites. Supports injected read/write failures, artificial
//! latency and in-flight tracking so concurrency bounds can be observed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::SettingSource;
use crate::error::SourceError;
use crate::models::{Scope, SettingSnapshot, SettingValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadFailure {
    Unreachable,
    PermissionDenied,
}

/// A write observed by the source, in call order
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub scope: Scope,
    pub key: String,
    pub value: SettingValue,
}

#[derive(Default)]
struct State {
    settings: HashMap<Scope, BTreeMap<String, SettingValue>>,
    read_failures: HashMap<Scope, ReadFailure>,
    queued_write_failures: HashMap<(Scope, String), VecDeque<SourceError>>,
    permanent_write_failures: HashMap<(Scope, String), SourceError>,
    writes: Vec<WriteRecord>,
}

pub struct InMemorySource {
    state: Mutex<State>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    reads: AtomicUsize,
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            latency: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not wedge every other caller.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_scope<I, K>(self, scope: Scope, settings: I) -> Self
    where
        I: IntoIterator<Item = (K, SettingValue)>,
        K: Into<String>,
    {
        self.state()
            .settings
            .insert(scope, settings.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner()) = latency;
        self
    }

    pub fn set_unreachable(&self, scope: &Scope) {
        self.state()
            .read_failures
            .insert(scope.clone(), ReadFailure::Unreachable);
    }

    pub fn set_permission_denied(&self, scope: &Scope) {
        self.state()
            .read_failures
            .insert(scope.clone(), ReadFailure::PermissionDenied);
    }

    /// Queue errors returned by the next writes of `key`, one per call
    pub fn fail_writes(&self, scope: &Scope, key: &str, errors: Vec<SourceError>) {
        self.state()
            .queued_write_failures
            .entry((scope.clone(), key.to_string()))
            .or_default()
            .extend(errors);
    }

    /// Every write of `key` fails with `error`
    pub fn fail_writes_always(&self, scope: &Scope, key: &str, error: SourceError) {
        self.state()
            .permanent_write_failures
            .insert((scope.clone(), key.to_string()), error);
    }

    pub fn clear_write_failures(&self, scope: &Scope, key: &str) {
        let mut state = self.state();
        let k = (scope.clone(), key.to_string());
        state.queued_write_failures.remove(&k);
        state.permanent_write_failures.remove(&k);
    }

    /// Change a value behind the engine's back
    pub fn set_value(&self, scope: &Scope, key: &str, value: SettingValue) {
        self.state()
            .settings
            .entry(scope.clone())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn value(&self, scope: &Scope, key: &str) -> Option<SettingValue> {
        self.state()
            .settings
            .get(scope)
            .and_then(|s| s.get(key).cloned())
    }

    pub fn settings(&self, scope: &Scope) -> BTreeMap<String, SettingValue> {
        self.state().settings.get(scope).cloned().unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state().writes.clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Highest number of snapshot reads observed in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn scopes(&self) -> Vec<Scope> {
        let mut scopes: Vec<Scope> = self.state().settings.keys().cloned().collect();
        scopes.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.id.cmp(&b.id)));
        scopes
    }

    /// Load tenant and site settings from a JSON state file
    pub fn from_state_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read state file {:?}", path))?;
        let state: StateFile = serde_json::from_str(&content)
            .context(format!("Failed to parse state file {:?}", path))?;
        Ok(Self::from_state(state))
    }

    pub fn from_state(state: StateFile) -> Self {
        let mut source = Self::new();
        if let Some(tenant) = state.tenant {
            source = source.with_scope(Scope::tenant(tenant.id), tenant.settings);
        }
        for (url, settings) in state.sites {
            source = source.with_scope(Scope::site(url), settings);
        }
        source
    }

    fn latency(&self) -> Duration {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// On-disk shape consumed by `InMemorySource::from_state_file`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateFile {
    pub tenant: Option<TenantState>,
    #[serde(default)]
    pub sites: BTreeMap<String, BTreeMap<String, SettingValue>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantState {
    pub id: String,
    #[serde(default)]
    pub settings: BTreeMap<String, SettingValue>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettingSource for InMemorySource {
    async fn get_snapshot(&self, scope: &Scope) -> Result<SettingSnapshot, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let state = self.state();
        match state.read_failures.get(scope) {
            Some(ReadFailure::Unreachable) => {
                return Err(SourceError::Unreachable {
                    scope: scope.id.clone(),
                    message: "connection refused".to_string(),
                })
            }
            Some(ReadFailure::PermissionDenied) => {
                return Err(SourceError::PermissionDenied {
                    scope: scope.id.clone(),
                    message: "access denied".to_string(),
                })
            }
            None => {}
        }

        let values = state.settings.get(scope).ok_or_else(|| SourceError::Unreachable {
            scope: scope.id.clone(),
            message: "scope does not exist".to_string(),
        })?;

        let mut snapshot = SettingSnapshot::new(scope.clone());
        snapshot.values = values.clone();
        Ok(snapshot)
    }

    async fn apply_setting(
        &self,
        scope: &Scope,
        key: &str,
        value: &SettingValue,
    ) -> Result<(), SourceError> {
        let mut state = self.state();
        let k = (scope.clone(), key.to_string());

        if let Some(err) = state.permanent_write_failures.get(&k) {
            return Err(err.clone());
        }
        if let Some(err) = state
            .queued_write_failures
            .get_mut(&k)
            .and_then(|queue| queue.pop_front())
        {
            return Err(err);
        }
        if !state.settings.contains_key(scope) {
            return Err(SourceError::Unreachable {
                scope: scope.id.clone(),
                message: "scope does not exist".to_string(),
            });
        }

        state.writes.push(WriteRecord {
            scope: scope.clone(),
            key: key.to_string(),
            value: value.clone(),
        });
        state
            .settings
            .entry(scope.clone())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn get_setting(&self, scope: &Scope, key: &str) -> Result<Option<SettingValue>, SourceError> {
        let state = self.state();
        if let Some(failure) = state.read_failures.get(scope) {
            let message = "read failed".to_string();
            return Err(match failure {
                ReadFailure::Unreachable => SourceError::Unreachable {
                    scope: scope.id.clone(),
                    message,
                },
                ReadFailure::PermissionDenied => SourceError::PermissionDenied {
                    scope: scope.id.clone(),
                    message,
                },
            });
        }
        Ok(state.settings.get(scope).and_then(|s| s.get(key).cloned()))
    }
}
