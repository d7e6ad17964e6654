//! Setting source boundary
//!
//! Everything the engine knows about the remote platform goes through
//! `SettingSource`. A handle is passed explicitly into each component; there
//! is no process-wide connection cache.

pub mod memory;
pub mod throttled;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::models::{Scope, SettingSnapshot, SettingValue};

pub use memory::{InMemorySource, StateFile};
pub use throttled::ThrottledSource;

/// Reads and writes individual configuration values at tenant or site scope
#[async_trait]
pub trait SettingSource: Send + Sync {
    /// Fetch every setting the platform reports for a scope
    async fn get_snapshot(&self, scope: &Scope) -> Result<SettingSnapshot, SourceError>;

    /// Write one setting
    async fn apply_setting(
        &self,
        scope: &Scope,
        key: &str,
        value: &SettingValue,
    ) -> Result<(), SourceError>;

    /// Read one setting. Sources with a cheaper single-key read should override this.
    async fn get_setting(&self, scope: &Scope, key: &str) -> Result<Option<SettingValue>, SourceError> {
        let snapshot = self.get_snapshot(scope).await?;
        Ok(snapshot.values.get(key).cloned())
    }
}
