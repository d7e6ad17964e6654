use async_trait::async_trait;
use std::sync::Arc;

use super::SettingSource;
use crate::error::SourceError;
use crate::models::{Scope, SettingSnapshot, SettingValue};
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};

/// Wraps a source so every call first takes a rate limiter token
pub struct ThrottledSource {
    inner: Arc<dyn SettingSource>,
    limiter: Arc<RateLimiter>,
}

impl ThrottledSource {
    pub fn new(inner: Arc<dyn SettingSource>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }

    pub fn with_config(inner: Arc<dyn SettingSource>, config: RateLimiterConfig) -> Self {
        Self::new(inner, Arc::new(RateLimiter::with_config(config)))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

#[async_trait]
impl SettingSource for ThrottledSource {
    async fn get_snapshot(&self, scope: &Scope) -> Result<SettingSnapshot, SourceError> {
        self.limiter.acquire().await;
        self.inner.get_snapshot(scope).await
    }

    async fn apply_setting(
        &self,
        scope: &Scope,
        key: &str,
        value: &SettingValue,
    ) -> Result<(), SourceError> {
        self.limiter.acquire().await;
        self.inner.apply_setting(scope, key, value).await
    }

    async fn get_setting(&self, scope: &Scope, key: &str) -> Result<Option<SettingValue>, SourceError> {
        self.limiter.acquire().await;
        self.inner.get_setting(scope, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;

    #[tokio::test]
    async fn test_calls_are_counted_by_limiter() {
        let scope = Scope::tenant("contoso");
        let inner = Arc::new(
            InMemorySource::new().with_scope(scope.clone(), [("k", SettingValue::Bool(false))]),
        );
        let source = ThrottledSource::with_config(inner.clone(), RateLimiterConfig::per_minute(100));

        source.get_snapshot(&scope).await.unwrap();
        source.apply_setting(&scope, "k", &SettingValue::Bool(true)).await.unwrap();
        assert_eq!(source.get_setting(&scope, "k").await.unwrap(), Some(SettingValue::Bool(true)));

        assert_eq!(source.limiter().get_stats().await.total_calls, 3);
        assert_eq!(inner.writes().len(), 1);
    }
}
