//! Engine configuration from `POSTURE_*` environment variables

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::rate_limiter::RateLimiterConfig;
use crate::retry::RetryPolicy;
use crate::utils::env::{get_var, load_env, parse_var};
use crate::utils::logging::{LogConfig, LogFormat, DEFAULT_LOG_FILTER};

pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub baseline_dir: PathBuf,
    pub concurrency_limit: usize,
    pub retry: RetryPolicy,
    pub deadline: Option<Duration>,
    /// Client-side request throttle; `None` disables it
    pub requests_per_minute: Option<u32>,
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            baseline_dir: data_dir.join("baselines"),
            data_dir,
            concurrency_limit: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            deadline: None,
            requests_per_minute: None,
            log: LogConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("posture"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

impl EngineConfig {
    /// Load `.env`, then read every `POSTURE_*` variable over the defaults
    pub fn from_env() -> Result<Self> {
        load_env()?;
        let mut config = Self::default();

        if let Some(dir) = get_var("POSTURE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
            config.baseline_dir = config.data_dir.join("baselines");
        }
        if let Some(dir) = get_var("POSTURE_BASELINE_DIR") {
            config.baseline_dir = PathBuf::from(dir);
        }

        if let Some(limit) = parse_var::<usize>("POSTURE_CONCURRENCY")? {
            if limit == 0 {
                return Err(anyhow!("POSTURE_CONCURRENCY must be at least 1"));
            }
            config.concurrency_limit = limit;
        }

        if let Some(attempts) = parse_var::<u32>("POSTURE_MAX_ATTEMPTS")? {
            if attempts == 0 {
                return Err(anyhow!("POSTURE_MAX_ATTEMPTS must be at least 1"));
            }
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64>("POSTURE_BASE_BACKOFF_MS")? {
            config.retry.base_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>("POSTURE_MAX_BACKOFF_MS")? {
            config.retry.max_backoff = Duration::from_millis(ms);
        }
        if config.retry.max_backoff < config.retry.base_backoff {
            return Err(anyhow!(
                "POSTURE_MAX_BACKOFF_MS ({:?}) is below POSTURE_BASE_BACKOFF_MS ({:?})",
                config.retry.max_backoff,
                config.retry.base_backoff
            ));
        }

        config.deadline = parse_var::<u64>("POSTURE_DEADLINE_SECS")?.map(Duration::from_secs);
        config.requests_per_minute = parse_var::<u32>("POSTURE_REQUESTS_PER_MINUTE")?.filter(|n| *n > 0);

        config.log.filter = get_var("POSTURE_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        if let Some(format) = get_var("POSTURE_LOG_FORMAT") {
            config.log.format = LogFormat::from_str(&format)
                .ok_or_else(|| anyhow!("POSTURE_LOG_FORMAT must be 'compact' or 'json', got '{}'", format))?;
        }

        Ok(config)
    }

    pub fn rate_limiter(&self) -> Option<RateLimiterConfig> {
        self.requests_per_minute.map(RateLimiterConfig::per_minute)
    }
}
