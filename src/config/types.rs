//! Core configuration types.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level application configuration, the seed for [`crate::builder::AgentBuilder`]
/// presets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub memory: MemorySettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            provider: ProviderSettings::default(),
            cache: CacheSettings::default(),
            retry: RetrySettings::default(),
            memory: MemorySettings::default(),
        }
    }
}

/// Provider connection settings: default model plus the HTTP adapter's
/// own connection needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        ProviderSettings {
            base_url: default_base_url(),
            api_key: None,
            default_model: default_model(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_max_retries() -> u32 {
    3
}

/// Dispatcher cache-layer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub mode: CacheMode,
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub ttl: Duration,
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            mode: CacheMode::Off,
            ttl: default_cache_ttl(),
            max_capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_cache_capacity() -> u64 {
    1000
}

/// Dispatcher cache mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    #[default]
    Off,
    Memory,
    Distributed,
}

/// Dispatcher retry-layer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(with = "humantime_serde", default = "default_base_delay")]
    pub base_delay: Duration,
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            exponential_backoff: default_true(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_true() -> bool {
    true
}

/// Hierarchical memory defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    #[serde(default = "default_working_capacity")]
    pub working_capacity: usize,
    #[serde(default = "default_episodic_threshold")]
    pub episodic_threshold: f32,
    #[serde(default)]
    pub auto_compress: bool,
}

impl Default for MemorySettings {
    fn default() -> Self {
        MemorySettings {
            working_capacity: default_working_capacity(),
            episodic_threshold: default_episodic_threshold(),
            auto_compress: false,
        }
    }
}

fn default_working_capacity() -> usize {
    20
}

fn default_episodic_threshold() -> f32 {
    0.7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = AppConfig::default();
        assert_eq!(config.memory.working_capacity, 20);
        assert_eq!(config.cache.mode, CacheMode::Off);
        assert_eq!(config.retry.max_attempts, 3);
    }
}
