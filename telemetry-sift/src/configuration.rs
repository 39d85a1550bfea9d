// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{borrow::Cow, path::PathBuf, str::FromStr, time::Duration};

use crate::error::{Error, Result};
use crate::log::LogLevelFilter;

/// Environment variable consulted when no API key is set in code.
pub const API_KEY_ENV: &str = "SIFT_API_KEY";
/// Environment variable overriding the library log level.
pub const LOG_LEVEL_ENV: &str = "SIFT_LOG_LEVEL";

const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
const DEFAULT_MODEL: &str = "grok-beta";

/// Configuration for the sift processor.
///
/// # Usage
/// ```
/// use telemetry_sift::Config;
///
/// // Pulls the API key and log level from the environment
/// let mut builder = Config::builder();
///
/// // Manual overrides
/// builder
///     .set_api_key("sk-test".to_string())
///     .set_max_sample_size(50);
///
/// let config = builder.build();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    // # Advisory endpoint
    api_key: String,
    /// Base url of the chat-completion endpoint
    base_url: Cow<'static, str>,
    /// Model name sent with every request
    model: Cow<'static, str>,

    // # Sampling
    /// Per-kind cap on the number of signals in one sample
    max_sample_size: usize,
    /// Period of the recommendation loop
    sampling_interval: Duration,

    // # Cache and rate limiting
    enable_cache: bool,
    cache_expiration: Duration,
    enable_rate_limit: bool,
    rate_limit_rpm: u32,

    // # Fallback and logging
    /// Serve the built-in static recommendation set on transport failures
    fallback_to_static: bool,
    log_level: LogLevelFilter,

    // # Policy management
    policy_file: Option<PathBuf>,
    policy_reload_interval: Duration,
    /// Labels every signal must carry, merged into the policy snapshot
    required_labels: Vec<String>,
    /// Labels no signal may carry, merged into the policy snapshot
    forbidden_labels: Vec<String>,

    // # Filter application
    auto_apply_filters: bool,
    max_filter_rules: usize,
    /// Optional TTL after which an installed rule is removed
    filter_timeout: Option<Duration>,

    // # Self-observability
    metrics_enabled: bool,
    metrics_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: Cow::Borrowed(DEFAULT_BASE_URL),
            model: Cow::Borrowed(DEFAULT_MODEL),
            max_sample_size: 100,
            sampling_interval: Duration::from_secs(5 * 60),
            enable_cache: true,
            cache_expiration: Duration::from_secs(60 * 60),
            enable_rate_limit: true,
            rate_limit_rpm: 60,
            fallback_to_static: false,
            log_level: LogLevelFilter::default(),
            policy_file: None,
            policy_reload_interval: Duration::from_secs(5 * 60),
            required_labels: Vec::new(),
            forbidden_labels: Vec::new(),
            auto_apply_filters: true,
            max_filter_rules: 100,
            filter_timeout: None,
            metrics_enabled: false,
            metrics_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Creates a builder pre-populated from the environment.
    pub fn builder() -> ConfigBuilder {
        let mut config = Config::default();
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            config.api_key = key;
        }
        if let Some(level) = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|v| LogLevelFilter::from_str(&v).ok())
        {
            config.log_level = level;
        }
        ConfigBuilder { config }
    }

    /// Fails when no credential is available from code or the environment.
    pub(crate) fn require_api_key(&self) -> Result<&str> {
        if self.api_key.is_empty() {
            return Err(Error::Config(format!(
                "api_key must be set or {API_KEY_ENV} exported"
            )));
        }
        Ok(&self.api_key)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_sample_size(&self) -> usize {
        self.max_sample_size
    }

    pub fn sampling_interval(&self) -> Duration {
        self.sampling_interval
    }

    pub fn enable_cache(&self) -> bool {
        self.enable_cache
    }

    pub fn cache_expiration(&self) -> Duration {
        self.cache_expiration
    }

    pub fn enable_rate_limit(&self) -> bool {
        self.enable_rate_limit
    }

    pub fn rate_limit_rpm(&self) -> u32 {
        self.rate_limit_rpm
    }

    pub fn fallback_to_static(&self) -> bool {
        self.fallback_to_static
    }

    pub fn log_level(&self) -> LogLevelFilter {
        self.log_level
    }

    pub fn policy_file(&self) -> Option<&PathBuf> {
        self.policy_file.as_ref()
    }

    pub fn policy_reload_interval(&self) -> Duration {
        self.policy_reload_interval
    }

    pub fn required_labels(&self) -> &[String] {
        &self.required_labels
    }

    pub fn forbidden_labels(&self) -> &[String] {
        &self.forbidden_labels
    }

    pub fn auto_apply_filters(&self) -> bool {
        self.auto_apply_filters
    }

    pub fn max_filter_rules(&self) -> usize {
        self.max_filter_rules
    }

    pub fn filter_timeout(&self) -> Option<Duration> {
        self.filter_timeout
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_enabled
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }
}

pub struct ConfigBuilder {
    config: Config,
}

macro_rules! setter {
    ($name:ident, $field:ident, $ty:ty) => {
        pub fn $name(&mut self, $field: $ty) -> &mut Self {
            self.config.$field = $field;
            self
        }
    };
}

impl ConfigBuilder {
    setter!(set_api_key, api_key, String);
    setter!(set_max_sample_size, max_sample_size, usize);
    setter!(set_sampling_interval, sampling_interval, Duration);
    setter!(set_enable_cache, enable_cache, bool);
    setter!(set_cache_expiration, cache_expiration, Duration);
    setter!(set_enable_rate_limit, enable_rate_limit, bool);
    setter!(set_rate_limit_rpm, rate_limit_rpm, u32);
    setter!(set_fallback_to_static, fallback_to_static, bool);
    setter!(set_log_level, log_level, LogLevelFilter);
    setter!(set_policy_reload_interval, policy_reload_interval, Duration);
    setter!(set_required_labels, required_labels, Vec<String>);
    setter!(set_forbidden_labels, forbidden_labels, Vec<String>);
    setter!(set_auto_apply_filters, auto_apply_filters, bool);
    setter!(set_max_filter_rules, max_filter_rules, usize);
    setter!(set_metrics_enabled, metrics_enabled, bool);
    setter!(set_metrics_interval, metrics_interval, Duration);

    pub fn set_base_url(&mut self, base_url: String) -> &mut Self {
        self.config.base_url = Cow::Owned(base_url);
        self
    }

    pub fn set_model(&mut self, model: String) -> &mut Self {
        self.config.model = Cow::Owned(model);
        self
    }

    pub fn set_policy_file(&mut self, policy_file: PathBuf) -> &mut Self {
        self.config.policy_file = Some(policy_file);
        self
    }

    pub fn set_filter_timeout(&mut self, filter_timeout: Duration) -> &mut Self {
        self.config.filter_timeout = Some(filter_timeout);
        self
    }

    pub fn build(&mut self) -> Config {
        self.config.clone()
    }
}
