//! Settings structures for flightsearch-rs configuration

use crate::errors::SearchError;
use crate::transport::{default_strategies, RetryPolicy, Strategy};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Main settings structure, read from settings.yml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub server: ServerSettings,
    pub search: SearchSettings,
    pub transport: TransportSettings,
    pub outgoing: OutgoingSettings,
    pub planner: PlannerSettings,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Merge with environment variables (FLIGHTSEARCH_* prefix, plus the
    /// usual OPENAI_* variables for the planner)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("FLIGHTSEARCH_DEBUG") {
            self.general.debug = val.parse().unwrap_or(false);
        }
        if let Ok(val) = std::env::var("FLIGHTSEARCH_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("FLIGHTSEARCH_BIND_ADDRESS") {
            self.server.bind_address = val;
        }
        if let Ok(val) = std::env::var("FLIGHTSEARCH_DEADLINE_SECS") {
            if let Ok(secs) = val.parse() {
                self.search.deadline_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("FLIGHTSEARCH_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                self.transport.max_retries = retries;
            }
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            if !val.is_empty() {
                self.planner.api_key = Some(val);
            }
        }
        if let Ok(val) = std::env::var("OPENAI_BASE_URL") {
            if !val.is_empty() {
                self.planner.base_url = val;
            }
        }
    }

    /// Reject settings the search pipeline cannot run with
    pub fn validate(&self) -> Result<(), SearchError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(SearchError::Config(format!("{name} must be positive, got {value}")))
            }
        };

        positive("search.deadline_secs", self.search.deadline_secs)?;
        positive("transport.probe_timeout_secs", self.transport.probe_timeout_secs)?;
        positive("transport.session_timeout_secs", self.transport.session_timeout_secs)?;
        positive("transport.execution_timeout_secs", self.transport.execution_timeout_secs)?;
        positive("outgoing.request_timeout", self.outgoing.request_timeout)?;
        positive("planner.timeout_secs", self.planner.timeout_secs)?;

        if self.search.max_concurrency == 0 {
            return Err(SearchError::Config(
                "search.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.transport.strategies.is_empty() {
            return Err(SearchError::Config(
                "transport.strategies must name at least one strategy".to_string(),
            ));
        }
        for strategy in &self.transport.strategies {
            Url::parse(strategy.endpoint()).map_err(|e| {
                SearchError::Config(format!(
                    "{} endpoint {:?} is not a valid URL: {e}",
                    strategy,
                    strategy.endpoint()
                ))
            })?;
        }
        Url::parse(&self.planner.base_url).map_err(|e| {
            SearchError::Config(format!("planner.base_url is not a valid URL: {e}"))
        })?;
        if self.transport.max_retry_delay_ms < self.transport.retry_delay_ms {
            return Err(SearchError::Config(format!(
                "transport.max_retry_delay_ms ({}) is below transport.retry_delay_ms ({})",
                self.transport.max_retry_delay_ms, self.transport.retry_delay_ms
            )));
        }
        Ok(())
    }
}

/// Seconds as a `Duration`, zero for values that cannot be represented
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Enable debug mode
    pub debug: bool,
    /// Instance name reported by the health endpoint
    pub instance_name: String,
    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl GeneralSettings {
    /// Log filter used when `RUST_LOG` is not set
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "flightsearch_rs=debug,info"
        } else {
            "info"
        }
    }
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            debug: false,
            instance_name: "flightsearch".to_string(),
            enable_metrics: true,
        }
    }
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "127.0.0.1".to_string(),
        }
    }
}

/// Request-wide search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Global deadline for one travel request, in seconds
    pub deadline_secs: f64,
    /// Upper bound on searches running at once
    pub max_concurrency: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            deadline_secs: 90.0,
            max_concurrency: 8,
        }
    }
}

impl SearchSettings {
    pub fn deadline(&self) -> Duration {
        secs(self.deadline_secs)
    }
}

/// Transport retry and fallback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub probe_timeout_secs: f64,
    pub session_timeout_secs: f64,
    pub execution_timeout_secs: f64,
    /// Retries after the first attempt, per strategy
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub retry_jitter_ms: u64,
    /// Strategies in the order they are tried
    pub strategies: Vec<Strategy>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 5.0,
            session_timeout_secs: 10.0,
            execution_timeout_secs: 20.0,
            max_retries: 2,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 4000,
            retry_jitter_ms: 250,
            strategies: default_strategies(),
        }
    }
}

impl TransportSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            probe_timeout: secs(self.probe_timeout_secs),
            session_timeout: secs(self.session_timeout_secs),
            execution_timeout: secs(self.execution_timeout_secs),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
            retry_jitter: Duration::from_millis(self.retry_jitter_ms),
        }
    }
}

/// Outgoing request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    /// Default request timeout in seconds
    pub request_timeout: f64,
    /// Pool max size
    pub pool_maxsize: usize,
    /// Verify SSL certificates
    pub verify_ssl: bool,
    /// Proxy settings
    pub proxies: ProxySettings,
    /// Extra headers to send
    pub extra_headers: HashMap<String, String>,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            request_timeout: 30.0,
            pool_maxsize: 20,
            verify_ssl: true,
            proxies: ProxySettings::default(),
            extra_headers: HashMap::new(),
        }
    }
}

impl OutgoingSettings {
    pub fn timeout(&self) -> Duration {
        secs(self.request_timeout)
    }
}

/// Proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
}

/// Query planner (chat-completions) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            api_key: None,
            timeout_secs: 30.0,
        }
    }
}

impl PlannerSettings {
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }
}
