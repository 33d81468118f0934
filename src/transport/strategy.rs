//! Transport strategies

use serde::{Deserialize, Serialize};
use std::fmt;

/// One concrete mechanism for fetching flight data.
///
/// Strategies are tried in configuration order; each carries the endpoint of
/// the executor that serves it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// Executor running next to this service
    LocalExecutor { endpoint: String },
    /// Executor shipped with the service as a fallback
    PackagedFallback { endpoint: String },
    /// Hosted fetch service
    RemoteServer { endpoint: String },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LocalExecutor { .. } => "local_executor",
            Self::PackagedFallback { .. } => "packaged_fallback",
            Self::RemoteServer { .. } => "remote_server",
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Self::LocalExecutor { endpoint }
            | Self::PackagedFallback { endpoint }
            | Self::RemoteServer { endpoint } => endpoint,
        }
    }

    /// Endpoint joined with `path`, without doubling slashes
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Default strategy order: local executor first, packaged fallback second
pub fn default_strategies() -> Vec<Strategy> {
    vec![
        Strategy::LocalExecutor {
            endpoint: "http://127.0.0.1:8765".to_string(),
        },
        Strategy::PackagedFallback {
            endpoint: "http://127.0.0.1:8766".to_string(),
        },
    ]
}
