//! TOML configuration file

use crate::logging::LoggingConfig;
use crate::scope::ScopeConfig;
use crate::{FuzzerError, Result};
use proxy_core::ProxyStartupConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use version_engine::{CandidateSet, DispatchConfig, DEFAULT_VERSIONS};

/// Top-level configuration. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzerConfig {
    pub candidates: CandidatesConfig,
    pub scope: ScopeConfig,
    pub dispatch: DispatchConfig,
    pub transport: TransportConfig,
    pub proxy: ProxyConfig,
    pub logging: LoggingConfig,
}

impl FuzzerConfig {
    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FuzzerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FuzzerError::Config(format!("Invalid configuration: {}", e)))
    }

    /// Passive probing would fire against every host the proxy sees
    pub fn passive_unscoped(&self) -> bool {
        self.proxy.passive_enabled && !self.scope.enabled
    }
}

/// Where the candidate version list comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidatesConfig {
    /// Inline tokens, in probe order
    pub versions: Vec<String>,
    /// Newline-delimited token file appended after `versions`
    pub file: Option<PathBuf>,
    /// Drop repeated tokens, keeping the first occurrence
    pub deduplicate: bool,
}

impl Default for CandidatesConfig {
    fn default() -> Self {
        Self {
            versions: DEFAULT_VERSIONS.iter().map(|v| v.to_string()).collect(),
            file: None,
            deduplicate: true,
        }
    }
}

impl CandidatesConfig {
    /// Build the effective candidate set.
    pub async fn build(&self) -> Result<CandidateSet> {
        let mut set = CandidateSet::empty();
        for raw in &self.versions {
            set.append(raw)?;
        }

        if let Some(path) = &self.file {
            let loaded = CandidateSet::load_file(path).await?;
            debug!("Read {} versions from {}", loaded.len(), path.display());
            for token in loaded.iter() {
                set.push(token.clone());
            }
        }

        if self.deduplicate {
            let removed = set.deduplicate();
            if removed > 0 {
                debug!("Removed {} duplicate versions", removed);
            }
        }

        Ok(set)
    }
}

/// Outbound HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub timeout_seconds: Option<u64>,
    pub accept_invalid_certs: bool,
    pub follow_redirects: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: None,
            accept_invalid_certs: true,
            follow_redirects: false,
        }
    }
}

/// Intercepting proxy settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    #[serde(flatten)]
    pub startup: ProxyStartupConfig,
    /// Feed proxied traffic to the engine on startup
    pub passive_enabled: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            startup: ProxyStartupConfig::default(),
            passive_enabled: true,
        }
    }
}
