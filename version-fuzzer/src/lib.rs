//! Command-line front end for the version engine: configuration, logging,
//! scope policy, HTTP transport and result rendering.

pub mod config;
pub mod http;
pub mod logging;
pub mod report;
pub mod scope;

use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use version_engine::{DispatchEngine, EngineError};

pub use config::{CandidatesConfig, FuzzerConfig, ProxyConfig, TransportConfig};
pub use http::ReqwestTransport;
pub use logging::{init_logging, LoggingConfig};
pub use report::{render_table, write_json, ResultRow};
pub use scope::{ScopeConfig, ScopePolicy};

/// Errors surfaced by the command-line front end
#[derive(Debug, Error)]
pub enum FuzzerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Proxy(#[from] proxy_core::ProxyError),

    #[error("Export failed: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, FuzzerError>;

/// Assemble a dispatch engine from the effective configuration.
pub async fn build_engine(config: &FuzzerConfig) -> Result<DispatchEngine> {
    let candidates = config.candidates.build().await?;
    let transport = ReqwestTransport::new(&config.transport)?;
    let scope = ScopePolicy::new(&config.scope);

    info!(
        "Engine ready with {} candidate versions (scope {})",
        candidates.len(),
        if config.scope.enabled { "enabled" } else { "disabled" }
    );

    Ok(DispatchEngine::new(Arc::new(transport), Arc::new(scope))
        .with_config(config.dispatch.clone())
        .with_candidates(candidates))
}
