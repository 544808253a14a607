//! Configuration types and utilities

use crate::error::ProxyError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Static Proxy Startup Configuration
/// These settings are set at startup and do not change during runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyStartupConfig {
    /// Address to listen on
    pub listen_address: String,
    /// Port to listen on
    pub listen_port: u16,
    /// Directory holding `ca.pem` / `ca.key`
    pub ca_dir: PathBuf,
    /// Requests whose body grows past this are forwarded without probing
    pub max_capture_bytes: usize,
}

impl Default for ProxyStartupConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 8080,
            ca_dir: PathBuf::from("./certs"),
            max_capture_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ProxyStartupConfig {
    /// Socket address the proxy binds to
    pub fn socket_addr(&self) -> Result<SocketAddr, ProxyError> {
        format!("{}:{}", self.listen_address, self.listen_port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ProxyError::ListenAddress {
                address: format!("{}:{}", self.listen_address, self.listen_port),
                reason: e.to_string(),
            })
    }
}
