//! Intercepting HTTP(S) proxy that routes observed requests into the version engine.

pub mod ca;
pub mod config;
pub mod error;
pub mod handlers;
pub mod proxy;

pub use ca::CertificateAuthority;
pub use config::ProxyStartupConfig;
pub use error::ProxyError;
pub use handlers::{capture_body, observed_request, CapturedBody, FuzzHandler};
pub use proxy::ProxyServer;

pub type Result<T> = std::result::Result<T, ProxyError>;
