use crate::{
    ca::CertificateAuthority, config::ProxyStartupConfig, error::ProxyError,
    handlers::FuzzHandler, Result,
};
use hudsucker::{certificate_authority::RcgenAuthority, rustls, ProxyBuilder};
use std::future::Future;
use std::sync::Arc;
use tracing::info;
use version_engine::PassiveHook;

/// Intercepting proxy that feeds observed traffic into a [`PassiveHook`].
pub struct ProxyServer {
    config: ProxyStartupConfig,
    ca: CertificateAuthority,
    hook: Arc<PassiveHook>,
}

impl ProxyServer {
    pub fn new(config: ProxyStartupConfig, ca: CertificateAuthority, hook: Arc<PassiveHook>) -> Self {
        Self { config, ca, hook }
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.socket_addr()?;
        info!("Starting proxy server on {}", addr);

        // Hudsucker/Rustls expects DER, not PEM.
        let private_key = rustls::PrivateKey(self.ca.ca_key_der());
        let ca_cert = rustls::Certificate(self.ca.ca_cert_der()?);

        let authority = RcgenAuthority::new(private_key, ca_cert, 1000)
            .map_err(|e| ProxyError::certificate(format!("failed to create signing authority: {}", e)))?;

        let handler = FuzzHandler::new(self.hook.clone(), self.config.max_capture_bytes);

        let proxy = ProxyBuilder::new()
            .with_addr(addr)
            .with_rustls_client()
            .with_ca(authority)
            .with_http_handler(handler)
            .build();

        proxy
            .start(shutdown)
            .await
            .map_err(|e| ProxyError::Serve {
                reason: e.to_string(),
            })?;

        info!("Proxy server on {} stopped", addr);
        Ok(())
    }
}
