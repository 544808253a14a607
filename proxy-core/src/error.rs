//! Proxy start-up and serving failures

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid listen address {address}: {reason}")]
    ListenAddress { address: String, reason: String },

    #[error("Certificate authority error: {reason}")]
    Certificate { reason: String },

    #[error("CA storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Proxy server stopped with error: {reason}")]
    Serve { reason: String },
}

impl ProxyError {
    pub fn certificate(reason: impl std::fmt::Display) -> Self {
        Self::Certificate {
            reason: reason.to_string(),
        }
    }
}

impl From<rcgen::RcgenError> for ProxyError {
    fn from(err: rcgen::RcgenError) -> Self {
        Self::certificate(err)
    }
}
