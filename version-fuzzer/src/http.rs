use crate::config::TransportConfig;
use crate::{FuzzerError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use version_engine::{EngineError, HttpHeaders, HttpRequestData, HttpResponseData, Transport};

/// Headers the client derives from the URL and body itself
const MANAGED_HEADERS: [&str; 5] = [
    "host",
    "content-length",
    "transfer-encoding",
    "connection",
    "proxy-connection",
];

/// [`Transport`] over a shared `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let redirects = if config.follow_redirects {
            reqwest::redirect::Policy::default()
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .redirect(redirects);
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder
            .build()
            .map_err(|e| FuzzerError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequestData) -> std::result::Result<HttpResponseData, EngineError> {
        let url = request.url();
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| EngineError::transport(&url, e))?;

        let mut builder = self.client.request(method, &url);
        for (name, value) in request.headers.iter() {
            if MANAGED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
                continue;
            }
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| EngineError::transport(&url, e))?;

        let status_code = resp.status().as_u16();
        let mut headers = HttpHeaders::new();
        for (k, v) in resp.headers() {
            headers.append(k.as_str(), &String::from_utf8_lossy(v.as_bytes()));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| EngineError::transport(&url, e))?;

        debug!("{} {} -> {} ({} bytes)", request.method, url, status_code, body.len());

        Ok(HttpResponseData {
            status_code,
            headers,
            body: body.to_vec(),
        })
    }
}
