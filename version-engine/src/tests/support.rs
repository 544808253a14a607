//! Scripted transport for engine tests

use crate::{EngineError, HttpRequestData, HttpResponseData, HttpService, Transport};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records every send; fails or delays selected paths
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<HttpRequestData>>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    default_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    pub fn delayed(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<HttpRequestData> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.calls().into_iter().map(|r| r.path).collect();
        paths.sort();
        paths
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &HttpRequestData) -> Result<HttpResponseData, EngineError> {
        self.calls.lock().unwrap().push(request.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        match self.delays.get(&request.path).copied().or(self.default_delay) {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&request.path) {
            return Err(EngineError::transport(&request.url(), "connection refused"));
        }

        let status = if request.path.contains("/v1/") { 401 } else { 200 };
        Ok(HttpResponseData::new(status, format!("body for {}", request.path)))
    }
}

/// GET request against api.example.com
pub fn request(path: &str) -> HttpRequestData {
    HttpRequestData::new("GET", HttpService::new("https", "api.example.com", 443), path)
}
