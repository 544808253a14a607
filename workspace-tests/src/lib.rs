//! Shared fixtures for the end-to-end tests

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode, Uri},
    Router,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Find a free local port
pub async fn get_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Versioned target API. Counts every request it serves, separately
/// the ones carrying the fuzzer marker, and the request body bytes received.
pub struct TargetServer {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
    pub marked_hits: Arc<AtomicUsize>,
    pub body_bytes: Arc<AtomicUsize>,
}

impl TargetServer {
    pub async fn spawn() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let marked_hits = Arc::new(AtomicUsize::new(0));
        let body_bytes = Arc::new(AtomicUsize::new(0));

        let app = {
            let hits = hits.clone();
            let marked_hits = marked_hits.clone();
            let body_bytes = body_bytes.clone();
            Router::new().fallback(move |uri: Uri, headers: HeaderMap, body: Bytes| {
                let hits = hits.clone();
                let marked_hits = marked_hits.clone();
                let body_bytes = body_bytes.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    body_bytes.fetch_add(body.len(), Ordering::SeqCst);
                    if headers.contains_key("x-api-fuzzer") {
                        marked_hits.fetch_add(1, Ordering::SeqCst);
                    }
                    let path = uri.path().to_string();
                    if path.contains("/v1/") {
                        (StatusCode::OK, format!("stable {}", path))
                    } else if path.contains("/v2/") {
                        (StatusCode::UNAUTHORIZED, "auth required".to_string())
                    } else {
                        (StatusCode::NOT_FOUND, String::new())
                    }
                }
            })
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            hits,
            marked_hits,
            body_bytes,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn marked_hits(&self) -> usize {
        self.marked_hits.load(Ordering::SeqCst)
    }

    pub fn body_bytes(&self) -> usize {
        self.body_bytes.load(Ordering::SeqCst)
    }
}
