use hudsucker::{
    hyper::{
        self,
        body::{Bytes, HttpBody},
        http::{request::Parts, uri::Authority},
        Body, Method, Request,
    },
    HttpContext, HttpHandler, RequestOrResponse,
};
use std::sync::Arc;
use tracing::{debug, warn};
use version_engine::{HttpHeaders, HttpRequestData, HttpService, PassiveHook, RunOutcome};

/// Hands every proxied request to the passive hook, then forwards it unchanged.
#[derive(Clone)]
pub struct FuzzHandler {
    hook: Arc<PassiveHook>,
    max_capture_bytes: usize,
}

impl FuzzHandler {
    pub fn new(hook: Arc<PassiveHook>, max_capture_bytes: usize) -> Self {
        Self {
            hook,
            max_capture_bytes,
        }
    }

    fn declared_length(parts: &Parts) -> Option<usize> {
        parts
            .headers
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Outcome of reading a request body up to the capture limit
pub enum CapturedBody {
    /// The whole body, within the limit
    Complete(Bytes),
    /// The limit was passed; replays the bytes already read followed by the rest of the stream
    Oversized(Body),
}

/// Read `body` chunk by chunk, stopping as soon as more than `limit` bytes have arrived.
pub async fn capture_body(mut body: Body, limit: usize) -> Result<CapturedBody, hyper::Error> {
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;

    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        total += chunk.len();
        chunks.push(chunk);
        if total > limit {
            return Ok(CapturedBody::Oversized(replay(chunks, body)));
        }
    }

    if chunks.len() == 1 {
        return Ok(CapturedBody::Complete(chunks.remove(0)));
    }
    let mut bytes = Vec::with_capacity(total);
    for chunk in &chunks {
        bytes.extend_from_slice(chunk);
    }
    Ok(CapturedBody::Complete(Bytes::from(bytes)))
}

fn replay(read: Vec<Bytes>, mut rest: Body) -> Body {
    let (mut tx, body) = Body::channel();
    tokio::spawn(async move {
        for chunk in read {
            if tx.send_data(chunk).await.is_err() {
                return;
            }
        }
        while let Some(chunk) = rest.data().await {
            match chunk {
                Ok(chunk) => {
                    if tx.send_data(chunk).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Request body stream failed mid-forward: {}", e);
                    tx.abort();
                    return;
                }
            }
        }
        if let Ok(Some(trailers)) = rest.trailers().await {
            let _ = tx.send_trailers(trailers).await;
        }
    });
    body
}

/// Convert an intercepted request into the engine's request model.
///
/// The target comes from the absolute URI when present, else from the
/// `Host` header (origin-form requests). Returns `None` when neither names a host.
pub fn observed_request(parts: &Parts, body: &[u8]) -> Option<HttpRequestData> {
    let uri = &parts.uri;
    let scheme = uri.scheme_str().unwrap_or("http").to_ascii_lowercase();

    let (host, port) = match uri.authority() {
        Some(authority) => (authority.host().to_string(), authority.port_u16()),
        None => {
            let raw = parts.headers.get("host")?.to_str().ok()?;
            let authority: Authority = raw.parse().ok()?;
            (authority.host().to_string(), authority.port_u16())
        }
    };
    if host.is_empty() {
        return None;
    }
    let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
    let port = port.or_else(|| HttpService::default_port(&scheme))?;

    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut headers = HttpHeaders::new();
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            headers.append(name.as_str(), value);
        }
    }

    let mut request = HttpRequestData::new(
        parts.method.as_str(),
        HttpService::new(scheme, host, port),
        path,
    );
    request.headers = headers;
    request.body = body.to_vec();
    Some(request)
}

#[async_trait::async_trait]
impl HttpHandler for FuzzHandler {
    async fn handle_request(&mut self, _ctx: &HttpContext, req: Request<Body>) -> RequestOrResponse {
        if req.method() == Method::CONNECT || !self.hook.is_enabled() {
            return RequestOrResponse::Request(req);
        }

        let (parts, body) = req.into_parts();

        if let Some(len) = Self::declared_length(&parts) {
            if len > self.max_capture_bytes {
                debug!("Body of {} bytes exceeds capture limit, not probing {}", len, parts.uri);
                return RequestOrResponse::Request(Request::from_parts(parts, body));
            }
        }

        let bytes = match capture_body(body, self.max_capture_bytes).await {
            Ok(CapturedBody::Complete(bytes)) => bytes,
            Ok(CapturedBody::Oversized(body)) => {
                debug!("Streamed body exceeds capture limit, not probing {}", parts.uri);
                return RequestOrResponse::Request(Request::from_parts(parts, body));
            }
            Err(e) => {
                // stream is gone, forward what we have
                warn!("Failed to read request body for {}: {}", parts.uri, e);
                return RequestOrResponse::Request(Request::from_parts(parts, Body::empty()));
            }
        };

        match observed_request(&parts, &bytes) {
            Some(observed) => match self.hook.observe(&observed).await {
                Some(RunOutcome::Dispatched(handle)) => {
                    debug!(
                        "Run {} probing {} versions for {}",
                        handle.run_id(),
                        handle.len(),
                        observed.url()
                    );
                }
                Some(RunOutcome::Skipped(reason)) => {
                    debug!("Skipped {}: {}", observed.url(), reason);
                }
                None => {}
            },
            None => debug!("Could not determine target of {}", parts.uri),
        }

        RequestOrResponse::Request(Request::from_parts(parts, Body::from(bytes)))
    }
}
