use proxy_core::{CertificateAuthority, ProxyServer, ProxyStartupConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use version_engine::{DispatchEngine, DispatchEvent, PassiveHook, SkipReason};
use version_fuzzer::{build_engine, FuzzerConfig, ReqwestTransport};
use workspace_tests::{get_free_port, TargetServer};

struct RunningProxy {
    port: u16,
    url: String,
    hook: Arc<PassiveHook>,
    shutdown: Option<oneshot::Sender<()>>,
    _ca_dir: tempfile::TempDir,
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn engine_config() -> FuzzerConfig {
    let mut config = FuzzerConfig::default();
    config.candidates.versions = vec!["v1".into(), "v2".into(), "v3".into()];
    config
}

async fn start_proxy(engine: Arc<DispatchEngine>) -> RunningProxy {
    start_proxy_with_limit(engine, ProxyStartupConfig::default().max_capture_bytes).await
}

async fn start_proxy_with_limit(engine: Arc<DispatchEngine>, max_capture_bytes: usize) -> RunningProxy {
    let ca_dir = tempfile::tempdir().unwrap();
    let port = get_free_port().await;
    let config = ProxyStartupConfig {
        listen_port: port,
        ca_dir: ca_dir.path().join("certs"),
        max_capture_bytes,
        ..ProxyStartupConfig::default()
    };

    let ca = CertificateAuthority::new(&config.ca_dir).unwrap();
    let hook = Arc::new(PassiveHook::new(engine));
    hook.set_enabled(true);

    let (tx, rx) = oneshot::channel::<()>();
    let server = ProxyServer::new(config, ca, hook.clone());
    tokio::spawn(async move {
        if let Err(e) = server
            .run(async {
                let _ = rx.await;
            })
            .await
        {
            tracing::error!("Proxy failed: {}", e);
        }
    });

    RunningProxy {
        port,
        url: format!("http://127.0.0.1:{}", port),
        hook,
        shutdown: Some(tx),
        _ca_dir: ca_dir,
    }
}

fn proxied_client(proxy_url: &str) -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(proxy_url).unwrap())
        .danger_accept_invalid_certs(true) // For our generated CA
        .build()
        .unwrap()
}

/// Send through the proxy, retrying while it starts up
async fn send_via_proxy(request: reqwest::RequestBuilder) -> reqwest::Response {
    for _ in 0..20 {
        match request.try_clone().unwrap().send().await {
            Ok(resp) => return resp,
            Err(e) => {
                tracing::warn!("Request failed, retrying: {}", e);
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
    }
    panic!("Failed to send request through proxy");
}

/// Write a raw request to the proxy and return the response head
async fn send_raw_via_proxy(port: u16, request: &[u8]) -> String {
    let mut stream = None;
    for _ in 0..20 {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(250)).await,
        }
    }
    let mut stream = stream.expect("proxy never accepted connections");
    stream.write_all(request).await.unwrap();

    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    tokio::time::timeout(Duration::from_secs(10), async {
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            head.extend_from_slice(&buf[..n]);
        }
    })
    .await
    .expect("timed out waiting for proxy response");
    String::from_utf8_lossy(&head).into_owned()
}

async fn collect_results(events: &mut broadcast::Receiver<DispatchEvent>, n: usize) -> Vec<String> {
    let mut paths = Vec::new();
    while paths.len() < n {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for results")
            .unwrap();
        if let DispatchEvent::ResultRecorded(entry) = event {
            paths.push(entry.modified_path);
        }
    }
    paths.sort();
    paths
}

#[tokio::test]
async fn test_proxied_request_triggers_version_probes() {
    let _ = tracing_subscriber::fmt::try_init();
    let target = TargetServer::spawn().await;
    let engine = Arc::new(build_engine(&engine_config()).await.unwrap());
    let mut events = engine.subscribe();
    let proxy = start_proxy(engine.clone()).await;
    let client = proxied_client(&proxy.url);

    let resp = send_via_proxy(client.get(target.url("/api/v1/users"))).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "stable /api/v1/users");

    let paths = collect_results(&mut events, 2).await;
    assert_eq!(paths, vec!["/api/v2/users", "/api/v3/users"]);

    let entries = engine.results().entries().await;
    let v2 = entries.iter().find(|e| e.target_token == "v2").unwrap();
    assert_eq!(v2.status_code, 401);
    assert_eq!(v2.original_path, "/api/v1/users");
    assert_eq!(v2.host, "127.0.0.1");
    let v3 = entries.iter().find(|e| e.target_token == "v3").unwrap();
    assert_eq!(v3.status_code, 404);

    assert_eq!(target.hits(), 3);
    assert_eq!(target.marked_hits(), 2);
}

#[tokio::test]
async fn test_probe_traffic_routed_through_proxy_does_not_loop() {
    let target = TargetServer::spawn().await;
    let engine = Arc::new(build_engine(&engine_config()).await.unwrap());
    let proxy = start_proxy(engine.clone()).await;

    // a second engine whose probes go back through the same proxy
    let looping = Arc::new(
        DispatchEngine::new(
            Arc::new(ReqwestTransport::from_client(proxied_client(&proxy.url))),
            Arc::new(version_engine::AllowAllScope),
        )
        .with_candidates(version_engine::CandidateSet::load("v1\nv2\nv3")),
    );
    let request = version_engine::HttpRequestData::from_url("GET", &target.url("/api/v1/orders")).unwrap();

    // wait for the proxy to accept connections
    let client = proxied_client(&proxy.url);
    send_via_proxy(client.get(target.url("/health"))).await;

    let report = looping.run(&request, false).await.join().await.unwrap();
    assert_eq!(report.recorded.len(), 2);

    tokio::time::sleep(Duration::from_millis(500)).await;
    // /health plus two marked probes, none of them re-probed
    assert_eq!(target.hits(), 3);
    assert_eq!(target.marked_hits(), 2);
    assert!(engine.results().is_empty().await);
}

#[tokio::test]
async fn test_marked_request_through_proxy_is_ignored() {
    let target = TargetServer::spawn().await;
    let engine = Arc::new(build_engine(&engine_config()).await.unwrap());
    let proxy = start_proxy(engine.clone()).await;
    let client = proxied_client(&proxy.url);

    let resp = send_via_proxy(
        client
            .get(target.url("/api/v1/users"))
            .header("X-Api-Fuzzer", "true"),
    )
    .await;
    assert_eq!(resp.status(), 200);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(target.hits(), 1);
    assert!(engine.results().is_empty().await);

    // same request observed directly by the hook reports why
    let observed = version_engine::HttpRequestData::from_url("GET", &target.url("/api/v1/users"))
        .unwrap()
        .with_header("x-api-fuzzer", "true");
    let outcome = proxy.hook.observe(&observed).await.unwrap();
    assert_eq!(outcome.skip_reason(), Some(SkipReason::SelfLoopDetected));
}

#[tokio::test]
async fn test_disabled_hook_forwards_without_probing() {
    let target = TargetServer::spawn().await;
    let engine = Arc::new(build_engine(&engine_config()).await.unwrap());
    let proxy = start_proxy(engine.clone()).await;
    proxy.hook.set_enabled(false);
    let client = proxied_client(&proxy.url);

    let resp = send_via_proxy(client.get(target.url("/api/v1/users"))).await;
    assert_eq!(resp.status(), 200);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(target.hits(), 1);
    assert!(engine.results().is_empty().await);
}

#[tokio::test]
async fn test_scoped_proxy_skips_foreign_hosts() {
    let target = TargetServer::spawn().await;
    let mut config = engine_config();
    config.scope.enabled = true;
    config.scope.include_patterns = vec!["*.internal.example".to_string()];
    let engine = Arc::new(build_engine(&config).await.unwrap());
    let proxy = start_proxy(engine.clone()).await;
    let client = proxied_client(&proxy.url);

    let resp = send_via_proxy(client.get(target.url("/api/v1/users"))).await;
    assert_eq!(resp.status(), 200);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(target.hits(), 1);
    assert!(engine.results().is_empty().await);
}

#[tokio::test]
async fn test_chunked_body_over_capture_limit_is_forwarded_unprobed() {
    let target = TargetServer::spawn().await;
    let engine = Arc::new(build_engine(&engine_config()).await.unwrap());
    let proxy = start_proxy_with_limit(engine.clone(), 16).await;

    // three 10 byte chunks, no Content-Length
    let request = format!(
        "POST {} HTTP/1.1\r\nHost: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
         a\r\n0123456789\r\na\r\nabcdefghij\r\na\r\nKLMNOPQRST\r\n0\r\n\r\n",
        target.url("/api/v1/upload"),
        target.addr
    );
    let head = send_raw_via_proxy(proxy.port, request.as_bytes()).await;
    assert!(head.starts_with("HTTP/1.1 200"), "unexpected response: {}", head);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(target.hits(), 1);
    assert_eq!(target.body_bytes(), 30);
    assert!(engine.results().is_empty().await);
}

#[tokio::test]
async fn test_chunked_body_within_capture_limit_is_probed() {
    let target = TargetServer::spawn().await;
    let engine = Arc::new(build_engine(&engine_config()).await.unwrap());
    let mut events = engine.subscribe();
    let proxy = start_proxy_with_limit(engine.clone(), 64).await;

    let request = format!(
        "POST {} HTTP/1.1\r\nHost: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
         a\r\n0123456789\r\n0\r\n\r\n",
        target.url("/api/v1/upload"),
        target.addr
    );
    let head = send_raw_via_proxy(proxy.port, request.as_bytes()).await;
    assert!(head.starts_with("HTTP/1.1 200"), "unexpected response: {}", head);

    let paths = collect_results(&mut events, 2).await;
    assert_eq!(paths, vec!["/api/v2/upload", "/api/v3/upload"]);
    assert_eq!(target.hits(), 3);
    assert_eq!(target.body_bytes(), 30);
}
