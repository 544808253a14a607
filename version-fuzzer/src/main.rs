use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use proxy_core::{CertificateAuthority, ProxyServer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use version_engine::{DispatchEvent, HttpRequestData, ManualTrigger, PassiveHook};
use version_fuzzer::{build_engine, init_logging, render_table, write_json, FuzzerConfig};

/// API Version Fuzzer - probe sibling API versions of observed requests
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Newline-delimited file of candidate versions
    #[arg(long, global = true)]
    versions_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Maximum in-flight probe requests
    #[arg(long, global = true)]
    max_concurrency: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe every other version of the given request(s) and print the results
    Scan {
        /// Request URL; repeat for several requests
        #[arg(long = "url", required = true)]
        urls: Vec<String>,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Extra header, `Name: value`
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body
        #[arg(long)]
        data: Option<String>,

        /// Skip requests outside the configured scope
        #[arg(long)]
        check_scope: bool,

        /// Write results as JSON to this file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Run the intercepting proxy and probe observed traffic
    Proxy {
        /// Listen address
        #[arg(long)]
        listen: Option<String>,

        /// Listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the effective candidate versions
    Versions,
}

impl Args {
    fn effective_config(&self) -> anyhow::Result<FuzzerConfig> {
        let mut config = match &self.config {
            Some(path) => FuzzerConfig::load(path)?,
            None => FuzzerConfig::default(),
        };

        if let Some(file) = &self.versions_file {
            config.candidates.file = Some(file.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json_format = true;
        }
        if let Some(limit) = self.max_concurrency {
            config.dispatch.max_concurrency = Some(limit);
        }
        if let Some(secs) = self.timeout {
            config.transport.timeout_seconds = Some(secs);
        }
        if let Command::Proxy { listen, port } = &self.command {
            if let Some(listen) = listen {
                config.proxy.startup.listen_address = listen.clone();
            }
            if let Some(port) = port {
                config.proxy.startup.listen_port = *port;
            }
        }
        Ok(config)
    }
}

fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("Invalid header '{}', expected 'Name: value'", raw),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.effective_config()?;
    let _log_guard = init_logging(&config.logging)?;

    match args.command {
        Command::Scan {
            urls,
            method,
            headers,
            data,
            check_scope,
            export,
        } => {
            let headers = headers
                .iter()
                .map(|h| parse_header(h))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let mut requests = Vec::with_capacity(urls.len());
            for url in &urls {
                let mut request = HttpRequestData::from_url(&method, url)
                    .with_context(|| format!("Invalid URL {}", url))?;
                for (name, value) in &headers {
                    request.set_header(name, value);
                }
                if let Some(body) = &data {
                    request.body = body.clone().into_bytes();
                }
                requests.push(request);
            }

            let engine = Arc::new(build_engine(&config).await?);
            let trigger = ManualTrigger::new(engine.clone());
            let outcomes = trigger.scan(requests.iter()).await;

            for (request, outcome) in requests.iter().zip(outcomes) {
                if let Some(reason) = outcome.skip_reason() {
                    warn!("Skipped {}: {}", request.url(), reason);
                    continue;
                }
                if let Some(report) = outcome.join().await {
                    info!(
                        "Run {} from {}: {} recorded, {} failed",
                        report.run_id,
                        report.source_token,
                        report.recorded.len(),
                        report.failures.len()
                    );
                    for failure in &report.failures {
                        warn!("{} failed: {}", failure.target, failure.error);
                    }
                }
            }

            let entries = engine.results().entries().await;
            print!("{}", render_table(&entries));
            println!("Requests Sent: {}", entries.len());

            if let Some(path) = export {
                write_json(&path, &entries)?;
                info!("Exported {} results to {}", entries.len(), path.display());
            }
        }
        Command::Proxy { .. } => {
            let engine = Arc::new(build_engine(&config).await?);
            let hook = Arc::new(PassiveHook::new(engine.clone()));
            hook.set_enabled(config.proxy.passive_enabled);
            if config.passive_unscoped() {
                warn!(
                    "Passive probing is on with scope disabled; every proxied host will be probed. \
                     Set [scope] enabled = true to limit it"
                );
            }

            let ca = CertificateAuthority::new(&config.proxy.startup.ca_dir)?;
            info!(
                "Import {} into your client to intercept HTTPS",
                config.proxy.startup.ca_dir.join("ca.crt").display()
            );

            let mut events = engine.subscribe();
            tokio::spawn(async move {
                let mut sent = 0usize;
                loop {
                    match events.recv().await {
                        Ok(DispatchEvent::ResultRecorded(entry)) => {
                            sent += 1;
                            println!(
                                "[{}] {} {} {} -> {}  {}  {} bytes  (Requests Sent: {})",
                                entry.id,
                                entry.method,
                                entry.host,
                                entry.original_path,
                                entry.modified_path,
                                entry.status_code,
                                entry.body_length,
                                sent
                            );
                        }
                        Ok(DispatchEvent::CandidateFailed(failure)) => {
                            warn!("{} failed: {}", failure.target, failure.error);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Result display lagged, {} events dropped", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            let server = ProxyServer::new(config.proxy.startup.clone(), ca, hook);
            server
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                    }
                })
                .await?;
        }
        Command::Versions => {
            let candidates = config.candidates.build().await?;
            print!("{}", candidates.to_text());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Authorization: Bearer abc").unwrap(),
            ("Authorization".to_string(), "Bearer abc".to_string())
        );
        assert_eq!(
            parse_header("X-Empty:").unwrap(),
            ("X-Empty".to_string(), String::new())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "api-version-fuzzer",
            "--max-concurrency",
            "3",
            "--timeout",
            "7",
            "--log-level",
            "debug",
            "proxy",
            "--port",
            "9090",
        ]);
        let config = args.effective_config().unwrap();

        assert_eq!(config.dispatch.max_concurrency, Some(3));
        assert_eq!(config.transport.timeout_seconds, Some(7));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.proxy.startup.listen_port, 9090);
    }

    #[test]
    fn test_scan_requires_url() {
        assert!(Args::try_parse_from(["api-version-fuzzer", "scan"]).is_err());
        let args = Args::try_parse_from([
            "api-version-fuzzer",
            "scan",
            "--url",
            "https://api.example.com/v1/users",
            "-X",
            "POST",
            "-H",
            "Accept: application/json",
        ])
        .unwrap();
        match args.command {
            Command::Scan { urls, method, headers, .. } => {
                assert_eq!(urls.len(), 1);
                assert_eq!(method, "POST");
                assert_eq!(headers, vec!["Accept: application/json"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
