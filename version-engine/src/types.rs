//! Core data types for the version engine

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use uuid::Uuid;

/// Header attached to every request the engine generates
pub const MARKER_HEADER: &str = "X-Api-Fuzzer";

/// Value of [`MARKER_HEADER`] on generated requests
pub const MARKER_VALUE: &str = "true";

/// A literal API version identifier as it appears in a path segment, e.g. `v2beta1`.
///
/// Always non-empty, trimmed and free of line breaks. Compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionToken(pub(crate) String);

impl VersionToken {
    /// Parse a token, trimming surrounding whitespace
    pub fn new(raw: &str) -> EngineResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EngineError::invalid_token("token is empty"));
        }
        if trimmed.chars().any(is_line_break) {
            return Err(EngineError::invalid_token(format!(
                "token '{}' spans multiple lines",
                trimmed.escape_debug()
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Line terminators recognised when splitting candidate text
pub(crate) fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{000B}' | '\u{000C}' | '\u{0085}' | '\u{2028}' | '\u{2029}'
    )
}

impl TryFrom<String> for VersionToken {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl TryFrom<&str> for VersionToken {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VersionToken> for String {
    fn from(token: VersionToken) -> Self {
        token.0
    }
}

impl Deref for VersionToken {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for VersionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for VersionToken {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for VersionToken {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Target service identity: scheme, host and port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HttpService {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl HttpService {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Default port for the scheme, if it has one
    pub fn default_port(scheme: &str) -> Option<u16> {
        match scheme.to_ascii_lowercase().as_str() {
            "http" | "ws" => Some(80),
            "https" | "wss" => Some(443),
            _ => None,
        }
    }

    /// `host[:port]`, omitting the port when it is the scheme default
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if Self::default_port(&self.scheme) == Some(self.port) {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

impl fmt::Display for HttpService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}

/// Ordered HTTP header list. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeaders {
    pub headers: Vec<(String, String)>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for a header name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace every value of `name` with a single `value`, keeping the
    /// position of the first occurrence
    pub fn set(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(index) => {
                self.headers[index] = (name.to_string(), value.to_string());
                let mut position = 0;
                self.headers.retain(|(key, _)| {
                    let keep = position <= index || !key.eq_ignore_ascii_case(name);
                    position += 1;
                    keep
                });
            }
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Append a value without touching existing ones
    pub fn append(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HttpHeaders {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            headers: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// An HTTP request as observed or generated by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequestData {
    pub method: String,
    pub service: HttpService,
    /// Path and query, as sent on the request line
    pub path: String,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpRequestData {
    /// Create a new HTTP request
    pub fn new(method: impl Into<String>, service: HttpService, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method: method.into(),
            service,
            path: if path.is_empty() { "/".to_string() } else { path },
            headers: HttpHeaders::new(),
            body: Vec::new(),
        }
    }

    /// Build a request from an absolute URL
    pub fn from_url(method: &str, url: &str) -> EngineResult<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| EngineError::invalid_request(format!("cannot parse '{}': {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| EngineError::invalid_request(format!("'{}' has no host", url)))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| EngineError::invalid_request(format!("'{}' has no port", url)))?;

        let mut path = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }

        let host = host.trim_start_matches('[').trim_end_matches(']');
        Ok(Self::new(
            method.to_uppercase(),
            HttpService::new(parsed.scheme(), host, port),
            path,
        ))
    }

    /// Absolute URL of this request
    pub fn url(&self) -> String {
        format!("{}{}", self.service, self.path)
    }

    /// Copy of this request with a different path
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        let mut request = self.clone();
        request.path = path.into();
        request
    }

    /// Add or replace a header
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn set_header(&mut self, key: &str, value: &str) {
        self.headers.set(key, value);
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.headers.contains(key)
    }

    /// Whether this request was generated by the engine
    pub fn is_marked(&self) -> bool {
        self.headers
            .iter()
            .any(|(key, value)| key.eq_ignore_ascii_case(MARKER_HEADER) && value == MARKER_VALUE)
    }

    /// Get request body as string
    pub fn body_as_string(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.clone())
    }
}

/// HTTP response captured for a generated request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponseData {
    pub status_code: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponseData {
    pub fn new(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            headers: HttpHeaders::new(),
            body: body.into(),
        }
    }

    /// Get response body length
    pub fn body_length(&self) -> usize {
        self.body.len()
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Get response body as string
    pub fn body_as_string(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.clone())
    }
}

/// The generated request together with the response it received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub request: HttpRequestData,
    pub response: HttpResponseData,
}

/// One recorded substitution-and-send
#[derive(Debug, Clone, Serialize)]
pub struct ResultEntry {
    /// Sequence id assigned by the [`ResultSink`](crate::ResultSink)
    pub id: u64,
    pub run_id: Uuid,
    pub method: String,
    pub host: String,
    pub original_path: String,
    pub modified_path: String,
    pub status_code: u16,
    pub body_length: usize,
    pub source_token: VersionToken,
    pub target_token: VersionToken,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip)]
    pub exchange: Arc<Exchange>,
}

impl ResultEntry {
    /// Build an entry for a completed exchange. The id is assigned on append.
    pub fn new(
        run_id: Uuid,
        original_path: impl Into<String>,
        source_token: VersionToken,
        target_token: VersionToken,
        exchange: Exchange,
    ) -> Self {
        Self {
            id: 0,
            run_id,
            method: exchange.request.method.clone(),
            host: exchange.request.service.host.clone(),
            original_path: original_path.into(),
            modified_path: exchange.request.path.clone(),
            status_code: exchange.response.status_code,
            body_length: exchange.response.body_length(),
            source_token,
            target_token,
            recorded_at: chrono::Utc::now(),
            exchange: Arc::new(exchange),
        }
    }

    /// The generated request behind this entry
    pub fn request(&self) -> &HttpRequestData {
        &self.exchange.request
    }

    /// The response behind this entry
    pub fn response(&self) -> &HttpResponseData {
        &self.exchange.response
    }
}

/// Dispatch policy knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum in-flight sends across all runs. `None` or zero means unbounded.
    pub max_concurrency: Option<usize>,
    /// Capacity of the live event channel
    pub event_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            event_capacity: 256,
        }
    }
}
