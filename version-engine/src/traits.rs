//! Capabilities the engine consumes from its environment

use crate::{EngineError, HttpRequestData, HttpResponseData};
use async_trait::async_trait;

/// Sends a generated request and returns the captured response.
///
/// Failures are reported per call and never affect sibling sends.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequestData) -> Result<HttpResponseData, EngineError>;
}

/// Scope predicate consulted when a run asks for scope checking
pub trait ScopeChecker: Send + Sync {
    fn is_in_scope(&self, url: &str) -> bool;
}

impl<F> ScopeChecker for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_in_scope(&self, url: &str) -> bool {
        self(url)
    }
}

/// Scope that accepts every URL
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllScope;

impl ScopeChecker for AllowAllScope {
    fn is_in_scope(&self, _url: &str) -> bool {
        true
    }
}
