//! Entry points that feed requests into the engine

use crate::execution::{DispatchEngine, RunOutcome};
use crate::types::HttpRequestData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Fires for every observed request while enabled, always with scope checking
pub struct PassiveHook {
    engine: Arc<DispatchEngine>,
    enabled: AtomicBool,
}

impl PassiveHook {
    /// Create a disabled hook
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        Self {
            engine,
            enabled: AtomicBool::new(false),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(
                "Passive version scanning {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Offer an observed request. Returns `None` while disabled.
    ///
    /// Dropping the returned outcome leaves the run going in the background.
    pub async fn observe(&self, request: &HttpRequestData) -> Option<RunOutcome> {
        if !self.is_enabled() {
            return None;
        }
        Some(self.engine.run(request, true).await)
    }
}

/// Runs user-selected requests without scope checking
#[derive(Clone)]
pub struct ManualTrigger {
    engine: Arc<DispatchEngine>,
}

impl ManualTrigger {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        Self { engine }
    }

    /// Start one run per selected request
    pub async fn scan<'a, I>(&self, requests: I) -> Vec<RunOutcome>
    where
        I: IntoIterator<Item = &'a HttpRequestData>,
    {
        let mut outcomes = Vec::new();
        for request in requests {
            outcomes.push(self.engine.run(request, false).await);
        }
        outcomes
    }
}
