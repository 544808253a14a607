//! Dispatch engine for version probing runs

use crate::error::{EngineError, SkipReason};
use crate::matcher::find_version;
use crate::results::ResultSink;
use crate::substitution::substitute;
use crate::traits::{ScopeChecker, Transport};
use crate::types::{DispatchConfig, Exchange, HttpRequestData, ResultEntry, VersionToken};
use crate::CandidateSet;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A candidate whose send failed
#[derive(Debug, Clone, Serialize)]
pub struct CandidateFailure {
    pub run_id: Uuid,
    pub target: VersionToken,
    pub error: EngineError,
}

/// Live notifications for rendering surfaces
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    ResultRecorded(ResultEntry),
    CandidateFailed(CandidateFailure),
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source_token: VersionToken,
    /// Sequence ids of recorded entries, in completion order of the joins
    pub recorded: Vec<u64>,
    pub failures: Vec<CandidateFailure>,
}

impl RunReport {
    /// Number of candidates that were dispatched
    pub fn dispatched(&self) -> usize {
        self.recorded.len() + self.failures.len()
    }
}

/// Outcome of [`DispatchEngine::run`]
#[derive(Debug)]
pub enum RunOutcome {
    /// A guard rejected the request; nothing was sent or recorded
    Skipped(SkipReason),
    /// Candidate tasks were spawned
    Dispatched(DispatchHandle),
}

impl RunOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, RunOutcome::Dispatched(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            RunOutcome::Skipped(reason) => Some(*reason),
            RunOutcome::Dispatched(_) => None,
        }
    }

    /// Wait for the run to finish. Skipped runs yield `None`.
    pub async fn join(self) -> Option<RunReport> {
        match self {
            RunOutcome::Skipped(_) => None,
            RunOutcome::Dispatched(handle) => Some(handle.join().await),
        }
    }
}

/// Handle to the tasks of one run.
///
/// Dropping the handle detaches the tasks; they still complete and record.
#[derive(Debug)]
pub struct DispatchHandle {
    run_id: Uuid,
    source: VersionToken,
    tasks: Vec<(VersionToken, JoinHandle<Result<u64, CandidateFailure>>)>,
}

impl DispatchHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn source_token(&self) -> &VersionToken {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Abort every task of this run that has not finished yet
    pub fn abort(&self) {
        for (_, task) in &self.tasks {
            task.abort();
        }
    }

    /// Wait for every task and collect the report
    pub async fn join(self) -> RunReport {
        let mut report = RunReport {
            run_id: self.run_id,
            source_token: self.source,
            recorded: Vec::with_capacity(self.tasks.len()),
            failures: Vec::new(),
        };

        for (target, task) in self.tasks {
            match task.await {
                Ok(Ok(id)) => report.recorded.push(id),
                Ok(Err(failure)) => report.failures.push(failure),
                Err(e) => report.failures.push(CandidateFailure {
                    run_id: self.run_id,
                    target,
                    error: EngineError::TaskFailed {
                        details: e.to_string(),
                    },
                }),
            }
        }

        report
    }
}

/// Shared pieces every candidate task needs
#[derive(Clone)]
struct TaskContext {
    run_id: Uuid,
    transport: Arc<dyn Transport>,
    sink: Arc<ResultSink>,
    limiter: Option<Arc<Semaphore>>,
    events: broadcast::Sender<DispatchEvent>,
}

/// Version probing engine.
///
/// Owns the candidate set and the result history. One engine serves any
/// number of concurrent runs.
pub struct DispatchEngine {
    candidates: Arc<RwLock<CandidateSet>>,
    transport: Arc<dyn Transport>,
    scope: Arc<dyn ScopeChecker>,
    sink: Arc<ResultSink>,
    limiter: Option<Arc<Semaphore>>,
    events: broadcast::Sender<DispatchEvent>,
}

impl DispatchEngine {
    /// Create an engine seeded with the default candidate list
    pub fn new(transport: Arc<dyn Transport>, scope: Arc<dyn ScopeChecker>) -> Self {
        let config = DispatchConfig::default();
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            candidates: Arc::new(RwLock::new(CandidateSet::default())),
            transport,
            scope,
            sink: Arc::new(ResultSink::new()),
            limiter: None,
            events,
        }
    }

    /// Apply dispatch policy
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.limiter = config
            .max_concurrency
            .filter(|limit| *limit > 0)
            .map(|limit| Arc::new(Semaphore::new(limit)));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        self.events = events;
        self
    }

    /// Replace the initial candidate set
    pub fn with_candidates(self, candidates: CandidateSet) -> Self {
        Self {
            candidates: Arc::new(RwLock::new(candidates)),
            ..self
        }
    }

    /// Shared handle for editing the candidate set
    pub fn candidates(&self) -> Arc<RwLock<CandidateSet>> {
        self.candidates.clone()
    }

    /// Result history shared by all runs
    pub fn results(&self) -> Arc<ResultSink> {
        self.sink.clone()
    }

    /// Subscribe to recorded results and per-candidate failures
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    /// Probe every other candidate version of `base`.
    ///
    /// Guards are evaluated in order and any failing guard makes the call a
    /// no-op: marker header present, out of scope (only when `check_scope`),
    /// empty candidate snapshot, no version segment in the path. Otherwise one
    /// task per target candidate is spawned and the handle returned.
    pub async fn run(&self, base: &HttpRequestData, check_scope: bool) -> RunOutcome {
        if base.is_marked() {
            debug!("Skipping self-generated request {} {}", base.method, base.path);
            return RunOutcome::Skipped(SkipReason::SelfLoopDetected);
        }

        let url = base.url();
        if check_scope && !self.scope.is_in_scope(&url) {
            debug!("Skipping out-of-scope request {}", url);
            return RunOutcome::Skipped(SkipReason::OutOfScope);
        }

        let candidates = self.candidates.read().await.snapshot();
        if candidates.is_empty() {
            debug!("Skipping {}: candidate list is empty", url);
            return RunOutcome::Skipped(SkipReason::ConfigurationEmpty);
        }

        let source = match find_version(&base.path, &candidates) {
            Some(token) => token.clone(),
            None => {
                debug!("Skipping {}: no version segment", url);
                return RunOutcome::Skipped(SkipReason::NoVersionMatch);
            }
        };

        let context = TaskContext {
            run_id: Uuid::new_v4(),
            transport: self.transport.clone(),
            sink: self.sink.clone(),
            limiter: self.limiter.clone(),
            events: self.events.clone(),
        };
        let base = Arc::new(base.clone());

        let tasks: Vec<_> = candidates
            .iter()
            .filter(|target| **target != source)
            .map(|target| {
                let task = tokio::spawn(execute_candidate(
                    context.clone(),
                    base.clone(),
                    source.clone(),
                    target.clone(),
                ));
                (target.clone(), task)
            })
            .collect();

        info!(
            "Run {} dispatched {} candidates for {} {} (source version {})",
            context.run_id,
            tasks.len(),
            base.method,
            url,
            source
        );

        RunOutcome::Dispatched(DispatchHandle {
            run_id: context.run_id,
            source,
            tasks,
        })
    }
}

/// Substitute, send and record one target version
async fn execute_candidate(
    context: TaskContext,
    base: Arc<HttpRequestData>,
    source: VersionToken,
    target: VersionToken,
) -> Result<u64, CandidateFailure> {
    let _permit = match &context.limiter {
        Some(limiter) => Some(limiter.clone().acquire_owned().await.map_err(|e| {
            CandidateFailure {
                run_id: context.run_id,
                target: target.clone(),
                error: EngineError::TaskFailed {
                    details: e.to_string(),
                },
            }
        })?),
        None => None,
    };

    let fuzz = substitute(&base, &source, &target);
    debug!("Sending {} {}", fuzz.request.method, fuzz.request.url());

    match context.transport.send(&fuzz.request).await {
        Ok(response) => {
            let mut entry = ResultEntry::new(
                context.run_id,
                fuzz.original_path,
                source,
                target,
                Exchange {
                    request: fuzz.request,
                    response,
                },
            );
            entry.id = context.sink.append(entry.clone()).await;
            info!(
                "[{}] {} {} -> {} ({} bytes)",
                entry.id, entry.method, entry.modified_path, entry.status_code, entry.body_length
            );
            let id = entry.id;
            // No subscribers is fine
            let _ = context.events.send(DispatchEvent::ResultRecorded(entry));
            Ok(id)
        }
        Err(error) => {
            warn!("Version {} failed for {}: {}", target, base.url(), error);
            let failure = CandidateFailure {
                run_id: context.run_id,
                target,
                error,
            };
            let _ = context.events.send(DispatchEvent::CandidateFailed(failure.clone()));
            Err(failure)
        }
    }
}
