//! Version Engine - API version discovery core
//!
//! Given an observed HTTP request whose path carries a version segment
//! (`/v1/`, `/v2beta1`), this crate derives sibling requests for every other
//! candidate version, sends them concurrently through a pluggable transport
//! and records each response for comparison.

pub mod types;
pub mod traits;
pub mod error;
pub mod candidates;
pub mod matcher;
pub mod substitution;
pub mod results;
pub mod execution;
pub mod triggers;


pub use types::{
    VersionToken, HttpService, HttpHeaders, HttpRequestData, HttpResponseData,
    Exchange, ResultEntry, DispatchConfig, MARKER_HEADER, MARKER_VALUE,
};

pub use traits::{Transport, ScopeChecker, AllowAllScope};

pub use error::{EngineError, EngineResult, ErrorCategory, SkipReason};

pub use candidates::{CandidateSet, DEFAULT_VERSIONS};

pub use matcher::{find_version, matches_segment};

pub use substitution::{substitute, substitute_path, FuzzRequest};

pub use results::ResultSink;

pub use execution::{
    DispatchEngine, DispatchHandle, DispatchEvent, RunOutcome, RunReport, CandidateFailure,
};

pub use triggers::{PassiveHook, ManualTrigger};
