use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use version_engine::ScopeChecker;

/// Host-based target scope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub enabled: bool,
    pub include_patterns: Vec<String>, // ["*.example.com", "api.*.io"]
    pub exclude_patterns: Vec<String>, // ["*.google.com"]
    pub use_regex: bool,
}

enum HostPattern {
    Glob(Pattern),
    Regex(Regex),
}

impl HostPattern {
    fn compile(pattern: &str, use_regex: bool) -> Option<Self> {
        if use_regex {
            match Regex::new(pattern) {
                Ok(re) => Some(HostPattern::Regex(re)),
                Err(e) => {
                    warn!("Invalid regex pattern '{}': {}", pattern, e);
                    None
                }
            }
        } else {
            match Pattern::new(pattern) {
                Ok(pat) => Some(HostPattern::Glob(pat)),
                Err(e) => {
                    warn!("Invalid glob pattern '{}': {}", pattern, e);
                    None
                }
            }
        }
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            HostPattern::Glob(pat) => pat.matches(host),
            HostPattern::Regex(re) => re.is_match(host),
        }
    }
}

/// Scope predicate handed to the engine. Patterns are compiled once;
/// invalid ones are logged and ignored.
///
/// Rules:
/// 1. If scope is disabled, everything is in scope
/// 2. Check exclude patterns first (highest priority)
/// 3. If no include patterns, everything is in scope
/// 4. Check include patterns
pub struct ScopePolicy {
    enabled: bool,
    include: Vec<HostPattern>,
    exclude: Vec<HostPattern>,
    has_includes: bool,
}

impl ScopePolicy {
    pub fn new(config: &ScopeConfig) -> Self {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .filter_map(|p| HostPattern::compile(p, config.use_regex))
                .collect::<Vec<_>>()
        };

        Self {
            enabled: config.enabled,
            include: compile(&config.include_patterns),
            exclude: compile(&config.exclude_patterns),
            has_includes: !config.include_patterns.is_empty(),
        }
    }

    pub fn allows_host(&self, host: &str) -> bool {
        if !self.enabled {
            return true;
        }

        if self.exclude.iter().any(|p| p.matches(host)) {
            return false;
        }

        // If no includes, everything is in scope (except excludes)
        if !self.has_includes {
            return true;
        }

        self.include.iter().any(|p| p.matches(host))
    }
}

impl ScopeChecker for ScopePolicy {
    fn is_in_scope(&self, url: &str) -> bool {
        self.allows_host(&extract_host(url))
    }
}

/// Extract hostname from URL
fn extract_host(url: &str) -> String {
    let rest = url
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);

    if let Some(v6) = authority.strip_prefix('[') {
        return v6.split(']').next().unwrap_or(v6).to_string();
    }
    authority.split(':').next().unwrap_or(authority).to_string()
}
