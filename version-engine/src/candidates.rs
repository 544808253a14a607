//! Candidate version list management
//!
//! The candidate set is the ordered list of version tokens tried as
//! substitution targets. It is edited through plain methods and read by
//! dispatch runs through an immutable [`CandidateSet::snapshot`].

use crate::error::{EngineError, EngineResult};
use crate::types::{is_line_break, VersionToken};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;

/// Versions seeded into a fresh candidate set
pub const DEFAULT_VERSIONS: [&str; 15] = [
    "v1", "v2", "v3", "v1beta1", "v1beta2", "v1alpha1", "v1alpha2", "v2beta1", "v2beta2",
    "v2alpha1", "v2alpha2", "v3beta1", "v3beta2", "v3alpha1", "v3alpha2",
];

/// Ordered list of version tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSet {
    tokens: Vec<VersionToken>,
}

impl Default for CandidateSet {
    /// The seeded list of [`DEFAULT_VERSIONS`]
    fn default() -> Self {
        Self {
            tokens: DEFAULT_VERSIONS
                .iter()
                .map(|v| VersionToken(v.to_string()))
                .collect(),
        }
    }
}

impl CandidateSet {
    /// An empty candidate set
    pub fn empty() -> Self {
        Self { tokens: Vec::new() }
    }

    /// Build a candidate set from newline-delimited text.
    ///
    /// Every line is trimmed and blank lines are dropped. Input order is kept
    /// and duplicates survive until [`deduplicate`](Self::deduplicate).
    pub fn load(text: &str) -> Self {
        Self {
            tokens: parse_lines(text).collect(),
        }
    }

    /// Load a newline-delimited candidate file
    pub async fn load_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| EngineError::CandidateSource {
                reason: format!("failed to read {}: {}", path.display(), e),
            })?;
        Ok(Self::load(&content))
    }

    /// Append every token in `text` after the existing ones. Returns how many were added.
    pub fn extend_from_text(&mut self, text: &str) -> usize {
        let before = self.tokens.len();
        self.tokens.extend(parse_lines(text));
        self.tokens.len() - before
    }

    /// Append a single token
    pub fn append(&mut self, raw: &str) -> EngineResult<()> {
        self.tokens.push(VersionToken::new(raw)?);
        Ok(())
    }

    pub fn push(&mut self, token: VersionToken) {
        self.tokens.push(token);
    }

    /// Remove the token at `position`. Out-of-range positions are ignored.
    pub fn remove_at(&mut self, position: usize) -> Option<VersionToken> {
        if position < self.tokens.len() {
            Some(self.tokens.remove(position))
        } else {
            None
        }
    }

    /// Collapse duplicates to their first occurrence. Returns how many were removed.
    pub fn deduplicate(&mut self) -> usize {
        let before = self.tokens.len();
        let mut seen = HashSet::with_capacity(before);
        self.tokens.retain(|token| seen.insert(token.clone()));
        before - self.tokens.len()
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    /// Immutable copy for a dispatch run
    pub fn snapshot(&self) -> Arc<[VersionToken]> {
        Arc::from(self.tokens.as_slice())
    }

    /// Token at `position`
    pub fn get(&self, position: usize) -> EngineResult<&VersionToken> {
        self.tokens
            .get(position)
            .ok_or_else(|| EngineError::index_out_of_range(position, self.tokens.len()))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionToken> {
        self.tokens.iter()
    }

    /// One token per line, suitable for [`load`](Self::load)
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for token in &self.tokens {
            text.push_str(token);
            text.push('\n');
        }
        text
    }
}

impl FromIterator<VersionToken> for CandidateSet {
    fn from_iter<T: IntoIterator<Item = VersionToken>>(iter: T) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

fn parse_lines(text: &str) -> impl Iterator<Item = VersionToken> + '_ {
    text.split(is_line_break)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| VersionToken(line.to_string()))
}
