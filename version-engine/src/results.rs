//! Append-only result history

use crate::error::{EngineError, EngineResult};
use crate::types::ResultEntry;
use tokio::sync::RwLock;
use tracing::debug;

/// Ordered collection of recorded results.
///
/// Entries appear in completion order. Sequence ids start at 1 after
/// construction or [`clear`](Self::clear) and strictly increase.
#[derive(Debug, Default)]
pub struct ResultSink {
    state: RwLock<SinkState>,
}

#[derive(Debug, Default)]
struct SinkState {
    entries: Vec<ResultEntry>,
    last_id: u64,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` and return its sequence id. Any id already on the entry is overwritten.
    pub async fn append(&self, mut entry: ResultEntry) -> u64 {
        let mut state = self.state.write().await;
        state.last_id += 1;
        entry.id = state.last_id;
        state.entries.push(entry);
        state.last_id
    }

    /// Drop every entry and reset the sequence counter
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        debug!("Clearing {} recorded results", state.entries.len());
        state.entries.clear();
        state.last_id = 0;
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Entry at `position` in history order
    pub async fn get(&self, position: usize) -> EngineResult<ResultEntry> {
        let state = self.state.read().await;
        state
            .entries
            .get(position)
            .cloned()
            .ok_or_else(|| EngineError::index_out_of_range(position, state.entries.len()))
    }

    /// Entry with the given sequence id
    pub async fn find(&self, id: u64) -> Option<ResultEntry> {
        let state = self.state.read().await;
        state.entries.iter().find(|entry| entry.id == id).cloned()
    }

    /// Copy of the whole history
    pub async fn entries(&self) -> Vec<ResultEntry> {
        self.state.read().await.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Exchange, HttpRequestData, HttpResponseData, VersionToken};
    use std::sync::Arc;
    use uuid::Uuid;

    fn entry(path: &str) -> ResultEntry {
        let request = HttpRequestData::from_url("GET", &format!("https://example.com{}", path)).unwrap();
        ResultEntry::new(
            Uuid::new_v4(),
            "/v1",
            VersionToken::new("v1").unwrap(),
            VersionToken::new("v2").unwrap(),
            Exchange {
                request,
                response: HttpResponseData::new(200, b"ok".to_vec()),
            },
        )
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let sink = ResultSink::new();
        assert_eq!(sink.append(entry("/v2")).await, 1);
        assert_eq!(sink.append(entry("/v3")).await, 2);
        assert_eq!(sink.len().await, 2);
        assert_eq!(sink.get(1).await.unwrap().id, 2);
        assert_eq!(sink.get(1).await.unwrap().modified_path, "/v3");
    }

    #[tokio::test]
    async fn test_clear_resets_sequence() {
        let sink = ResultSink::new();
        sink.append(entry("/v2")).await;
        sink.append(entry("/v3")).await;
        sink.clear().await;

        assert_eq!(sink.len().await, 0);
        assert!(sink.is_empty().await);
        assert_eq!(sink.append(entry("/v2")).await, 1);
    }

    #[tokio::test]
    async fn test_get_out_of_range() {
        let sink = ResultSink::new();
        sink.append(entry("/v2")).await;
        assert_eq!(
            sink.get(3).await.unwrap_err(),
            EngineError::IndexOutOfRange { index: 3, len: 1 }
        );
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let sink = ResultSink::new();
        sink.append(entry("/v2")).await;
        let id = sink.append(entry("/v3")).await;
        assert_eq!(sink.find(id).await.unwrap().modified_path, "/v3");
        assert!(sink.find(99).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_appends_yield_unique_ids() {
        let sink = Arc::new(ResultSink::new());
        let mut handles = Vec::new();
        for i in 0..64 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                sink.append(entry(&format!("/v{}", i))).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=64).collect::<Vec<u64>>());

        let history: Vec<u64> = sink.entries().await.iter().map(|e| e.id).collect();
        assert!(history.windows(2).all(|w| w[0] < w[1]));
    }
}
