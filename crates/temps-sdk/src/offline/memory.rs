use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{OfflineStore, PendingEntry, PendingRequest};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    entries: Vec<PendingEntry>,
}

/// Process-local store; entries do not survive a restart
#[derive(Debug, Default)]
pub struct MemoryOfflineStore {
    state: Mutex<MemoryState>,
}

impl MemoryOfflineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfflineStore for MemoryOfflineStore {
    async fn enqueue(&self, request: PendingRequest) -> Result<PendingEntry, StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        state.next_id += 1;
        let entry = PendingEntry {
            id: state.next_id,
            request,
            queued_at: Utc::now(),
        };
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn list_pending(&self) -> Result<Vec<PendingEntry>, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.entries.clone())
    }

    async fn remove(&self, request: &PendingRequest) -> Result<usize, StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        let before = state.entries.len();
        state.entries.retain(|entry| &entry.request != request);
        Ok(before - state.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &str) -> PendingRequest {
        PendingRequest {
            url: "https://temps.example.com/api/1/store/".to_string(),
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_assigns_increasing_ids() {
        let store = MemoryOfflineStore::new();
        let first = store.enqueue(request("a")).await.unwrap();
        let second = store.enqueue(request("b")).await.unwrap();

        assert!(second.id > first.id);
        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].request.body, "a");
    }

    #[tokio::test]
    async fn test_remove_matches_url_and_body() {
        let store = MemoryOfflineStore::new();
        store.enqueue(request("a")).await.unwrap();
        store.enqueue(request("b")).await.unwrap();

        let other_url = PendingRequest {
            url: "https://elsewhere.example.com/".to_string(),
            body: "a".to_string(),
        };
        assert_eq!(store.remove(&other_url).await.unwrap(), 0);
        assert_eq!(store.remove(&request("a")).await.unwrap(), 1);

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request.body, "b");
    }
}
