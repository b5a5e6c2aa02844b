//! Durable queue of not-yet-confirmed deliveries
//!
//! The store only persists, lists and removes. Deciding when to replay is
//! the transport's job.

mod memory;
mod sqlite;

pub use memory::MemoryOfflineStore;
pub use sqlite::SqliteOfflineStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Logical identity of a delivery: destination plus body
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingRequest {
    pub url: String,
    pub body: String,
}

/// A persisted delivery with its store-assigned key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: i64,
    pub request: PendingRequest,
    pub queued_at: DateTime<Utc>,
}

#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Persist a delivery; the store assigns the key and enqueue time
    async fn enqueue(&self, request: PendingRequest) -> Result<PendingEntry, StoreError>;

    /// All pending deliveries, oldest first
    async fn list_pending(&self) -> Result<Vec<PendingEntry>, StoreError>;

    /// Remove every entry whose url and body match; returns how many were removed
    async fn remove(&self, request: &PendingRequest) -> Result<usize, StoreError>;
}
