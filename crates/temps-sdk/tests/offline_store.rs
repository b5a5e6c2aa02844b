use std::sync::Arc;

use temps_sdk::offline::OfflineStore;
use temps_sdk::{PendingRequest, SqliteOfflineStore};
use tempfile::TempDir;

fn request(body: &str) -> PendingRequest {
    PendingRequest {
        url: "https://temps.example.com/api/1/store/?sentry_key=key".to_string(),
        body: body.to_string(),
    }
}

#[tokio::test]
async fn test_entries_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("offline.db");

    {
        let store = SqliteOfflineStore::open(&db_path).unwrap();
        store.enqueue(request("first")).await.unwrap();
        store.enqueue(request("second")).await.unwrap();
    }

    let reopened = SqliteOfflineStore::open(&db_path).unwrap();
    let pending = reopened.list_pending().await.unwrap();

    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].request.body, "first");
    assert_eq!(pending[1].request.body, "second");
    assert!(pending[0].id < pending[1].id);
}

#[tokio::test]
async fn test_remove_by_identity() {
    let store = SqliteOfflineStore::open_in_memory().unwrap();
    store.enqueue(request("keep")).await.unwrap();
    store.enqueue(request("drop")).await.unwrap();
    store.enqueue(request("drop")).await.unwrap();

    let removed = store.remove(&request("drop")).await.unwrap();

    assert_eq!(removed, 2);
    let pending = store.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request, request("keep"));
}

#[tokio::test]
async fn test_remove_requires_matching_url() {
    let store = SqliteOfflineStore::open_in_memory().unwrap();
    store.enqueue(request("body")).await.unwrap();

    let other = PendingRequest {
        url: "https://other.example.com/".to_string(),
        body: "body".to_string(),
    };

    assert_eq!(store.remove(&other).await.unwrap(), 0);
    assert_eq!(store.list_pending().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_enqueue_records_time() {
    let store = SqliteOfflineStore::open_in_memory().unwrap();
    let before = chrono::Utc::now();

    let entry = store.enqueue(request("timed")).await.unwrap();
    let listed = store.list_pending().await.unwrap();

    assert!(entry.queued_at >= before);
    assert_eq!(listed[0].queued_at, entry.queued_at);
}

#[tokio::test]
async fn test_store_usable_as_trait_object() {
    let temp_dir = TempDir::new().unwrap();
    let store: Arc<dyn OfflineStore> =
        Arc::new(SqliteOfflineStore::open(temp_dir.path().join("shared.db")).unwrap());

    let entry = store.enqueue(request("dyn")).await.unwrap();

    assert_eq!(entry.request.body, "dyn");
    assert_eq!(store.list_pending().await.unwrap().len(), 1);
}
