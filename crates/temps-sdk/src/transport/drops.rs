//! Dropped-event accounting
//!
//! The transport never retries by itself; it only reports what it could not
//! deliver through an injectable recorder.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

/// Category used when no classifier is configured
pub const DEFAULT_CATEGORY: &str = "default";

/// Why an event was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    QueueOverflow,
    NetworkError,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::QueueOverflow => "queue_overflow",
            DropReason::NetworkError => "network_error",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details passed to the drop recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEvent {
    pub category: String,
    pub payload: String,
}

/// Maps a serialized payload to an accounting category
pub type CategoryClassifier = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Receives one call per dropped event
pub type DropRecorder = Arc<dyn Fn(DropReason, &DroppedEvent) + Send + Sync>;

/// Classifier that reads the event `type` field from a JSON payload
pub fn classify_by_event_type(payload: &str) -> String {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| value.get("type")?.as_str().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
}

/// In-memory drop counter keyed by `(reason, category)`
#[derive(Debug, Clone, Default)]
pub struct DropCounter {
    counts: Arc<Mutex<HashMap<(DropReason, String), u64>>>,
}

impl DropCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that feeds this counter
    pub fn recorder(&self) -> DropRecorder {
        let counts = self.counts.clone();
        Arc::new(move |reason: DropReason, dropped: &DroppedEvent| {
            *counts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry((reason, dropped.category.clone()))
                .or_insert(0) += 1;
        })
    }

    pub fn count(&self, reason: DropReason, category: &str) -> u64 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(reason, category.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    /// Sorted snapshot of every non-zero counter
    pub fn snapshot(&self) -> Vec<(DropReason, String, u64)> {
        let mut entries: Vec<_> = self
            .counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|((reason, category), count)| (*reason, category.clone(), *count))
            .collect();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_event_type() {
        assert_eq!(classify_by_event_type(r#"{"type":"error"}"#), "error");
        assert_eq!(
            classify_by_event_type(r#"{"type":"performance","value":1}"#),
            "performance"
        );
        assert_eq!(classify_by_event_type("not json"), DEFAULT_CATEGORY);
        assert_eq!(classify_by_event_type(r#"{"type":3}"#), DEFAULT_CATEGORY);
    }

    #[test]
    fn test_drop_counter_counts_per_reason_and_category() {
        let counter = DropCounter::new();
        let recorder = counter.recorder();
        let dropped = DroppedEvent {
            category: "error".to_string(),
            payload: "{}".to_string(),
        };

        recorder(DropReason::NetworkError, &dropped);
        recorder(DropReason::NetworkError, &dropped);
        recorder(DropReason::QueueOverflow, &dropped);

        assert_eq!(counter.count(DropReason::NetworkError, "error"), 2);
        assert_eq!(counter.count(DropReason::QueueOverflow, "error"), 1);
        assert_eq!(counter.count(DropReason::QueueOverflow, "default"), 0);
        assert_eq!(counter.total(), 3);
        assert_eq!(
            counter.snapshot(),
            vec![
                (DropReason::QueueOverflow, "error".to_string(), 1),
                (DropReason::NetworkError, "error".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_drop_reason_display() {
        assert_eq!(DropReason::QueueOverflow.to_string(), "queue_overflow");
        assert_eq!(DropReason::NetworkError.to_string(), "network_error");
    }
}
