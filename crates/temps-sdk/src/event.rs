//! Telemetry event model
//!
//! An [`Event`] is created once by the client from a raw signal and then moved
//! through the hook pipeline. Waterfall taps take the event by value and return
//! the next one, so no two stages ever alias the same record. The capture
//! timestamp is private: taps can rebuild everything else but cannot rewrite it.

use std::backtrace::Backtrace;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open key/value context merged into events by callers and plugins
pub type EventContext = Map<String, Value>;

/// Closed set of event tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Error,
    Performance,
    Custom,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Error => "error",
            EventType::Performance => "performance",
            EventType::Custom => "custom",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured telemetry record
///
/// Wire format: `{type, message?, stack?, metric?, value?, timestamp, context?}`
/// with `timestamp` in milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    timestamp: i64,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: EventContext,
}

impl Event {
    fn new(kind: EventType, context: Option<EventContext>) -> Self {
        Self {
            kind,
            message: None,
            stack: None,
            metric: None,
            value: None,
            timestamp: Utc::now().timestamp_millis(),
            context: context.unwrap_or_default(),
        }
    }

    /// Build an `error` event from a captured exception
    pub fn error(exception: &Exception, context: Option<EventContext>) -> Self {
        let mut event = Self::new(EventType::Error, context);
        event.message = Some(exception.message.clone());
        event.stack = Some(exception.stack.clone());
        event
    }

    /// Build a `performance` event for a named metric
    pub fn performance(
        metric: impl Into<String>,
        value: f64,
        context: Option<EventContext>,
    ) -> Self {
        let mut event = Self::new(EventType::Performance, context);
        event.metric = Some(metric.into());
        event.value = Some(value);
        event
    }

    /// Build a `custom` event; the name travels in the `metric` field
    pub fn custom(name: impl Into<String>, context: Option<EventContext>) -> Self {
        let mut event = Self::new(EventType::Custom, context);
        event.metric = Some(name.into());
        event
    }

    /// Capture time in milliseconds since the Unix epoch
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Return the event with one context entry added or replaced
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Return the event with every entry of `patch` merged into its context
    pub fn with_context(mut self, patch: EventContext) -> Self {
        self.context.extend(patch);
        self
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Raw error information handed to the client
///
/// Every capture path funnels into this shape so that events uniformly carry
/// a message and a stack, whatever the original cause was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    pub message: String,
    pub stack: String,
}

impl Exception {
    /// Exception with the given message and a backtrace captured here
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let stack = format!("Error: {}\n{}", message, Backtrace::force_capture());
        Self { message, stack }
    }

    /// Exception from a Rust error, including its `source()` chain in the stack
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let message = err.to_string();
        let mut stack = format!("Error: {}", message);
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push_str(&format!("\nCaused by: {}", cause));
            source = cause.source();
        }
        stack.push('\n');
        stack.push_str(&Backtrace::force_capture().to_string());
        Self { message, stack }
    }

    /// Coerce an arbitrary non-error reason into an exception
    pub fn from_reason(reason: impl fmt::Display) -> Self {
        Self::new(reason.to_string())
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = stack.into();
        self
    }
}

impl From<anyhow::Error> for Exception {
    fn from(err: anyhow::Error) -> Self {
        Self::from(&err)
    }
}

impl From<&anyhow::Error> for Exception {
    fn from(err: &anyhow::Error) -> Self {
        let message = err.to_string();
        let mut stack = format!("Error: {}", message);
        for cause in err.chain().skip(1) {
            stack.push_str(&format!("\nCaused by: {}", cause));
        }
        stack.push('\n');
        stack.push_str(&err.backtrace().to_string());
        Self { message, stack }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, thiserror::Error)]
    #[error("query failed")]
    struct QueryError {
        #[source]
        source: std::io::Error,
    }

    #[test]
    fn test_error_event_wire_format() {
        let exception = Exception::new("boom");
        let event = Event::error(&exception, None);

        let value: Value = serde_json::from_str(&event.to_payload().unwrap()).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "boom");
        assert!(value["stack"].as_str().unwrap().starts_with("Error: boom"));
        assert!(value["timestamp"].is_i64());
        assert!(value.get("metric").is_none());
        assert!(value.get("value").is_none());
        assert!(value.get("context").is_none());
    }

    #[test]
    fn test_performance_event_wire_format() {
        let mut context = EventContext::new();
        context.insert("page".to_string(), json!("/checkout"));
        let event = Event::performance("LCP", 1234.5, Some(context));

        let value: Value = serde_json::from_str(&event.to_payload().unwrap()).unwrap();
        assert_eq!(value["type"], "performance");
        assert_eq!(value["metric"], "LCP");
        assert_eq!(value["value"], 1234.5);
        assert_eq!(value["context"]["page"], "/checkout");
        assert!(value.get("message").is_none());
    }

    #[test]
    fn test_payload_roundtrip_keeps_timestamp() {
        let event = Event::custom("signup", None).with_context_entry("plan", "pro");
        let decoded = Event::from_payload(&event.to_payload().unwrap()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.timestamp(), event.timestamp());
    }

    #[test]
    fn test_exception_from_error_includes_source_chain() {
        let err = QueryError {
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        let exception = Exception::from_error(&err);
        assert_eq!(exception.message, "query failed");
        assert!(exception.stack.contains("Caused by: disk full"));
    }

    #[test]
    fn test_exception_from_reason_coerces_values() {
        let exception = Exception::from_reason(42);
        assert_eq!(exception.message, "42");
        assert!(!exception.stack.is_empty());
    }

    #[test]
    fn test_exception_from_anyhow() {
        let err = anyhow::anyhow!("inner").context("outer");
        let exception = Exception::from(err);
        assert_eq!(exception.message, "outer");
        assert!(exception.stack.contains("Caused by: inner"));
    }
}
