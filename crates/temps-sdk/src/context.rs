//! Ambient context attached to every event
//!
//! [`ContextDescriptor`] is an immutable value. Updates build a new descriptor
//! and swap it in wholesale, so a capture running concurrently with an update
//! sees either the old or the new descriptor, never a mix.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::BoxError;
use crate::event::EventContext;
use crate::plugin::{Plugin, PluginContext};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(default, skip_serializing_if = "EventContext::is_empty")]
    pub tags: EventContext,
    #[serde(default, skip_serializing_if = "EventContext::is_empty")]
    pub extra: EventContext,
}

impl ContextDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release(&self, release: impl Into<String>) -> Self {
        Self {
            release: Some(release.into()),
            ..self.clone()
        }
    }

    pub fn with_environment(&self, environment: impl Into<String>) -> Self {
        Self {
            environment: Some(environment.into()),
            ..self.clone()
        }
    }

    pub fn with_user(&self, user: Value) -> Self {
        Self {
            user: Some(user),
            ..self.clone()
        }
    }

    pub fn without_user(&self) -> Self {
        Self {
            user: None,
            ..self.clone()
        }
    }

    pub fn with_tag(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut tags = self.tags.clone();
        tags.insert(key.into(), value.into());
        Self {
            tags,
            ..self.clone()
        }
    }

    /// New descriptor with `patch` merged into the free-form context
    pub fn with_context(&self, patch: EventContext) -> Self {
        let mut extra = self.extra.clone();
        extra.extend(patch);
        Self {
            extra,
            ..self.clone()
        }
    }

    /// Flatten into event context entries
    pub fn to_event_context(&self) -> EventContext {
        let mut context = self.extra.clone();
        if let Some(release) = &self.release {
            context.insert("release".to_string(), Value::from(release.as_str()));
        }
        if let Some(environment) = &self.environment {
            context.insert("environment".to_string(), Value::from(environment.as_str()));
        }
        if let Some(user) = &self.user {
            context.insert("user".to_string(), user.clone());
        }
        if !self.tags.is_empty() {
            context.insert("tags".to_string(), Value::Object(self.tags.clone()));
        }
        context
    }
}

/// Merges the current [`ContextDescriptor`] into every outgoing event
///
/// Taps `transformEvent`. Keys already present on the event are kept.
pub struct ContextPlugin {
    descriptor: Arc<RwLock<Arc<ContextDescriptor>>>,
}

impl ContextPlugin {
    pub const NAME: &'static str = "context";

    pub fn new(descriptor: ContextDescriptor) -> Self {
        Self {
            descriptor: Arc::new(RwLock::new(Arc::new(descriptor))),
        }
    }

    pub fn current(&self) -> Arc<ContextDescriptor> {
        self.descriptor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the descriptor with the one `update` derives from the current value
    pub fn update<F>(&self, update: F)
    where
        F: FnOnce(&ContextDescriptor) -> ContextDescriptor,
    {
        let mut slot = self.descriptor.write().unwrap_or_else(PoisonError::into_inner);
        let next = update(slot.as_ref());
        *slot = Arc::new(next);
    }
}

impl Default for ContextPlugin {
    fn default() -> Self {
        Self::new(ContextDescriptor::default())
    }
}

impl Plugin for ContextPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn setup(&self, context: &PluginContext) -> Result<(), BoxError> {
        let descriptor = self.descriptor.clone();
        context
            .hooks()
            .transform_event
            .tap(Self::NAME, move |event, _| {
                let current = descriptor
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                let mut merged = current.to_event_context();
                merged.extend(event.context.clone());
                let mut event = event;
                event.context = merged;
                event
            });
        debug!("Context plugin attached");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_context_returns_new_descriptor() {
        let original = ContextDescriptor::new().with_release("1.2.0");
        let mut patch = EventContext::new();
        patch.insert("region".to_string(), json!("eu"));

        let updated = original.with_context(patch);

        assert!(original.extra.is_empty());
        assert_eq!(updated.extra["region"], "eu");
        assert_eq!(updated.release.as_deref(), Some("1.2.0"));
    }

    #[test]
    fn test_to_event_context_flattens_fields() {
        let descriptor = ContextDescriptor::new()
            .with_environment("staging")
            .with_user(json!({"id": "u-1"}))
            .with_tag("team", "checkout");

        let context = descriptor.to_event_context();
        assert_eq!(context["environment"], "staging");
        assert_eq!(context["user"]["id"], "u-1");
        assert_eq!(context["tags"]["team"], "checkout");
        assert!(!context.contains_key("release"));
    }

    #[test]
    fn test_update_swaps_descriptor() {
        let plugin = ContextPlugin::default();
        let before = plugin.current();

        plugin.update(|d| d.with_release("2.0.0"));

        assert!(before.release.is_none());
        assert_eq!(plugin.current().release.as_deref(), Some("2.0.0"));
    }
}
