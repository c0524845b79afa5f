//! Task handler trait and the registry the processor dispatches through.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::errors::TaskError;

/// Executes one task type
///
/// Handlers receive the raw envelope payload and decode it themselves, so a
/// malformed payload surfaces as [`TaskError::SkipRetry`].
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    fn task_type(&self) -> &'static str;

    async fn handle(&self, payload: &serde_json::Value) -> Result<(), TaskError>;
}

/// Task type → handler
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same type
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) -> &mut Self {
        self.handlers
            .insert(handler.task_type().to_string(), handler);
        self
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }

    pub fn task_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(&'static str);

    #[async_trait]
    impl TaskHandler for Noop {
        fn task_type(&self) -> &'static str {
            self.0
        }

        async fn handle(&self, _payload: &serde_json::Value) -> Result<(), TaskError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_registry_dispatch() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(Arc::new(Noop("task:b")))
            .register(Arc::new(Noop("task:a")));

        assert_eq!(registry.task_types(), vec!["task:a", "task:b"]);
        assert!(registry.get("task:missing").is_none());

        let handler = registry.get("task:a").unwrap();
        handler.handle(&serde_json::Value::Null).await.unwrap();
    }
}
