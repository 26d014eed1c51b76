use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of a single handler invocation.
pub type HandlerResult = Result<Value, String>;

/// Implemented once per task name; receives the task's JSON args.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, args: Value) -> HandlerResult;
}

/// Maps task names to their handlers.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler under a task name, replacing any previous one.
    pub fn register<H: JobHandler + 'static>(&self, task_name: impl Into<String>, handler: H) {
        self.handlers.write().insert(task_name.into(), Arc::new(handler));
    }

    pub fn get(&self, task_name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.read().get(task_name).cloned()
    }

    pub fn contains(&self, task_name: &str) -> bool {
        self.handlers.read().contains_key(task_name)
    }

    /// All registered task names.
    pub fn task_names(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns its args unchanged.
pub struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    async fn run(&self, args: Value) -> HandlerResult {
        Ok(args)
    }
}

/// Sleeps for `{"millis": n}` (default 1000), then returns how long it slept.
pub struct SleepHandler;

#[async_trait]
impl JobHandler for SleepHandler {
    async fn run(&self, args: Value) -> HandlerResult {
        let millis = args.get("millis").and_then(Value::as_u64).unwrap_or(1000);
        tokio::time::sleep(tokio::time::Duration::from_millis(millis)).await;
        Ok(json!({ "slept_ms": millis }))
    }
}

/// Counts words and characters in `{"text": "..."}`.
pub struct WordCountHandler;

#[async_trait]
impl JobHandler for WordCountHandler {
    async fn run(&self, args: Value) -> HandlerResult {
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing string field 'text'".to_string())?;

        Ok(json!({
            "words": text.split_whitespace().count(),
            "chars": text.chars().count(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_handler() {
        let result = EchoHandler.run(json!({"a": 1})).await.unwrap();
        assert_eq!(result, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_word_count_handler() {
        let result = WordCountHandler
            .run(json!({"text": "one two three"}))
            .await
            .unwrap();
        assert_eq!(result, json!({"words": 3, "chars": 13}));

        let err = WordCountHandler.run(json!({})).await.unwrap_err();
        assert!(err.contains("text"));
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = HandlerRegistry::new();
        registry.register("echo", EchoHandler);

        assert!(registry.contains("echo"));
        assert!(!registry.contains("transcribe"));

        let handler = registry.get("echo").unwrap();
        let result = handler.run(json!("hi")).await.unwrap();
        assert_eq!(result, json!("hi"));
    }
}
