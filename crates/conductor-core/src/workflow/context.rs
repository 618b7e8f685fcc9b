//! Shared execution context handed to every task action.
//!
//! `ExecutionContext` is a cheap-to-clone handle over one concurrent map. All
//! reads and writes go through explicit accessors, so sibling tasks running
//! in the same ready round can write different keys without coordinating;
//! writes to the same key are serialized by the map's shard lock and the last
//! writer wins. The scheduler is the only component that snapshots the map
//! for persistence.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handle to the key/value store of one workflow execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    values: Arc<DashMap<String, Value>>,
    execution_id: Uuid,
    cancel: CancellationToken,
}

impl ExecutionContext {
    /// Create a context seeded with `initial` entries.
    pub fn new(
        execution_id: Uuid,
        initial: impl IntoIterator<Item = (String, Value)>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            values: Arc::new(initial.into_iter().collect()),
            execution_id,
            cancel,
        }
    }

    /// A detached context with no cancellation wiring (tests, dry runs).
    pub fn detached(initial: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::new(Uuid::nil(), initial, CancellationToken::new())
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Clone out the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.remove(key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Ordered copy of every entry, used for persistence.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Whether the execution has been asked to stop.
    ///
    /// Long-running actions should poll this (or await [`cancelled`]) and
    /// return early.
    ///
    /// [`cancelled`]: ExecutionContext::cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the execution is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seeded_values_are_readable() {
        let ctx = ExecutionContext::detached([("input".to_string(), json!("report.pdf"))]);
        assert_eq!(ctx.get("input"), Some(json!("report.pdf")));
        assert!(ctx.get("missing").is_none());
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn clones_share_the_same_map() {
        let ctx = ExecutionContext::detached([]);
        let other = ctx.clone();
        other.insert("extract", json!({"pages": 3}));
        assert_eq!(ctx.get("extract"), Some(json!({"pages": 3})));
    }

    #[test]
    fn insert_returns_previous_and_remove_deletes() {
        let ctx = ExecutionContext::detached([]);
        assert!(ctx.insert("k", json!(1)).is_none());
        assert_eq!(ctx.insert("k", json!(2)), Some(json!(1)));
        assert_eq!(ctx.remove("k"), Some(json!(2)));
        assert!(ctx.is_empty());
    }

    #[test]
    fn snapshot_is_key_ordered() {
        let ctx = ExecutionContext::detached([]);
        ctx.insert("b", json!(2));
        ctx.insert("a", json!(1));
        let keys: Vec<_> = ctx.snapshot().into_keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_lose_keys() {
        let ctx = ExecutionContext::detached([]);
        let mut handles = Vec::new();
        for i in 0..16 {
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                ctx.insert(format!("task-{i}"), json!(i));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(ctx.len(), 16);
    }

    #[tokio::test]
    async fn cancellation_is_observable() {
        let token = CancellationToken::new();
        let ctx = ExecutionContext::new(Uuid::now_v7(), [], token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }
}
