use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const TASK_ID: &str = "task_id";
pub const CONTEXT_ID: &str = "context_id";
pub const QUERY: &str = "query";

/// Run-scoped metadata attached to a node by id.
///
/// Merging is last-write-wins per key, so stamping the same values twice
/// leaves the map unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    data: HashMap<String, serde_json::Value>,
}

impl NodeAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_id(self, task_id: impl Into<String>) -> Self {
        self.stamp(TASK_ID, task_id.into())
    }

    pub fn with_context_id(self, context_id: impl Into<String>) -> Self {
        self.stamp(CONTEXT_ID, context_id.into())
    }

    pub fn with_query(self, query: impl Into<String>) -> Self {
        self.stamp(QUERY, query.into())
    }

    pub fn task_id(&self) -> Option<&str> {
        self.text(TASK_ID)
    }

    pub fn context_id(&self) -> Option<&str> {
        self.text(CONTEXT_ID)
    }

    /// Follow-up input routed to this node, if any.
    pub fn query(&self) -> Option<&str> {
        self.text(QUERY)
    }

    pub fn merge(&mut self, other: &NodeAttributes) {
        self.data
            .extend(other.data.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    fn stamp(mut self, key: &str, value: String) -> Self {
        self.data
            .insert(key.to_string(), serde_json::Value::String(value));
        self
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.data.get(key)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let attrs = NodeAttributes::new()
            .with_task_id("t1")
            .with_query("Paris in May");

        assert_eq!(attrs.task_id(), Some("t1"));
        assert_eq!(attrs.query(), Some("Paris in May"));
        assert_eq!(attrs.context_id(), None);
    }

    #[test]
    fn test_merge_last_write_wins() {
        let mut attrs = NodeAttributes::new().with_task_id("t1").with_query("first");
        let update = NodeAttributes::new().with_query("second").with_context_id("c1");

        attrs.merge(&update);

        assert_eq!(attrs.task_id(), Some("t1"));
        assert_eq!(attrs.query(), Some("second"));
        assert_eq!(attrs.context_id(), Some("c1"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let update = NodeAttributes::new().with_task_id("t1").with_context_id("c1");
        let mut once = NodeAttributes::new();
        once.merge(&update);
        let mut twice = once.clone();
        twice.merge(&update);
        assert_eq!(once, twice);
    }
}
