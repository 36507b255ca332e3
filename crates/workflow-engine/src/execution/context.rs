//! Data passed between the nodes of a run

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which the raw trigger payload is stored
pub const PAYLOAD_KEY: &str = "payload";

/// Key under which a non-object trigger result is stored
pub const TRIGGER_KEY: &str = "trigger";

/// Key/value store shared by the steps of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    data: Map<String, Value>,
}

impl ExecutionContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Consume the context as a JSON object
    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }

    /// Merge a handler result into the context
    ///
    /// Object keys are merged at the top level (later values win); any
    /// other value is stored whole under `fallback_key`.
    pub fn merge_result(&mut self, fallback_key: &str, result: Value) {
        match result {
            Value::Object(map) => self.data.extend(map),
            Value::Null => {}
            other => {
                self.data.insert(fallback_key.to_string(), other);
            }
        }
    }
}
