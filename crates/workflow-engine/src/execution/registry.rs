//! Handler registry for trigger, action and condition subtypes
//!
//! The engine never hardcodes what a `send_email` action or a
//! `priority_check` condition does. Hosts register one handler per subtype
//! string and the engine looks them up by the node's config key
//! (`triggerType`, `actionType`, `conditionType`).
//!
//! # Usage
//!
//! ```ignore
//! let mut registry = HandlerRegistry::new();
//! registry.register_trigger_fn("ticket_created", |_node, payload| async move { Ok(payload) });
//! registry.register_action_fn("assign_ticket", |_node, _ctx| async move { Ok(json!({"agent": "ana"})) });
//! registry.register_condition_fn("priority_check", |_node, ctx| {
//!     Ok(ctx.get("priority").and_then(|v| v.as_str()) == Some("high"))
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerResult;
use crate::execution::context::ExecutionContext;
use crate::types::WorkflowNode;

/// Starts a run from the trigger payload
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    /// Returns data merged into the run context
    async fn fire(&self, node: &WorkflowNode, payload: &Value) -> HandlerResult<Value>;
}

/// Performs an action node's side effect
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Returns the step result, stored in the context under the node id
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> HandlerResult<Value>;
}

/// Decides which branch a condition node takes
pub trait ConditionPredicate: Send + Sync {
    fn evaluate(&self, node: &WorkflowNode, context: &ExecutionContext) -> HandlerResult<bool>;
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = HandlerResult<T>> + Send>>;

/// Async closure wrapped as a [`TriggerHandler`]
///
/// The closure receives owned copies so the returned future can be `'static`.
pub struct CallbackTrigger {
    callback: Box<dyn Fn(WorkflowNode, Value) -> BoxFuture<Value> + Send + Sync>,
}

#[async_trait]
impl TriggerHandler for CallbackTrigger {
    async fn fire(&self, node: &WorkflowNode, payload: &Value) -> HandlerResult<Value> {
        (self.callback)(node.clone(), payload.clone()).await
    }
}

/// Async closure wrapped as an [`ActionHandler`]
pub struct CallbackAction {
    callback: Box<dyn Fn(WorkflowNode, ExecutionContext) -> BoxFuture<Value> + Send + Sync>,
}

#[async_trait]
impl ActionHandler for CallbackAction {
    async fn execute(&self, node: &WorkflowNode, context: &ExecutionContext) -> HandlerResult<Value> {
        (self.callback)(node.clone(), context.clone()).await
    }
}

/// Closure wrapped as a [`ConditionPredicate`]
pub struct FnPredicate<F>(pub F);

impl<F> ConditionPredicate for FnPredicate<F>
where
    F: Fn(&WorkflowNode, &ExecutionContext) -> HandlerResult<bool> + Send + Sync,
{
    fn evaluate(&self, node: &WorkflowNode, context: &ExecutionContext) -> HandlerResult<bool> {
        (self.0)(node, context)
    }
}

/// Handlers keyed by subtype string
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    triggers: HashMap<String, Arc<dyn TriggerHandler>>,
    actions: HashMap<String, Arc<dyn ActionHandler>>,
    conditions: HashMap<String, Arc<dyn ConditionPredicate>>,
}

impl HandlerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_trigger(&mut self, trigger_type: impl Into<String>, handler: Arc<dyn TriggerHandler>) {
        self.triggers.insert(trigger_type.into(), handler);
    }

    pub fn register_action(&mut self, action_type: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.actions.insert(action_type.into(), handler);
    }

    pub fn register_condition(
        &mut self,
        condition_type: impl Into<String>,
        predicate: Arc<dyn ConditionPredicate>,
    ) {
        self.conditions.insert(condition_type.into(), predicate);
    }

    /// Register a trigger backed by an async closure
    pub fn register_trigger_fn<F, Fut>(&mut self, trigger_type: impl Into<String>, callback: F)
    where
        F: Fn(WorkflowNode, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Value>> + Send + 'static,
    {
        let handler = CallbackTrigger {
            callback: Box::new(move |node, payload| Box::pin(callback(node, payload))),
        };
        self.register_trigger(trigger_type, Arc::new(handler));
    }

    /// Register an action backed by an async closure
    pub fn register_action_fn<F, Fut>(&mut self, action_type: impl Into<String>, callback: F)
    where
        F: Fn(WorkflowNode, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Value>> + Send + 'static,
    {
        let handler = CallbackAction {
            callback: Box::new(move |node, context| Box::pin(callback(node, context))),
        };
        self.register_action(action_type, Arc::new(handler));
    }

    /// Register a condition backed by a plain closure
    pub fn register_condition_fn<F>(&mut self, condition_type: impl Into<String>, predicate: F)
    where
        F: Fn(&WorkflowNode, &ExecutionContext) -> HandlerResult<bool> + Send + Sync + 'static,
    {
        self.register_condition(condition_type, Arc::new(FnPredicate(predicate)));
    }

    pub fn trigger(&self, trigger_type: &str) -> Option<Arc<dyn TriggerHandler>> {
        self.triggers.get(trigger_type).cloned()
    }

    pub fn action(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.actions.get(action_type).cloned()
    }

    pub fn condition(&self, condition_type: &str) -> Option<Arc<dyn ConditionPredicate>> {
        self.conditions.get(condition_type).cloned()
    }

    /// Registered trigger subtypes, sorted
    pub fn trigger_types(&self) -> Vec<&str> {
        sorted_keys(&self.triggers)
    }

    /// Registered action subtypes, sorted
    pub fn action_types(&self) -> Vec<&str> {
        sorted_keys(&self.actions)
    }

    /// Registered condition subtypes, sorted
    pub fn condition_types(&self) -> Vec<&str> {
        sorted_keys(&self.conditions)
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` with the same subtype.
    pub fn merge(&mut self, other: HandlerRegistry) {
        self.triggers.extend(other.triggers);
        self.actions.extend(other.actions);
        self.conditions.extend(other.conditions);
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<&str> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}
