//! Workflow execution
//!
//! A run starts at the first trigger node, fires its handler with the
//! trigger payload, then walks outgoing connections one node at a time:
//!
//! - **action**: dispatched by `actionType`; result stored in the context
//!   under the node id and appended to the trace
//! - **condition**: evaluated by `conditionType`; the connection whose
//!   `sourceHandle` matches the result (`"true"` / `"false"`) is followed,
//!   falling back to the first untagged connection
//! - **approval, notification, assignment**: passed through without
//!   dispatch or trace entry
//!
//! The run ends at a node with no outgoing connection. Each handler is
//! awaited before the walk advances; the first failure aborts the run with
//! the trace recorded so far.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::constants::handles;
use crate::error::{ExecutionError, ExecutionFailure};
use crate::events::{EventSink, WorkflowEvent};
use crate::execution::context::{PAYLOAD_KEY, TRIGGER_KEY};
use crate::execution::registry::HandlerRegistry;
use crate::execution::trace::{ExecutionTrace, TraceStep};
use crate::graph::WorkflowGraph;
use crate::types::{NodeId, NodeType, Workflow, WorkflowConnection, WorkflowId, WorkflowNode};

/// Shared, lockable handle to a workflow record
///
/// Runs clone a snapshot under the read lock and update the execution
/// counters under the write lock, so concurrent runs of the same workflow
/// never lose an increment.
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    inner: Arc<RwLock<Workflow>>,
}

impl WorkflowHandle {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            inner: Arc::new(RwLock::new(workflow)),
        }
    }

    pub fn id(&self) -> WorkflowId {
        self.inner.read().id.clone()
    }

    /// Clone of the current record
    pub fn snapshot(&self) -> Workflow {
        self.inner.read().clone()
    }

    pub fn execution_count(&self) -> u64 {
        self.inner.read().execution_count
    }

    /// Mutate the record under the write lock
    pub fn update<R>(&self, f: impl FnOnce(&mut Workflow) -> R) -> R {
        f(&mut self.inner.write())
    }
}

impl From<Workflow> for WorkflowHandle {
    fn from(workflow: Workflow) -> Self {
        Self::new(workflow)
    }
}

/// Error plus the node it happened on
type StepError = (ExecutionError, Option<NodeId>);

/// Runs workflows against a handler registry
#[derive(Clone)]
pub struct ExecutionEngine {
    registry: Arc<HandlerRegistry>,
    max_steps: u32,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<HandlerRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            max_steps: config.max_steps,
        }
    }

    /// Set the maximum number of nodes a run may visit.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Execute a workflow once
    ///
    /// On success the workflow's execution count and last-executed time are
    /// updated and the trace is returned. Failed runs leave the record
    /// untouched.
    pub async fn run(
        &self,
        workflow: &WorkflowHandle,
        payload: Value,
        event_sink: &dyn EventSink,
    ) -> Result<ExecutionTrace, ExecutionFailure> {
        let snapshot = workflow.snapshot();
        let run = RunEvents {
            sink: event_sink,
            workflow_id: snapshot.id.clone(),
            execution_id: format!("wf-exec-{}", uuid::Uuid::new_v4()),
        };
        let mut trace = ExecutionTrace::new(run.execution_id.clone(), snapshot.id.clone());

        log::info!("Run {} of workflow '{}' started", run.execution_id, snapshot.name);
        run.started();

        let outcome = self.walk(&snapshot.graph, payload, &mut trace, &run).await;
        let finished_at = Utc::now();
        trace.finish(finished_at);

        match outcome {
            Ok(()) => {
                workflow.update(|w| w.record_execution(finished_at));
                log::info!(
                    "Run {} completed with {} step(s)",
                    run.execution_id,
                    trace.len()
                );
                run.completed(trace.len());
                Ok(trace)
            }
            Err((error, failed_node)) => {
                log::warn!("Run {} failed: {}", run.execution_id, error);
                run.failed(&error);
                Err(ExecutionFailure {
                    error,
                    trace,
                    failed_node,
                })
            }
        }
    }

    async fn walk(
        &self,
        graph: &WorkflowGraph,
        payload: Value,
        trace: &mut ExecutionTrace,
        run: &RunEvents<'_>,
    ) -> Result<(), StepError> {
        // Multiple triggers: the first in insertion order wins.
        let trigger = graph
            .trigger_nodes()
            .next()
            .ok_or((ExecutionError::NoTriggerNode, None))?;
        let trigger_type = trigger.subtype().unwrap_or_default();
        let handler = self.registry.trigger(trigger_type).ok_or_else(|| {
            (
                ExecutionError::UnknownTriggerType(trigger_type.to_string()),
                Some(trigger.id.clone()),
            )
        })?;

        run.step_started(trigger);
        let start = Instant::now();
        let fired = handler
            .fire(trigger, &payload)
            .await
            .map_err(|e| run.handler_failed(trigger, e.message))?;
        run.step_completed(trigger, &fired, elapsed_ms(start));

        trace.context.set(PAYLOAD_KEY, payload);
        trace.context.merge_result(TRIGGER_KEY, fired);

        let mut current = first_outgoing(graph, &trigger.id).map(|c| c.target_node_id.clone());
        let mut steps: u32 = 0;

        while let Some(node_id) = current {
            if steps >= self.max_steps {
                return Err((ExecutionError::StepLimitExceeded(self.max_steps), Some(node_id)));
            }
            steps += 1;

            let Some(node) = graph.node(&node_id) else {
                log::warn!("Connection points at missing node '{}'; stopping", node_id);
                break;
            };

            current = match node.node_type {
                NodeType::Action => {
                    self.execute_action(node, trace, run).await?;
                    first_outgoing(graph, &node.id).map(|c| c.target_node_id.clone())
                }
                NodeType::Condition => {
                    let result = self.evaluate_condition(node, trace, run)?;
                    let next = branch_connection(graph, &node.id, result);
                    run.condition_evaluated(node, result, next.map(|c| c.id.clone()));
                    next.map(|c| c.target_node_id.clone())
                }
                NodeType::Trigger
                | NodeType::Approval
                | NodeType::Notification
                | NodeType::Assignment => {
                    log::debug!("Passing through {:?} node '{}'", node.node_type, node.id);
                    first_outgoing(graph, &node.id).map(|c| c.target_node_id.clone())
                }
            };
        }

        Ok(())
    }

    async fn execute_action(
        &self,
        node: &WorkflowNode,
        trace: &mut ExecutionTrace,
        run: &RunEvents<'_>,
    ) -> Result<(), StepError> {
        let action_type = node.subtype().unwrap_or_default();
        let handler = self.registry.action(action_type).ok_or_else(|| {
            (
                ExecutionError::UnknownActionType(action_type.to_string()),
                Some(node.id.clone()),
            )
        })?;

        run.step_started(node);
        let start = Instant::now();
        let result = handler
            .execute(node, &trace.context)
            .await
            .map_err(|e| run.handler_failed(node, e.message))?;
        let duration_ms = elapsed_ms(start);
        run.step_completed(node, &result, duration_ms);

        trace.context.set(node.id.clone(), result.clone());
        trace.push(TraceStep {
            node_id: node.id.clone(),
            node_type: node.node_type,
            result,
            duration_ms,
        });
        Ok(())
    }

    fn evaluate_condition(
        &self,
        node: &WorkflowNode,
        trace: &mut ExecutionTrace,
        run: &RunEvents<'_>,
    ) -> Result<bool, StepError> {
        let condition_type = node.subtype().unwrap_or_default();
        let predicate = self.registry.condition(condition_type).ok_or_else(|| {
            (
                ExecutionError::UnknownConditionType(condition_type.to_string()),
                Some(node.id.clone()),
            )
        })?;

        run.step_started(node);
        let start = Instant::now();
        let result = predicate
            .evaluate(node, &trace.context)
            .map_err(|e| run.handler_failed(node, e.message))?;
        let duration_ms = elapsed_ms(start);
        run.step_completed(node, &Value::Bool(result), duration_ms);

        trace.push(TraceStep {
            node_id: node.id.clone(),
            node_type: node.node_type,
            result: Value::Bool(result),
            duration_ms,
        });
        Ok(result)
    }
}

/// First outgoing connection in insertion order
fn first_outgoing<'a>(graph: &'a WorkflowGraph, node_id: &'a str) -> Option<&'a WorkflowConnection> {
    graph.outgoing(node_id).next()
}

/// Connection a condition follows for its result
///
/// Prefers the connection tagged with the matching handle; otherwise the
/// first untagged connection; otherwise none.
fn branch_connection<'a>(
    graph: &'a WorkflowGraph,
    node_id: &'a str,
    result: bool,
) -> Option<&'a WorkflowConnection> {
    let handle = if result { handles::TRUE } else { handles::FALSE };
    graph
        .outgoing(node_id)
        .find(|c| c.source_handle.as_deref() == Some(handle))
        .or_else(|| graph.outgoing(node_id).find(|c| c.source_handle.is_none()))
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Per-run event emission
struct RunEvents<'a> {
    sink: &'a dyn EventSink,
    workflow_id: WorkflowId,
    execution_id: String,
}

impl RunEvents<'_> {
    fn started(&self) {
        let _ = self.sink.send(WorkflowEvent::RunStarted {
            workflow_id: self.workflow_id.clone(),
            execution_id: self.execution_id.clone(),
        });
    }

    fn completed(&self, steps: usize) {
        let _ = self.sink.send(WorkflowEvent::RunCompleted {
            workflow_id: self.workflow_id.clone(),
            execution_id: self.execution_id.clone(),
            steps,
        });
    }

    fn failed(&self, error: &ExecutionError) {
        let _ = self.sink.send(WorkflowEvent::RunFailed {
            workflow_id: self.workflow_id.clone(),
            execution_id: self.execution_id.clone(),
            error: error.to_string(),
        });
    }

    fn step_started(&self, node: &WorkflowNode) {
        let _ = self.sink.send(WorkflowEvent::StepStarted {
            execution_id: self.execution_id.clone(),
            node_id: node.id.clone(),
            node_type: node.node_type,
        });
    }

    fn step_completed(&self, node: &WorkflowNode, result: &Value, duration_ms: u64) {
        let _ = self.sink.send(WorkflowEvent::StepCompleted {
            execution_id: self.execution_id.clone(),
            node_id: node.id.clone(),
            result: result.clone(),
            duration_ms,
        });
    }

    fn condition_evaluated(&self, node: &WorkflowNode, result: bool, next_connection: Option<String>) {
        let _ = self.sink.send(WorkflowEvent::ConditionEvaluated {
            execution_id: self.execution_id.clone(),
            node_id: node.id.clone(),
            result,
            next_connection,
        });
    }

    /// Emit a step failure and build the error that aborts the run
    fn handler_failed(&self, node: &WorkflowNode, message: String) -> StepError {
        let _ = self.sink.send(WorkflowEvent::StepFailed {
            execution_id: self.execution_id.clone(),
            node_id: node.id.clone(),
            error: message.clone(),
        });
        (
            ExecutionError::HandlerFailure {
                node_id: node.id.clone(),
                message,
            },
            Some(node.id.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use crate::error::HandlerError;
    use crate::events::{NullEventSink, VecEventSink};
    use serde_json::json;

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register_trigger_fn("ticket_created", |_node, payload| async move { Ok(payload) });
        registry.register_trigger_fn("schedule", |_node, _payload| async { Ok(json!("tick")) });
        registry.register_action_fn("assign_ticket", |_node, _ctx| async {
            Ok(json!({"agent": "ana"}))
        });
        registry.register_action_fn("send_email", |_node, ctx| async move {
            // Sees the output of earlier steps
            Ok(json!({"to": ctx.get("a").and_then(|v| v.get("agent")).cloned()}))
        });
        registry.register_action_fn("add_tag", |node, _ctx| async move { Ok(json!(node.id)) });
        registry.register_action_fn("escalate", |_node, _ctx| async {
            Err(HandlerError::new("pager offline"))
        });
        registry.register_condition_fn("priority_check", |_node, ctx| {
            Ok(ctx.get("priority").and_then(|v| v.as_str()) == Some("high"))
        });
        registry
    }

    fn engine() -> ExecutionEngine {
        ExecutionEngine::new(Arc::new(registry()), &EngineConfig::default())
    }

    fn linear() -> WorkflowHandle {
        let graph = WorkflowBuilder::new()
            .trigger("t", "ticket_created", (0.0, 0.0))
            .action("a", "assign_ticket", (300.0, 0.0))
            .action("b", "send_email", (600.0, 0.0))
            .connect("t", "a")
            .connect("a", "b")
            .build();
        WorkflowHandle::new(Workflow::with_graph("Linear", graph))
    }

    fn branching() -> WorkflowHandle {
        let graph = WorkflowBuilder::new()
            .trigger("t", "ticket_created", (0.0, 0.0))
            .condition("c", "priority_check", (300.0, 0.0))
            .action("hi", "add_tag", (600.0, -100.0))
            .action("lo", "add_tag", (600.0, 100.0))
            .connect("t", "c")
            .connect_from("c", "false", "lo")
            .connect_from("c", "true", "hi")
            .build();
        WorkflowHandle::new(Workflow::with_graph("Branching", graph))
    }

    #[tokio::test]
    async fn test_linear_run() {
        let handle = linear();
        let sink = VecEventSink::new();
        let trace = engine()
            .run(&handle, json!({"ticketId": 1}), &sink)
            .await
            .unwrap();

        assert_eq!(trace.node_ids(), vec!["a", "b"]);
        assert_eq!(trace.result_of("b"), Some(&json!({"to": "ana"})));
        assert_eq!(trace.context.get("ticketId"), Some(&json!(1)));
        assert_eq!(trace.context.get("payload"), Some(&json!({"ticketId": 1})));
        assert!(trace.completed_at.is_some());

        let wf = handle.snapshot();
        assert_eq!(wf.execution_count, 1);
        assert!(wf.last_executed_at.is_some());

        let events = sink.events();
        assert!(matches!(events.first(), Some(WorkflowEvent::RunStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(WorkflowEvent::RunCompleted { steps: 2, .. })
        ));
        assert!(events
            .iter()
            .all(|e| e.execution_id() == trace.execution_id));
    }

    #[tokio::test]
    async fn test_no_trigger() {
        let graph = WorkflowBuilder::new()
            .action("a", "assign_ticket", (0.0, 0.0))
            .build();
        let handle = WorkflowHandle::new(Workflow::with_graph("Headless", graph));

        let failure = engine()
            .run(&handle, Value::Null, &NullEventSink)
            .await
            .unwrap_err();
        assert_eq!(failure.error, ExecutionError::NoTriggerNode);
        assert!(failure.trace.is_empty());
        assert_eq!(handle.execution_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_trigger_and_action() {
        let graph = WorkflowBuilder::new()
            .trigger("t", "payment_received", (0.0, 0.0))
            .build();
        let handle = WorkflowHandle::new(Workflow::with_graph("Unknown", graph));
        let failure = engine().run(&handle, Value::Null, &NullEventSink).await.unwrap_err();
        assert_eq!(
            failure.error,
            ExecutionError::UnknownTriggerType("payment_received".into())
        );
        assert_eq!(failure.failed_node.as_deref(), Some("t"));

        let graph = WorkflowBuilder::new()
            .trigger("t", "ticket_created", (0.0, 0.0))
            .action("a", "assign_ticket", (300.0, 0.0))
            .action("x", "update_status", (600.0, 0.0))
            .connect("t", "a")
            .connect("a", "x")
            .build();
        let handle = WorkflowHandle::new(Workflow::with_graph("Unknown", graph));
        let failure = engine().run(&handle, Value::Null, &NullEventSink).await.unwrap_err();
        assert_eq!(
            failure.error,
            ExecutionError::UnknownActionType("update_status".into())
        );
        assert_eq!(failure.trace.node_ids(), vec!["a"]);
        assert_eq!(handle.execution_count(), 0);
    }

    #[tokio::test]
    async fn test_condition_follows_tagged_branch() {
        let handle = branching();
        let sink = VecEventSink::new();

        let trace = engine()
            .run(&handle, json!({"priority": "high"}), &sink)
            .await
            .unwrap();
        assert_eq!(trace.node_ids(), vec!["c", "hi"]);
        assert_eq!(trace.result_of("c"), Some(&json!(true)));
        assert!(sink.events().iter().any(|e| matches!(
            e,
            WorkflowEvent::ConditionEvaluated { result: true, next_connection: Some(id), .. } if id == "conn-3"
        )));

        let trace = engine()
            .run(&handle, json!({"priority": "low"}), &NullEventSink)
            .await
            .unwrap();
        assert_eq!(trace.node_ids(), vec!["c", "lo"]);
        assert_eq!(handle.execution_count(), 2);
    }

    #[tokio::test]
    async fn test_condition_falls_back_to_untagged() {
        let graph = WorkflowBuilder::new()
            .trigger("t", "ticket_created", (0.0, 0.0))
            .condition("c", "priority_check", (300.0, 0.0))
            .action("hi", "add_tag", (600.0, -100.0))
            .action("any", "add_tag", (600.0, 100.0))
            .connect("t", "c")
            .connect_from("c", "true", "hi")
            .connect("c", "any")
            .build();
        let handle = WorkflowHandle::new(Workflow::with_graph("Fallback", graph));

        let trace = engine()
            .run(&handle, json!({"priority": "low"}), &NullEventSink)
            .await
            .unwrap();
        assert_eq!(trace.node_ids(), vec!["c", "any"]);
    }

    #[tokio::test]
    async fn test_condition_without_matching_branch_stops() {
        let graph = WorkflowBuilder::new()
            .trigger("t", "ticket_created", (0.0, 0.0))
            .condition("c", "priority_check", (300.0, 0.0))
            .action("hi", "add_tag", (600.0, 0.0))
            .connect("t", "c")
            .connect_from("c", "true", "hi")
            .build();
        let handle = WorkflowHandle::new(Workflow::with_graph("Dead end", graph));

        let trace = engine()
            .run(&handle, json!({}), &NullEventSink)
            .await
            .unwrap();
        assert_eq!(trace.node_ids(), vec!["c"]);
        assert_eq!(trace.result_of("c"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_pass_through_nodes() {
        let graph = WorkflowBuilder::new()
            .trigger("t", "schedule", (0.0, 0.0))
            .add_node("ap", NodeType::Approval, Some("manager_approval"), (300.0, 0.0))
            .add_node("n", NodeType::Notification, None, (600.0, 0.0))
            .action("a", "add_tag", (900.0, 0.0))
            .connect("t", "ap")
            .connect("ap", "n")
            .connect("n", "a")
            .build();
        let handle = WorkflowHandle::new(Workflow::with_graph("Pass", graph));

        let trace = engine().run(&handle, Value::Null, &NullEventSink).await.unwrap();
        assert_eq!(trace.node_ids(), vec!["a"]);
        // Non-object trigger output lands under "trigger"
        assert_eq!(trace.context.get("trigger"), Some(&json!("tick")));
    }

    #[tokio::test]
    async fn test_handler_failure_keeps_partial_trace() {
        let graph = WorkflowBuilder::new()
            .trigger("t", "ticket_created", (0.0, 0.0))
            .action("a", "assign_ticket", (300.0, 0.0))
            .action("e", "escalate", (600.0, 0.0))
            .action("never", "add_tag", (900.0, 0.0))
            .connect("t", "a")
            .connect("a", "e")
            .connect("e", "never")
            .build();
        let handle = WorkflowHandle::new(Workflow::with_graph("Failing", graph));
        let sink = VecEventSink::new();

        let failure = engine().run(&handle, Value::Null, &sink).await.unwrap_err();
        assert_eq!(
            failure.error,
            ExecutionError::HandlerFailure {
                node_id: "e".into(),
                message: "pager offline".into()
            }
        );
        assert_eq!(failure.failed_node.as_deref(), Some("e"));
        assert_eq!(failure.trace.node_ids(), vec!["a"]);
        assert_eq!(handle.execution_count(), 0);
        assert!(handle.snapshot().last_executed_at.is_none());
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, WorkflowEvent::StepFailed { node_id, .. } if node_id == "e")));
        assert!(matches!(
            sink.events().last(),
            Some(WorkflowEvent::RunFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_step_limit_guards_cycles() {
        let graph = WorkflowBuilder::new()
            .trigger("t", "ticket_created", (0.0, 0.0))
            .action("a", "add_tag", (300.0, 0.0))
            .action("b", "add_tag", (600.0, 0.0))
            .connect("t", "a")
            .connect("a", "b")
            .connect("b", "a")
            .build();
        let handle = WorkflowHandle::new(Workflow::with_graph("Loop", graph));

        let failure = engine()
            .with_max_steps(5)
            .run(&handle, Value::Null, &NullEventSink)
            .await
            .unwrap_err();
        assert_eq!(failure.error, ExecutionError::StepLimitExceeded(5));
        assert_eq!(failure.trace.len(), 5);
        assert_eq!(handle.execution_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_count_every_success() {
        let handle = linear();
        let engine = engine();

        let runs = (0..8).map(|_| {
            let engine = engine.clone();
            let handle = handle.clone();
            tokio::spawn(async move { engine.run(&handle, json!({}), &NullEventSink).await })
        });
        for run in runs.collect::<Vec<_>>() {
            run.await.unwrap().unwrap();
        }
        assert_eq!(handle.execution_count(), 8);
    }
}
