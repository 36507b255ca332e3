//! Execution trace records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::context::ExecutionContext;
use crate::types::{NodeId, NodeType, WorkflowId};

/// One dispatched step of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    pub node_id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Action output, or the boolean a condition evaluated to
    pub result: serde_json::Value,
    pub duration_ms: u64,
}

/// Ordered record of the steps a run executed
///
/// Only action and condition nodes appear; the trigger and pass-through
/// nodes do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTrace {
    pub execution_id: String,
    pub workflow_id: WorkflowId,
    pub steps: Vec<TraceStep>,
    /// Context as it stood when the run ended
    pub context: ExecutionContext,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionTrace {
    pub fn new(execution_id: impl Into<String>, workflow_id: impl Into<WorkflowId>) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            steps: Vec::new(),
            context: ExecutionContext::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn push(&mut self, step: TraceStep) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Node ids in execution order
    pub fn node_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.node_id.as_str()).collect()
    }

    /// Result recorded for a node, if it ran
    pub fn result_of(&self, node_id: &str) -> Option<&serde_json::Value> {
        self.steps
            .iter()
            .find(|s| s.node_id == node_id)
            .map(|s| &s.result)
    }

    pub(crate) fn finish(&mut self, at: DateTime<Utc>) {
        self.completed_at = Some(at);
    }
}
