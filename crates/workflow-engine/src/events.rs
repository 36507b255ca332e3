//! Event types for streaming run progress
//!
//! The execution engine reports progress through an [`EventSink`] so hosts
//! can forward events over whatever transport they use (a channel, a log,
//! a UI bridge).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::NodeType;

/// Trait for sending workflow events
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g. channel closed)
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone, thiserror::Error)]
#[error("Event error: {message}")]
pub struct EventError {
    pub message: String,
}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// Run started
    #[serde(rename_all = "camelCase")]
    RunStarted {
        workflow_id: String,
        execution_id: String,
    },

    /// Run finished successfully
    #[serde(rename_all = "camelCase")]
    RunCompleted {
        workflow_id: String,
        execution_id: String,
        steps: usize,
    },

    /// Run aborted
    #[serde(rename_all = "camelCase")]
    RunFailed {
        workflow_id: String,
        execution_id: String,
        error: String,
    },

    /// A node is about to be dispatched
    #[serde(rename_all = "camelCase")]
    StepStarted {
        execution_id: String,
        node_id: String,
        node_type: NodeType,
    },

    /// A node's handler returned
    #[serde(rename_all = "camelCase")]
    StepCompleted {
        execution_id: String,
        node_id: String,
        result: serde_json::Value,
        duration_ms: u64,
    },

    /// A node's handler failed
    #[serde(rename_all = "camelCase")]
    StepFailed {
        execution_id: String,
        node_id: String,
        error: String,
    },

    /// A condition picked a branch
    #[serde(rename_all = "camelCase")]
    ConditionEvaluated {
        execution_id: String,
        node_id: String,
        result: bool,
        /// Connection that will be followed, if any
        next_connection: Option<String>,
    },
}

impl WorkflowEvent {
    /// Execution ID carried by the event
    pub fn execution_id(&self) -> &str {
        match self {
            Self::RunStarted { execution_id, .. }
            | Self::RunCompleted { execution_id, .. }
            | Self::RunFailed { execution_id, .. }
            | Self::StepStarted { execution_id, .. }
            | Self::StepCompleted { execution_id, .. }
            | Self::StepFailed { execution_id, .. }
            | Self::ConditionEvaluated { execution_id, .. } => execution_id,
        }
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Forwards every event to the `log` facade at debug level
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        log::debug!("{:?}", event);
        Ok(())
    }
}

/// Forwards events into a tokio channel, e.g. to a UI bridge task
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        Self { sender }
    }

    /// Sink plus the receiving end of a fresh channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.sender
            .send(event)
            .map_err(|_| EventError::channel_closed())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for tests that assert on emitted events.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();
        sink.send(WorkflowEvent::StepStarted {
            execution_id: "exec1".into(),
            node_id: "a".into(),
            node_type: NodeType::Action,
        })
        .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].execution_id(), "exec1");

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = WorkflowEvent::ConditionEvaluated {
            execution_id: "exec1".into(),
            node_id: "c".into(),
            result: true,
            next_connection: Some("conn-1".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "conditionEvaluated");
        assert_eq!(json["nodeId"], "c");
        assert_eq!(json["nextConnection"], "conn-1");
    }

    #[tokio::test]
    async fn test_channel_event_sink_forwards_until_closed() {
        let (sink, mut receiver) = ChannelEventSink::channel();
        let started = WorkflowEvent::RunStarted {
            workflow_id: "wf".into(),
            execution_id: "exec1".into(),
        };
        sink.send(started.clone()).unwrap();
        assert_eq!(receiver.recv().await, Some(started.clone()));

        drop(receiver);
        let err = sink.send(started).unwrap_err();
        assert_eq!(err.message, EventError::channel_closed().message);
    }

    #[test]
    fn test_null_event_sink() {
        let sink = NullEventSink;
        sink.send(WorkflowEvent::RunStarted {
            workflow_id: "wf".into(),
            execution_id: "exec1".into(),
        })
        .unwrap();
    }
}
