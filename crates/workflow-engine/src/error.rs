//! Error types for the workflow engine

use thiserror::Error;

use crate::execution::ExecutionTrace;
use crate::types::NodeId;

/// Result type alias using WorkflowError
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Structural errors rejected by the graph mutation API
///
/// A call that returns one of these has left the graph untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A connection for this ordered pair already exists
    #[error("Connection from '{source_id}' to '{target_id}' already exists")]
    DuplicateConnection { source_id: NodeId, target_id: NodeId },

    /// Source and target are the same node
    #[error("Node '{0}' cannot be connected to itself")]
    SelfConnection(NodeId),

    /// A referenced node does not exist
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A referenced connection does not exist
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),
}

/// Errors that abort a workflow run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The graph has no trigger node to start from
    #[error("Workflow has no trigger node")]
    NoTriggerNode,

    /// No handler registered for the trigger's `triggerType`
    #[error("Unknown trigger type: {0}")]
    UnknownTriggerType(String),

    /// No handler registered for an action's `actionType`
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    /// No predicate registered for a condition's `conditionType`
    #[error("Unknown condition type: {0}")]
    UnknownConditionType(String),

    /// A host handler returned an error
    #[error("Handler failed on node '{node_id}': {message}")]
    HandlerFailure { node_id: NodeId, message: String },

    /// The run visited more nodes than allowed (usually a cycle)
    #[error("Execution limit reached ({0} steps)")]
    StepLimitExceeded(u32),
}

/// A failed run: the error, the trace recorded so far and the failing step
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    pub error: ExecutionError,
    /// Steps that completed before the failure
    pub trace: ExecutionTrace,
    /// Node being executed when the run failed, if any
    pub failed_node: Option<NodeId>,
}

/// Errors from a persistence gateway, surfaced unchanged
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The id cannot be used as a record file name
    #[error("Invalid record id: {0:?}")]
    InvalidId(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by the host-facing workflow operations
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Execution(#[from] Box<ExecutionFailure>),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The workflow failed validation and cannot change status
    #[error("Workflow is invalid: {0}")]
    Invalid(String),
}

impl From<ExecutionFailure> for WorkflowError {
    fn from(failure: ExecutionFailure) -> Self {
        Self::Execution(Box::new(failure))
    }
}

/// Error returned by host-supplied handlers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    /// Create a handler error with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type for host-supplied handlers
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;
