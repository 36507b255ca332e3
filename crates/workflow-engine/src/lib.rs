//! Workflow Engine - visual automation workflows for ticket handling
//!
//! This crate provides the model and runtime behind a node-and-connection
//! workflow editor. It supports:
//!
//! - A validated graph model mutated through a single API
//! - Canvas geometry: pan/zoom transform, orthogonal connection routing
//! - A pointer-driven editor state machine (select, connect, pan)
//! - Trigger-driven execution with pluggable action and condition handlers
//! - Template instantiation with id remapping
//! - JSON file persistence behind an async gateway trait
//!
//! # Example
//!
//! ```ignore
//! use workflow_engine::{ExecutionEngine, HandlerRegistry, NullEventSink, WorkflowHandle};
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register_trigger_fn("ticket_created", |_node, payload| async move { Ok(payload) });
//! let engine = ExecutionEngine::new(Arc::new(registry), &EngineConfig::default());
//! let trace = engine.run(&WorkflowHandle::new(workflow), payload, &NullEventSink).await?;
//! ```

pub mod builder;
pub mod canvas;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod execution;
pub mod graph;
pub mod store;
pub mod templates;
pub mod types;
pub mod validation;

// Re-export key types
pub use builder::WorkflowBuilder;
pub use canvas::{
    ConnectState, ConnectionRouter, CoordinateTransform, EditorEvent, GraphEditorController,
    RoutedConnection, ToolMode,
};
pub use config::{CanvasConfig, ConfigError, EngineConfig, StorageConfig, WorkflowConfig};
pub use error::{
    ExecutionError, ExecutionFailure, GraphError, HandlerError, HandlerResult, PersistenceError,
    Result, WorkflowError,
};
pub use events::{
    ChannelEventSink, EventError, EventSink, LogEventSink, NullEventSink, VecEventSink, WorkflowEvent,
};
pub use execution::{
    ExecutionContext, ExecutionEngine, ExecutionTrace, HandlerRegistry, TraceStep, WorkflowHandle,
};
pub use graph::{GraphChange, WorkflowGraph};
pub use store::{PersistenceGateway, WorkflowStore};
pub use templates::{builtin_templates, capture, TemplateInstantiator};
pub use types::{
    ConnectionId, NodeId, NodeType, Position, TemplateId, Workflow, WorkflowConnection, WorkflowId,
    WorkflowNode, WorkflowStatus, WorkflowSummary, WorkflowTemplate,
};
pub use validation::{is_runnable, validate_graph, validate_workflow, Severity, ValidationIssue};
