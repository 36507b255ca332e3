//! Workflow execution
//!
//! - [`engine`]: the run loop and the shared [`WorkflowHandle`]
//! - [`registry`]: host handlers keyed by subtype
//! - [`context`]: data passed between steps
//! - [`trace`]: what a run did

pub mod context;
pub mod engine;
pub mod registry;
pub mod trace;

pub use context::ExecutionContext;
pub use engine::{ExecutionEngine, WorkflowHandle};
pub use registry::{
    ActionHandler, CallbackAction, CallbackTrigger, ConditionPredicate, FnPredicate, HandlerRegistry,
    TriggerHandler,
};
pub use trace::{ExecutionTrace, TraceStep};
