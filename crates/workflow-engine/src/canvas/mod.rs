//! Canvas geometry and interaction
//!
//! - [`transform`]: screen/world conversion under pan and zoom
//! - [`router`]: orthogonal connection paths and hit-testing
//! - [`editor`]: the pointer-driven editing state machine

pub mod editor;
pub mod router;
pub mod transform;

pub use editor::{ConnectState, EditorEvent, Gesture, GraphEditorController, ToolMode};
pub use router::{distance_to_polyline, ConnectionRouter, Polyline, RoutedConnection};
pub use transform::CoordinateTransform;
