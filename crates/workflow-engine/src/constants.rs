//! Engine-wide constants
//!
//! Single source of truth for canvas geometry, zoom bounds and execution
//! limits. Config defaults are read from here.

/// Node box geometry in world units
pub mod node_box {
    /// Width of every node box
    pub const WIDTH: f64 = 200.0;
    /// Height of every node box
    pub const HEIGHT: f64 = 80.0;
}

/// Zoom bounds for the canvas
pub mod zoom {
    pub const MIN: f64 = 0.5;
    pub const MAX: f64 = 2.0;
    pub const STEP: f64 = 0.1;
    pub const DEFAULT: f64 = 1.0;
}

/// Placement used when a node arrives without a position
pub mod fallback {
    /// World position of the first repaired node
    pub const ORIGIN: (f64, f64) = (100.0, 100.0);
    /// Horizontal distance between consecutive repaired nodes
    pub const SPACING: f64 = 250.0;
}

/// Execution limits
pub mod execution {
    /// Maximum number of nodes a single run may visit
    pub const MAX_STEPS: u32 = 1000;
}

/// Graph change log
pub mod change_log {
    /// Undrained changes kept before the oldest are dropped
    pub const CAPACITY: usize = 1024;
}

/// Connection handle names used for condition branches
pub mod handles {
    pub const TRUE: &str = "true";
    pub const FALSE: &str = "false";
}

/// Connection hit-testing
pub mod hit {
    /// Maximum world distance from a polyline that still counts as a hit
    pub const TOLERANCE: f64 = 6.0;
}

/// Pointer gesture thresholds (screen pixels)
pub mod pointer {
    /// Movement below this distance keeps a press a click rather than a drag
    pub const DRAG_THRESHOLD: f64 = 3.0;
}

/// Data storage paths
pub mod paths {
    /// Directory for persisted workflows and templates, relative to the working directory
    pub const DATA_DIR: &str = "data";
    pub const WORKFLOWS_DIR: &str = "workflows";
    pub const TEMPLATES_DIR: &str = "templates";
}
