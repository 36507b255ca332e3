//! Interactive graph editing
//!
//! `GraphEditorController` turns primitive pointer events from the host UI
//! into graph mutations and view changes. The host translates raw input
//! into four calls:
//!
//! - [`GraphEditorController::node_clicked`] when it hit-tests nodes itself
//! - [`GraphEditorController::canvas_pointer_down`] for any press (hit-tests internally)
//! - [`GraphEditorController::pointer_moved`]
//! - [`GraphEditorController::pointer_up`]
//!
//! Each returns the [`EditorEvent`]s the UI should react to. The ongoing
//! gesture is a single tagged [`Gesture`], so a drag and a pending
//! connection can never be active at once.

use crate::canvas::router::{ConnectionRouter, Polyline, RoutedConnection};
use crate::canvas::transform::CoordinateTransform;
use crate::config::CanvasConfig;
use crate::constants::pointer::DRAG_THRESHOLD;
use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use crate::types::{ConnectionId, NodeId, NodeType, Position};

/// The exclusive interaction mode chosen by the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ToolMode {
    #[default]
    Select,
    Connect,
    Pan,
}

/// Progress of the two-click connect gesture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectState {
    Idle,
    PendingSource(NodeId),
}

/// The gesture in progress
#[derive(Debug, Clone, PartialEq)]
pub enum Gesture {
    Idle,
    /// Pan drag; `last` is the previous pointer position in screen space
    Panning { last: Position },
    /// Node press that becomes a drag once the pointer leaves the threshold
    DraggingNode {
        node_id: NodeId,
        /// Pointer minus node position, in world space
        grab_offset: Position,
        /// Where the press started, in screen space
        press: Position,
        moved: bool,
    },
    /// First click of a connect gesture landed on `source`
    PendingConnection { source: NodeId },
}

/// Something the UI should react to
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    NodeSelected(NodeId),
    SelectionCleared,
    /// Open the configuration view for a node
    ConfigRequested(NodeId),
    NodeAdded(NodeId),
    NodeMoved { node_id: NodeId, position: Position },
    NodeDeleted(NodeId),
    ConnectionStarted(NodeId),
    ConnectionCreated(ConnectionId),
    ConnectionRejected(GraphError),
    ConnectionCancelled,
    Panned(Position),
    Zoomed(f64),
}

/// Interaction state machine over a workflow graph
#[derive(Debug, Clone)]
pub struct GraphEditorController {
    graph: WorkflowGraph,
    transform: CoordinateTransform,
    router: ConnectionRouter,
    tool: ToolMode,
    gesture: Gesture,
    selected: Option<NodeId>,
    /// Last known pointer position in world space
    pointer_world: Option<Position>,
}

impl GraphEditorController {
    pub fn new(graph: WorkflowGraph, config: &CanvasConfig) -> Self {
        let mut editor = Self {
            graph,
            transform: CoordinateTransform::new(config),
            router: ConnectionRouter::new(config),
            tool: ToolMode::default(),
            gesture: Gesture::Idle,
            selected: None,
            pointer_world: None,
        };
        editor.repair_positions();
        editor
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Direct access for host-driven edits (e.g. config panels)
    ///
    /// Cached routes are dropped since the graph may be replaced wholesale,
    /// which resets its revision.
    pub fn graph_mut(&mut self) -> &mut WorkflowGraph {
        self.router.invalidate();
        &mut self.graph
    }

    pub fn into_graph(self) -> WorkflowGraph {
        self.graph
    }

    pub fn transform(&self) -> &CoordinateTransform {
        &self.transform
    }

    pub fn router(&self) -> &ConnectionRouter {
        &self.router
    }

    pub fn tool_mode(&self) -> ToolMode {
        self.tool
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn connect_state(&self) -> ConnectState {
        match &self.gesture {
            Gesture::PendingConnection { source } => ConnectState::PendingSource(source.clone()),
            _ => ConnectState::Idle,
        }
    }

    /// Switch tool mode, abandoning whatever gesture was in progress
    pub fn set_tool_mode(&mut self, tool: ToolMode) -> Vec<EditorEvent> {
        if tool == self.tool {
            return Vec::new();
        }
        log::debug!("Tool mode {:?} -> {:?}", self.tool, tool);
        self.tool = tool;
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::PendingConnection { .. } => vec![EditorEvent::ConnectionCancelled],
            _ => Vec::new(),
        }
    }

    /// Add a node dropped at a screen position (e.g. from a palette)
    pub fn add_node_at(&mut self, node_type: NodeType, subtype: Option<&str>, screen: Position) -> Vec<EditorEvent> {
        let world = self.transform.to_world(screen);
        let id = self.graph.add_node(node_type, world, subtype);
        vec![EditorEvent::NodeAdded(id)]
    }

    /// A click on a node, for hosts that hit-test nodes themselves
    pub fn node_clicked(&mut self, node_id: &str) -> Vec<EditorEvent> {
        if self.graph.node(node_id).is_none() {
            return vec![EditorEvent::ConnectionRejected(GraphError::NodeNotFound(
                node_id.to_string(),
            ))];
        }

        match self.tool {
            ToolMode::Connect => self.connect_click(node_id),
            ToolMode::Select => self.select(node_id, true),
            ToolMode::Pan => Vec::new(),
        }
    }

    /// Pointer pressed anywhere on the canvas
    pub fn canvas_pointer_down(&mut self, screen: Position) -> Vec<EditorEvent> {
        // Host edits through graph_mut may have brought in unplaced nodes.
        self.repair_positions();
        let world = self.transform.to_world(screen);
        self.pointer_world = Some(world);
        let hit = self
            .graph
            .node_at(world, self.router.node_width(), self.router.node_height())
            .and_then(|n| n.position.map(|p| (n.id.clone(), p)));

        match (self.tool, hit) {
            (ToolMode::Pan, _) => {
                self.gesture = Gesture::Panning { last: screen };
                Vec::new()
            }
            (ToolMode::Select, Some((node_id, position))) => {
                self.gesture = Gesture::DraggingNode {
                    node_id,
                    grab_offset: world - position,
                    press: screen,
                    moved: false,
                };
                Vec::new()
            }
            (ToolMode::Select, None) => {
                self.gesture = Gesture::Idle;
                match self.selected.take() {
                    Some(_) => vec![EditorEvent::SelectionCleared],
                    None => Vec::new(),
                }
            }
            (ToolMode::Connect, Some((node_id, _))) => self.connect_click(&node_id),
            (ToolMode::Connect, None) => match std::mem::replace(&mut self.gesture, Gesture::Idle) {
                Gesture::PendingConnection { .. } => vec![EditorEvent::ConnectionCancelled],
                _ => Vec::new(),
            },
        }
    }

    /// Pointer moved to a new screen position
    pub fn pointer_moved(&mut self, screen: Position) -> Vec<EditorEvent> {
        let world = self.transform.to_world(screen);
        self.pointer_world = Some(world);

        match &mut self.gesture {
            Gesture::Panning { last } => {
                let delta = screen - *last;
                *last = screen;
                self.transform.pan_by(delta);
                vec![EditorEvent::Panned(self.transform.pan())]
            }
            Gesture::DraggingNode {
                node_id,
                grab_offset,
                press,
                moved,
            } => {
                if !*moved {
                    let d = screen - *press;
                    if (d.x * d.x + d.y * d.y).sqrt() < DRAG_THRESHOLD {
                        return Vec::new();
                    }
                    *moved = true;
                }
                let position = world - *grab_offset;
                let node_id = node_id.clone();
                match self.graph.move_node(&node_id, position) {
                    Ok(()) => vec![EditorEvent::NodeMoved { node_id, position }],
                    Err(e) => {
                        // The node vanished mid-drag (host edit); drop the gesture.
                        log::warn!("Drag aborted: {}", e);
                        self.gesture = Gesture::Idle;
                        Vec::new()
                    }
                }
            }
            Gesture::Idle | Gesture::PendingConnection { .. } => Vec::new(),
        }
    }

    /// Pointer released; ends pan and drag gestures
    ///
    /// A pending connection survives pointer release.
    pub fn pointer_up(&mut self) -> Vec<EditorEvent> {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::DraggingNode {
                node_id,
                moved: false,
                ..
            } => self.select(&node_id, true),
            Gesture::DraggingNode { node_id, .. } => self.select(&node_id, false),
            pending @ Gesture::PendingConnection { .. } => {
                self.gesture = pending;
                Vec::new()
            }
            Gesture::Panning { .. } | Gesture::Idle => Vec::new(),
        }
    }

    pub fn zoom_in(&mut self) -> Vec<EditorEvent> {
        self.transform.zoom_in();
        vec![EditorEvent::Zoomed(self.transform.zoom())]
    }

    pub fn zoom_out(&mut self) -> Vec<EditorEvent> {
        self.transform.zoom_out();
        vec![EditorEvent::Zoomed(self.transform.zoom())]
    }

    pub fn reset_zoom(&mut self) -> Vec<EditorEvent> {
        self.transform.reset_zoom();
        vec![EditorEvent::Zoomed(self.transform.zoom())]
    }

    /// Zoom around a screen point (mouse wheel)
    pub fn zoom_at(&mut self, anchor: Position, zoom: f64) -> Vec<EditorEvent> {
        self.transform.zoom_at(anchor, zoom);
        vec![EditorEvent::Zoomed(self.transform.zoom())]
    }

    /// Remove the selected node and its connections
    pub fn delete_selected(&mut self) -> Result<Vec<EditorEvent>, GraphError> {
        let Some(node_id) = self.selected.take() else {
            return Ok(Vec::new());
        };
        self.graph.remove_node(&node_id)?;

        let mut events = vec![EditorEvent::NodeDeleted(node_id.clone())];
        let touches_gesture = match &self.gesture {
            Gesture::PendingConnection { source } => *source == node_id,
            Gesture::DraggingNode { node_id: dragged, .. } => *dragged == node_id,
            _ => false,
        };
        if touches_gesture {
            if matches!(self.gesture, Gesture::PendingConnection { .. }) {
                events.push(EditorEvent::ConnectionCancelled);
            }
            self.gesture = Gesture::Idle;
        }
        Ok(events)
    }

    /// Preview path from the pending source to the pointer
    pub fn pending_preview(&mut self) -> Option<Polyline> {
        let Gesture::PendingConnection { source } = &self.gesture else {
            return None;
        };
        let source = source.clone();
        let pointer = self.pointer_world?;
        let position = self.router.node_position(&mut self.graph, &source).ok()?;
        Some(self.router.preview(position, pointer))
    }

    /// Paths of all connections, recomputed if the graph changed
    pub fn routes(&mut self) -> &[RoutedConnection] {
        self.router.routes(&mut self.graph)
    }

    /// Connection under a screen point
    pub fn connection_at(&mut self, screen: Position) -> Option<ConnectionId> {
        let world = self.transform.to_world(screen);
        self.router.hit_test(&mut self.graph, world)
    }

    /// Give every node without a position its fallback placement
    ///
    /// Nodes without connections are never reached by routing, so they are
    /// placed here to stay hit-testable.
    fn repair_positions(&mut self) {
        let unplaced: Vec<NodeId> = self
            .graph
            .nodes()
            .iter()
            .filter(|n| n.position.is_none())
            .map(|n| n.id.clone())
            .collect();
        for node_id in unplaced {
            if let Err(e) = self.router.node_position(&mut self.graph, &node_id) {
                log::warn!("Could not place node '{}': {}", node_id, e);
            }
        }
    }

    fn connect_click(&mut self, node_id: &str) -> Vec<EditorEvent> {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::PendingConnection { source } if source == node_id => {
                vec![EditorEvent::ConnectionCancelled]
            }
            Gesture::PendingConnection { source } => match self.graph.add_connection(&source, node_id) {
                Ok(id) => vec![EditorEvent::ConnectionCreated(id)],
                Err(e) => {
                    log::debug!("Connection rejected: {}", e);
                    vec![EditorEvent::ConnectionRejected(e)]
                }
            },
            _ => {
                self.gesture = Gesture::PendingConnection {
                    source: node_id.to_string(),
                };
                vec![EditorEvent::ConnectionStarted(node_id.to_string())]
            }
        }
    }

    fn select(&mut self, node_id: &str, open_config: bool) -> Vec<EditorEvent> {
        let mut events = Vec::new();
        if self.selected.as_deref() != Some(node_id) {
            self.selected = Some(node_id.to_string());
            events.push(EditorEvent::NodeSelected(node_id.to_string()));
        }
        if open_config {
            events.push(EditorEvent::ConfigRequested(node_id.to_string()));
        }
        events
    }
}
