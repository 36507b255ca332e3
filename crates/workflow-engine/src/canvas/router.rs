//! Orthogonal connection routing
//!
//! Every connection is drawn as a four-point polyline leaving the right
//! edge of the source box at mid-height and entering the left edge of the
//! target box at mid-height:
//!
//! ```text
//! start = (source.x + W, source.y + H/2)
//! end   = (target.x,     target.y + H/2)
//! midX  = (start.x + end.x) / 2
//! path  = [start, (midX, start.y), (midX, end.y), end]
//! ```
//!
//! The same polyline is used for painting, hit-testing and the live
//! preview of a pending connection.

use crate::config::CanvasConfig;
use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use crate::types::{ConnectionId, NodeId, Position};

/// A routed connection path
pub type Polyline = [Position; 4];

/// A connection together with its current path
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedConnection {
    pub connection_id: ConnectionId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub path: Polyline,
}

/// Computes connection paths from live node positions
///
/// Paths are cached per graph revision, so any mutation of the graph
/// forces a recompute before the next call to [`ConnectionRouter::routes`].
#[derive(Debug, Clone)]
pub struct ConnectionRouter {
    node_width: f64,
    node_height: f64,
    fallback_origin: Position,
    fallback_spacing: f64,
    hit_tolerance: f64,
    cache: Option<RouteCache>,
}

#[derive(Debug, Clone)]
struct RouteCache {
    revision: u64,
    routes: Vec<RoutedConnection>,
}

impl Default for ConnectionRouter {
    fn default() -> Self {
        Self::new(&CanvasConfig::default())
    }
}

impl ConnectionRouter {
    pub fn new(config: &CanvasConfig) -> Self {
        Self {
            node_width: config.node_width,
            node_height: config.node_height,
            fallback_origin: Position::from(config.fallback_origin),
            fallback_spacing: config.fallback_spacing,
            hit_tolerance: config.hit_tolerance,
            cache: None,
        }
    }

    pub fn node_width(&self) -> f64 {
        self.node_width
    }

    pub fn node_height(&self) -> f64 {
        self.node_height
    }

    /// Path between two node positions (top-left corners)
    pub fn path(&self, source: Position, target: Position) -> Polyline {
        let end = Position::new(target.x, target.y + self.node_height / 2.0);
        self.path_to_point(source, end)
    }

    /// Path from a node to a free world point, used for the pending-connection preview
    pub fn preview(&self, source: Position, pointer_world: Position) -> Polyline {
        self.path_to_point(source, pointer_world)
    }

    fn path_to_point(&self, source: Position, end: Position) -> Polyline {
        let start = Position::new(source.x + self.node_width, source.y + self.node_height / 2.0);
        let mid_x = (start.x + end.x) / 2.0;
        [
            start,
            Position::new(mid_x, start.y),
            Position::new(mid_x, end.y),
            end,
        ]
    }

    /// Position of a node, repairing a missing one in place
    ///
    /// The fallback depends only on the node's index, so repeated routing
    /// of the same corrupted graph is deterministic.
    pub fn node_position(&self, graph: &mut WorkflowGraph, node_id: &str) -> Result<Position, GraphError> {
        let origin = self.fallback_origin;
        let spacing = self.fallback_spacing;
        graph.position_or_repair(node_id, |index| {
            Position::new(origin.x + index as f64 * spacing, origin.y)
        })
    }

    /// Path of a single connection
    pub fn route(&self, graph: &mut WorkflowGraph, connection_id: &str) -> Result<Polyline, GraphError> {
        let (source_id, target_id) = graph
            .connection(connection_id)
            .map(|c| (c.source_node_id.clone(), c.target_node_id.clone()))
            .ok_or_else(|| GraphError::ConnectionNotFound(connection_id.to_string()))?;
        let source = self.node_position(graph, &source_id)?;
        let target = self.node_position(graph, &target_id)?;
        Ok(self.path(source, target))
    }

    /// Paths of every connection, recomputed only when the graph changed
    pub fn routes(&mut self, graph: &mut WorkflowGraph) -> &[RoutedConnection] {
        let fresh = self
            .cache
            .as_ref()
            .is_some_and(|c| c.revision == graph.revision());
        if !fresh {
            let routes = self.compute_routes(graph);
            // Read the revision after routing: repairs bump it.
            self.cache = Some(RouteCache {
                revision: graph.revision(),
                routes,
            });
        }
        self.cache.as_ref().map(|c| c.routes.as_slice()).unwrap_or(&[])
    }

    /// Drop cached paths
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Connection whose path passes within the hit tolerance of a world point
    ///
    /// The most recently added connection wins when several are close.
    pub fn hit_test(&mut self, graph: &mut WorkflowGraph, point: Position) -> Option<ConnectionId> {
        let tolerance = self.hit_tolerance;
        self.routes(graph)
            .iter()
            .rev()
            .find(|r| distance_to_polyline(point, &r.path) <= tolerance)
            .map(|r| r.connection_id.clone())
    }

    fn compute_routes(&self, graph: &mut WorkflowGraph) -> Vec<RoutedConnection> {
        let endpoints: Vec<_> = graph
            .connections()
            .iter()
            .map(|c| (c.id.clone(), c.source_node_id.clone(), c.target_node_id.clone()))
            .collect();

        let mut routes = Vec::with_capacity(endpoints.len());
        for (connection_id, source_id, target_id) in endpoints {
            let positions = self
                .node_position(graph, &source_id)
                .and_then(|s| self.node_position(graph, &target_id).map(|t| (s, t)));
            match positions {
                Ok((source, target)) => routes.push(RoutedConnection {
                    path: self.path(source, target),
                    connection_id,
                    source_id,
                    target_id,
                }),
                Err(e) => log::warn!("Skipping connection '{}': {}", connection_id, e),
            }
        }
        log::debug!("Routed {} connection(s) at revision {}", routes.len(), graph.revision());
        routes
    }
}

/// Shortest distance from a point to a polyline
pub fn distance_to_polyline(point: Position, path: &[Position]) -> f64 {
    path.windows(2)
        .map(|seg| distance_to_segment(point, seg[0], seg[1]))
        .fold(f64::INFINITY, f64::min)
}

fn distance_to_segment(p: Position, a: Position, b: Position) -> f64 {
    let ab = b - a;
    let len_sq = ab.x * ab.x + ab.y * ab.y;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len_sq).clamp(0.0, 1.0)
    };
    let closest = Position::new(a.x + t * ab.x, a.y + t * ab.y);
    let d = p - closest;
    (d.x * d.x + d.y * d.y).sqrt()
}
