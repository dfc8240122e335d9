// SPDX-License-Identifier: MIT

//! Graph surface types
//!
//! `FlowGraph` holds the nodes placed on the canvas and the edges drawn
//! between them. Every edge mutation recomputes the cached execution order,
//! so a previously returned order is never reused after an edit.

use super::order::{map_to_agents, resolve, resolve_strict};
use crate::agents::{Agent, GraphError, WorkflowError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id of the synthetic start node present in every graph
pub const START_NODE_ID: &str = "1";

/// Canvas placement of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A node on the canvas. Apart from the start node, the node id is the id of
/// the agent it places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub position: Position,
}

impl GraphNode {
    pub fn is_start(&self) -> bool {
        self.id == START_NODE_ID
    }

    /// The agent placed by this node; `None` for the start node
    pub fn agent_id(&self) -> Option<&str> {
        if self.is_start() {
            None
        } else {
            Some(&self.id)
        }
    }
}

/// A directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn pair(&self) -> (&str, &str) {
        (&self.source, &self.target)
    }
}

/// Editable pipeline graph with a cached execution order
#[derive(Debug, Clone)]
pub struct FlowGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<Edge>,
    order: Result<Vec<String>, WorkflowError>,
}

impl FlowGraph {
    /// Create a graph holding only the start node
    pub fn new() -> Self {
        Self {
            nodes: vec![GraphNode {
                id: START_NODE_ID.to_string(),
                position: Position::default(),
            }],
            edges: Vec::new(),
            order: Ok(Vec::new()),
        }
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Place a node. Returns `false` if it was already placed, in which case
    /// only its position changes.
    pub fn add_node(&mut self, id: impl Into<String>, position: Position) -> bool {
        let id = id.into();
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            node.position = position;
            return false;
        }
        self.nodes.push(GraphNode { id, position });
        true
    }

    pub fn move_node(&mut self, id: &str, position: Position) -> Result<(), GraphError> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
        node.position = position;
        Ok(())
    }

    /// Remove a node together with every edge touching it
    pub fn remove_node(&mut self, id: &str) -> Result<GraphNode, GraphError> {
        if id == START_NODE_ID {
            return Err(GraphError::StartNodeRemoval);
        }
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
        let node = self.nodes.remove(index);

        let before = self.edges.len();
        self.edges.retain(|e| e.source != id && e.target != id);
        if self.edges.len() != before {
            self.recompute();
        }
        Ok(node)
    }

    /// Draw an edge and return its id. Parallel edges are allowed.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<String, GraphError> {
        for id in [source, target] {
            if self.node(id).is_none() {
                return Err(GraphError::UnknownNode(id.to_string()));
            }
        }
        if target == START_NODE_ID {
            return Err(GraphError::StartNodeTarget);
        }

        let id = format!("edge-{}", Uuid::new_v4());
        self.edges.push(Edge {
            id: id.clone(),
            source: source.to_string(),
            target: target.to_string(),
        });
        self.recompute();
        Ok(id)
    }

    /// Remove one edge from `source` to `target`, if any
    pub fn disconnect(&mut self, source: &str, target: &str) -> bool {
        match self
            .edges
            .iter()
            .position(|e| e.source == source && e.target == target)
        {
            Some(index) => {
                self.edges.remove(index);
                self.recompute();
                true
            }
            None => false,
        }
    }

    pub fn remove_edge(&mut self, edge_id: &str) -> Result<Edge, GraphError> {
        let index = self
            .edges
            .iter()
            .position(|e| e.id == edge_id)
            .ok_or_else(|| GraphError::UnknownEdge(edge_id.to_string()))?;
        let edge = self.edges.remove(index);
        self.recompute();
        Ok(edge)
    }

    /// Current execution order, or the cycle preventing one
    pub fn execution_order(&self) -> Result<&[String], WorkflowError> {
        self.order.as_deref().map_err(Clone::clone)
    }

    /// Order ignoring cycles
    pub fn best_effort_order(&self) -> Vec<String> {
        resolve(self.edges.iter().map(Edge::pair))
    }

    /// Agents in execution order, skipping the start node and nodes the
    /// lookup cannot resolve. The start node is never looked up.
    pub fn ordered_agents<F>(&self, mut lookup: F) -> Result<Vec<Agent>, WorkflowError>
    where
        F: FnMut(&str) -> Option<Agent>,
    {
        let order = self.execution_order()?;
        Ok(map_to_agents(order, |id| {
            if id == START_NODE_ID {
                None
            } else {
                lookup(id)
            }
        }))
    }

    fn recompute(&mut self) {
        self.order = resolve_strict(self.edges.iter().map(Edge::pair));
        match &self.order {
            Ok(order) => log::debug!("Execution order: {:?}", order),
            Err(e) => log::warn!("{}", e),
        }
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new()
    }
}
