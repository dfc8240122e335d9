//! Pipeline loader - YAML file loading and parsing
//!
//! A pipeline file bundles the agents of a catalog with the graph drawn
//! over them.

use super::catalog::AgentCatalog;
use super::graph::{FlowGraph, GraphNode, START_NODE_ID};
use crate::agents::{Agent, FlowError, WorkflowError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level pipeline definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// Explicit placements; edge endpoints missing here are placed at the origin
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

/// An edge as written in a pipeline file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EdgeDefinition {
    pub source: String,
    pub target: String,
}

impl PipelineDefinition {
    /// Build the graph described by this definition
    pub fn build_graph(&self) -> Result<FlowGraph, FlowError> {
        let mut graph = FlowGraph::new();
        for node in &self.nodes {
            graph.add_node(node.id.clone(), node.position);
        }

        for edge in &self.edges {
            for id in [&edge.source, &edge.target] {
                if graph.node(id).is_none() {
                    graph.add_node(id.clone(), Default::default());
                }
            }
            graph.connect(&edge.source, &edge.target)?;
        }

        Ok(graph)
    }

    /// Load the definition's agents into a fresh catalog. An agent may not
    /// use the start node's id.
    pub async fn build_catalog(&self) -> Result<AgentCatalog, FlowError> {
        let catalog = AgentCatalog::new();
        for agent in &self.agents {
            if agent.id == START_NODE_ID {
                return Err(WorkflowError::ReservedAgentId(agent.id.clone()).into());
            }
            if catalog.register(agent.clone()).await.is_some() {
                log::warn!("Duplicate agent id {} in pipeline {}", agent.id, self.name);
            }
        }
        Ok(catalog)
    }
}

/// Loads pipeline definitions from YAML files
pub struct PipelineLoader;

impl PipelineLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a pipeline definition from a YAML file
    pub fn load_pipeline<P: AsRef<Path>>(&self, path: P) -> Result<PipelineDefinition, FlowError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WorkflowError::FileNotFound(path.display().to_string()).into());
        }
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a pipeline definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<PipelineDefinition, FlowError> {
        let def: PipelineDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }
}

impl Default for PipelineLoader {
    fn default() -> Self {
        Self::new()
    }
}
