// SPDX-License-Identifier: MIT

//! Typed error handling for agentflow-rs
//!
//! Every fallible library call returns [`FlowError`] (or one of its
//! sub-enums converted through `From`). Pipeline runs fail with
//! [`RunFailure`](crate::flow::graph::RunFailure), which wraps a `FlowError`
//! together with the partial run.

use thiserror::Error;

/// Top-level error type for agentflow-rs
#[derive(Debug, Error)]
pub enum FlowError {
    /// API errors from the invocation service
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Agent not present in the catalog
    #[error("Agent '{id}' not found")]
    AgentNotFound { id: String },

    /// Configuration errors (invalid env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workflow-specific errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Graph edit errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Workflow-specific errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkflowError {
    /// Circular dependency detected in the pipeline graph
    #[error("Circular dependency detected: {0:?}")]
    CircularDependency(Vec<String>),

    /// Unknown agent kind code
    #[error("Unknown agent kind: {0}")]
    UnknownKind(u8),

    /// File not found when loading a pipeline
    #[error("Pipeline file not found: {0}")]
    FileNotFound(String),

    /// Nothing to run
    #[error("Pipeline has no runnable steps")]
    EmptyPipeline,

    /// Agent id collides with the start node
    #[error("Agent id {0:?} is reserved for the start node")]
    ReservedAgentId(String),
}

/// Errors raised by edits on the graph surface
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    /// Edge endpoint or removal target is not a node of the graph
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Edges may not point into the start node
    #[error("The start node cannot be the target of an edge")]
    StartNodeTarget,

    /// The start node always exists
    #[error("The start node cannot be removed")]
    StartNodeRemoval,

    /// Edge id not present in the graph
    #[error("Unknown edge: {0}")]
    UnknownEdge(String),
}

impl FlowError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an agent not found error
    pub fn agent_not_found(id: impl Into<String>) -> Self {
        Self::AgentNotFound { id: id.into() }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
