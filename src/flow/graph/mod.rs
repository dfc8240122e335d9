// SPDX-License-Identifier: MIT

//! Pipeline graph: editing, ordering and execution
//!
//! This module provides the graph surface, the resolver that turns its
//! edges into a linear order, and the executor that runs that order.

pub mod executor;
pub mod order;
pub mod types;

pub use executor::{PipelineExecutor, RunEvent, RunFailure, RunState, StepResult};
pub use order::{map_to_agents, resolve, resolve_strict};
pub use types::{Edge, FlowGraph, GraphNode, Position, START_NODE_ID};
