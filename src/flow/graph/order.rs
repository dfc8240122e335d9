// SPDX-License-Identifier: MIT

//! Execution order resolution
//!
//! Turns the edge list of the pipeline graph into a single linear order
//! using a reverse-postorder depth-first traversal. Traversal roots are taken
//! in first-seen order while scanning the edges (source before target), so
//! the same edge list always yields the same order.

use crate::agents::{Agent, WorkflowError};
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    InProgress,
    Done,
}

/// Successor lists plus node ids in first-seen order
struct Adjacency<'a> {
    nodes: Vec<&'a str>,
    successors: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> Adjacency<'a> {
    fn build(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut nodes = Vec::new();
        let mut successors: HashMap<&'a str, Vec<&'a str>> = HashMap::new();
        let mut seen = std::collections::HashSet::new();

        for (source, target) in edges {
            // Duplicate edges are kept; the traversal skips visited targets
            successors.entry(source).or_default().push(target);
            for id in [source, target] {
                if seen.insert(id) {
                    nodes.push(id);
                }
            }
        }

        Self { nodes, successors }
    }

    fn successors(&self, node: &str) -> &[&'a str] {
        self.successors.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reverse-postorder traversal. With `strict`, the first back edge found
    /// aborts with the node ids of the cycle it closes.
    fn traverse(&self, strict: bool) -> Result<Vec<String>, Vec<String>> {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.nodes.len());
        let mut postorder = Vec::with_capacity(self.nodes.len());

        for &root in &self.nodes {
            if marks.contains_key(root) {
                continue;
            }

            marks.insert(root, Mark::InProgress);
            let mut stack: Vec<(&str, usize)> = vec![(root, 0)];

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                if let Some(&child) = self.successors(node).get(top.1) {
                    top.1 += 1;
                    match marks.get(child) {
                        None => {
                            marks.insert(child, Mark::InProgress);
                            stack.push((child, 0));
                        }
                        Some(Mark::InProgress) if strict => {
                            let start = stack.iter().position(|(n, _)| *n == child).unwrap_or(0);
                            return Err(stack[start..].iter().map(|(n, _)| n.to_string()).collect());
                        }
                        Some(_) => {}
                    }
                } else {
                    stack.pop();
                    marks.insert(node, Mark::Done);
                    postorder.push(node.to_string());
                }
            }
        }

        postorder.reverse();
        Ok(postorder)
    }
}

/// Resolve the execution order of every node referenced by an edge.
///
/// Never fails. Nodes on a cycle still appear exactly once, but their relative
/// order carries no dependency guarantee.
pub fn resolve<'a>(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<String> {
    let adjacency = Adjacency::build(edges);
    match adjacency.traverse(false) {
        Ok(order) => order,
        // Non-strict traversal never reports cycles
        Err(_) => Vec::new(),
    }
}

/// Like [`resolve`], but rejects graphs containing a cycle (self-loops
/// included). On success the order is identical to `resolve`'s.
pub fn resolve_strict<'a>(
    edges: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<Vec<String>, WorkflowError> {
    Adjacency::build(edges)
        .traverse(true)
        .map_err(WorkflowError::CircularDependency)
}

/// Map resolved ids back to agents, skipping ids the lookup does not know
/// (the start node, or agents deleted from the catalog).
pub fn map_to_agents<F>(order: &[String], mut lookup: F) -> Vec<Agent>
where
    F: FnMut(&str) -> Option<Agent>,
{
    order
        .iter()
        .filter_map(|id| {
            let agent = lookup(id);
            if agent.is_none() {
                log::debug!("Skipping node {} with no catalog entry", id);
            }
            agent
        })
        .collect()
}
