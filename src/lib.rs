// SPDX-License-Identifier: MIT

//! agentflow-rs: compose agents into a graph, resolve it into a linear
//! pipeline and run the pipeline with streamed, chained step outputs.

pub mod agents;
pub mod flow;
