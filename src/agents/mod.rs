// SPDX-License-Identifier: MIT

//! Agent module - defines the steps a pipeline is built from
//!
//! This module provides:
//! - `Agent` - a catalog entry (id, name, description, avatar, kind)
//! - `AgentKind` - the closed set of step kinds with their configuration
//! - `Invoker` - the contract used to stream a step's output
//! - `FrameDecoder` - newline-delimited frame decoding for streamed output

pub mod error;
pub mod frame;
pub mod invoke;

pub use error::{FlowError, GraphError, WorkflowError};
pub use frame::{decode_frames, Frame, FrameDecoder};
pub use invoke::{ChunkStream, HttpInvoker, InvokeRequest, Invoker};

use serde::{Deserialize, Serialize};

/// Kind-specific configuration of an agent.
///
/// The wire format flattens the payload next to a numeric `kind` code
/// (0 = Analyser, 1 = Judge, 2 = Handler, 3 = Painter).
#[derive(Debug, Clone, PartialEq)]
pub enum AgentKind {
    Analyser {
        identity_setting: String,
        task: String,
    },
    Judge {
        identity_setting: String,
        task: String,
        /// Verdicts the judge may emit
        output: Vec<String>,
    },
    Handler {
        /// Code block run by the handler
        deal: String,
    },
    Painter {
        identity_setting: String,
        style: String,
    },
}

impl AgentKind {
    pub const ANALYSER: u8 = 0;
    pub const JUDGE: u8 = 1;
    pub const HANDLER: u8 = 2;
    pub const PAINTER: u8 = 3;

    /// Numeric code sent to the invocation service
    pub fn code(&self) -> u8 {
        match self {
            AgentKind::Analyser { .. } => Self::ANALYSER,
            AgentKind::Judge { .. } => Self::JUDGE,
            AgentKind::Handler { .. } => Self::HANDLER,
            AgentKind::Painter { .. } => Self::PAINTER,
        }
    }

    /// Display label for the kind
    pub fn label(&self) -> &'static str {
        Self::label_for(self.code()).unwrap_or("Unknown")
    }

    /// Display label for a kind code, `None` for unknown codes
    pub fn label_for(code: u8) -> Option<&'static str> {
        match code {
            Self::ANALYSER => Some("Analyser"),
            Self::JUDGE => Some("Judger"),
            Self::HANDLER => Some("Handler"),
            Self::PAINTER => Some("Painter"),
            _ => None,
        }
    }
}

/// A configured step that can be placed on the pipeline graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AgentRecord", into = "AgentRecord")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub description: String,
    pub avatar: String,
    pub kind: AgentKind,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            avatar: String::new(),
            kind,
        }
    }

    /// Build the invocation request for this agent
    pub fn invoke_request(&self, input: impl Into<String>) -> InvokeRequest {
        InvokeRequest {
            id: self.id.clone(),
            kind: self.kind.code(),
            input: input.into(),
        }
    }
}

/// Flat wire representation of an [`Agent`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AgentRecord {
    #[serde(default)]
    id: String,
    kind: u8,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity_setting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    style: Option<String>,
}

impl TryFrom<AgentRecord> for Agent {
    type Error = WorkflowError;

    fn try_from(record: AgentRecord) -> Result<Self, Self::Error> {
        let kind = match record.kind {
            AgentKind::ANALYSER => AgentKind::Analyser {
                identity_setting: record.identity_setting.unwrap_or_default(),
                task: record.task.unwrap_or_default(),
            },
            AgentKind::JUDGE => AgentKind::Judge {
                identity_setting: record.identity_setting.unwrap_or_default(),
                task: record.task.unwrap_or_default(),
                output: record.output.unwrap_or_default(),
            },
            AgentKind::HANDLER => AgentKind::Handler {
                deal: record.deal.unwrap_or_default(),
            },
            AgentKind::PAINTER => AgentKind::Painter {
                identity_setting: record.identity_setting.unwrap_or_default(),
                style: record.style.unwrap_or_default(),
            },
            other => return Err(WorkflowError::UnknownKind(other)),
        };

        Ok(Self {
            id: record.id,
            name: record.name,
            description: record.description,
            avatar: record.avatar,
            kind,
        })
    }
}

impl From<Agent> for AgentRecord {
    fn from(agent: Agent) -> Self {
        let mut record = AgentRecord {
            id: agent.id,
            kind: agent.kind.code(),
            name: agent.name,
            description: agent.description,
            avatar: agent.avatar,
            identity_setting: None,
            task: None,
            output: None,
            deal: None,
            style: None,
        };

        match agent.kind {
            AgentKind::Analyser {
                identity_setting,
                task,
            } => {
                record.identity_setting = Some(identity_setting);
                record.task = Some(task);
            }
            AgentKind::Judge {
                identity_setting,
                task,
                output,
            } => {
                record.identity_setting = Some(identity_setting);
                record.task = Some(task);
                record.output = Some(output);
            }
            AgentKind::Handler { deal } => record.deal = Some(deal),
            AgentKind::Painter {
                identity_setting,
                style,
            } => {
                record.identity_setting = Some(identity_setting);
                record.style = Some(style);
            }
        }

        record
    }
}
