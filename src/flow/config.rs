// SPDX-License-Identifier: MIT

//! Environment-driven configuration
//!
//! Values come from the process environment (a `.env` file is loaded by the
//! binary through `dotenv` before this is read).

use crate::agents::{FlowError, HttpInvoker};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const API_URL_VAR: &str = "AGENTFLOW_API_URL";
pub const TIMEOUT_VAR: &str = "AGENTFLOW_TIMEOUT_SECS";
pub const PORT_VAR: &str = "AGENTFLOW_PORT";
pub const EVENT_BUFFER_VAR: &str = "AGENTFLOW_EVENT_BUFFER";

#[derive(Debug, Clone, PartialEq)]
pub struct FlowConfig {
    /// Base URL of the agent invocation service
    pub api_url: String,
    pub request_timeout: Option<Duration>,
    pub port: u16,
    /// Capacity of the run event channel
    pub event_buffer: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000".to_string(),
            request_timeout: None,
            port: 3000,
            event_buffer: 100,
        }
    }
}

impl FlowConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, FlowError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Read configuration from an explicit variable map
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, FlowError> {
        let defaults = Self::default();

        let api_url = vars
            .get(API_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or(defaults.api_url);

        let request_timeout = parse_var::<u64>(vars, TIMEOUT_VAR)?.map(Duration::from_secs);
        let port = parse_var(vars, PORT_VAR)?.unwrap_or(defaults.port);
        let event_buffer = parse_var(vars, EVENT_BUFFER_VAR)?.unwrap_or(defaults.event_buffer);

        if event_buffer == 0 {
            return Err(FlowError::config(format!("{} must be at least 1", EVENT_BUFFER_VAR)));
        }

        Ok(Self {
            api_url,
            request_timeout,
            port,
            event_buffer,
        })
    }

    /// Build the HTTP invoker described by this configuration
    pub fn invoker(&self) -> Result<HttpInvoker, FlowError> {
        match self.request_timeout {
            Some(timeout) => HttpInvoker::with_timeout(&self.api_url, timeout),
            None => Ok(HttpInvoker::new(&self.api_url)),
        }
    }
}

fn parse_var<T: FromStr>(vars: &HashMap<String, String>, name: &str) -> Result<Option<T>, FlowError>
where
    T::Err: std::fmt::Display,
{
    match vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| FlowError::config(format!("invalid {}={:?}: {}", name, raw, e))),
    }
}
