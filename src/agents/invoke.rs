// SPDX-License-Identifier: MIT

//! Step invocation contract
//!
//! An [`Invoker`] starts one step and hands back its raw response body as a
//! stream of byte chunks. Decoding those chunks into frames is the caller's
//! job (see [`decode_frames`](super::frame::decode_frames)).

use super::error::FlowError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw response body of a step invocation
pub type ChunkStream = BoxStream<'static, Result<Bytes, FlowError>>;

/// Payload sent to the invocation service for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub id: String,
    pub kind: u8,
    pub input: String,
}

/// Contract for starting a step and streaming its output
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Start the step. An `Err` here means the step never produced a stream.
    async fn invoke(&self, request: InvokeRequest) -> Result<ChunkStream, FlowError>;
}

/// Invoker backed by the agent service's `/call/one` endpoint
pub struct HttpInvoker {
    client: Client,
    base_url: String,
}

impl HttpInvoker {
    /// Create a new HttpInvoker for the given service base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create an HttpInvoker whose requests time out after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FlowError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn call_url(&self) -> String {
        format!("{}/call/one", self.base_url)
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self, request: InvokeRequest) -> Result<ChunkStream, FlowError> {
        let url = self.call_url();
        log::debug!("Invoking agent {} (kind {}) at {}", request.id, request.kind, url);

        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(FlowError::api(
                "invoker",
                format!("HTTP {}: {}", status, text),
            ));
        }

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(FlowError::from))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_url_strips_trailing_slash() {
        let invoker = HttpInvoker::new("http://localhost:8000/");
        assert_eq!(invoker.call_url(), "http://localhost:8000/call/one");
    }

    #[test]
    fn test_request_wire_format() {
        let request = InvokeRequest {
            id: "a1".to_string(),
            kind: 2,
            input: "text".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, serde_json::json!({"id": "a1", "kind": 2, "input": "text"}));
    }
}
