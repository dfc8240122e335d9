// SPDX-License-Identifier: MIT

//! Newline-delimited frame decoding for streamed agent output
//!
//! A step's response body is a sequence of JSON objects separated by `\n`.
//! Transport chunks do not respect frame boundaries, so bytes are buffered
//! until a full line is available.

use super::error::FlowError;
use super::invoke::ChunkStream;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;

/// One decoded frame of a step's output stream
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Frame {
    /// Text fragment to append to the step's output, if any
    #[serde(default)]
    pub content: Option<String>,
}

impl Frame {
    /// The fragment this frame contributes; empty fragments count as none
    pub fn fragment(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.is_empty())
    }
}

/// Incremental decoder turning raw chunks into frames.
///
/// Lines that fail to decode are logged and dropped; they never abort
/// decoding of the lines that follow.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    malformed: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = self.decode_line(&line[..pos]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush an unterminated trailing line at end-of-stream
    pub fn finish(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line)
    }

    /// Number of lines discarded so far
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<Frame> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                self.malformed += 1;
                log::warn!("Discarding frame with invalid UTF-8: {}", e);
                return None;
            }
        };

        if line.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<Frame>(line) {
            Ok(frame) => Some(frame),
            Err(e) => {
                self.malformed += 1;
                log::warn!("Failed to parse frame {:?}: {}", line, e);
                None
            }
        }
    }
}

/// Adapt a chunk stream into a stream of decoded frames.
///
/// Transport errors are yielded once and end the stream.
pub fn decode_frames(chunks: ChunkStream) -> impl Stream<Item = Result<Frame, FlowError>> + Send {
    struct State {
        chunks: ChunkStream,
        decoder: FrameDecoder,
        pending: VecDeque<Frame>,
        done: bool,
    }

    let state = State {
        chunks,
        decoder: FrameDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(frame), state));
            }
            if state.done {
                return None;
            }

            match state.chunks.next().await {
                Some(Ok(bytes)) => {
                    let frames = state.decoder.feed(&bytes);
                    state.pending.extend(frames);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.done = true;
                    if let Some(frame) = state.decoder.finish() {
                        state.pending.push_back(frame);
                    }
                    if state.decoder.malformed() > 0 {
                        log::debug!(
                            "Stream ended with {} malformed frame(s) discarded",
                            state.decoder.malformed()
                        );
                    }
                }
            }
        }
    })
}
