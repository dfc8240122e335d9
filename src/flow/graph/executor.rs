//! Pipeline executor
//!
//! Runs an ordered list of agents one after another. Each agent's streamed
//! output is accumulated frame by frame and becomes the next agent's input.
//! Observers receive a snapshot of the accumulated text after every fragment.

use crate::agents::{decode_frames, Agent, FlowError, Invoker};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Accumulated output of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub id: String,
    pub content: String,
}

/// State of a single run. Owned by the run; never shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    /// Input for the next step to execute
    pub input: String,
    /// One entry per step that has started, in execution order
    pub results: Vec<StepResult>,
    /// Concatenated step outputs, set once every step has completed
    pub output: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    fn new(input: String) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            input,
            results: Vec::new(),
            output: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Concatenation of every step's content in execution order
    pub fn concatenated(&self) -> String {
        self.results.iter().map(|r| r.content.as_str()).collect()
    }

    pub fn result(&self, id: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.id == id)
    }

    fn last_content(&self) -> String {
        self.results
            .last()
            .map(|r| r.content.clone())
            .unwrap_or_default()
    }
}

/// Progress notifications published while a run executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        steps: Vec<String>,
    },
    StepStarted {
        index: usize,
        id: String,
        name: String,
    },
    /// Full accumulated content of the step so far
    StepDelta {
        id: String,
        content: String,
    },
    StepCompleted {
        id: String,
        content: String,
    },
    RunCompleted {
        output: String,
    },
    RunFailed {
        id: String,
        error: String,
    },
}

/// A run aborted by a failing step. Results gathered so far, including the
/// failing step's partial output, are kept in `partial`.
#[derive(Debug, Error)]
#[error("run aborted at step '{step_id}' (#{index}): {source}")]
pub struct RunFailure {
    pub step_id: String,
    pub index: usize,
    #[source]
    pub source: FlowError,
    pub partial: RunState,
}

/// Publishes events to an optional observer. A closed receiver stops
/// publishing but never aborts the run.
struct Observer<'a> {
    tx: Option<&'a mpsc::Sender<RunEvent>>,
}

impl<'a> Observer<'a> {
    async fn emit(&mut self, event: RunEvent) {
        if let Some(tx) = self.tx {
            if tx.send(event).await.is_err() {
                log::debug!("Run observer closed, dropping further events");
                self.tx = None;
            }
        }
    }
}

/// Sequential executor for resolved pipelines
#[derive(Clone)]
pub struct PipelineExecutor {
    invoker: Arc<dyn Invoker>,
}

impl PipelineExecutor {
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }

    /// Run the steps without an observer
    pub async fn run(
        &self,
        steps: &[Agent],
        input: impl Into<String>,
    ) -> Result<RunState, RunFailure> {
        self.execute(steps, input.into(), Observer { tx: None }).await
    }

    /// Run the steps, publishing [`RunEvent`]s to `tx`
    pub async fn run_stream(
        &self,
        steps: &[Agent],
        input: impl Into<String>,
        tx: mpsc::Sender<RunEvent>,
    ) -> Result<RunState, RunFailure> {
        self.execute(steps, input.into(), Observer { tx: Some(&tx) })
            .await
    }

    async fn execute(
        &self,
        steps: &[Agent],
        input: String,
        mut observer: Observer<'_>,
    ) -> Result<RunState, RunFailure> {
        let mut state = RunState::new(input);
        log::info!("Run {} starting with {} steps", state.run_id, steps.len());

        observer
            .emit(RunEvent::RunStarted {
                run_id: state.run_id.to_string(),
                steps: steps.iter().map(|a| a.id.clone()).collect(),
            })
            .await;

        for (index, agent) in steps.iter().enumerate() {
            log::info!(
                "Executing step {} ({}, {})",
                agent.id,
                agent.name,
                agent.kind.label()
            );
            observer
                .emit(RunEvent::StepStarted {
                    index,
                    id: agent.id.clone(),
                    name: agent.name.clone(),
                })
                .await;

            let mut result = StepResult {
                id: agent.id.clone(),
                content: String::new(),
            };
            let outcome = self
                .execute_step(agent, &state.input, &mut result, &mut observer)
                .await;
            state.results.push(result);

            match outcome {
                Ok(()) => {
                    let content = state.last_content();
                    log::info!("Step {} completed ({} bytes)", agent.id, content.len());
                    observer
                        .emit(RunEvent::StepCompleted {
                            id: agent.id.clone(),
                            content: content.clone(),
                        })
                        .await;
                    state.input = content;
                }
                Err(e) => {
                    log::error!("Step {} failed: {}", agent.id, e);
                    observer
                        .emit(RunEvent::RunFailed {
                            id: agent.id.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    state.finished_at = Some(Utc::now());
                    return Err(RunFailure {
                        step_id: agent.id.clone(),
                        index,
                        source: e,
                        partial: state,
                    });
                }
            }
        }

        let output = state.concatenated();
        state.output = Some(output.clone());
        state.finished_at = Some(Utc::now());
        log::info!("Run {} completed", state.run_id);

        observer.emit(RunEvent::RunCompleted { output }).await;
        Ok(state)
    }

    /// Invoke one step and drain its stream into `result`
    async fn execute_step(
        &self,
        agent: &Agent,
        input: &str,
        result: &mut StepResult,
        observer: &mut Observer<'_>,
    ) -> Result<(), FlowError> {
        let chunks = self.invoker.invoke(agent.invoke_request(input)).await?;

        let frames = decode_frames(chunks);
        futures::pin_mut!(frames);

        while let Some(frame) = frames.next().await {
            let frame = frame?;
            if let Some(fragment) = frame.fragment() {
                result.content.push_str(fragment);
                observer
                    .emit(RunEvent::StepDelta {
                        id: result.id.clone(),
                        content: result.content.clone(),
                    })
                    .await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentKind, ChunkStream, InvokeRequest};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// What a mock step sends back
    enum Script {
        /// Fixed chunks, sent as-is
        Chunks(Vec<&'static str>),
        /// Echo the input, then append a suffix, as two frames
        Echo(&'static str),
        /// Fail before producing a stream
        Fail,
        /// Send the chunks, then break the connection
        BreakAfter(Vec<&'static str>),
    }

    struct ScriptedInvoker {
        scripts: HashMap<String, Script>,
        calls: Mutex<Vec<InvokeRequest>>,
    }

    impl ScriptedInvoker {
        fn new(scripts: Vec<(&str, Script)>) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts
                    .into_iter()
                    .map(|(id, s)| (id.to_string(), s))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn called_ids(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.id.clone())
                .collect()
        }

        fn input_of(&self, id: &str) -> Option<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .map(|r| r.input.clone())
        }
    }

    fn frame(content: &str) -> String {
        format!("{}\n", serde_json::json!({ "content": content }))
    }

    fn chunks(items: Vec<String>) -> ChunkStream {
        stream::iter(items.into_iter().map(|s| Ok(Bytes::from(s)))).boxed()
    }

    #[async_trait]
    impl Invoker for ScriptedInvoker {
        async fn invoke(&self, request: InvokeRequest) -> Result<ChunkStream, FlowError> {
            self.calls.lock().unwrap().push(request.clone());
            match self.scripts.get(&request.id) {
                Some(Script::Chunks(items)) => {
                    Ok(chunks(items.iter().map(|s| s.to_string()).collect()))
                }
                Some(Script::Echo(suffix)) => {
                    Ok(chunks(vec![frame(&request.input), frame(suffix)]))
                }
                Some(Script::Fail) | None => Err(FlowError::api("mock", "HTTP 500: boom")),
                Some(Script::BreakAfter(items)) => {
                    let mut items: Vec<Result<Bytes, FlowError>> =
                        items.iter().map(|s| Ok(Bytes::from(*s))).collect();
                    items.push(Err(FlowError::other("connection reset")));
                    Ok(stream::iter(items).boxed())
                }
            }
        }
    }

    fn agent(id: &str) -> Agent {
        Agent::new(
            id,
            id.to_uppercase(),
            AgentKind::Analyser {
                identity_setting: String::new(),
                task: String::new(),
            },
        )
    }

    fn abc() -> Vec<Agent> {
        vec![agent("a"), agent("b"), agent("c")]
    }

    #[tokio::test]
    async fn test_chained_output_is_concatenation_of_steps() {
        let invoker = ScriptedInvoker::new(vec![
            (
                "a",
                Script::Chunks(vec!["{\"content\":\"x\"}\n", "{\"content\":\"y\"}\n"]),
            ),
            ("b", Script::Echo("-b")),
            ("c", Script::Echo("-c")),
        ]);
        let executor = PipelineExecutor::new(invoker.clone());

        let state = executor.run(&abc(), "start").await.unwrap();

        assert_eq!(state.result("a").unwrap().content, "xy");
        assert_eq!(state.result("b").unwrap().content, "xy-b");
        assert_eq!(state.result("c").unwrap().content, "xy-b-c");
        assert_eq!(state.output.as_deref(), Some("xyxy-bxy-b-c"));
        assert_eq!(state.input, "xy-b-c");
        assert!(state.finished_at.is_some());

        assert_eq!(invoker.input_of("a").as_deref(), Some("start"));
        assert_eq!(invoker.input_of("b").as_deref(), Some("xy"));
        assert_eq!(invoker.input_of("c").as_deref(), Some("xy-b"));
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_interrupt_step() {
        let invoker = ScriptedInvoker::new(vec![(
            "a",
            Script::Chunks(vec![
                "{\"content\":\"x\"}\n",
                "not-json\n",
                "{\"content\":\"y\"}\n",
            ]),
        )]);
        let executor = PipelineExecutor::new(invoker);

        let state = executor.run(&[agent("a")], "in").await.unwrap();
        assert_eq!(state.output.as_deref(), Some("xy"));
    }

    #[tokio::test]
    async fn test_failed_step_aborts_run_and_keeps_partials() {
        let invoker = ScriptedInvoker::new(vec![
            ("a", Script::Chunks(vec!["{\"content\":\"x\"}\n"])),
            ("b", Script::Fail),
            ("c", Script::Echo("-c")),
        ]);
        let executor = PipelineExecutor::new(invoker.clone());

        let failure = executor.run(&abc(), "start").await.unwrap_err();

        assert_eq!(failure.step_id, "b");
        assert_eq!(failure.index, 1);
        assert!(failure.to_string().contains("HTTP 500"));
        assert_eq!(invoker.called_ids(), vec!["a", "b"]);

        let partial = &failure.partial;
        assert_eq!(partial.results.len(), 2);
        assert_eq!(partial.result("a").unwrap().content, "x");
        assert_eq!(partial.result("b").unwrap().content, "");
        assert!(partial.result("c").is_none());
        assert!(partial.output.is_none());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_partial_content() {
        let invoker = ScriptedInvoker::new(vec![
            ("a", Script::Chunks(vec!["{\"content\":\"x\"}\n"])),
            ("b", Script::BreakAfter(vec!["{\"content\":\"half\"}\n"])),
            ("c", Script::Echo("-c")),
        ]);
        let executor = PipelineExecutor::new(invoker.clone());

        let failure = executor.run(&abc(), "start").await.unwrap_err();

        assert_eq!(failure.step_id, "b");
        assert_eq!(failure.partial.result("b").unwrap().content, "half");
        assert_eq!(invoker.called_ids(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_events_are_ordered_per_step() {
        let invoker = ScriptedInvoker::new(vec![
            (
                "a",
                Script::Chunks(vec!["{\"content\":\"x\"}\n{\"note\":1}\n{\"content\":\"y\"}\n"]),
            ),
            ("b", Script::Echo("!")),
        ]);
        let executor = PipelineExecutor::new(invoker);
        let (tx, mut rx) = mpsc::channel(64);

        let steps = vec![agent("a"), agent("b")];
        let state = executor.run_stream(&steps, "go", tx).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(&events[0], RunEvent::RunStarted { steps, .. } if steps == &["a", "b"]));
        assert_eq!(
            events[1..].to_vec(),
            vec![
                RunEvent::StepStarted {
                    index: 0,
                    id: "a".into(),
                    name: "A".into()
                },
                RunEvent::StepDelta {
                    id: "a".into(),
                    content: "x".into()
                },
                RunEvent::StepDelta {
                    id: "a".into(),
                    content: "xy".into()
                },
                RunEvent::StepCompleted {
                    id: "a".into(),
                    content: "xy".into()
                },
                RunEvent::StepStarted {
                    index: 1,
                    id: "b".into(),
                    name: "B".into()
                },
                RunEvent::StepDelta {
                    id: "b".into(),
                    content: "xy".into()
                },
                RunEvent::StepDelta {
                    id: "b".into(),
                    content: "xy!".into()
                },
                RunEvent::StepCompleted {
                    id: "b".into(),
                    content: "xy!".into()
                },
                RunEvent::RunCompleted {
                    output: "xyxy!".into()
                },
            ]
        );
        assert_eq!(state.output.as_deref(), Some("xyxy!"));
    }

    #[tokio::test]
    async fn test_failure_event_is_published() {
        let invoker = ScriptedInvoker::new(vec![("a", Script::Fail)]);
        let executor = PipelineExecutor::new(invoker);
        let (tx, mut rx) = mpsc::channel(16);

        let _ = executor.run_stream(&[agent("a")], "go", tx).await;

        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        assert!(matches!(last, Some(RunEvent::RunFailed { id, .. }) if id == "a"));
    }

    #[tokio::test]
    async fn test_closed_observer_does_not_abort_run() {
        let invoker = ScriptedInvoker::new(vec![("a", Script::Echo("!"))]);
        let executor = PipelineExecutor::new(invoker);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let state = executor.run_stream(&[agent("a")], "go", tx).await.unwrap();
        assert_eq!(state.output.as_deref(), Some("go!"));
    }

    #[tokio::test]
    async fn test_empty_pipeline_yields_empty_output() {
        let executor = PipelineExecutor::new(ScriptedInvoker::new(vec![]));
        let state = executor.run(&[], "unused").await.unwrap();
        assert!(state.results.is_empty());
        assert_eq!(state.output.as_deref(), Some(""));
    }

    #[test]
    fn test_event_wire_format() {
        let event = RunEvent::StepDelta {
            id: "a".into(),
            content: "xy".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "step_delta", "id": "a", "content": "xy"})
        );
    }
}
