// SPDX-License-Identifier: MIT

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::agents::{Agent, FlowError, GraphError, Invoker, WorkflowError};
use crate::flow::catalog::AgentCatalog;
use crate::flow::graph::{
    Edge, FlowGraph, GraphNode, PipelineExecutor, Position, RunEvent, START_NODE_ID,
};

/// Shared server state. The graph and catalog are edited in place; every
/// run works on snapshots taken when it starts.
#[derive(Clone)]
pub struct AppState {
    catalog: AgentCatalog,
    graph: Arc<RwLock<FlowGraph>>,
    executor: PipelineExecutor,
    event_buffer: usize,
}

impl AppState {
    pub fn new(
        catalog: AgentCatalog,
        graph: FlowGraph,
        invoker: Arc<dyn Invoker>,
        event_buffer: usize,
    ) -> Self {
        Self {
            catalog,
            graph: Arc::new(RwLock::new(graph)),
            executor: PipelineExecutor::new(invoker),
            event_buffer: event_buffer.max(1),
        }
    }

    /// Agents of the current execution order, from point-in-time snapshots
    async fn resolve_steps(&self) -> Result<Vec<Agent>, FlowError> {
        let graph = self.graph.read().await.clone();
        let agents = self.catalog.snapshot().await;
        let steps = graph.ordered_agents(|id| agents.get(id).cloned())?;
        Ok(steps)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/agents", get(list_agents).post(create_agent))
        .route(
            "/api/agents/{id}",
            get(get_agent).put(update_agent).delete(delete_agent),
        )
        .route("/api/graph", get(get_graph))
        .route("/api/graph/nodes", post(add_node))
        .route("/api/graph/nodes/{id}", delete(remove_node))
        .route("/api/graph/edges", post(add_edge))
        .route("/api/graph/edges/{id}", delete(remove_edge))
        .route("/api/graph/order", get(get_order))
        .route("/api/runs", post(create_run))
        .route("/api/runs/stream", post(stream_run))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> Result<(), FlowError> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// JSON error response
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        let status = match &err {
            FlowError::AgentNotFound { .. } => StatusCode::NOT_FOUND,
            FlowError::Graph(GraphError::UnknownNode(_) | GraphError::UnknownEdge(_)) => {
                StatusCode::NOT_FOUND
            }
            FlowError::Graph(_) => StatusCode::BAD_REQUEST,
            FlowError::Workflow(WorkflowError::CircularDependency(_)) => StatusCode::CONFLICT,
            FlowError::Workflow(_) => StatusCode::BAD_REQUEST,
            FlowError::Api { .. } | FlowError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        FlowError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct KindQuery {
    kind: Option<u8>,
}

async fn list_agents(
    State(state): State<AppState>,
    Query(query): Query<KindQuery>,
) -> Json<Vec<Agent>> {
    Json(state.catalog.list(query.kind).await)
}

async fn create_agent(State(state): State<AppState>, Json(draft): Json<Agent>) -> Json<Value> {
    let id = state.catalog.create(draft).await;
    Json(json!({ "id": id }))
}

async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    state
        .catalog
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| FlowError::agent_not_found(id).into())
}

async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut agent): Json<Agent>,
) -> Result<Json<Agent>, ApiError> {
    if id == START_NODE_ID {
        return Err(FlowError::from(WorkflowError::ReservedAgentId(id)).into());
    }
    agent.id = id;
    state.catalog.update(agent.clone()).await?;
    Ok(Json(agent))
}

async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.catalog.remove(&id).await {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(FlowError::agent_not_found(id).into()),
    }
}

#[derive(Serialize)]
struct GraphView {
    nodes: Vec<GraphNode>,
    edges: Vec<Edge>,
    order: Option<Vec<String>>,
    error: Option<String>,
}

async fn get_graph(State(state): State<AppState>) -> Json<GraphView> {
    let graph = state.graph.read().await;
    let (order, error) = match graph.execution_order() {
        Ok(order) => (Some(order.to_vec()), None),
        Err(e) => (None, Some(e.to_string())),
    };
    Json(GraphView {
        nodes: graph.nodes().to_vec(),
        edges: graph.edges().to_vec(),
        order,
        error,
    })
}

#[derive(Deserialize)]
struct PlaceNodeRequest {
    agent_id: String,
    #[serde(default)]
    position: Position,
}

async fn add_node(
    State(state): State<AppState>,
    Json(payload): Json<PlaceNodeRequest>,
) -> Result<StatusCode, ApiError> {
    if state.catalog.get(&payload.agent_id).await.is_none() {
        return Err(FlowError::agent_not_found(payload.agent_id).into());
    }
    let created = state
        .graph
        .write()
        .await
        .add_node(payload.agent_id, payload.position);
    Ok(if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    })
}

async fn remove_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.graph.write().await.remove_node(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ConnectRequest {
    source: String,
    target: String,
}

async fn add_edge(
    State(state): State<AppState>,
    Json(payload): Json<ConnectRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = state
        .graph
        .write()
        .await
        .connect(&payload.source, &payload.target)?;
    Ok(Json(json!({ "id": id })))
}

async fn remove_edge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.graph.write().await.remove_edge(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_order(State(state): State<AppState>) -> Result<Json<Vec<Agent>>, ApiError> {
    Ok(Json(state.resolve_steps().await?))
}

#[derive(Deserialize)]
struct RunRequest {
    input: String,
}

async fn create_run(
    State(state): State<AppState>,
    Json(payload): Json<RunRequest>,
) -> Result<Response, ApiError> {
    let steps = state.resolve_steps().await?;
    if steps.is_empty() {
        return Err(FlowError::from(WorkflowError::EmptyPipeline).into());
    }

    let response = match state.executor.run(&steps, payload.input).await {
        Ok(run) => Json(json!({ "status": "completed", "run": run })).into_response(),
        Err(failure) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "status": "failed",
                "step_id": failure.step_id,
                "error": failure.source.to_string(),
                "run": failure.partial,
            })),
        )
            .into_response(),
    };
    Ok(response)
}

async fn stream_run(
    State(state): State<AppState>,
    Json(payload): Json<RunRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let steps = state.resolve_steps().await?;
    if steps.is_empty() {
        return Err(FlowError::from(WorkflowError::EmptyPipeline).into());
    }

    let (tx, rx) = mpsc::channel::<RunEvent>(state.event_buffer);
    let executor = state.executor.clone();

    tokio::spawn(async move {
        log::info!("Starting streaming run over {} steps", steps.len());
        if let Err(failure) = executor.run_stream(&steps, payload.input, tx).await {
            log::warn!("Streaming run failed: {}", failure);
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1))))
}
