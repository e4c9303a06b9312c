pub mod api;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::api::{args_from_query, call_context, status_for, ListQuery};
use toolwire_core::{CallEnvelope, Dispatcher, EngineError, RunStore, ToolSummary};

// 1. Application State
// The dispatcher carries the registry and the plan executor; nothing else is shared.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

// 2. Routes
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tools", get(list_tools))
        .route("/tools/{name}", get(call_tool_query).post(call_tool))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Periodically drops paused runs nobody came back for.
pub fn spawn_run_purger(store: Arc<dyn RunStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => debug!("Purged {} expired plan runs", purged),
                Err(e) => warn!("Run purge failed: {}", e),
            }
        }
    })
}

// --- HANDLERS ---

async fn health_check() -> &'static str {
    "Toolwire Gateway: Operational"
}

async fn list_tools(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Json<Vec<ToolSummary>> {
    let tags: Vec<&str> = query.tag.as_deref().into_iter().collect();
    let tools = state
        .dispatcher
        .registry()
        .list(&tags)
        .map(|tool| ToolSummary::from(tool.as_ref()))
        .collect();
    Json(tools)
}

async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<CallEnvelope>) {
    let args = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        match serde_json::from_slice(&body) {
            Ok(args) => args,
            Err(e) => {
                let err = EngineError::Validation(vec![format!("body is not valid JSON: {}", e)]);
                let envelope = CallEnvelope::failure(&err);
                return (status_for(&envelope), Json(envelope));
            }
        }
    };

    respond(&state, &name, args, &headers).await
}

async fn call_tool_query(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<CallEnvelope>) {
    let schema = state
        .dispatcher
        .registry()
        .resolve(&name)
        .ok()
        .map(|tool| tool.schema.raw().clone());
    let args = args_from_query(params, schema.as_ref());

    respond(&state, &name, args, &headers).await
}

async fn respond(state: &AppState, name: &str, args: Value, headers: &HeaderMap) -> (StatusCode, Json<CallEnvelope>) {
    let envelope = state.dispatcher.dispatch(name, args, call_context(headers)).await;
    (status_for(&envelope), Json(envelope))
}
