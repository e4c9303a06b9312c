mod common;

use std::sync::Arc;

use serde_json::{json, Value};
use toolwire_core::{CallMethod, MemoryRunStore, Reply, SqliteRunStore, TransportError};
use toolwire_tools::Task;

fn memory() -> Arc<MemoryRunStore> {
    Arc::new(MemoryRunStore::new())
}

fn paused(reply: Reply) -> (String, Value) {
    match reply {
        Reply::Paused { run_id, preview, .. } => (run_id, preview),
        other => panic!("expected a paused reply, got {:?}", other),
    }
}

fn remote(err: TransportError) -> (Option<String>, String) {
    match err {
        TransportError::Remote { code, message } => (code, message),
        other => panic!("expected a remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn list_tasks_returns_the_envelope_data() {
    let server = common::spawn(memory()).await;
    server.board.add("ship it", "high").await;

    let reply = server.client.call("listTasks", json!({})).await.unwrap();
    let expected = serde_json::to_value(server.board.list("all").await).unwrap();
    assert_eq!(reply, Reply::Data(expected));
}

#[tokio::test]
async fn failed_calls_raise_the_server_error_text() {
    let server = common::spawn(memory()).await;

    let err = server
        .client
        .call("completeTask", json!({ "id": "nope" }))
        .await
        .unwrap_err();
    let (code, message) = remote(err);
    assert_eq!(message, "no task with id nope");
    assert_eq!(code.as_deref(), Some("handler_error"));
}

#[tokio::test]
async fn invalid_arguments_and_unknown_tools_are_caller_errors() {
    let server = common::spawn(memory()).await;

    let (code, _) = remote(server.client.call("addTask", json!({})).await.unwrap_err());
    assert_eq!(code.as_deref(), Some("validation_error"));
    assert!(server.board.list("all").await.is_empty());

    let (code, message) = remote(server.client.call("ghost", json!({})).await.unwrap_err());
    assert_eq!(code.as_deref(), Some("not_found"));
    assert_eq!(message, "tool 'ghost' not found");
}

#[tokio::test]
async fn get_calls_flatten_arguments_into_the_query() {
    let server = common::spawn(memory()).await;
    let done = server.board.add("old", "low").await;
    server.board.add("new", "low").await;
    server.board.complete(&done.id).await.unwrap();

    let open = server
        .client
        .call_with(CallMethod::Get, "listTasks", json!({ "status": "open" }))
        .await
        .unwrap()
        .data()
        .unwrap();
    assert_eq!(open.as_array().map(Vec::len), Some(1));
    assert_eq!(open[0]["title"], "new");

    // Declared string properties stay strings even when they look like numbers.
    let echoed = server
        .client
        .call_with(CallMethod::Get, "echo", json!({ "message": "42" }))
        .await
        .unwrap();
    assert_eq!(echoed, Reply::Data(json!({ "echo": "42" })));
}

#[tokio::test]
async fn plans_pause_and_resume_over_http() {
    let server = common::spawn(memory()).await;

    let (run_id, preview) = paused(server.client.call("greet", json!({})).await.unwrap());
    assert_eq!(preview["form"]["fields"][0]["name"], "name");

    let reply = server
        .client
        .resume("greet", &run_id, json!({ "name": "Ada" }))
        .await
        .unwrap();
    assert_eq!(reply, Reply::Data(json!({ "greeting": "hi Ada" })));

    let (code, _) = remote(server.client.resume("greet", &run_id, json!({})).await.unwrap_err());
    assert_eq!(code.as_deref(), Some("unknown_run"));
}

#[tokio::test]
async fn typed_calls_decode_into_structs() {
    let server = common::spawn(memory()).await;

    let task: Task = server
        .client
        .call_typed("addTask", &json!({ "title": "typed" }))
        .await
        .unwrap();
    assert_eq!(task.title, "typed");
    assert_eq!(task.priority, "normal");
    assert!(!task.done);
}

#[tokio::test]
async fn directory_lists_tools_by_tag() {
    let server = common::spawn(memory()).await;

    let all = server.client.list_tools(None).await.unwrap();
    assert_eq!(all.len(), server.registry.len());

    let names: Vec<String> = server
        .client
        .list_tools(Some("tasks"))
        .await
        .unwrap()
        .into_iter()
        .map(|tool| tool.name)
        .collect();
    assert_eq!(names, vec!["addTask", "listTasks", "completeTask", "draftTask"]);
}

#[tokio::test]
async fn health_reports_operational() {
    let server = common::spawn(memory()).await;
    let status = server.client.health().await.unwrap();
    assert!(status.contains("Operational"));
}

#[tokio::test]
async fn paused_runs_survive_a_gateway_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("runs.db").display());

    let first = common::spawn(Arc::new(SqliteRunStore::connect(&url, None).await.unwrap())).await;
    let (run_id, preview) = paused(
        first
            .client
            .call("draftTask", json!({ "title": "Write docs" }))
            .await
            .unwrap(),
    );
    assert_eq!(preview["form"]["fields"][0]["value"], "Write docs");
    drop(first);

    let second = common::spawn(Arc::new(SqliteRunStore::connect(&url, None).await.unwrap())).await;
    let task: Task = serde_json::from_value(
        second
            .client
            .resume("draftTask", &run_id, json!({ "priority": "high" }))
            .await
            .unwrap()
            .data()
            .unwrap(),
    )
    .unwrap();

    assert_eq!(task.title, "Write docs");
    assert_eq!(task.priority, "high");
    assert_eq!(second.board.list("all").await, vec![task]);
}
