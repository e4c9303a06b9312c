use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use toolwire_core::{PlanStep, ToolDefinition, UiHint};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub priority: String,
    pub done: bool,
}

/// The in-process task list behind the task tools.
#[derive(Clone, Default)]
pub struct TaskBoard {
    tasks: Arc<Mutex<Vec<Task>>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, title: &str, priority: &str) -> Task {
        let task = Task {
            id: ulid::Ulid::new().to_string(),
            title: title.to_string(),
            priority: priority.to_string(),
            done: false,
        };
        self.tasks.lock().await.push(task.clone());
        task
    }

    pub async fn list(&self, status: &str) -> Vec<Task> {
        self.tasks
            .lock()
            .await
            .iter()
            .filter(|task| match status {
                "open" => !task.done,
                "done" => task.done,
                _ => true,
            })
            .cloned()
            .collect()
    }

    pub async fn complete(&self, id: &str) -> anyhow::Result<Task> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| anyhow!("no task with id {}", id))?;
        task.done = true;
        Ok(task.clone())
    }
}

const PRIORITIES: [&str; 3] = ["low", "normal", "high"];

pub(crate) fn add_task(board: TaskBoard) -> anyhow::Result<ToolDefinition> {
    let tool = ToolDefinition::handler("addTask", "Adds a task to the board", move |args: Value, _| {
        let board = board.clone();
        async move {
            let title = args["title"].as_str().unwrap_or_default();
            let priority = args["priority"].as_str().unwrap_or("normal");
            let task = board.add(title, priority).await;
            Ok(serde_json::to_value(task)?)
        }
    })
    .parameters(json!({
        "type": "object",
        "required": ["title", "priority"],
        "additionalProperties": false,
        "properties": {
            "title": { "type": "string", "minLength": 1 },
            "priority": { "type": "string", "enum": PRIORITIES, "default": "normal" }
        }
    }))
    .tag("tasks")
    .build()?;
    Ok(tool)
}

pub(crate) fn list_tasks(board: TaskBoard) -> anyhow::Result<ToolDefinition> {
    let tool = ToolDefinition::handler("listTasks", "Lists tasks on the board", move |args: Value, _| {
        let board = board.clone();
        async move {
            let status = args["status"].as_str().unwrap_or("all");
            Ok(serde_json::to_value(board.list(status).await)?)
        }
    })
    .parameters(json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "status": { "type": "string", "enum": ["open", "done", "all"], "default": "all" }
        }
    }))
    .tag("tasks")
    .ui(UiHint::component("TaskList"))
    .build()?;
    Ok(tool)
}

pub(crate) fn complete_task(board: TaskBoard) -> anyhow::Result<ToolDefinition> {
    let tool = ToolDefinition::handler("completeTask", "Marks a task as done", move |args: Value, _| {
        let board = board.clone();
        async move {
            let id = args["id"].as_str().unwrap_or_default();
            Ok(serde_json::to_value(board.complete(id).await?)?)
        }
    })
    .parameters(json!({
        "type": "object",
        "required": ["id"],
        "properties": { "id": { "type": "string" } }
    }))
    .tag("tasks")
    .build()?;
    Ok(tool)
}

/// Two-step task creation: show a prefilled form, then add whatever comes back.
pub(crate) fn draft_task(board: TaskBoard) -> anyhow::Result<ToolDefinition> {
    let tool = ToolDefinition::plan("draftTask", "Drafts a task through a form", move || {
        let board = board.clone();
        vec![
            PlanStep::labelled("form")
                .pause()
                .reason("Review the task before it is added")
                .output(|ctx| async move {
                    Ok(json!({
                        "form": {
                            "fields": [
                                { "name": "title", "type": "text", "value": ctx.args()["title"] },
                                { "name": "priority", "type": "select", "options": PRIORITIES, "value": "normal" }
                            ]
                        }
                    }))
                }),
            PlanStep::labelled("task").run(move |ctx| {
                let board = board.clone();
                async move {
                    let input = ctx.input();
                    let title = input["title"]
                        .as_str()
                        .or_else(|| ctx.args()["title"].as_str())
                        .filter(|title| !title.is_empty())
                        .ok_or_else(|| anyhow!("a task needs a title"))?;
                    let priority = input["priority"]
                        .as_str()
                        .filter(|p| PRIORITIES.contains(p))
                        .unwrap_or("normal");
                    Ok(serde_json::to_value(board.add(title, priority).await)?)
                }
            }),
        ]
    })
    .parameters(json!({
        "type": "object",
        "properties": { "title": { "type": "string", "default": "" } }
    }))
    .tag("tasks")
    .tag("forms")
    .ui(UiHint::component("TaskCard"))
    .build()?;
    Ok(tool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn board_filters_by_status() {
        let board = TaskBoard::new();
        let first = board.add("write docs", "low").await;
        board.add("ship", "high").await;
        board.complete(&first.id).await.unwrap();

        assert_eq!(board.list("all").await.len(), 2);
        assert_eq!(board.list("done").await, vec![Task { done: true, ..first }]);
        assert_eq!(board.list("open").await[0].title, "ship");
    }

    #[tokio::test]
    async fn completing_an_unknown_task_fails() {
        let err = TaskBoard::new().complete("nope").await.unwrap_err();
        assert_eq!(err.to_string(), "no task with id nope");
    }
}
