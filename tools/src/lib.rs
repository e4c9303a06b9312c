//! The tools this host ships with.
//!
//! Every tool is listed explicitly in [`catalogue`]; adding one means adding a
//! constructor here, nothing is discovered at runtime.

mod tasks;

pub use tasks::{Task, TaskBoard};

use serde_json::{json, Value};
use toolwire_core::{PlanStep, RegistrationReport, ToolDefinition, ToolRegistry, UiHint};
use tracing::info;

/// Builds every tool definition, in directory order.
pub fn catalogue(board: TaskBoard) -> Vec<ToolDefinition> {
    let constructors: Vec<anyhow::Result<ToolDefinition>> = vec![
        echo(),
        tasks::add_task(board.clone()),
        tasks::list_tasks(board.clone()),
        tasks::complete_task(board.clone()),
        tasks::draft_task(board),
        greet(),
    ];

    constructors
        .into_iter()
        .filter_map(|built| match built {
            Ok(tool) => Some(tool),
            Err(err) => {
                tracing::error!("Tool failed to build: {:#}", err);
                None
            }
        })
        .collect()
}

/// Registers the whole catalogue; duplicates follow the registry's policy.
pub fn register_all(registry: &ToolRegistry, board: TaskBoard) -> RegistrationReport {
    let report = registry.define_many(catalogue(board));
    info!(
        "Registered {} tools ({} rejected)",
        report.registered.len(),
        report.rejected.len()
    );
    report
}

fn echo() -> anyhow::Result<ToolDefinition> {
    let tool = ToolDefinition::handler("echo", "Echoes the message back", |args: Value, _| async move {
        Ok(json!({ "echo": args["message"] }))
    })
    .parameters(json!({
        "type": "object",
        "required": ["message"],
        "properties": { "message": { "type": "string" } }
    }))
    .tag("debug")
    .ui(UiHint::component("TextBlock"))
    .build()?;
    Ok(tool)
}

fn greet() -> anyhow::Result<ToolDefinition> {
    let tool = ToolDefinition::plan("greet", "Asks for a name, then greets", || {
        vec![
            PlanStep::labelled("form")
                .pause()
                .reason("Waiting for the visitor's name")
                .output(|_| async {
                    Ok(json!({
                        "form": {
                            "title": "Who are you?",
                            "fields": [{ "name": "name", "type": "text", "required": true }]
                        }
                    }))
                }),
            PlanStep::labelled("reply").run(|ctx| async move {
                let name = ctx.input()["name"].as_str().unwrap_or("stranger").to_string();
                Ok(json!({ "greeting": format!("hi {}", name) }))
            }),
        ]
    })
    .tag("forms")
    .build()?;
    Ok(tool)
}
