use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::envelope::CallEnvelope;
use crate::error::EngineError;
use crate::registry::ToolRegistry;
use crate::runtime::{PlanExecutor, PlanState};
use crate::tool::{CallContext, ToolDefinition, ToolKind};

/// Argument key that turns a call into a resume of a paused run.
///
/// `{ "__PLAN_RESUME__": "<runId>", ..input }`: everything except the marker
/// becomes the run's `$input`.
pub const RESUME_MARKER: &str = "__PLAN_RESUME__";

/// Turns `(name, args)` into an envelope. Holds no state of its own.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    executor: PlanExecutor,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, executor: PlanExecutor) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn dispatch(&self, name: &str, args: Value, ctx: CallContext) -> CallEnvelope {
        info!("Dispatching '{}' (request {})", name, ctx.request_id);
        let request_id = ctx.request_id.clone();

        match self.call(name, args, ctx).await {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("Call '{}' (request {}) failed: {}", name, request_id, err);
                CallEnvelope::failure(&err)
            }
        }
    }

    async fn call(&self, name: &str, args: Value, ctx: CallContext) -> Result<CallEnvelope, EngineError> {
        let tool = self.registry.resolve(name)?;

        if let Some((run_id, input)) = split_resume(&args)? {
            let ToolKind::Plan(plan) = &tool.kind else {
                return Err(EngineError::Validation(vec![format!(
                    "'{}' is not a plan and cannot be resumed",
                    name
                )]));
            };
            let state = self.executor.resume(name, plan, &run_id, input).await;
            return plan_envelope(state, &tool);
        }

        // Validation happens before anything of the tool runs.
        let args = tool.schema.validate(args).map_err(EngineError::Validation)?;

        match &tool.kind {
            ToolKind::Handler(handler) => {
                let data = handler(args, ctx).await.map_err(EngineError::handler)?;
                Ok(CallEnvelope::Success {
                    data,
                    ui: tool.ui.clone(),
                })
            }
            ToolKind::Plan(plan) => {
                let state = self.executor.start(name, plan, args).await;
                plan_envelope(state, &tool)
            }
        }
    }
}

fn plan_envelope(state: PlanState, tool: &ToolDefinition) -> Result<CallEnvelope, EngineError> {
    match state {
        PlanState::Completed(data) => Ok(CallEnvelope::Success {
            data,
            ui: tool.ui.clone(),
        }),
        PlanState::Paused { run_id, preview, reason, .. } => Ok(CallEnvelope::Paused {
            run_id,
            preview,
            reason,
        }),
        PlanState::Failed(err) => Err(err),
        PlanState::Running(step) => Err(EngineError::Step {
            step: format!("#{}", step),
            message: "plan stopped while still running".to_string(),
        }),
    }
}

/// Pulls the resume marker out of the arguments, if there is one.
fn split_resume(args: &Value) -> Result<Option<(String, Value)>, EngineError> {
    let Some(object) = args.as_object() else {
        return Ok(None);
    };
    let Some(marker) = object.get(RESUME_MARKER) else {
        return Ok(None);
    };
    let run_id = marker.as_str().ok_or_else(|| {
        EngineError::Validation(vec![format!("{} must be a run id string", RESUME_MARKER)])
    })?;

    let input: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| key.as_str() != RESUME_MARKER)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Ok(Some((run_id.to_string(), Value::Object(input))))
}
