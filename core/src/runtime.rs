use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::store::{PlanRunState, RunStore};
use crate::tool::{ExecutionContext, PlanFn, PlanStep};

// 1. The Run States
// A plan run is always in exactly one of these. `Running` is internal to the
// executor; callers only ever get one of the other three back.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanState {
    Running(usize),
    Paused {
        run_id: String,
        /// The step the run continues from.
        step_index: usize,
        context: ExecutionContext,
        preview: Value,
        reason: Option<String>,
    },
    Completed(Value),
    Failed(EngineError),
}

// Tracks the last non-pause `output` so completion can prefer the terminal projection.
struct Progress {
    projection: Option<(usize, Value)>,
}

// 2. The Executor
// Stateless between calls. Anything that has to outlive a request sits in the store.
#[derive(Clone)]
pub struct PlanExecutor {
    store: Arc<dyn RunStore>,
}

impl PlanExecutor {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Runs a fresh instance of `plan` from its first step.
    pub async fn start(&self, tool: &str, plan: &PlanFn, args: Value) -> PlanState {
        debug!("Starting plan '{}'", tool);
        self.drive(tool, plan(), ExecutionContext::new(args), 0, None).await
    }

    /// Continues a paused run with the caller's input.
    ///
    /// The step that paused is not run again; execution picks up at the one after it.
    pub async fn resume(&self, tool: &str, plan: &PlanFn, run_id: &str, input: Value) -> PlanState {
        // A. Take the lease. Nothing is discarded if this fails: the run may
        // belong to a resume that is still in flight.
        let claimed = match self.store.claim(run_id, tool).await {
            Ok(state) => state,
            Err(err) => return PlanState::Failed(err.into()),
        };

        // B. If this future is dropped before the run settles, hand the lease back.
        let guard = LeaseGuard {
            store: Arc::clone(&self.store),
            run_id: Some(run_id.to_string()),
        };

        // C. Rebuild the context and hand it the input.
        let mut context = claimed.context;
        context.set_input(input);

        info!("Resuming plan '{}' run {} at step {}", tool, run_id, claimed.step_index);
        let outcome = self.drive(tool, plan(), context, claimed.step_index, Some(run_id)).await;
        guard.disarm();
        outcome
    }

    async fn drive(
        &self,
        tool: &str,
        steps: Vec<PlanStep>,
        mut context: ExecutionContext,
        start: usize,
        resumed_from: Option<&str>,
    ) -> PlanState {
        let mut progress = Progress { projection: None };
        let mut state = PlanState::Running(start);

        let outcome = loop {
            state = match state {
                PlanState::Running(index) if index >= steps.len() => {
                    PlanState::Completed(final_result(&context, &progress, steps.len()))
                }
                PlanState::Running(index) => {
                    advance(&steps[index], index, &mut context, &mut progress).await
                }
                settled => break settled,
            };
        };

        self.settle(tool, outcome, resumed_from).await
    }

    /// Applies the outcome to the store: park paused runs, drop finished ones.
    async fn settle(&self, tool: &str, outcome: PlanState, resumed_from: Option<&str>) -> PlanState {
        let outcome = match outcome {
            PlanState::Paused { run_id, step_index, context, preview, reason } => {
                let record = PlanRunState {
                    run_id: run_id.clone(),
                    tool: tool.to_string(),
                    step_index,
                    context,
                };
                match self.store.save(&record).await {
                    Ok(()) => {
                        info!("Plan '{}' paused, run {} waits at step {}", tool, run_id, step_index);
                        PlanState::Paused {
                            run_id,
                            step_index,
                            context: record.context,
                            preview,
                            reason,
                        }
                    }
                    Err(err) => PlanState::Failed(err.into()),
                }
            }
            PlanState::Completed(result) => {
                info!("Plan '{}' completed", tool);
                PlanState::Completed(result)
            }
            PlanState::Failed(err) => {
                match &err {
                    EngineError::Step { step, message } => {
                        warn!("Plan '{}' failed at step {}: {}", tool, step, message)
                    }
                    other => warn!("Plan '{}' failed: {}", tool, other),
                }
                PlanState::Failed(err)
            }
            PlanState::Running(_) => unreachable!("drive only settles terminal states"),
        };

        // The run id that was resumed is spent whatever happened next.
        if let Some(previous) = resumed_from {
            if let Err(err) = self.store.discard(previous).await {
                warn!("Could not discard run {}: {}", previous, err);
            }
        }

        outcome
    }
}

// Releases a claimed run unless the resume that claimed it settled.
struct LeaseGuard {
    store: Arc<dyn RunStore>,
    run_id: Option<String>,
}

impl LeaseGuard {
    fn disarm(mut self) {
        self.run_id = None;
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let Some(run_id) = self.run_id.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Resume of run {} dropped outside a runtime; lease kept until expiry", run_id);
            return;
        };

        warn!("Resume of run {} was cancelled, releasing its lease", run_id);
        let store = Arc::clone(&self.store);
        handle.spawn(async move {
            if let Err(err) = store.release(&run_id).await {
                warn!("Could not release run {}: {}", run_id, err);
            }
        });
    }
}

// 3. One Step
async fn advance(
    step: &PlanStep,
    index: usize,
    context: &mut ExecutionContext,
    progress: &mut Progress,
) -> PlanState {
    let name = step.display_name(index);

    if step.label.as_deref().is_some_and(|label| label.starts_with('$')) {
        return PlanState::Failed(EngineError::Step {
            step: name,
            message: "labels starting with '$' are reserved".to_string(),
        });
    }

    if let Some(run) = &step.run {
        match run(context.clone()).await {
            Ok(result) => context.record(step.label.as_deref(), result),
            Err(err) => return step_failed(name, err),
        }
    }

    let output = match &step.output {
        Some(output) => match output(context.clone()).await {
            Ok(value) => Some(value),
            Err(err) => return step_failed(name, err),
        },
        None => None,
    };

    if step.pause {
        return PlanState::Paused {
            run_id: ulid::Ulid::new().to_string(),
            step_index: index + 1,
            context: context.clone(),
            preview: output.unwrap_or(Value::Null),
            reason: step.reason.clone(),
        };
    }

    if let Some(value) = output {
        progress.projection = Some((index, value));
    }
    debug!("Step {} done", name);
    PlanState::Running(index + 1)
}

fn step_failed(step: String, err: anyhow::Error) -> PlanState {
    PlanState::Failed(EngineError::Step {
        step,
        message: format!("{:#}", err),
    })
}

/// Terminal `output`, else the latest `run` result, else the resume input, else null.
fn final_result(context: &ExecutionContext, progress: &Progress, len: usize) -> Value {
    if let Some((index, value)) = &progress.projection {
        if index + 1 == len {
            return value.clone();
        }
    }
    if let Some(last) = context.last_result() {
        return last.clone();
    }
    if context.has_input() {
        return context.input().clone();
    }
    Value::Null
}
