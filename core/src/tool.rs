use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::schema::ParameterSchema;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

pub type HandlerFn = Arc<dyn Fn(Value, CallContext) -> BoxFuture<anyhow::Result<Value>> + Send + Sync>;
pub type StepFn = Arc<dyn Fn(ExecutionContext) -> BoxFuture<anyhow::Result<Value>> + Send + Sync>;
pub type PlanFn = Arc<dyn Fn() -> Vec<PlanStep> + Send + Sync>;

/// Context key holding the payload a paused plan was resumed with.
pub const INPUT_KEY: &str = "$input";
/// Context key holding the validated arguments a plan was started with.
pub const ARGS_KEY: &str = "$args";

/// Which host widget should render a tool's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiHint {
    pub component: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub props: Value,
}

impl UiHint {
    pub fn component(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            props: Value::Null,
        }
    }

    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }
}

/// Per-request metadata handed to single-shot handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub request_id: String,
    pub session: Option<String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            request_id: ulid::Ulid::new().to_string(),
            session: None,
        }
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The values a plan run has accumulated so far.
///
/// Every step receives its own copy; the executor folds the step's result back
/// in before the next step runs. It is serialized as-is when a run pauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    values: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last: Option<Value>,
}

impl ExecutionContext {
    pub fn new(args: Value) -> Self {
        let mut values = Map::new();
        values.insert(ARGS_KEY.to_string(), args);
        Self { values, last: None }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The resume payload, or `Value::Null` before the run was ever resumed.
    pub fn input(&self) -> &Value {
        self.values.get(INPUT_KEY).unwrap_or(&Value::Null)
    }

    pub fn args(&self) -> &Value {
        self.values.get(ARGS_KEY).unwrap_or(&Value::Null)
    }

    pub fn has_input(&self) -> bool {
        self.values.contains_key(INPUT_KEY)
    }

    pub fn set_input(&mut self, input: Value) {
        self.values.insert(INPUT_KEY.to_string(), input);
    }

    /// Stores a `run` result under its step label (if any) and remembers it as the latest.
    pub fn record(&mut self, label: Option<&str>, result: Value) {
        if let Some(label) = label {
            self.values.insert(label.to_string(), result.clone());
        }
        self.last = Some(result);
    }

    pub fn last_result(&self) -> Option<&Value> {
        self.last.as_ref()
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// One element of a plan.
#[derive(Clone, Default)]
pub struct PlanStep {
    pub label: Option<String>,
    pub run: Option<StepFn>,
    pub output: Option<StepFn>,
    pub pause: bool,
    pub reason: Option<String>,
}

impl PlanStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn run<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.run = Some(Arc::new(move |ctx: ExecutionContext| -> BoxFuture<anyhow::Result<Value>> {
            Box::pin(f(ctx))
        }));
        self
    }

    pub fn output<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.output = Some(Arc::new(move |ctx: ExecutionContext| -> BoxFuture<anyhow::Result<Value>> {
            Box::pin(f(ctx))
        }));
        self
    }

    pub fn pause(mut self) -> Self {
        self.pause = true;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Name used in logs and step errors.
    pub fn display_name(&self, index: usize) -> String {
        self.label.clone().unwrap_or_else(|| format!("#{}", index))
    }
}

impl fmt::Debug for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanStep")
            .field("label", &self.label)
            .field("run", &self.run.is_some())
            .field("output", &self.output.is_some())
            .field("pause", &self.pause)
            .field("reason", &self.reason)
            .finish()
    }
}

/// A tool is either answered in one call or driven through a plan.
#[derive(Clone)]
pub enum ToolKind {
    Handler(HandlerFn),
    Plan(PlanFn),
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Handler(_) => "handler",
            ToolKind::Plan(_) => "plan",
        }
    }
}

/// A registered, callable tool.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub schema: ParameterSchema,
    pub kind: ToolKind,
    pub tags: BTreeSet<String>,
    pub ui: Option<UiHint>,
}

impl ToolDefinition {
    /// Starts a single-shot tool.
    pub fn handler<F, Fut>(name: impl Into<String>, description: impl Into<String>, f: F) -> ToolBuilder
    where
        F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: HandlerFn = Arc::new(move |args: Value, ctx: CallContext| -> BoxFuture<anyhow::Result<Value>> {
            Box::pin(f(args, ctx))
        });
        ToolBuilder::new(name.into(), description.into(), ToolKind::Handler(handler))
    }

    /// Starts a plan-based tool. `f` is called once per run to produce its steps.
    pub fn plan<F>(name: impl Into<String>, description: impl Into<String>, f: F) -> ToolBuilder
    where
        F: Fn() -> Vec<PlanStep> + Send + Sync + 'static,
    {
        ToolBuilder::new(name.into(), description.into(), ToolKind::Plan(Arc::new(f)))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_plan(&self) -> bool {
        matches!(self.kind, ToolKind::Plan(_))
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("kind", &self.kind.as_str())
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// What the directory listing exposes about a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub kind: String,
    pub tags: Vec<String>,
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiHint>,
}

impl From<&ToolDefinition> for ToolSummary {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            kind: tool.kind.as_str().to_string(),
            tags: tool.tags.iter().cloned().collect(),
            parameters: tool.schema.raw().clone(),
            ui: tool.ui.clone(),
        }
    }
}

pub struct ToolBuilder {
    name: String,
    description: String,
    parameters: Option<Value>,
    kind: ToolKind,
    tags: BTreeSet<String>,
    ui: Option<UiHint>,
}

impl ToolBuilder {
    fn new(name: String, description: String, kind: ToolKind) -> Self {
        Self {
            name,
            description,
            parameters: None,
            kind,
            tags: BTreeSet::new(),
            ui: None,
        }
    }

    /// JSON Schema for the arguments. Defaults to "any object".
    pub fn parameters(mut self, schema: Value) -> Self {
        self.parameters = Some(schema);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn ui(mut self, ui: UiHint) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn build(self) -> Result<ToolDefinition, EngineError> {
        let schema = match self.parameters {
            Some(raw) => ParameterSchema::compile(raw).map_err(|message| EngineError::InvalidSchema {
                name: self.name.clone(),
                message,
            })?,
            None => ParameterSchema::any_object(),
        };

        Ok(ToolDefinition {
            name: self.name,
            description: self.description,
            schema,
            kind: self.kind,
            tags: self.tags,
            ui: self.ui,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn context_records_labelled_and_unlabelled_results() {
        let mut ctx = ExecutionContext::new(json!({ "id": 1 }));
        ctx.record(Some("fetch"), json!({ "rows": 3 }));
        ctx.record(None, json!("tail"));

        assert_eq!(ctx.get("fetch"), Some(&json!({ "rows": 3 })));
        assert_eq!(ctx.last_result(), Some(&json!("tail")));
        assert_eq!(ctx.args(), &json!({ "id": 1 }));
        assert!(ctx.input().is_null());
    }

    #[test]
    fn context_survives_a_serde_round_trip() {
        let mut ctx = ExecutionContext::new(json!({}));
        ctx.record(Some("form"), json!({ "fields": [] }));
        ctx.set_input(json!({ "name": "Ada" }));

        let restored: ExecutionContext =
            serde_json::from_value(serde_json::to_value(&ctx).unwrap()).unwrap();
        assert_eq!(restored, ctx);
        assert_eq!(restored.input()["name"], "Ada");
    }

    #[test]
    fn invalid_schema_is_caught_at_build_time() {
        let err = ToolDefinition::handler("broken", "", |args, _| async move { Ok(args) })
            .parameters(json!({ "type": "not-a-type" }))
            .build()
            .unwrap_err();
        assert_eq!(err.code(), "invalid_schema");
    }
}
