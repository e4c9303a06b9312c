//! The tool invocation engine: a registry of schema-checked tools, a plan
//! executor that can park a run until outside input arrives, the router that
//! ties them together, and a generic client for calling tools over HTTP.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod runtime;
pub mod schema;
pub mod store;
pub mod tool;

pub use client::{CallMethod, Reply, ToolClient};
pub use dispatch::{Dispatcher, RESUME_MARKER};
pub use envelope::{CallEnvelope, PAUSED_MARKER};
pub use error::{EngineError, StoreError, TransportError};
pub use registry::{DuplicatePolicy, RegistrationReport, ToolRegistry};
pub use runtime::{PlanExecutor, PlanState};
pub use store::{MemoryRunStore, PlanRunState, RunStore, SqliteRunStore};
pub use tool::{CallContext, ExecutionContext, PlanStep, ToolDefinition, ToolSummary, UiHint};
