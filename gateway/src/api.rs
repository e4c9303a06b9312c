use std::collections::HashMap;

use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use toolwire_core::{CallContext, CallEnvelope};

// Input: the directory listing filter
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub tag: Option<String>,
}

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const SESSION_HEADER: &str = "x-session-id";

/// Builds the per-call context from request headers.
pub fn call_context(headers: &HeaderMap) -> CallContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let mut ctx = CallContext::new();
    if let Some(request_id) = header(REQUEST_ID_HEADER) {
        ctx.request_id = request_id;
    }
    ctx.session = header(SESSION_HEADER);
    ctx
}

/// Rebuilds call arguments from a query string.
///
/// Properties the schema declares as strings are kept verbatim; everything
/// else is read as JSON when it parses, and as a plain string when it doesn't.
pub fn args_from_query(params: HashMap<String, String>, schema: Option<&Value>) -> Value {
    let args: Map<String, Value> = params
        .into_iter()
        .map(|(key, raw)| {
            let declared = schema
                .and_then(|s| s.pointer(&format!("/properties/{}/type", key)))
                .and_then(Value::as_str);
            let value = match declared {
                Some("string") => Value::String(raw),
                _ => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
            };
            (key, value)
        })
        .collect();
    Value::Object(args)
}

/// HTTP status for an envelope. The body is the envelope either way.
pub fn status_for(envelope: &CallEnvelope) -> StatusCode {
    match envelope.code() {
        None => StatusCode::OK,
        Some("validation_error") => StatusCode::BAD_REQUEST,
        Some("not_found") | Some("unknown_run") => StatusCode::NOT_FOUND,
        Some("run_already_active") => StatusCode::CONFLICT,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
