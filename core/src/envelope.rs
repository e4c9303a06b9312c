use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::tool::UiHint;

/// Key that marks a paused envelope on the wire.
pub const PAUSED_MARKER: &str = "__PLAN_PAUSED__";

/// The normalized answer to every call.
///
/// Wire shapes:
/// - `{ "ok": true, "data": .., "ui": .. }`
/// - `{ "ok": false, "error": "..", "code": ".." }`
/// - `{ "__PLAN_PAUSED__": true, "runId": "..", "preview": .., "reason": ".." }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope", into = "WireEnvelope")]
pub enum CallEnvelope {
    Success {
        data: Value,
        ui: Option<UiHint>,
    },
    Failure {
        error: String,
        code: Option<String>,
    },
    Paused {
        run_id: String,
        preview: Value,
        reason: Option<String>,
    },
}

impl CallEnvelope {
    pub fn success(data: Value) -> Self {
        CallEnvelope::Success { data, ui: None }
    }

    pub fn failure(err: &EngineError) -> Self {
        CallEnvelope::Failure {
            error: err.to_string(),
            code: Some(err.code().to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CallEnvelope::Success { .. })
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            CallEnvelope::Failure { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "__PLAN_PAUSED__", default, skip_serializing_if = "Option::is_none")]
    paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ui: Option<UiHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(rename = "runId", default, skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preview: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl From<CallEnvelope> for WireEnvelope {
    fn from(envelope: CallEnvelope) -> Self {
        match envelope {
            CallEnvelope::Success { data, ui } => WireEnvelope {
                ok: Some(true),
                data: Some(data),
                ui,
                ..Default::default()
            },
            CallEnvelope::Failure { error, code } => WireEnvelope {
                ok: Some(false),
                error: Some(error),
                code,
                ..Default::default()
            },
            CallEnvelope::Paused { run_id, preview, reason } => WireEnvelope {
                paused: Some(true),
                run_id: Some(run_id),
                preview: Some(preview),
                reason,
                ..Default::default()
            },
        }
    }
}

impl TryFrom<WireEnvelope> for CallEnvelope {
    type Error = String;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        if wire.paused == Some(true) {
            let run_id = wire
                .run_id
                .ok_or_else(|| "paused envelope without runId".to_string())?;
            return Ok(CallEnvelope::Paused {
                run_id,
                preview: wire.preview.unwrap_or(Value::Null),
                reason: wire.reason,
            });
        }

        match wire.ok {
            Some(true) => Ok(CallEnvelope::Success {
                data: wire.data.unwrap_or(Value::Null),
                ui: wire.ui,
            }),
            Some(false) => Ok(CallEnvelope::Failure {
                error: wire.error.unwrap_or_else(|| "unknown error".to_string()),
                code: wire.code,
            }),
            None => Err(format!("envelope has neither 'ok' nor '{}'", PAUSED_MARKER)),
        }
    }
}
