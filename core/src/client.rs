use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::dispatch::RESUME_MARKER;
use crate::envelope::CallEnvelope;
use crate::error::TransportError;
use crate::tool::ToolSummary;

/// How a call goes over the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallMethod {
    /// Arguments travel as the JSON body.
    #[default]
    Post,
    /// Arguments are flattened into the query string.
    Get,
}

/// A decoded successful answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Data(Value),
    Paused {
        run_id: String,
        preview: Value,
        reason: Option<String>,
    },
}

impl Reply {
    pub fn data(self) -> Option<Value> {
        match self {
            Reply::Data(data) => Some(data),
            Reply::Paused { .. } => None,
        }
    }
}

/// Calls any registered tool by name. No per-tool code lives here.
#[derive(Clone)]
pub struct ToolClient {
    http: Client,
    endpoint: String,
}

impl ToolClient {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        let endpoint = config.endpoint.trim_end_matches('/').to_string();

        info!("Tool client targeting {}", endpoint);
        Ok(Self { http, endpoint })
    }

    pub fn from_env() -> Result<Self, TransportError> {
        Self::new(ClientConfig::from_env())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn call(&self, name: &str, args: Value) -> Result<Reply, TransportError> {
        self.call_with(CallMethod::Post, name, args).await
    }

    pub async fn call_with(&self, method: CallMethod, name: &str, args: Value) -> Result<Reply, TransportError> {
        let url = format!("{}/tools/{}", self.endpoint, name);
        debug!("Calling '{}' ({:?})", name, method);

        let request = match method {
            CallMethod::Post => self.http.request(Method::POST, &url).json(&args),
            CallMethod::Get => self.http.request(Method::GET, &url).query(&query_pairs(&args)?),
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Failure envelopes come with 4xx/5xx statuses, so decode before looking at the status.
        let envelope: CallEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
            Err(err) => return Err(TransportError::Decode(err.to_string())),
        };

        match envelope {
            CallEnvelope::Success { data, .. } => Ok(Reply::Data(data)),
            CallEnvelope::Paused { run_id, preview, reason } => Ok(Reply::Paused {
                run_id,
                preview,
                reason,
            }),
            CallEnvelope::Failure { error, code } => Err(TransportError::Remote { code, message: error }),
        }
    }

    /// Continues a paused plan. `input` must be an object (or null).
    pub async fn resume(&self, name: &str, run_id: &str, input: Value) -> Result<Reply, TransportError> {
        let mut payload = match input {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(TransportError::InvalidArguments(format!(
                    "resume input must be an object, got {}",
                    other
                )))
            }
        };
        payload.insert(RESUME_MARKER.to_string(), Value::String(run_id.to_string()));
        self.call(name, Value::Object(payload)).await
    }

    /// Typed convenience over [`ToolClient::call`] for single-shot tools.
    pub async fn call_typed<A, R>(&self, name: &str, args: &A) -> Result<R, TransportError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let args = serde_json::to_value(args).map_err(|e| TransportError::InvalidArguments(e.to_string()))?;
        match self.call(name, args).await? {
            Reply::Data(data) => serde_json::from_value(data).map_err(|e| TransportError::Decode(e.to_string())),
            Reply::Paused { run_id, .. } => Err(TransportError::Decode(format!(
                "'{}' paused as run {}; use call() for plans",
                name, run_id
            ))),
        }
    }

    /// Fetches the tool directory, optionally narrowed to one tag.
    pub async fn list_tools(&self, tag: Option<&str>) -> Result<Vec<ToolSummary>, TransportError> {
        let mut request = self.http.get(format!("{}/tools", self.endpoint));
        if let Some(tag) = tag {
            request = request.query(&[("tag", tag)]);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: response.text().await?,
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }

    pub async fn health(&self) -> Result<String, TransportError> {
        let response = self.http.get(format!("{}/health", self.endpoint)).send().await?;
        Ok(response.error_for_status()?.text().await?)
    }
}

/// Flattens an argument object for a query string.
///
/// Strings go through as-is; every other value is sent as its JSON text.
fn query_pairs(args: &Value) -> Result<Vec<(String, String)>, TransportError> {
    match args {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect()),
        other => Err(TransportError::InvalidArguments(format!(
            "GET calls need object arguments, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_flattening() {
        let pairs = query_pairs(&json!({
            "q": "open",
            "limit": 5,
            "done": false,
            "filter": { "tag": "ui" }
        }))
        .unwrap();

        assert!(pairs.contains(&("q".to_string(), "open".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "5".to_string())));
        assert!(pairs.contains(&("done".to_string(), "false".to_string())));
        assert!(pairs.contains(&("filter".to_string(), r#"{"tag":"ui"}"#.to_string())));
    }

    #[test]
    fn query_flattening_rejects_scalars() {
        assert!(query_pairs(&Value::Null).unwrap().is_empty());
        assert!(matches!(
            query_pairs(&json!([1, 2])),
            Err(TransportError::InvalidArguments(_))
        ));
    }

    #[test]
    fn endpoint_is_normalized() {
        let client = ToolClient::new(ClientConfig::new("http://localhost:3000/")).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:3000");
    }
}
