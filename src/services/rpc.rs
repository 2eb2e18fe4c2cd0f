// JSON-RPC 1.1 over HTTP, the transport every KBase service speaks.
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::defs::PipelineError;

#[derive(Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl JsonRpcClient {
    pub fn new(http: reqwest::Client, url: &str, token: Option<String>) -> Self {
        JsonRpcClient {
            http,
            url: url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Calls `method` (`Module.function`) with a single parameter record and
    /// returns the first element of the result list.
    ///
    /// # Arguments
    ///
    /// * `method` - fully qualified method name
    /// * `params` - the single positional parameter
    ///
    /// # Returns
    /// The deserialised first result, or `PipelineError::Service`.
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, PipelineError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let service_err = |error: String| PipelineError::Service {
            service: method.to_string(),
            error,
        };

        let params = serde_json::to_value(params)
            .map_err(|e| service_err(format!("unserialisable parameters: {}", e)))?;
        let body = json!({
            "version": "1.1",
            "method": method,
            "params": [params],
            "id": uuid::Uuid::new_v4().simple().to_string(),
        });
        debug!("RPC {} -> {}", method, self.url);

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.header(reqwest::header::AUTHORIZATION, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| service_err(format!("Failed to connect to {}: {}", self.url, e)))?;
        let status = response.status();
        let reply: Value = response
            .json()
            .await
            .map_err(|e| service_err(format!("HTTP {}: unreadable reply: {}", status, e)))?;

        unpack_reply(reply).map_err(service_err)
    }
}

/// Pulls `result[0]` out of a JSON-RPC reply, or the server's error message.
pub(crate) fn unpack_reply<R: DeserializeOwned>(mut reply: Value) -> Result<R, String> {
    if let Some(error) = reply.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        let detail = error.get("error").and_then(Value::as_str).unwrap_or("");
        return Err(if detail.is_empty() {
            message.to_string()
        } else {
            format!("{}\n{}", message, detail)
        });
    }

    let first = reply
        .get_mut("result")
        .and_then(Value::as_array_mut)
        .and_then(|results| {
            if results.is_empty() {
                None
            } else {
                Some(results.swap_remove(0))
            }
        })
        .ok_or_else(|| "reply carries no result".to_string())?;

    serde_json::from_value(first).map_err(|e| format!("unexpected result shape: {}", e))
}
