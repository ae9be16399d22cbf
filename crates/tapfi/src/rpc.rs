use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Error;

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC 2.0 client over HTTP POST.
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "json-rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "{method}: HTTP {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("{method}: {e}")))?;
        extract_result(method, body)
    }
}

/// Pull `result` out of a JSON-RPC response body. A missing result reads as null.
pub(crate) fn extract_result(method: &str, body: Value) -> Result<Value, Error> {
    let response: JsonRpcResponse = serde_json::from_value(body)
        .map_err(|e| Error::UpstreamUnavailable(format!("{method}: {e}")))?;
    if let Some(err) = response.error {
        return Err(Error::UpstreamUnavailable(format!(
            "{method}: rpc error {}: {}",
            err.code, err.message
        )));
    }
    Ok(response.result.unwrap_or(Value::Null))
}
