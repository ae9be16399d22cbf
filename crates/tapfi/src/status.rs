use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;

/// On-chain state of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// No receipt yet.
    Pending,
    Succeeded,
    Reverted,
}

/// Upstream transaction-status source.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn transaction_status(&self, tx_hash: &str) -> Result<TxState, Error>;
}

/// Interpret the `result` of `eth_getTransactionReceipt`.
pub fn parse_receipt(result: &Value) -> Result<TxState, Error> {
    if result.is_null() {
        return Ok(TxState::Pending);
    }
    match result.get("status").and_then(Value::as_str) {
        Some("0x1") => Ok(TxState::Succeeded),
        Some(_) => Ok(TxState::Reverted),
        None => Err(Error::UpstreamUnavailable(
            "receipt without status field".to_string(),
        )),
    }
}

/// Replays a fixed sequence of responses; the last one repeats forever.
pub struct ScriptedStatusSource {
    script: Mutex<VecDeque<Result<TxState, String>>>,
    last: Mutex<Result<TxState, String>>,
    calls: AtomicUsize,
}

impl ScriptedStatusSource {
    /// `Err(reason)` entries simulate upstream failures.
    pub fn new(script: Vec<Result<TxState, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Ok(TxState::Pending)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for ScriptedStatusSource {
    async fn transaction_status(&self, _tx_hash: &str) -> Result<TxState, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap_or_else(|p| p.into_inner());
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(next) = script.pop_front() {
            *last = next;
        }
        last.clone().map_err(Error::UpstreamUnavailable)
    }
}

#[cfg(feature = "http")]
pub use self::rpc_source::JsonRpcStatusSource;

#[cfg(feature = "http")]
mod rpc_source {
    use async_trait::async_trait;
    use serde_json::json;

    use super::{parse_receipt, StatusSource, TxState};
    use crate::error::Error;
    use crate::rpc::JsonRpcClient;

    /// Status source backed by a chain JSON-RPC endpoint.
    pub struct JsonRpcStatusSource {
        rpc: JsonRpcClient,
    }

    impl JsonRpcStatusSource {
        pub fn new(client: reqwest::Client, rpc_url: impl Into<String>) -> Self {
            Self {
                rpc: JsonRpcClient::new(client, rpc_url),
            }
        }
    }

    #[async_trait]
    impl StatusSource for JsonRpcStatusSource {
        async fn transaction_status(&self, tx_hash: &str) -> Result<TxState, Error> {
            let result = self
                .rpc
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            parse_receipt(&result)
        }
    }
}
