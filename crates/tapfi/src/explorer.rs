//! Transaction history from an Etherscan-compatible explorer API.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::payment::PaymentStatus;
use crate::units::format_units;

const NO_TRANSACTIONS: &str = "No transactions found";
const NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: String,
    pub from: String,
    /// Empty for contract creations.
    pub to: String,
    /// Native amount, formatted in whole units.
    pub value: String,
    pub timestamp_ms: u64,
    pub status: PaymentStatus,
    pub block_number: u64,
    pub gas_used: String,
    pub gas_price: String,
    pub direction: Direction,
}

#[derive(Debug, Deserialize)]
struct TxListResponse {
    status: String,
    message: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTx {
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    time_stamp: String,
    block_number: String,
    #[serde(default)]
    gas_used: String,
    #[serde(default)]
    gas_price: String,
    #[serde(rename = "txreceipt_status", default)]
    receipt_status: String,
}

pub struct ExplorerClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl ExplorerClient {
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Normal transactions of `wallet`, newest first.
    pub async fn transaction_history(&self, wallet: &str) -> Result<Vec<TransactionRecord>, Error> {
        let url = txlist_url(&self.api_url, wallet, &self.api_key)?;
        debug!(wallet, "fetching transaction history");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("txlist: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "txlist: HTTP {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("txlist: {e}")))?;
        parse_txlist(body, wallet)
    }
}

fn txlist_url(api_url: &str, wallet: &str, api_key: &str) -> Result<Url, Error> {
    let mut url = Url::parse(api_url)
        .map_err(|e| Error::Config(format!("explorer url {api_url}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("module", "account")
        .append_pair("action", "txlist")
        .append_pair("address", wallet)
        .append_pair("startblock", "0")
        .append_pair("endblock", "99999999")
        .append_pair("sort", "desc")
        .append_pair("apikey", api_key);
    Ok(url)
}

/// Parse a `txlist` response body. Entries that do not parse are skipped.
pub fn parse_txlist(body: Value, wallet: &str) -> Result<Vec<TransactionRecord>, Error> {
    let response: TxListResponse = serde_json::from_value(body)
        .map_err(|e| Error::UpstreamUnavailable(format!("txlist: {e}")))?;

    if response.status != "1" {
        if response.message == NO_TRANSACTIONS {
            return Ok(Vec::new());
        }
        let detail = response.result.as_str().unwrap_or_default();
        return Err(Error::UpstreamUnavailable(format!(
            "txlist: {} {detail}",
            response.message
        )));
    }

    let Value::Array(entries) = response.result else {
        return Err(Error::UpstreamUnavailable(
            "txlist: result is not a list".to_string(),
        ));
    };

    let records = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawTx>(entry) {
            Ok(raw) => to_record(raw, wallet),
            Err(err) => {
                warn!(error = %err, "skipping malformed txlist entry");
                None
            }
        })
        .collect();
    Ok(records)
}

fn to_record(raw: RawTx, wallet: &str) -> Option<TransactionRecord> {
    let value = BigUint::parse_bytes(raw.value.as_bytes(), 10)?;
    let timestamp_secs: u64 = raw.time_stamp.parse().ok()?;
    let block_number: u64 = raw.block_number.parse().ok()?;

    let status = if raw.receipt_status == "1" {
        PaymentStatus::Confirmed
    } else {
        PaymentStatus::Failed
    };
    let direction = if raw.to.eq_ignore_ascii_case(wallet) {
        Direction::Received
    } else {
        Direction::Sent
    };

    Some(TransactionRecord {
        hash: raw.hash,
        from: raw.from,
        to: raw.to,
        value: format_units(&value, NATIVE_DECIMALS),
        timestamp_ms: timestamp_secs.saturating_mul(1000),
        status,
        block_number,
        gas_used: raw.gas_used,
        gas_price: raw.gas_price,
        direction,
    })
}
