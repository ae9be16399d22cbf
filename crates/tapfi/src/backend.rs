//! HTTP client for the TapFi backend's payment request API.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::requests::{NewPaymentRequest, PaymentRequest, PaymentRequests, PaymentStats};

pub struct PaymentRequestClient {
    client: reqwest::Client,
    base: Url,
}

impl PaymentRequestClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, Error> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("API_BASE_URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("API_BASE_URL {base_url}: not a base url")));
        }
        Ok(Self { client, base })
    }

    fn url(&self, segments: &[&str]) -> Url {
        endpoint(&self.base, segments)
    }
}

/// `base` with `segments` appended as path segments, each percent-encoded.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

#[async_trait]
impl PaymentRequests for PaymentRequestClient {
    async fn create(&self, request: &NewPaymentRequest) -> Result<PaymentRequest, Error> {
        let url = self.url(&["payment-requests"]);
        debug!(wallet = %request.wallet_address, "creating payment request");

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("create request: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "create request: HTTP {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("create request: {e}")))?;
        parse_request(body)
    }

    async fn get(&self, id: &str) -> Result<Option<PaymentRequest>, Error> {
        let url = self.url(&["payment-requests", id]);
        debug!(id, "fetching payment request");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("get request: {e}")))?;
        if !response.status().is_success() {
            debug!(id, status = %response.status(), "payment request not available");
            return Ok(None);
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("get request: {e}")))?;
        parse_request(body).map(Some)
    }

    async fn complete(&self, id: &str, tx_hash: &str) -> Result<bool, Error> {
        let url = self.url(&["payment-requests", id, "complete"]);
        let response = self
            .client
            .post(url)
            .json(&complete_body(tx_hash))
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("complete request: {e}")))?;

        let accepted = response.status().is_success();
        if !accepted {
            warn!(id, status = %response.status(), "backend refused completion");
        }
        Ok(accepted)
    }

    async fn stats(&self, wallet: &str) -> Result<PaymentStats, Error> {
        let url = self.url(&["stats", wallet]);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("stats: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "stats: HTTP {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("stats: {e}")))?;
        parse_stats(body)
    }
}

fn complete_body(tx_hash: &str) -> Value {
    json!({ "txHash": tx_hash })
}

pub fn parse_request(body: Value) -> Result<PaymentRequest, Error> {
    serde_json::from_value(body)
        .map_err(|e| Error::UpstreamUnavailable(format!("malformed payment request: {e}")))
}

pub fn parse_stats(body: Value) -> Result<PaymentStats, Error> {
    serde_json::from_value(body)
        .map_err(|e| Error::UpstreamUnavailable(format!("malformed stats: {e}")))
}
