//! Payment requests kept by the TapFi backend: created by a payee, looked up
//! by the payer, and marked completed once the transfer confirms.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::Error;
use crate::payment::PaymentIntent;

/// How long a new request stays payable.
pub const REQUEST_LIFETIME: Duration = Duration::hours(24);

const DEFAULT_TOP_TOKEN: &str = "ETH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Active,
    Completed,
    Expired,
}

/// Body of a create call; the backend assigns id, timestamps and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPaymentRequest {
    pub wallet_address: String,
    pub amount: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
}

impl NewPaymentRequest {
    /// Request for `intent` to be paid to its recipient.
    pub fn from_intent(intent: &PaymentIntent, recipient_name: Option<&str>) -> Self {
        Self {
            wallet_address: intent.recipient_address().to_string(),
            amount: intent.amount().to_string(),
            token: intent.token_symbol().to_string(),
            message: intent.message().map(str::to_string),
            recipient_name: recipient_name
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub id: String,
    pub wallet_address: String,
    pub amount: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub status: RequestStatus,
}

impl PaymentRequest {
    /// Past its expiry or already marked expired. Completed requests never expire.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        match self.status {
            RequestStatus::Expired => true,
            RequestStatus::Completed => false,
            RequestStatus::Active => now >= self.expires_at,
        }
    }
}

/// Received-payment summary for a wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStats {
    pub total_received: f64,
    pub total_transactions: u64,
    pub top_token: String,
    /// Month-over-month change, in percent.
    pub monthly_growth: f64,
}

/// Payment request backend (the TapFi API, or an in-memory store).
#[async_trait]
pub trait PaymentRequests: Send + Sync {
    async fn create(&self, request: &NewPaymentRequest) -> Result<PaymentRequest, Error>;

    /// `Ok(None)` when the backend does not know `id`.
    async fn get(&self, id: &str) -> Result<Option<PaymentRequest>, Error>;

    /// Mark `id` paid by `tx_hash`. Returns whether the backend accepted it.
    async fn complete(&self, id: &str, tx_hash: &str) -> Result<bool, Error>;

    async fn stats(&self, wallet: &str) -> Result<PaymentStats, Error>;
}

/// In-memory backend for tests and offline use.
#[derive(Default)]
pub struct MemoryRequestStore {
    requests: Mutex<HashMap<String, PaymentRequest>>,
    completions: Mutex<Vec<(String, String)>>,
    next_id: AtomicU64,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(request id, tx hash)` of every accepted completion, oldest first.
    pub fn completions(&self) -> Vec<(String, String)> {
        lock(&self.completions).clone()
    }
}

#[async_trait]
impl PaymentRequests for MemoryRequestStore {
    async fn create(&self, request: &NewPaymentRequest) -> Result<PaymentRequest, Error> {
        let id = format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let now = OffsetDateTime::now_utc();
        let created = PaymentRequest {
            id: id.clone(),
            wallet_address: request.wallet_address.clone(),
            amount: request.amount.clone(),
            token: request.token.clone(),
            message: request.message.clone(),
            recipient_name: request.recipient_name.clone(),
            created_at: now,
            expires_at: now + REQUEST_LIFETIME,
            status: RequestStatus::Active,
        };
        lock(&self.requests).insert(id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<Option<PaymentRequest>, Error> {
        let now = OffsetDateTime::now_utc();
        Ok(lock(&self.requests).get_mut(id).map(|request| {
            if request.status == RequestStatus::Active && request.is_expired(now) {
                request.status = RequestStatus::Expired;
            }
            request.clone()
        }))
    }

    async fn complete(&self, id: &str, tx_hash: &str) -> Result<bool, Error> {
        let now = OffsetDateTime::now_utc();
        let mut requests = lock(&self.requests);
        let Some(request) = requests.get_mut(id) else {
            return Ok(false);
        };
        if request.status != RequestStatus::Active || request.is_expired(now) {
            return Ok(false);
        }
        request.status = RequestStatus::Completed;
        lock(&self.completions).push((id.to_string(), tx_hash.to_string()));
        Ok(true)
    }

    async fn stats(&self, wallet: &str) -> Result<PaymentStats, Error> {
        let requests = lock(&self.requests);
        let paid: Vec<&PaymentRequest> = requests
            .values()
            .filter(|r| r.status == RequestStatus::Completed)
            .filter(|r| r.wallet_address.eq_ignore_ascii_case(wallet))
            .collect();

        let mut per_token: HashMap<&str, usize> = HashMap::new();
        for request in &paid {
            *per_token.entry(request.token.as_str()).or_default() += 1;
        }
        let top_token = per_token
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(token, _)| token.to_string())
            .unwrap_or_else(|| DEFAULT_TOP_TOKEN.to_string());

        Ok(PaymentStats {
            total_received: paid.iter().filter_map(|r| r.amount.parse::<f64>().ok()).sum(),
            total_transactions: paid.len() as u64,
            top_token,
            monthly_growth: 0.0,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    const PAYEE: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
    const PAYER: &str = "0x742d35Cc6634C0532925a3b8D4C0532925a3b8D4";

    fn new_request(amount: &str, token: &str) -> NewPaymentRequest {
        let intent = PaymentIntent::new(PAYEE, amount, token, Some("rent"), PAYER).unwrap();
        NewPaymentRequest::from_intent(&intent, Some("Zoë"))
    }

    #[test]
    fn test_request_json_shape() {
        let body = json!({
            "id": "abc123",
            "walletAddress": PAYEE,
            "amount": "0.1",
            "token": "ETH",
            "recipientName": "John Doe",
            "createdAt": "2024-05-01T10:00:00.000Z",
            "expiresAt": "2024-05-02T10:00:00Z",
            "status": "active"
        });
        let request: PaymentRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.created_at, datetime!(2024-05-01 10:00 UTC));
        assert_eq!(request.expires_at - request.created_at, REQUEST_LIFETIME);
        assert_eq!(request.message, None);
        assert_eq!(request.status, RequestStatus::Active);

        let out = serde_json::to_value(new_request("1", "USDC")).unwrap();
        assert_eq!(out["walletAddress"], PAYEE);
        assert_eq!(out["recipientName"], "Zoë");
        assert_eq!(out["message"], "rent");
    }

    #[test]
    fn test_is_expired() {
        let mut request: PaymentRequest = serde_json::from_value(json!({
            "id": "a",
            "walletAddress": PAYEE,
            "amount": "1",
            "token": "ETH",
            "createdAt": "2024-05-01T10:00:00Z",
            "expiresAt": "2024-05-02T10:00:00Z",
            "status": "active"
        }))
        .unwrap();
        assert!(!request.is_expired(datetime!(2024-05-02 09:59 UTC)));
        assert!(request.is_expired(datetime!(2024-05-02 10:00 UTC)));

        request.status = RequestStatus::Completed;
        assert!(!request.is_expired(datetime!(2030-01-01 0:00 UTC)));
    }

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemoryRequestStore::new();
        let created = store.create(&new_request("2.5", "USDC")).await.unwrap();
        assert_eq!(created.status, RequestStatus::Active);
        assert_eq!(created.expires_at - created.created_at, REQUEST_LIFETIME);

        let fetched = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(store.get("missing").await.unwrap().is_none());

        assert!(store.complete(&created.id, "0xabc").await.unwrap());
        assert!(!store.complete(&created.id, "0xdef").await.unwrap());
        assert!(!store.complete("missing", "0xabc").await.unwrap());
        assert_eq!(
            store.completions(),
            vec![(created.id.clone(), "0xabc".to_string())]
        );
        assert_eq!(
            store.get(&created.id).await.unwrap().unwrap().status,
            RequestStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_memory_store_stats() {
        let store = MemoryRequestStore::new();
        let empty = store.stats(PAYEE).await.unwrap();
        assert_eq!(empty.total_transactions, 0);
        assert_eq!(empty.top_token, "ETH");

        for (amount, token) in [("1.5", "USDC"), ("2", "USDC"), ("0.1", "ETH")] {
            let request = store.create(&new_request(amount, token)).await.unwrap();
            store.complete(&request.id, "0x1").await.unwrap();
        }
        store.create(&new_request("100", "ETH")).await.unwrap();

        let stats = store.stats(&PAYEE.to_lowercase()).await.unwrap();
        assert_eq!(stats.total_transactions, 3);
        assert!((stats.total_received - 3.6).abs() < 1e-9);
        assert_eq!(stats.top_token, "USDC");
        assert_eq!(store.stats(PAYER).await.unwrap().total_transactions, 0);
    }
}
