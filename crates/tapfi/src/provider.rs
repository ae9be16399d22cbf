use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use num_bigint::BigUint;

use crate::error::Error;
use crate::token::{TokenKey, TokenMetadata};

/// Upstream token metadata and balance source (Alchemy, or an in-memory stub).
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Metadata for an ERC-20 contract. `Ok(None)` when the provider knows nothing about it.
    async fn token_metadata(
        &self,
        chain_id: u64,
        address: &str,
    ) -> Result<Option<TokenMetadata>, Error>;

    /// Native asset balance of `owner`, in base units.
    async fn native_balance(&self, chain_id: u64, owner: &str) -> Result<BigUint, Error>;

    /// ERC-20 balance of `owner`, in base units.
    async fn token_balance(
        &self,
        chain_id: u64,
        token: &str,
        owner: &str,
    ) -> Result<BigUint, Error>;
}

/// In-memory provider for tests and offline demos. Counts every call.
#[derive(Default)]
pub struct StaticProvider {
    metadata: Mutex<HashMap<TokenKey, TokenMetadata>>,
    balances: Mutex<HashMap<String, BigUint>>,
    failing: AtomicBool,
    metadata_calls: AtomicUsize,
    balance_calls: AtomicUsize,
    last_balance_request: Mutex<Option<(u64, String, String)>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_metadata(&self, chain_id: u64, address: &str, meta: TokenMetadata) {
        lock(&self.metadata).insert(TokenKey::contract(chain_id, address), meta);
    }

    /// Set a balance; `token` is `None` for the native asset.
    pub fn set_balance(&self, chain_id: u64, token: Option<&str>, owner: &str, amount: BigUint) {
        lock(&self.balances).insert(balance_key(chain_id, token, owner), amount);
    }

    /// Make every subsequent call fail with `UpstreamUnavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    /// `(chain_id, token or native symbol marker, owner)` of the latest balance call.
    pub fn last_balance_request(&self) -> Option<(u64, String, String)> {
        lock(&self.last_balance_request).clone()
    }

    fn check(&self) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::UpstreamUnavailable("static provider offline".to_string()));
        }
        Ok(())
    }

    fn balance(&self, chain_id: u64, token: Option<&str>, owner: &str) -> Result<BigUint, Error> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_balance_request) = Some((
            chain_id,
            token.unwrap_or("native").to_lowercase(),
            owner.to_lowercase(),
        ));
        self.check()?;
        Ok(lock(&self.balances)
            .get(&balance_key(chain_id, token, owner))
            .cloned()
            .unwrap_or_default())
    }
}

fn balance_key(chain_id: u64, token: Option<&str>, owner: &str) -> String {
    format!(
        "{chain_id}:{}:{}",
        token.unwrap_or("native").to_lowercase(),
        owner.to_lowercase()
    )
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl TokenProvider for StaticProvider {
    async fn token_metadata(
        &self,
        chain_id: u64,
        address: &str,
    ) -> Result<Option<TokenMetadata>, Error> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(lock(&self.metadata)
            .get(&TokenKey::contract(chain_id, address))
            .cloned())
    }

    async fn native_balance(&self, chain_id: u64, owner: &str) -> Result<BigUint, Error> {
        self.balance(chain_id, None, owner)
    }

    async fn token_balance(
        &self,
        chain_id: u64,
        token: &str,
        owner: &str,
    ) -> Result<BigUint, Error> {
        self.balance(chain_id, Some(token), owner)
    }
}
