//! Token directory: the list of spendable tokens per chain, with balances.
//!
//! Token lists and balance readings are cached for [`CACHE_DURATION`]. The
//! directory is shared (`Arc<TokenDirectory>`) by every component of a client
//! session and is the only writer of its cache entries. Concurrent misses on
//! the same chain share one upstream token-list fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::address::parse_address;
use crate::cache::{Cached, TtlCache, CACHE_DURATION};
use crate::chains::{ChainConfig, ChainRegistry, PopularToken};
use crate::error::Error;
use crate::provider::TokenProvider;
use crate::token::{TokenCategory, TokenMetadata, TokenRecord};

const STABLECOINS: &[&str] = &["USDC", "USDT", "DAI"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BalanceKey {
    chain_id: u64,
    symbol: String,
    owner: String,
}

impl BalanceKey {
    fn new(chain_id: u64, symbol: &str, owner: &str) -> Self {
        Self {
            chain_id,
            symbol: symbol.to_string(),
            owner: owner.to_lowercase(),
        }
    }
}

pub struct TokenDirectory {
    chains: Arc<ChainRegistry>,
    provider: Arc<dyn TokenProvider>,
    lists: RwLock<TtlCache<u64, Vec<TokenRecord>>>,
    balances: RwLock<TtlCache<BalanceKey, TokenRecord>>,
    list_fetches: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl TokenDirectory {
    pub fn new(chains: Arc<ChainRegistry>, provider: Arc<dyn TokenProvider>) -> Self {
        Self::with_ttl(chains, provider, CACHE_DURATION)
    }

    pub fn with_ttl(
        chains: Arc<ChainRegistry>,
        provider: Arc<dyn TokenProvider>,
        ttl: Duration,
    ) -> Self {
        Self {
            chains,
            provider,
            lists: RwLock::new(TtlCache::new(ttl)),
            balances: RwLock::new(TtlCache::new(ttl)),
            list_fetches: Mutex::new(HashMap::new()),
        }
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    /// Spendable tokens on `chain_id`: the native asset first, then by rank.
    ///
    /// When the provider fails, a previously cached list (even an expired
    /// one) is returned instead of the error.
    pub async fn list_tokens(&self, chain_id: u64) -> Result<Vec<TokenRecord>, Error> {
        let chain = self.chains.get(chain_id)?;

        if let Some(list) = self.lists.read().await.get_fresh(&chain_id) {
            debug!(chain_id, "token list cache hit");
            return Ok(list);
        }

        let fetch_lock = self
            .list_fetches
            .lock()
            .await
            .entry(chain_id)
            .or_default()
            .clone();
        let _fetching = fetch_lock.lock().await;

        // Another caller may have filled the cache while we waited.
        if let Some(list) = self.lists.read().await.get_fresh(&chain_id) {
            debug!(chain_id, "token list filled by concurrent fetch");
            return Ok(list);
        }

        match self.fetch_tokens(chain).await {
            Ok(list) => {
                debug!(chain_id, count = list.len(), "token list refreshed");
                self.lists.write().await.insert(chain_id, list.clone());
                Ok(list)
            }
            Err(err) => {
                if let Some(list) = self.lists.read().await.last_known(&chain_id) {
                    warn!(chain_id, error = %err, "token list refresh failed, serving cached list");
                    return Ok(list);
                }
                warn!(chain_id, error = %err, "token list refresh failed");
                Err(err)
            }
        }
    }

    pub fn search_tokens(
        &self,
        _chain_id: u64,
        query: &str,
        tokens: &[TokenRecord],
    ) -> Vec<TokenRecord> {
        search_tokens(query, tokens)
    }

    /// Balance of `symbol` held by `owner`, served from cache while fresh.
    ///
    /// Never fails: on upstream error the last known reading is returned
    /// marked stale, or `None` if there is none.
    pub async fn refresh_balance(
        &self,
        chain_id: u64,
        symbol: &str,
        owner: &str,
    ) -> Option<TokenRecord> {
        let key = BalanceKey::new(chain_id, symbol, owner);
        if let Some(record) = self.balances.read().await.get_fresh(&key) {
            debug!(chain_id, symbol, "balance cache hit");
            return Some(record);
        }

        match self.fetch_balance(chain_id, symbol, owner).await {
            Ok(record) => {
                self.balances.write().await.insert(key, record.clone());
                Some(record)
            }
            Err(err) => {
                warn!(chain_id, symbol, error = %err, "balance refresh failed");
                self.balances
                    .read()
                    .await
                    .last_known(&key)
                    .map(|record| record.marked_stale())
            }
        }
    }

    /// Cached balance without touching the network; expired readings come back stale.
    pub async fn cached_balance(
        &self,
        chain_id: u64,
        symbol: &str,
        owner: &str,
    ) -> Option<TokenRecord> {
        match self
            .balances
            .read()
            .await
            .get(&BalanceKey::new(chain_id, symbol, owner))
        {
            Cached::Fresh(record) => Some(record),
            Cached::Expired(record) => Some(record.marked_stale()),
            Cached::Missing => None,
        }
    }

    pub async fn clear_cache(&self) {
        self.lists.write().await.clear();
        self.balances.write().await.clear();
    }

    async fn fetch_tokens(&self, chain: &ChainConfig) -> Result<Vec<TokenRecord>, Error> {
        let lookups = chain.popular_tokens.iter().map(|token| async move {
            let meta = self
                .provider
                .token_metadata(chain.chain_id, &token.address)
                .await;
            (token, meta)
        });

        let mut records = vec![native_record(chain)];
        for (token, meta) in join_all(lookups).await {
            match meta.map_err(upstream)? {
                Some(meta) => records.push(contract_record(chain, token, meta)),
                None => debug!(
                    chain_id = chain.chain_id,
                    address = %token.address,
                    "no metadata for token, skipping"
                ),
            }
        }

        records.sort_by_key(|record| (!record.is_native(), record.rank));
        Ok(records)
    }

    async fn fetch_balance(
        &self,
        chain_id: u64,
        symbol: &str,
        owner: &str,
    ) -> Result<TokenRecord, Error> {
        parse_address(owner)?;
        let chain = self.chains.get(chain_id)?;

        if chain.is_native_symbol(symbol) {
            let raw = self
                .provider
                .native_balance(chain_id, owner)
                .await
                .map_err(upstream)?;
            return Ok(native_record(chain).with_balance(raw));
        }

        let tokens = self.list_tokens(chain_id).await?;
        let token = tokens
            .into_iter()
            .find(|t| t.symbol == symbol && t.contract_address.is_some())
            .ok_or_else(|| Error::TokenNotFound {
                chain_id,
                symbol: symbol.to_string(),
            })?;
        let address = token.contract_address.clone().unwrap_or_default();
        let raw = self
            .provider
            .token_balance(chain_id, &address, owner)
            .await
            .map_err(upstream)?;
        Ok(token.with_balance(raw))
    }
}

/// Case-insensitive substring match on symbol, display name or contract address.
/// A blank query returns the input unchanged.
pub fn search_tokens(query: &str, tokens: &[TokenRecord]) -> Vec<TokenRecord> {
    let query = query.trim();
    if query.is_empty() {
        return tokens.to_vec();
    }

    let needle = query.to_lowercase();
    tokens
        .iter()
        .filter(|token| {
            token.symbol.to_lowercase().contains(&needle)
                || token.display_name.to_lowercase().contains(&needle)
                || token
                    .contract_address
                    .as_ref()
                    .is_some_and(|a| a.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

fn upstream(err: Error) -> Error {
    match err {
        Error::UpstreamUnavailable(_) => err,
        other => Error::UpstreamUnavailable(other.to_string()),
    }
}

fn native_record(chain: &ChainConfig) -> TokenRecord {
    TokenRecord {
        symbol: chain.native.symbol.clone(),
        display_name: TokenRecord::label(&chain.native.name, &chain.native.symbol),
        icon_uri: chain.native_icon(),
        contract_address: None,
        decimals: chain.native.decimals,
        balance: None,
        category: TokenCategory::Native,
        rank: 1,
    }
}

fn contract_record(chain: &ChainConfig, token: &PopularToken, meta: TokenMetadata) -> TokenRecord {
    let (category, rank) = if STABLECOINS.contains(&meta.symbol.as_str()) {
        (TokenCategory::Stablecoin, 2)
    } else {
        (TokenCategory::Other, 3)
    };
    TokenRecord {
        display_name: TokenRecord::label(&meta.name, &meta.symbol),
        symbol: meta.symbol,
        icon_uri: meta
            .logo
            .unwrap_or_else(|| chain.token_icon(&token.address)),
        contract_address: Some(token.address.clone()),
        decimals: meta.decimals,
        balance: None,
        category,
        rank,
    }
}
