//! Alchemy-backed [`TokenProvider`].

use std::collections::HashMap;

use async_trait::async_trait;
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chains::ChainRegistry;
use crate::error::Error;
use crate::provider::TokenProvider;
use crate::rpc::JsonRpcClient;
use crate::token::TokenMetadata;
use crate::units::parse_hex_quantity;

pub struct AlchemyProvider {
    clients: HashMap<u64, JsonRpcClient>,
}

impl AlchemyProvider {
    /// One endpoint per registry chain that Alchemy serves.
    pub fn new(client: reqwest::Client, chains: &ChainRegistry, api_key: &str) -> Self {
        let clients = chains
            .chain_ids()
            .into_iter()
            .filter_map(|id| {
                let network = chains.get(id).ok()?.alchemy_network.as_deref()?;
                Some((id, JsonRpcClient::new(client.clone(), endpoint(network, api_key))))
            })
            .collect();
        Self { clients }
    }

    fn rpc(&self, chain_id: u64) -> Result<&JsonRpcClient, Error> {
        self.clients
            .get(&chain_id)
            .ok_or(Error::UnsupportedChain(chain_id))
    }
}

pub fn endpoint(network: &str, api_key: &str) -> String {
    format!("https://{network}.g.alchemy.com/v2/{api_key}")
}

#[async_trait]
impl TokenProvider for AlchemyProvider {
    async fn token_metadata(
        &self,
        chain_id: u64,
        address: &str,
    ) -> Result<Option<TokenMetadata>, Error> {
        let result = self
            .rpc(chain_id)?
            .call("alchemy_getTokenMetadata", json!([address]))
            .await?;
        parse_token_metadata(result)
    }

    async fn native_balance(&self, chain_id: u64, owner: &str) -> Result<BigUint, Error> {
        let result = self
            .rpc(chain_id)?
            .call("eth_getBalance", json!([owner, "latest"]))
            .await?;
        let hex = result
            .as_str()
            .ok_or_else(|| Error::UpstreamUnavailable("eth_getBalance: not a string".to_string()))?;
        parse_hex_quantity(hex)
    }

    async fn token_balance(
        &self,
        chain_id: u64,
        token: &str,
        owner: &str,
    ) -> Result<BigUint, Error> {
        let result = self
            .rpc(chain_id)?
            .call("alchemy_getTokenBalances", json!([owner, [token]]))
            .await?;
        parse_token_balance(result, token)
    }
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    name: Option<String>,
    symbol: Option<String>,
    decimals: Option<u8>,
    logo: Option<String>,
}

/// `None` when Alchemy has no symbol or decimals for the contract.
fn parse_token_metadata(result: Value) -> Result<Option<TokenMetadata>, Error> {
    if result.is_null() {
        return Ok(None);
    }
    let raw: RawMetadata = serde_json::from_value(result)
        .map_err(|e| Error::UpstreamUnavailable(format!("alchemy_getTokenMetadata: {e}")))?;
    let (Some(symbol), Some(decimals)) = (raw.symbol.filter(|s| !s.is_empty()), raw.decimals)
    else {
        return Ok(None);
    };
    Ok(Some(TokenMetadata {
        name: raw.name.unwrap_or_else(|| symbol.clone()),
        symbol,
        decimals,
        logo: raw.logo.filter(|l| !l.is_empty()),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBalances {
    token_balances: Vec<RawTokenBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTokenBalance {
    contract_address: String,
    token_balance: Option<String>,
    error: Option<Value>,
}

fn parse_token_balance(result: Value, token: &str) -> Result<BigUint, Error> {
    let raw: RawBalances = serde_json::from_value(result)
        .map_err(|e| Error::UpstreamUnavailable(format!("alchemy_getTokenBalances: {e}")))?;
    let entry = raw
        .token_balances
        .into_iter()
        .find(|b| b.contract_address.eq_ignore_ascii_case(token))
        .ok_or_else(|| {
            Error::UpstreamUnavailable(format!("alchemy_getTokenBalances: no entry for {token}"))
        })?;
    if let Some(err) = entry.error.filter(|e| !e.is_null()) {
        return Err(Error::UpstreamUnavailable(format!(
            "alchemy_getTokenBalances: {err}"
        )));
    }
    match entry.token_balance {
        Some(hex) => parse_hex_quantity(&hex),
        None => Ok(BigUint::from(0u8)),
    }
}
