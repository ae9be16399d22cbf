//! Supported networks, keyed by chain id.
//!
//! Everything the rest of the crate needs to know about a chain lives in one
//! [`ChainConfig`]: its native currency, where token icons are hosted, which
//! Alchemy network serves it, which explorer indexes it and which tokens are
//! offered for payment. [`ChainRegistry::new`] validates the whole set once,
//! at startup.

use std::collections::{HashMap, HashSet};

use crate::address::is_valid_address;
use crate::error::Error;

const ICON_BASE: &str = "https://raw.githubusercontent.com/trustwallet/assets/master/blockchains";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// A token offered for payment on a chain, before metadata is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopularToken {
    pub address: String,
    pub symbol: String,
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub native: NativeCurrency,
    /// Folder name under the Trust Wallet assets repository.
    pub asset_folder: String,
    /// Alchemy subdomain, e.g. `eth-mainnet`.
    pub alchemy_network: Option<String>,
    /// Etherscan-compatible API endpoint.
    pub explorer_api: Option<String>,
    /// Block explorer web root, used for transaction links.
    pub explorer_url: Option<String>,
    pub popular_tokens: Vec<PopularToken>,
}

impl ChainConfig {
    pub fn native_icon(&self) -> String {
        format!("{ICON_BASE}/{}/info/logo.png", self.asset_folder)
    }

    pub fn token_icon(&self, address: &str) -> String {
        format!("{ICON_BASE}/{}/assets/{address}/logo.png", self.asset_folder)
    }

    pub fn is_native_symbol(&self, symbol: &str) -> bool {
        self.native.symbol == symbol
    }

    fn validate(&self) -> Result<(), Error> {
        let id = self.chain_id;
        if self.name.trim().is_empty() {
            return Err(Error::Config(format!("chain {id}: empty name")));
        }
        if self.asset_folder.trim().is_empty() {
            return Err(Error::Config(format!("chain {id}: empty asset folder")));
        }
        if self.native.symbol.trim().is_empty() || self.native.decimals == 0 {
            return Err(Error::Config(format!(
                "chain {id}: native currency needs a symbol and non-zero decimals"
            )));
        }

        let mut seen = HashSet::new();
        for token in &self.popular_tokens {
            if !is_valid_address(&token.address) {
                return Err(Error::Config(format!(
                    "chain {id}: token {} has invalid address {}",
                    token.symbol, token.address
                )));
            }
            if !seen.insert(token.address.to_lowercase()) {
                return Err(Error::Config(format!(
                    "chain {id}: duplicate token address {}",
                    token.address
                )));
            }
        }
        Ok(())
    }
}

/// Validated set of supported chains.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: HashMap<u64, ChainConfig>,
}

impl ChainRegistry {
    pub fn new(chains: Vec<ChainConfig>) -> Result<Self, Error> {
        let mut map = HashMap::with_capacity(chains.len());
        for chain in chains {
            chain.validate()?;
            let id = chain.chain_id;
            if map.insert(id, chain).is_some() {
                return Err(Error::Config(format!("chain {id} configured twice")));
            }
        }
        if map.is_empty() {
            return Err(Error::Config("no chains configured".to_string()));
        }
        Ok(Self { chains: map })
    }

    /// The networks the payment UI ships with.
    pub fn builtin() -> Result<Self, Error> {
        Self::new(builtin_chains())
    }

    pub fn get(&self, chain_id: u64) -> Result<&ChainConfig, Error> {
        self.chains
            .get(&chain_id)
            .ok_or(Error::UnsupportedChain(chain_id))
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.chains.contains_key(&chain_id)
    }

    /// Chain ids in ascending order.
    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Explorer link for a transaction, when the chain has an explorer.
    pub fn tx_url(&self, chain_id: u64, tx_hash: &str) -> Option<String> {
        let base = self.chains.get(&chain_id)?.explorer_url.as_ref()?;
        Some(format!("{}/tx/{tx_hash}", base.trim_end_matches('/')))
    }
}

fn native(name: &str, symbol: &str) -> NativeCurrency {
    NativeCurrency {
        name: name.to_string(),
        symbol: symbol.to_string(),
        decimals: 18,
    }
}

fn tokens(list: &[(&str, &str)]) -> Vec<PopularToken> {
    list.iter()
        .map(|(address, symbol)| PopularToken {
            address: address.to_string(),
            symbol: symbol.to_string(),
        })
        .collect()
}

fn chain(
    chain_id: u64,
    name: &str,
    native: NativeCurrency,
    asset_folder: &str,
    alchemy_network: Option<&str>,
    explorer: Option<(&str, &str)>,
    popular_tokens: Vec<PopularToken>,
) -> ChainConfig {
    ChainConfig {
        chain_id,
        name: name.to_string(),
        native,
        asset_folder: asset_folder.to_string(),
        alchemy_network: alchemy_network.map(str::to_string),
        explorer_api: explorer.map(|(api, _)| api.to_string()),
        explorer_url: explorer.map(|(_, web)| web.to_string()),
        popular_tokens,
    }
}

fn builtin_chains() -> Vec<ChainConfig> {
    vec![
        chain(
            1,
            "Ethereum",
            native("Ether", "ETH"),
            "ethereum",
            Some("eth-mainnet"),
            Some(("https://api.etherscan.io/api", "https://etherscan.io")),
            tokens(&[
                ("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "USDC"),
                ("0xdAC17F958D2ee523a2206206994597C13D831ec7", "USDT"),
            ]),
        ),
        chain(
            10,
            "Optimism",
            native("Ether", "ETH"),
            "optimism",
            Some("opt-mainnet"),
            Some((
                "https://api-optimistic.etherscan.io/api",
                "https://optimistic.etherscan.io",
            )),
            tokens(&[("0x7F5c764cBc14f9669B88837ca1490cCa17c31607", "USDC")]),
        ),
        chain(
            56,
            "BNB Chain",
            native("BNB", "BNB"),
            "smartchain",
            None,
            Some(("https://api.bscscan.com/api", "https://bscscan.com")),
            Vec::new(),
        ),
        chain(
            100,
            "Gnosis",
            native("xDAI", "XDAI"),
            "xdai",
            None,
            None,
            Vec::new(),
        ),
        chain(
            137,
            "Polygon",
            native("POL", "POL"),
            "polygon",
            Some("polygon-mainnet"),
            Some(("https://api.polygonscan.com/api", "https://polygonscan.com")),
            tokens(&[
                ("0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174", "USDC"),
                ("0xc2132D05D31c914a87C6611C10748AEb04B58e8F", "USDT"),
            ]),
        ),
        chain(
            250,
            "Fantom",
            native("Fantom", "FTM"),
            "fantom",
            None,
            None,
            Vec::new(),
        ),
        chain(
            8453,
            "Base",
            native("Ether", "ETH"),
            "base",
            Some("base-mainnet"),
            Some(("https://api.basescan.org/api", "https://basescan.org")),
            tokens(&[("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", "USDC")]),
        ),
        chain(
            42161,
            "Arbitrum One",
            native("Ether", "ETH"),
            "arbitrum",
            Some("arb-mainnet"),
            Some(("https://api.arbiscan.io/api", "https://arbiscan.io")),
            tokens(&[
                ("0xFF970A61A04b1cA14834A43f5dE4533eBDDB5CC8", "USDC"),
                ("0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9", "USDT"),
            ]),
        ),
        chain(
            42220,
            "Celo",
            native("CELO", "CELO"),
            "celo",
            None,
            None,
            Vec::new(),
        ),
        chain(
            43114,
            "Avalanche",
            native("Avalanche", "AVAX"),
            "avalanchec",
            None,
            None,
            Vec::new(),
        ),
        chain(
            11155111,
            "Sepolia",
            native("Sepolia Ether", "ETH"),
            "ethereum",
            Some("eth-sepolia"),
            Some((
                "https://api-sepolia.etherscan.io/api",
                "https://sepolia.etherscan.io",
            )),
            tokens(&[("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238", "USDC")]),
        ),
    ]
}
