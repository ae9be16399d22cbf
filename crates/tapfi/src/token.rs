use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::units::{format_fixed, DISPLAY_DECIMALS};

/// Token metadata as reported by the metadata provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenCategory {
    Native,
    Stablecoin,
    Other,
}

/// A balance reading for one owner.
///
/// `stale` is set when the reading is older than the cache window or could
/// not be refreshed; such a balance must not be presented as authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub raw: BigUint,
    pub formatted: String,
    pub stale: bool,
}

impl Balance {
    pub fn fresh(raw: BigUint, decimals: u8) -> Self {
        let formatted = format_fixed(&raw, decimals, DISPLAY_DECIMALS);
        Self {
            raw,
            formatted,
            stale: false,
        }
    }
}

/// A spendable token on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub symbol: String,
    pub display_name: String,
    pub icon_uri: String,
    /// Absent for the native asset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    pub decimals: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Balance>,
    pub category: TokenCategory,
    pub rank: u32,
}

impl TokenRecord {
    pub fn is_native(&self) -> bool {
        self.contract_address.is_none()
    }

    pub fn with_balance(mut self, raw: BigUint) -> Self {
        self.balance = Some(Balance::fresh(raw, self.decimals));
        self
    }

    /// Copy of this record whose balance, if any, is flagged stale.
    pub fn marked_stale(&self) -> Self {
        let mut record = self.clone();
        if let Some(balance) = record.balance.as_mut() {
            balance.stale = true;
        }
        record
    }

    /// Label shown in token pickers, e.g. `USD Coin (USDC)`.
    pub fn label(name: &str, symbol: &str) -> String {
        format!("{name} ({symbol})")
    }
}

/// Token identity: CAIP-19 style, the contract address for ERC-20 tokens and
/// the symbol for the native asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey(pub String);

impl TokenKey {
    pub fn contract(chain_id: u64, address: &str) -> Self {
        let addr = address.to_lowercase();
        Self(format!("eip155:{chain_id}/erc20:{addr}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc() -> TokenRecord {
        TokenRecord {
            symbol: "USDC".to_string(),
            display_name: "USD Coin (USDC)".to_string(),
            icon_uri: String::new(),
            contract_address: Some("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string()),
            decimals: 6,
            balance: None,
            category: TokenCategory::Stablecoin,
            rank: 2,
        }
    }

    #[test]
    fn test_contract_key_is_case_insensitive() {
        let token = usdc();
        assert_eq!(
            TokenKey::contract(1, token.contract_address.as_deref().unwrap()),
            TokenKey::contract(1, "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")
        );
    }

    #[test]
    fn test_with_balance_formats_six_places() {
        let token = usdc().with_balance(BigUint::from(12_345_678u64));
        let balance = token.balance.unwrap();
        assert_eq!(balance.formatted, "12.345678");
        assert!(!balance.stale);
    }

    #[test]
    fn test_marked_stale_keeps_value() {
        let token = usdc().with_balance(BigUint::from(1u8));
        let stale = token.marked_stale();
        let balance = stale.balance.as_ref().unwrap();
        assert!(balance.stale);
        assert_eq!(balance.raw, BigUint::from(1u8));
        assert!(!token.balance.unwrap().stale);
    }
}
