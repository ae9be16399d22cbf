use async_trait::async_trait;
use num_bigint::BigUint;

use crate::error::WalletError;

/// A transaction for the wallet to sign and broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: String,
    pub to: String,
    pub value: BigUint,
    pub data: Vec<u8>,
    pub gas_limit: Option<u64>,
}

/// A read-only contract call (`eth_call`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: String,
    pub data: Vec<u8>,
}

/// Wallet capability supplied by the host's wallet SDK.
///
/// Passed explicitly to the operations that need it; this crate never
/// connects to a wallet on its own.
#[async_trait]
pub trait Wallet: Send + Sync {
    fn is_connected(&self) -> bool;

    fn address(&self) -> Option<String>;

    fn chain_id(&self) -> Option<u64>;

    /// Returns the connected address.
    async fn connect(&self) -> Result<String, WalletError>;

    async fn disconnect(&self) -> Result<(), WalletError>;

    async fn switch_network(&self, chain_id: u64) -> Result<(), WalletError>;

    /// Sign and broadcast; returns the transaction hash.
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<String, WalletError>;

    async fn call_contract(&self, call: ContractCall) -> Result<Vec<u8>, WalletError>;
}
