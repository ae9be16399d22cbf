use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::address::{checksum_address, parse_address, selector};
use crate::error::{Error, WalletError};
use crate::poller::PaymentWatch;
use crate::status::TxState;
use crate::token::TokenRecord;
use crate::units::{parse_positive_units, validate_amount};
use crate::wallet::{ContractCall, TransactionRequest, Wallet};

const NATIVE_TRANSFER_GAS: u64 = 21_000;
const TOKEN_TRANSFER_GAS: u64 = 50_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Idle,
    Pending,
    Confirmed,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Confirmed | PaymentStatus::Failed)
    }
}

impl From<TxState> for PaymentStatus {
    fn from(state: TxState) -> Self {
        match state {
            TxState::Pending => PaymentStatus::Pending,
            TxState::Succeeded => PaymentStatus::Confirmed,
            TxState::Reverted => PaymentStatus::Failed,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Idle => "idle",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the payer is about to send. Fields are private so an intent cannot
/// change after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    recipient_address: String,
    amount: String,
    token_symbol: String,
    message: Option<String>,
    sender_address: String,
}

impl PaymentIntent {
    pub fn new(
        recipient_address: &str,
        amount: &str,
        token_symbol: &str,
        message: Option<&str>,
        sender_address: &str,
    ) -> Result<Self, Error> {
        parse_address(recipient_address)?;
        parse_address(sender_address)?;
        validate_amount(amount)?;
        if token_symbol.trim().is_empty() {
            return Err(Error::InvalidToken("missing token symbol".to_string()));
        }
        Ok(Self {
            recipient_address: recipient_address.to_string(),
            amount: amount.to_string(),
            token_symbol: token_symbol.to_string(),
            message: message.filter(|m| !m.is_empty()).map(str::to_string),
            sender_address: sender_address.to_string(),
        })
    }

    pub fn recipient_address(&self) -> &str {
        &self.recipient_address
    }

    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn token_symbol(&self) -> &str {
        &self.token_symbol
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn sender_address(&self) -> &str {
        &self.sender_address
    }
}

/// Status of one payment: idle, then pending once submitted, then confirmed
/// or failed. Terminal states never change.
#[derive(Debug, Clone, Default)]
pub struct PaymentTracker {
    status: PaymentStatus,
    intent: Option<PaymentIntent>,
    tx_hash: Option<String>,
}

impl PaymentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn intent(&self) -> Option<&PaymentIntent> {
        self.intent.as_ref()
    }

    pub fn tx_hash(&self) -> Option<&str> {
        self.tx_hash.as_deref()
    }

    /// Idle → Pending once the wallet returned a transaction hash.
    pub fn submit(&mut self, intent: PaymentIntent, tx_hash: &str) -> Result<(), Error> {
        if self.status != PaymentStatus::Idle {
            return Err(invalid(self.status, PaymentStatus::Pending));
        }
        self.status = PaymentStatus::Pending;
        self.intent = Some(intent);
        self.tx_hash = Some(tx_hash.to_string());
        Ok(())
    }

    /// Apply a polled status. Pending → Pending is a no-op.
    pub fn resolve(&mut self, status: PaymentStatus) -> Result<(), Error> {
        match (self.status, status) {
            (PaymentStatus::Pending, PaymentStatus::Pending) => Ok(()),
            (PaymentStatus::Pending, s) if s.is_terminal() => {
                self.status = s;
                Ok(())
            }
            (from, to) => Err(invalid(from, to)),
        }
    }

    /// Drive the tracker from a status watch until the watch ends.
    pub async fn follow(&mut self, watch: &mut PaymentWatch) -> PaymentStatus {
        while let Some(status) = watch.next().await {
            if let Err(err) = self.resolve(status) {
                warn!(error = %err, "ignoring status update");
            }
            if self.status.is_terminal() {
                break;
            }
        }
        self.status
    }
}

fn invalid(from: PaymentStatus, to: PaymentStatus) -> Error {
    Error::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// ABI-encode `transfer(recipient, amount)`.
pub fn encode_transfer(recipient: &str, amount: &BigUint) -> Result<Vec<u8>, Error> {
    let mut data = Vec::with_capacity(68);
    data.extend_from_slice(&selector("transfer(address,uint256)"));
    data.extend_from_slice(&address_word(recipient)?);
    data.extend_from_slice(&uint_word(amount)?);
    Ok(data)
}

fn address_word(address: &str) -> Result<[u8; 32], Error> {
    let addr = parse_address(address)?;
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&addr);
    Ok(word)
}

fn uint_word(value: &BigUint) -> Result<[u8; 32], Error> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(Error::InvalidAmount("amount exceeds uint256".to_string()));
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

/// Build the wallet transaction for `intent` paid in `token`.
pub fn prepare_transaction(
    intent: &PaymentIntent,
    token: &TokenRecord,
) -> Result<TransactionRequest, Error> {
    if token.symbol != intent.token_symbol {
        return Err(Error::TransactionRejected(format!(
            "intent is for {}, token is {}",
            intent.token_symbol, token.symbol
        )));
    }
    let amount = parse_positive_units(&intent.amount, token.decimals)?;
    let recipient = checksum_address(&intent.recipient_address)?;

    match &token.contract_address {
        None => Ok(TransactionRequest {
            from: intent.sender_address.clone(),
            to: recipient,
            value: amount,
            data: Vec::new(),
            gas_limit: Some(NATIVE_TRANSFER_GAS),
        }),
        Some(contract) => Ok(TransactionRequest {
            from: intent.sender_address.clone(),
            to: checksum_address(contract)?,
            value: BigUint::from(0u8),
            data: encode_transfer(&recipient, &amount)?,
            gas_limit: Some(TOKEN_TRANSFER_GAS),
        }),
    }
}

/// Make sure the wallet is connected and on `chain_id`, switching if needed.
pub async fn ensure_network(wallet: &dyn Wallet, chain_id: u64) -> Result<(), Error> {
    if !wallet.is_connected() {
        wallet.connect().await.map_err(rejected)?;
    }

    let actual = wallet.chain_id().unwrap_or_default();
    if actual == chain_id {
        return Ok(());
    }

    info!(expected = chain_id, actual, "switching wallet network");
    match wallet.switch_network(chain_id).await {
        Ok(()) if wallet.chain_id() == Some(chain_id) => Ok(()),
        Ok(()) => Err(Error::NetworkMismatch {
            expected: chain_id,
            actual: wallet.chain_id().unwrap_or_default(),
        }),
        Err(err) => {
            warn!(error = %err, "network switch failed");
            Err(Error::NetworkMismatch {
                expected: chain_id,
                actual,
            })
        }
    }
}

/// Submit a payment through the wallet; returns the transaction hash.
pub async fn submit_payment(
    wallet: &dyn Wallet,
    chain_id: u64,
    intent: &PaymentIntent,
    token: &TokenRecord,
) -> Result<String, Error> {
    ensure_network(wallet, chain_id).await?;

    let connected = wallet.address().unwrap_or_default();
    if !connected.eq_ignore_ascii_case(&intent.sender_address) {
        return Err(Error::TransactionRejected(format!(
            "connected wallet {connected} is not the sender {}",
            intent.sender_address
        )));
    }

    let tx = prepare_transaction(intent, token)?;
    let hash = wallet.send_transaction(tx).await.map_err(rejected)?;
    info!(chain_id, tx_hash = %hash, token = %token.symbol, "payment submitted");
    Ok(hash)
}

/// ERC-20 `balanceOf(owner)` read through the wallet's provider.
pub async fn erc20_balance_of(
    wallet: &dyn Wallet,
    token: &str,
    owner: &str,
) -> Result<BigUint, Error> {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&selector("balanceOf(address)"));
    data.extend_from_slice(&address_word(owner)?);

    let result = wallet
        .call_contract(ContractCall {
            to: token.to_string(),
            data,
        })
        .await
        .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;
    Ok(BigUint::from_bytes_be(&result))
}

fn rejected(err: WalletError) -> Error {
    Error::TransactionRejected(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::token::TokenCategory;

    const SENDER: &str = "0x742d35Cc6634C0532925a3b8D4C0532925a3b8D4";
    const RECIPIENT: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

    struct MockWallet {
        connected: Mutex<bool>,
        chain_id: Mutex<u64>,
        allow_switch: bool,
        reject_send: bool,
        sent: Mutex<Vec<TransactionRequest>>,
    }

    impl MockWallet {
        fn on_chain(chain_id: u64) -> Self {
            Self {
                connected: Mutex::new(true),
                chain_id: Mutex::new(chain_id),
                allow_switch: true,
                reject_send: false,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Wallet for MockWallet {
        fn is_connected(&self) -> bool {
            *self.connected.lock().unwrap()
        }

        fn address(&self) -> Option<String> {
            self.is_connected().then(|| SENDER.to_lowercase())
        }

        fn chain_id(&self) -> Option<u64> {
            Some(*self.chain_id.lock().unwrap())
        }

        async fn connect(&self) -> Result<String, WalletError> {
            *self.connected.lock().unwrap() = true;
            Ok(SENDER.to_string())
        }

        async fn disconnect(&self) -> Result<(), WalletError> {
            *self.connected.lock().unwrap() = false;
            Ok(())
        }

        async fn switch_network(&self, chain_id: u64) -> Result<(), WalletError> {
            if !self.allow_switch {
                return Err(WalletError::UnknownChain(chain_id));
            }
            *self.chain_id.lock().unwrap() = chain_id;
            Ok(())
        }

        async fn send_transaction(&self, tx: TransactionRequest) -> Result<String, WalletError> {
            if self.reject_send {
                return Err(WalletError::UserRejected);
            }
            self.sent.lock().unwrap().push(tx);
            Ok("0xfeed".to_string())
        }

        async fn call_contract(&self, call: ContractCall) -> Result<Vec<u8>, WalletError> {
            assert_eq!(hex::encode(&call.data[..4]), "70a08231");
            Ok(vec![0x03, 0xe8])
        }
    }

    fn eth() -> TokenRecord {
        TokenRecord {
            symbol: "ETH".to_string(),
            display_name: "Ether (ETH)".to_string(),
            icon_uri: String::new(),
            contract_address: None,
            decimals: 18,
            balance: None,
            category: TokenCategory::Native,
            rank: 1,
        }
    }

    fn usdc() -> TokenRecord {
        TokenRecord {
            symbol: "USDC".to_string(),
            display_name: "USD Coin (USDC)".to_string(),
            icon_uri: String::new(),
            contract_address: Some(USDC.to_string()),
            decimals: 6,
            balance: None,
            category: TokenCategory::Stablecoin,
            rank: 2,
        }
    }

    fn intent(token: &str, amount: &str) -> PaymentIntent {
        PaymentIntent::new(RECIPIENT, amount, token, Some("coffee"), SENDER).unwrap()
    }

    #[test]
    fn test_intent_validation() {
        assert!(PaymentIntent::new("0x12", "1", "ETH", None, SENDER).is_err());
        assert!(PaymentIntent::new(RECIPIENT, "0", "ETH", None, SENDER).is_err());
        assert!(matches!(
            PaymentIntent::new(RECIPIENT, "1", " ", None, SENDER),
            Err(Error::InvalidToken(_))
        ));
        let intent = PaymentIntent::new(RECIPIENT, "1", "ETH", Some(""), SENDER).unwrap();
        assert_eq!(intent.message(), None);
    }

    #[test]
    fn test_tracker_transitions() {
        let mut tracker = PaymentTracker::new();
        assert_eq!(tracker.status(), PaymentStatus::Idle);
        assert!(tracker.resolve(PaymentStatus::Confirmed).is_err());

        tracker.submit(intent("ETH", "1"), "0xabc").unwrap();
        assert_eq!(tracker.status(), PaymentStatus::Pending);
        assert!(tracker.submit(intent("ETH", "1"), "0xdef").is_err());

        tracker.resolve(PaymentStatus::Pending).unwrap();
        tracker.resolve(PaymentStatus::Confirmed).unwrap();
        assert_eq!(tracker.status(), PaymentStatus::Confirmed);

        assert!(tracker.resolve(PaymentStatus::Failed).is_err());
        assert_eq!(tracker.status(), PaymentStatus::Confirmed);
        assert_eq!(tracker.tx_hash(), Some("0xabc"));
    }

    #[test]
    fn test_prepare_native_transfer() {
        let tx = prepare_transaction(&intent("ETH", "0.5"), &eth()).unwrap();
        assert_eq!(tx.to, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert_eq!(tx.value, BigUint::from(500_000_000_000_000_000u64));
        assert!(tx.data.is_empty());
        assert_eq!(tx.gas_limit, Some(21_000));
    }

    #[test]
    fn test_prepare_token_transfer() {
        let tx = prepare_transaction(&intent("USDC", "1"), &usdc()).unwrap();
        assert_eq!(tx.to, USDC);
        assert_eq!(tx.value, BigUint::from(0u8));
        assert_eq!(
            hex::encode(&tx.data),
            concat!(
                "a9059cbb",
                "0000000000000000000000005aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
                "00000000000000000000000000000000000000000000000000000000000f4240"
            )
        );
    }

    #[test]
    fn test_prepare_rejects_too_many_decimals() {
        let result = prepare_transaction(&intent("USDC", "0.0000001"), &usdc());
        assert!(matches!(result, Err(Error::InvalidAmount(_))));
    }

    #[test]
    fn test_prepare_rejects_token_mismatch() {
        let result = prepare_transaction(&intent("ETH", "1"), &usdc());
        assert!(matches!(result, Err(Error::TransactionRejected(_))));
    }

    #[tokio::test]
    async fn test_submit_switches_network() {
        let wallet = MockWallet::on_chain(1);
        let hash = submit_payment(&wallet, 11155111, &intent("ETH", "1"), &eth())
            .await
            .unwrap();
        assert_eq!(hash, "0xfeed");
        assert_eq!(wallet.chain_id(), Some(11155111));
        assert_eq!(wallet.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_network_mismatch() {
        let mut wallet = MockWallet::on_chain(1);
        wallet.allow_switch = false;
        let result = submit_payment(&wallet, 11155111, &intent("ETH", "1"), &eth()).await;
        assert!(matches!(
            result,
            Err(Error::NetworkMismatch {
                expected: 11155111,
                actual: 1
            })
        ));
        assert!(wallet.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejected_by_user() {
        let mut wallet = MockWallet::on_chain(1);
        wallet.reject_send = true;
        let result = submit_payment(&wallet, 1, &intent("ETH", "1"), &eth()).await;
        assert!(matches!(result, Err(Error::TransactionRejected(_))));
    }

    #[tokio::test]
    async fn test_submit_connects_disconnected_wallet() {
        let wallet = MockWallet::on_chain(1);
        wallet.disconnect().await.unwrap();
        submit_payment(&wallet, 1, &intent("ETH", "1"), &eth())
            .await
            .unwrap();
        assert!(wallet.is_connected());
    }

    #[tokio::test]
    async fn test_erc20_balance_of() {
        let wallet = MockWallet::on_chain(1);
        let balance = erc20_balance_of(&wallet, USDC, SENDER).await.unwrap();
        assert_eq!(balance, BigUint::from(1000u32));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_watch_to_confirmation() {
        use std::sync::Arc;

        use crate::poller::PaymentStatusPoller;
        use crate::status::ScriptedStatusSource;

        let source = Arc::new(ScriptedStatusSource::new(vec![
            Ok(TxState::Pending),
            Ok(TxState::Succeeded),
        ]));
        let poller = PaymentStatusPoller::new(source);

        let mut tracker = PaymentTracker::new();
        tracker.submit(intent("ETH", "1"), "0xabc").unwrap();
        let mut watch = poller.watch("0xabc", SENDER);
        assert_eq!(tracker.follow(&mut watch).await, PaymentStatus::Confirmed);
    }
}
