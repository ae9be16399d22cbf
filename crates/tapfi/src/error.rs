use thiserror::Error;

/// Unified error type for the TapFi payment core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("invalid payment link: {0}")]
    InvalidPaymentLink(String),

    #[error("network mismatch: expected chain {expected}, wallet is on {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("unsupported chain: {0}")]
    UnsupportedChain(u64),

    #[error("token {symbol} not found on chain {chain_id}")]
    TokenNotFound { chain_id: u64, symbol: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("payment status cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Short notification text for the payment UI.
    ///
    /// Upstream details are logged, not shown; the returned string is bounded.
    pub fn user_message(&self) -> String {
        let msg = match self {
            Error::UpstreamUnavailable(_) => {
                "Token data is temporarily unavailable. Please try again.".to_string()
            }
            Error::InvalidPaymentLink(_) => "This payment link is invalid or incomplete.".to_string(),
            Error::NetworkMismatch { expected, .. } => {
                format!("Please switch your wallet to chain {expected}.")
            }
            Error::TransactionRejected(reason) => format!("Payment failed: {reason}"),
            Error::UnsupportedChain(id) => format!("Chain {id} is not supported."),
            Error::TokenNotFound { symbol, .. } => format!("Token {symbol} is not available."),
            Error::InvalidAmount(_) => "Please enter a valid amount.".to_string(),
            Error::InvalidToken(_) => "Please choose a token.".to_string(),
            Error::InvalidAddress(_) => "Please enter a valid wallet address.".to_string(),
            Error::InvalidTransition { .. } => "This payment was already submitted.".to_string(),
            Error::Config(_) => "The application is misconfigured.".to_string(),
            Error::Serialization(_) => "The result could not be displayed.".to_string(),
        };
        truncate(msg, USER_MESSAGE_LIMIT)
    }
}

const USER_MESSAGE_LIMIT: usize = 160;

fn truncate(mut msg: String, limit: usize) -> String {
    if msg.chars().count() <= limit {
        return msg;
    }
    let cut = msg
        .char_indices()
        .nth(limit - 1)
        .map(|(i, _)| i)
        .unwrap_or(msg.len());
    msg.truncate(cut);
    msg.push('…');
    msg
}

/// Errors reported by the wallet capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("wallet not connected")]
    NotConnected,

    #[error("request rejected by user")]
    UserRejected,

    #[error("chain {0} is not available in the wallet")]
    UnknownChain(u64),

    #[error("wallet error: {0}")]
    Provider(String),
}
