//! Payment deep links: `{origin}/pay?data=<url-encoded JSON>`.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::address::parse_address;
use crate::chains::{ChainConfig, ChainRegistry};
use crate::error::Error;
use crate::payment::PaymentIntent;
use crate::units::validate_amount;

const PAY_PATH: &str = "/pay";
const DATA_PARAM: &str = "data";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLink {
    /// Recipient wallet address.
    pub to: String,
    pub amount: String,
    /// Token symbol.
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Recipient display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Creation time, unix milliseconds.
    #[serde(default)]
    pub timestamp: u64,
}

impl PaymentLink {
    /// Link requesting `intent` be paid on `chain_id`, stamped with the current time.
    pub fn from_intent(
        intent: &PaymentIntent,
        chain_id: u64,
        token_address: Option<&str>,
        recipient_name: Option<&str>,
    ) -> Self {
        Self {
            to: intent.recipient_address().to_string(),
            amount: intent.amount().to_string(),
            token: intent.token_symbol().to_string(),
            token_address: token_address.map(str::to_string),
            chain_id,
            message: intent.message().map(str::to_string),
            recipient: recipient_name
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            timestamp: now_ms(),
        }
    }

    /// Link for `intent` on `chain`, resolving the token's contract address.
    pub fn for_chain(
        intent: &PaymentIntent,
        chain: &ChainConfig,
        recipient_name: Option<&str>,
    ) -> Result<Self, Error> {
        let symbol = intent.token_symbol();
        let token_address = chain
            .popular_tokens
            .iter()
            .find(|t| t.symbol == symbol)
            .map(|t| t.address.as_str());
        if token_address.is_none() && !chain.is_native_symbol(symbol) {
            return Err(Error::TokenNotFound {
                chain_id: chain.chain_id,
                symbol: symbol.to_string(),
            });
        }
        Ok(Self::from_intent(
            intent,
            chain.chain_id,
            token_address,
            recipient_name,
        ))
    }

    /// The intent of `payer` paying this link.
    pub fn to_intent(&self, payer: &str) -> Result<PaymentIntent, Error> {
        PaymentIntent::new(
            &self.to,
            &self.amount,
            &self.token,
            self.message.as_deref(),
            payer,
        )
    }

    pub fn encode(&self, origin: &str) -> Result<String, Error> {
        let json = serde_json::to_string(self)
            .map_err(|e| Error::InvalidPaymentLink(e.to_string()))?;
        let mut url = Url::parse(origin)
            .map_err(|e| Error::InvalidPaymentLink(format!("origin {origin}: {e}")))?;
        url.set_path(PAY_PATH);
        url.query_pairs_mut().clear().append_pair(DATA_PARAM, &json);
        Ok(url.into())
    }

    /// Parse and validate a link produced by [`PaymentLink::encode`].
    pub fn decode(link: &str) -> Result<Self, Error> {
        let url = Url::parse(link).map_err(|e| Error::InvalidPaymentLink(e.to_string()))?;
        if url.path().trim_end_matches('/') != PAY_PATH {
            return Err(Error::InvalidPaymentLink(format!(
                "unexpected path {}",
                url.path()
            )));
        }
        let data = url
            .query_pairs()
            .find(|(k, _)| k == DATA_PARAM)
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| Error::InvalidPaymentLink("missing data parameter".to_string()))?;

        let parsed: PaymentLink = serde_json::from_str(&data)
            .map_err(|e| Error::InvalidPaymentLink(format!("malformed payload: {e}")))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// [`PaymentLink::decode`], additionally requiring the link's chain to be in `chains`.
    pub fn decode_for(link: &str, chains: &ChainRegistry) -> Result<Self, Error> {
        let parsed = Self::decode(link)?;
        if !chains.contains(parsed.chain_id) {
            return Err(Error::InvalidPaymentLink(format!(
                "unsupported chain {}",
                parsed.chain_id
            )));
        }
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), Error> {
        let invalid = |what: &str| Error::InvalidPaymentLink(what.to_string());
        parse_address(&self.to).map_err(|_| invalid("invalid recipient address"))?;
        if let Some(token_address) = &self.token_address {
            parse_address(token_address).map_err(|_| invalid("invalid token address"))?;
        }
        validate_amount(&self.amount).map_err(|_| invalid("invalid amount"))?;
        if self.token.trim().is_empty() {
            return Err(invalid("missing token"));
        }
        Ok(())
    }
}

fn now_ms() -> u64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    u64::try_from(nanos / 1_000_000).unwrap_or_default()
}
