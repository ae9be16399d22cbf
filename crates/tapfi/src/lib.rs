pub mod address;
pub mod cache;
pub mod chains;
pub mod config;
pub mod debounce;
pub mod directory;
pub mod error;
pub mod link;
pub mod payment;
pub mod poller;
pub mod provider;
pub mod requests;
pub mod status;
pub mod token;
pub mod units;
pub mod wallet;

#[cfg(feature = "http")]
pub mod alchemy;
#[cfg(feature = "http")]
pub mod backend;
#[cfg(feature = "http")]
pub mod explorer;
#[cfg(feature = "http")]
pub mod rpc;

use std::sync::Arc;

use tracing::{info, warn};

// Re-exports for convenience
pub use chains::{ChainConfig, ChainRegistry};
pub use config::Config;
pub use debounce::BalanceRefresher;
pub use directory::{search_tokens, TokenDirectory};
pub use error::{Error, WalletError};
pub use link::PaymentLink;
pub use payment::{PaymentIntent, PaymentStatus, PaymentTracker};
pub use poller::{PaymentStatusPoller, PaymentWatch, WatchEnd};
pub use provider::TokenProvider;
pub use requests::{NewPaymentRequest, PaymentRequest, PaymentRequests};
pub use status::StatusSource;
pub use token::TokenRecord;
pub use wallet::Wallet;

/// Everything a client session shares, built once at startup.
pub struct AppContext {
    config: Config,
    chains: Arc<ChainRegistry>,
    directory: Arc<TokenDirectory>,
    poller: PaymentStatusPoller,
    requests: Option<Arc<dyn PaymentRequests>>,
    #[cfg(feature = "http")]
    explorer: Option<explorer::ExplorerClient>,
}

impl AppContext {
    /// Assemble a context around caller-supplied upstream services.
    pub fn with_services(
        config: Config,
        chains: ChainRegistry,
        provider: Arc<dyn TokenProvider>,
        status: Arc<dyn StatusSource>,
    ) -> Result<Self, Error> {
        config.validate(&chains)?;
        let chains = Arc::new(chains);
        let directory = Arc::new(TokenDirectory::with_ttl(
            chains.clone(),
            provider,
            config.token_cache_ttl,
        ));
        let poller = PaymentStatusPoller::with_policy(status, config.poll.clone());
        Ok(Self {
            config,
            chains,
            directory,
            poller,
            requests: None,
            #[cfg(feature = "http")]
            explorer: None,
        })
    }

    /// Attach the payment request backend.
    pub fn with_requests(mut self, requests: Arc<dyn PaymentRequests>) -> Self {
        self.requests = Some(requests);
        self
    }

    /// Production wiring: Alchemy for tokens, JSON-RPC for receipts, the
    /// TapFi backend for payment requests and the default chain's explorer
    /// for history.
    #[cfg(feature = "http")]
    pub fn from_config(config: Config) -> Result<Self, Error> {
        let chains = ChainRegistry::builtin()?;
        let client = reqwest::Client::new();

        let provider = Arc::new(alchemy::AlchemyProvider::new(
            client.clone(),
            &chains,
            config.require_alchemy_key()?,
        ));
        let status = Arc::new(status::JsonRpcStatusSource::new(
            client.clone(),
            config.require_rpc_url()?,
        ));
        let explorer_api = chains.get(config.default_chain_id)?.explorer_api.clone();
        let explorer = match (explorer_api, config.etherscan_api_key.clone()) {
            (Some(api), Some(key)) => {
                Some(explorer::ExplorerClient::new(client.clone(), api, key))
            }
            _ => None,
        };

        let requests = Arc::new(backend::PaymentRequestClient::new(
            client,
            &config.api_base_url,
        )?);

        let mut ctx =
            Self::with_services(config, chains, provider, status)?.with_requests(requests);
        ctx.explorer = explorer;
        info!(
            chain_id = ctx.config.default_chain_id,
            history = ctx.explorer.is_some(),
            "app context ready"
        );
        Ok(ctx)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    pub fn directory(&self) -> Arc<TokenDirectory> {
        self.directory.clone()
    }

    pub fn poller(&self) -> &PaymentStatusPoller {
        &self.poller
    }

    pub fn requests(&self) -> Result<&dyn PaymentRequests, Error> {
        self.requests
            .as_deref()
            .ok_or_else(|| Error::Config("no payment request backend configured".to_string()))
    }

    #[cfg(feature = "http")]
    pub fn explorer(&self) -> Result<&explorer::ExplorerClient, Error> {
        self.explorer.as_ref().ok_or_else(|| {
            Error::Config("transaction history needs ETHERSCAN_API_KEY and an explorer".to_string())
        })
    }

    /// Debounced balance refresher over the shared directory.
    pub fn balance_refresher(&self) -> BalanceRefresher {
        BalanceRefresher::with_quiet_period(self.directory.clone(), self.config.balance_debounce)
    }

    /// Deep link asking for `intent` to be paid on the default chain.
    pub fn payment_link(
        &self,
        intent: &PaymentIntent,
        recipient_name: Option<&str>,
    ) -> Result<String, Error> {
        let chain = self.chains.get(self.config.default_chain_id)?;
        PaymentLink::for_chain(intent, chain, recipient_name)?.encode(&self.config.app_origin)
    }

    /// Decode a scanned deep link, rejecting chains this context does not serve.
    pub fn open_link(&self, link: &str) -> Result<PaymentLink, Error> {
        PaymentLink::decode_for(link, &self.chains)
    }

    /// Follow `tracker`'s transaction to the end and, once it confirms, mark
    /// payment request `request_id` completed on the backend.
    pub async fn settle_request(
        &self,
        request_id: &str,
        tracker: &mut PaymentTracker,
        watch: &mut PaymentWatch,
    ) -> Result<PaymentStatus, Error> {
        let status = tracker.follow(watch).await;
        if status != PaymentStatus::Confirmed {
            return Ok(status);
        }
        let tx_hash = tracker.tx_hash().unwrap_or(watch.tx_hash());
        if self.requests()?.complete(request_id, tx_hash).await? {
            info!(request_id, tx_hash, "payment request completed");
        } else {
            warn!(request_id, tx_hash, "payment request completion refused");
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use num_bigint::BigUint;

    use super::*;
    use crate::provider::StaticProvider;
    use crate::requests::MemoryRequestStore;
    use crate::status::{ScriptedStatusSource, TxState};

    const PAYER: &str = "0x742d35Cc6634C0532925a3b8D4C0532925a3b8D4";
    const PAYEE: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn context(provider: Arc<StaticProvider>) -> AppContext {
        context_with_status(provider, vec![Ok(TxState::Succeeded)])
    }

    fn context_with_status(
        provider: Arc<StaticProvider>,
        script: Vec<Result<TxState, String>>,
    ) -> AppContext {
        let config = Config {
            poll: poller::PollPolicy {
                interval: Duration::from_secs(1),
                ..Default::default()
            },
            ..Config::default()
        };
        AppContext::with_services(
            config,
            ChainRegistry::builtin().unwrap(),
            provider,
            Arc::new(ScriptedStatusSource::new(script)),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresher_shares_directory_cache() {
        let provider = Arc::new(StaticProvider::new());
        provider.set_balance(11155111, None, PAYER, BigUint::from(10u8).pow(18));
        let ctx = context(provider.clone());

        let refresher = ctx.balance_refresher();
        let mut results = refresher.subscribe();
        refresher.request(11155111, "ETH", PAYER);
        results.changed().await.unwrap();
        assert_eq!(provider.balance_calls(), 1);

        let cached = ctx
            .directory()
            .cached_balance(11155111, "ETH", PAYER)
            .await
            .unwrap();
        assert_eq!(cached.balance.unwrap().formatted, "1.000000");
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_uses_configured_policy() {
        let ctx = context(Arc::new(StaticProvider::new()));
        assert_eq!(ctx.poller().policy().interval, Duration::from_secs(1));
        let mut watch = ctx.poller().watch("0xabc", PAYER);
        assert_eq!(watch.next().await, Some(PaymentStatus::Confirmed));
    }

    #[test]
    fn test_payment_link_on_default_chain() {
        let ctx = context(Arc::new(StaticProvider::new()));
        let intent = PaymentIntent::new(PAYEE, "5", "USDC", None, PAYER).unwrap();
        let link = PaymentLink::decode(&ctx.payment_link(&intent, None).unwrap()).unwrap();
        assert_eq!(link.chain_id, 11155111);
        assert_eq!(
            link.token_address.as_deref(),
            Some("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238")
        );

        let intent = PaymentIntent::new(PAYEE, "5", "DOGE", None, PAYER).unwrap();
        assert!(matches!(
            ctx.payment_link(&intent, None),
            Err(Error::TokenNotFound { .. })
        ));
    }

    #[test]
    fn test_open_link_rejects_unknown_chain() {
        let ctx = context(Arc::new(StaticProvider::new()));
        let intent = PaymentIntent::new(PAYEE, "5", "ETH", None, PAYER).unwrap();

        let mut link = PaymentLink::from_intent(&intent, 8453, None, None);
        let url = link.encode(&ctx.config().app_origin).unwrap();
        assert_eq!(ctx.open_link(&url).unwrap().chain_id, 8453);

        link.chain_id = 424242;
        let url = link.encode(&ctx.config().app_origin).unwrap();
        assert!(matches!(ctx.open_link(&url), Err(Error::InvalidPaymentLink(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_request_completes_on_confirmation() {
        let store = Arc::new(MemoryRequestStore::new());
        let ctx = context(Arc::new(StaticProvider::new())).with_requests(store.clone());
        let intent = PaymentIntent::new(PAYEE, "5", "ETH", None, PAYER).unwrap();
        let request = store
            .create(&NewPaymentRequest::from_intent(&intent, None))
            .await
            .unwrap();

        let mut tracker = PaymentTracker::new();
        tracker.submit(intent, "0xabc").unwrap();
        let mut watch = ctx.poller().watch("0xabc", PAYER);
        let status = ctx
            .settle_request(&request.id, &mut tracker, &mut watch)
            .await
            .unwrap();

        assert_eq!(status, PaymentStatus::Confirmed);
        assert_eq!(store.completions(), vec![(request.id, "0xabc".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_request_leaves_failed_payment_open() {
        let store = Arc::new(MemoryRequestStore::new());
        let ctx = context_with_status(
            Arc::new(StaticProvider::new()),
            vec![Ok(TxState::Pending), Ok(TxState::Reverted)],
        )
        .with_requests(store.clone());
        let intent = PaymentIntent::new(PAYEE, "5", "ETH", None, PAYER).unwrap();
        let request = store
            .create(&NewPaymentRequest::from_intent(&intent, None))
            .await
            .unwrap();

        let mut tracker = PaymentTracker::new();
        tracker.submit(intent, "0xdef").unwrap();
        let mut watch = ctx.poller().watch("0xdef", PAYER);
        let status = ctx
            .settle_request(&request.id, &mut tracker, &mut watch)
            .await
            .unwrap();

        assert_eq!(status, PaymentStatus::Failed);
        assert!(store.completions().is_empty());
        assert_eq!(
            store.get(&request.id).await.unwrap().unwrap().status,
            requests::RequestStatus::Active
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_request_needs_backend() {
        let ctx = context(Arc::new(StaticProvider::new()));
        let intent = PaymentIntent::new(PAYEE, "5", "ETH", None, PAYER).unwrap();
        let mut tracker = PaymentTracker::new();
        tracker.submit(intent, "0xabc").unwrap();
        let mut watch = ctx.poller().watch("0xabc", PAYER);
        assert!(matches!(
            ctx.settle_request("req-1", &mut tracker, &mut watch).await,
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            default_chain_id: 999,
            ..Config::default()
        };
        let result = AppContext::with_services(
            config,
            ChainRegistry::builtin().unwrap(),
            Arc::new(StaticProvider::new()),
            Arc::new(ScriptedStatusSource::new(Vec::new())),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
