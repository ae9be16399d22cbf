//! Trailing-edge debouncing for balance refreshes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::directory::TokenDirectory;
use crate::token::TokenRecord;

/// Minimum input quiescence before a balance refresh is issued.
pub const BALANCE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Runs `action` with the most recent triggered value once no new trigger
/// has arrived for `quiet`. Superseded values are dropped, never queued.
///
/// Must be created inside a tokio runtime. Dropping the debouncer stops the
/// worker and discards any pending value.
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
    worker: JoinHandle<()>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F, Fut>(quiet: Duration, action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(rx, quiet, action));
        Self { tx, worker }
    }

    pub fn trigger(&self, value: T) {
        // Only fails once the worker is gone, in which case there is nothing to notify.
        let _ = self.tx.send(value);
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run<T, F, Fut>(mut rx: mpsc::UnboundedReceiver<T>, quiet: Duration, action: F)
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(mut latest) = rx.recv().await {
        loop {
            match tokio::time::timeout(quiet, rx.recv()).await {
                Ok(Some(next)) => latest = next,
                Ok(None) => return,
                Err(_) => break,
            }
        }
        action(latest).await;
    }
}

/// Parameters of one balance refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRequest {
    pub chain_id: u64,
    pub symbol: String,
    pub owner: String,
}

/// Debounced front end to [`TokenDirectory::refresh_balance`].
///
/// The UI calls [`BalanceRefresher::request`] on every input change and
/// renders whatever arrives on [`BalanceRefresher::subscribe`].
pub struct BalanceRefresher {
    debouncer: Debouncer<BalanceRequest>,
    results: watch::Receiver<Option<TokenRecord>>,
}

impl BalanceRefresher {
    pub fn new(directory: Arc<TokenDirectory>) -> Self {
        Self::with_quiet_period(directory, BALANCE_DEBOUNCE)
    }

    pub fn with_quiet_period(directory: Arc<TokenDirectory>, quiet: Duration) -> Self {
        let (results_tx, results) = watch::channel(None);
        let results_tx = Arc::new(results_tx);
        let debouncer = Debouncer::new(quiet, move |request: BalanceRequest| {
            let directory = directory.clone();
            let results_tx = results_tx.clone();
            async move {
                debug!(
                    chain_id = request.chain_id,
                    symbol = %request.symbol,
                    "debounced balance refresh"
                );
                let record = directory
                    .refresh_balance(request.chain_id, &request.symbol, &request.owner)
                    .await;
                results_tx.send_replace(record);
            }
        });
        Self { debouncer, results }
    }

    pub fn request(&self, chain_id: u64, symbol: &str, owner: &str) {
        self.debouncer.trigger(BalanceRequest {
            chain_id,
            symbol: symbol.to_string(),
            owner: owner.to_string(),
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TokenRecord>> {
        self.results.clone()
    }

    /// Most recent refresh result, if any has completed.
    pub fn latest(&self) -> Option<TokenRecord> {
        self.results.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use num_bigint::BigUint;

    use super::*;
    use crate::chains::ChainRegistry;
    use crate::provider::StaticProvider;

    const ALICE: &str = "0x742d35Cc6634C0532925a3b8D4C0532925a3b8D4";
    const BOB: &str = "0x8ba1f109551bD432803012645ac136c22C57592a";

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_keeps_only_last_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let debouncer = Debouncer::new(Duration::from_millis(500), move |v: u32| {
            let sink = sink.clone();
            async move { sink.lock().unwrap().push(v) }
        });

        for v in 0..5 {
            debouncer.trigger(v);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*seen.lock().unwrap(), vec![4]);

        debouncer.trigger(10);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*seen.lock().unwrap(), vec![4, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_waits_for_quiet_period() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let debouncer = Debouncer::new(Duration::from_millis(500), move |v: u32| {
            let sink = sink.clone();
            async move { sink.lock().unwrap().push(v) }
        });

        debouncer.trigger(1);
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(seen.lock().unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_discards_pending_value() {
        let seen = Arc::new(Mutex::new(Vec::<u32>::new()));
        let sink = seen.clone();
        let debouncer = Debouncer::new(Duration::from_millis(500), move |v: u32| {
            let sink = sink.clone();
            async move { sink.lock().unwrap().push(v) }
        });
        debouncer.trigger(1);
        drop(debouncer);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_balance_requests_issue_one_call() {
        let provider = Arc::new(StaticProvider::new());
        provider.set_balance(1, None, BOB, BigUint::from(3_000_000_000_000_000_000u64));
        let registry = Arc::new(ChainRegistry::builtin().unwrap());
        let directory = Arc::new(TokenDirectory::new(registry, provider.clone()));

        let refresher = BalanceRefresher::new(directory);
        let mut results = refresher.subscribe();

        refresher.request(1, "ETH", ALICE);
        tokio::time::sleep(Duration::from_millis(200)).await;
        refresher.request(1, "ETH", ALICE);
        tokio::time::sleep(Duration::from_millis(200)).await;
        refresher.request(1, "ETH", BOB);

        results.changed().await.unwrap();
        assert_eq!(provider.balance_calls(), 1);
        assert_eq!(
            provider.last_balance_request(),
            Some((1, "native".to_string(), BOB.to_lowercase()))
        );
        let record = refresher.latest().unwrap();
        assert_eq!(record.balance.unwrap().formatted, "3.000000");
    }
}
