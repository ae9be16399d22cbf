//! Payment status polling.
//!
//! [`PaymentStatusPoller::watch`] starts a background task that queries the
//! [`StatusSource`] immediately and then once per interval until the
//! transaction is confirmed or failed. Upstream errors count as "still
//! pending" and back off exponentially; after too many consecutive errors
//! the watch gives up instead of polling forever.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::payment::PaymentStatus;
use crate::status::StatusSource;

pub const POLL_INTERVAL: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Consecutive upstream errors tolerated before the watch gives up.
    pub max_consecutive_errors: u32,
    pub max_backoff: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_consecutive_errors: 12,
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl PollPolicy {
    /// Delay before the next check: the interval, doubled per consecutive error.
    pub fn delay_after(&self, consecutive_errors: u32) -> Duration {
        if consecutive_errors == 0 {
            return self.interval;
        }
        let factor = 1u32 << consecutive_errors.min(16);
        self.interval
            .saturating_mul(factor)
            .min(self.max_backoff.max(self.interval))
    }
}

/// Why a watch stopped producing statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEnd {
    /// A confirmed or failed status was delivered.
    Terminal,
    Cancelled,
    /// The upstream kept failing; the outcome is unknown.
    RetriesExhausted,
}

enum Event {
    Status(PaymentStatus),
    GaveUp,
}

pub struct PaymentStatusPoller {
    source: Arc<dyn StatusSource>,
    policy: PollPolicy,
}

impl PaymentStatusPoller {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self::with_policy(source, PollPolicy::default())
    }

    pub fn with_policy(source: Arc<dyn StatusSource>, policy: PollPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Observe `tx_hash` until it reaches a terminal state.
    ///
    /// Each watch is single-use; start a new one for another transaction.
    /// Must be called inside a tokio runtime.
    pub fn watch(&self, tx_hash: &str, wallet: &str) -> PaymentWatch {
        let (tx, rx) = mpsc::channel(1);
        let span = info_span!("payment_watch", tx_hash = %tx_hash, wallet = %wallet);
        let task = tokio::spawn(
            poll_loop(
                self.source.clone(),
                self.policy.clone(),
                tx_hash.to_string(),
                tx,
            )
            .instrument(span),
        );
        PaymentWatch {
            tx_hash: tx_hash.to_string(),
            wallet: wallet.to_string(),
            rx,
            task,
            end: None,
        }
    }
}

async fn poll_loop(
    source: Arc<dyn StatusSource>,
    policy: PollPolicy,
    tx_hash: String,
    tx: mpsc::Sender<Event>,
) {
    let mut consecutive_errors = 0u32;
    loop {
        let status = match source.transaction_status(&tx_hash).await {
            Ok(state) => {
                consecutive_errors = 0;
                PaymentStatus::from(state)
            }
            Err(err) => {
                consecutive_errors += 1;
                if consecutive_errors > policy.max_consecutive_errors {
                    warn!(error = %err, attempts = consecutive_errors, "giving up on status polling");
                    let _ = tx.send(Event::GaveUp).await;
                    return;
                }
                debug!(error = %err, attempts = consecutive_errors, "status query failed, still pending");
                PaymentStatus::Pending
            }
        };

        if tx.send(Event::Status(status)).await.is_err() {
            return;
        }
        if status.is_terminal() {
            info!(?status, "payment reached terminal state");
            return;
        }

        tokio::time::sleep(policy.delay_after(consecutive_errors)).await;
    }
}

/// Finite stream of [`PaymentStatus`] values for one transaction.
///
/// Dropping the watch cancels it.
pub struct PaymentWatch {
    tx_hash: String,
    wallet: String,
    rx: mpsc::Receiver<Event>,
    task: JoinHandle<()>,
    end: Option<WatchEnd>,
}

impl PaymentWatch {
    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    pub fn wallet(&self) -> &str {
        &self.wallet
    }

    pub async fn next(&mut self) -> Option<PaymentStatus> {
        futures::StreamExt::next(self).await
    }

    /// Stop polling. No further check runs and no further status is yielded.
    pub fn cancel(&mut self) {
        self.task.abort();
        self.rx.close();
        if self.end.is_none() {
            self.end = Some(WatchEnd::Cancelled);
        }
    }

    /// Set once the stream is exhausted or cancelled.
    pub fn end(&self) -> Option<WatchEnd> {
        self.end
    }
}

impl Stream for PaymentWatch {
    type Item = PaymentStatus;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.end.is_some() {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Event::Status(status))) => {
                if status.is_terminal() {
                    self.end = Some(WatchEnd::Terminal);
                }
                Poll::Ready(Some(status))
            }
            Poll::Ready(Some(Event::GaveUp)) => {
                self.end = Some(WatchEnd::RetriesExhausted);
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                self.end = Some(WatchEnd::Cancelled);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PaymentWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
