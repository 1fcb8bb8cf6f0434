//! Lot finalization. Consumes the external scheduler's lot-closed signal,
//! declares the winner from the ledger's current leader and hands the result
//! to the payment system.

use {
    crate::{
        fanout::EventBus,
        locks::LotLocks,
        storage::{BidStorage, LotClose, StorageError},
    },
    anyhow::{Context, Result},
    async_trait::async_trait,
    chrono::Utc,
    model::{
        Amount, BidderId, LotId,
        auction::LotStatus,
        events::{BidEvent, BidEventKind, PendingEvent},
    },
    serde_json::json,
    std::{sync::Arc, time::Duration},
    thiserror::Error,
    url::Url,
};

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "finalizer")]
struct Metrics {
    /// Number of lots closed by this instance.
    lots_closed: prometheus::IntCounter,

    /// Number of failed payment capture callbacks.
    payment_capture_failures: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

/// The external payment system's capture callback.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentCapturing: Send + Sync {
    async fn on_lot_won(&self, lot: LotId, bidder: BidderId, amount: &Amount) -> Result<()>;
}

/// Posts the winner to the checkout system's capture webhook.
pub struct WebhookPaymentCapture {
    client: reqwest::Client,
    url: Url,
}

impl WebhookPaymentCapture {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("failed to build payment capture client")?,
            url,
        })
    }
}

#[async_trait]
impl PaymentCapturing for WebhookPaymentCapture {
    async fn on_lot_won(&self, lot: LotId, bidder: BidderId, amount: &Amount) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({
                "lotId": lot,
                "bidderId": bidder,
                "amount": amount,
            }))
            .send()
            .await
            .context("payment capture request failed")?;
        response
            .error_for_status()
            .context("payment capture rejected")?;
        Ok(())
    }
}

/// Stand-in when no capture webhook is configured.
pub struct LogOnlyPaymentCapture;

#[async_trait]
impl PaymentCapturing for LogOnlyPaymentCapture {
    async fn on_lot_won(&self, lot: LotId, bidder: BidderId, amount: &Amount) -> Result<()> {
        tracing::info!(lot, bidder, %amount, "lot won; no payment capture configured");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CloseLotError {
    #[error("lot does not exist")]
    UnknownLot,
    #[error("lot is busy, retry later")]
    Busy,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct WinnerFinalizer {
    storage: Arc<dyn BidStorage>,
    locks: LotLocks,
    events: EventBus,
    payment: Arc<dyn PaymentCapturing>,
}

impl WinnerFinalizer {
    pub fn new(
        storage: Arc<dyn BidStorage>,
        locks: LotLocks,
        events: EventBus,
        payment: Arc<dyn PaymentCapturing>,
    ) -> Self {
        Self {
            storage,
            locks,
            events,
            payment,
        }
    }

    /// Closes a lot, emitting the terminal winner event when a leader
    /// exists. Idempotent: closing an already closed lot returns the
    /// previously stored winner event and triggers no second capture.
    pub async fn close_lot(&self, lot_id: LotId) -> Result<Option<BidEvent>, CloseLotError> {
        let _section = self
            .locks
            .acquire(lot_id)
            .await
            .map_err(|_| CloseLotError::Busy)?;

        let lot = self
            .storage
            .lot(lot_id)
            .await?
            .ok_or(CloseLotError::UnknownLot)?;
        if lot.status == LotStatus::Closed {
            return Ok(self.storage.winner_event(lot_id).await?);
        }
        if lot.status == LotStatus::Open {
            self.storage.mark_closing(lot_id).await?;
        }

        let leader = self.storage.current_leader(lot_id).await?;
        let winner = leader.map(|leader| PendingEvent {
            auction_id: lot.auction_id,
            lot_id: Some(lot.id),
            kind: BidEventKind::Winner {
                bidder_id: leader.bidder_id,
                amount: leader.amount,
            },
            timestamp: Utc::now(),
            requester: None,
        });

        match self.storage.finalize_lot(lot_id, winner).await? {
            LotClose::Closed { winner } => {
                Metrics::get().lots_closed.inc();
                tracing::info!(lot = lot_id, won = winner.is_some(), "lot closed");
                if let Some(event) = &winner {
                    self.events.publish(std::slice::from_ref(event));
                    if let BidEventKind::Winner { bidder_id, amount } = &event.kind {
                        // The ledger, not the callback, is authoritative: a
                        // failed capture is surfaced to operators but does
                        // not undo the close.
                        if let Err(err) =
                            self.payment.on_lot_won(lot_id, *bidder_id, amount).await
                        {
                            Metrics::get().payment_capture_failures.inc();
                            tracing::error!(?err, lot = lot_id, "payment capture failed");
                        }
                    }
                }
                Ok(winner)
            }
            LotClose::AlreadyClosed { winner } => Ok(winner),
        }
    }
}
