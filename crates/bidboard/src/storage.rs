//! The storage seam between the engine and its persistence. The ledger is
//! the only shared mutable resource in the system; everything else is either
//! stateless or derived from it.

use {
    async_trait::async_trait,
    model::{
        BidderId, LotId,
        auction::Lot,
        bidder::Bidder,
        events::{BidEvent, EventFilter, PendingEvent},
        leaderboard::Leader,
    },
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Pagination and ordering of a ledger query.
#[derive(Clone, Copy, Debug)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
    pub ascending: bool,
}

/// A page of ledger events plus the total number of matching events.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventPage {
    pub events: Vec<BidEvent>,
    pub total: i64,
}

/// Outcome of finalizing a lot.
#[derive(Clone, Debug, PartialEq)]
pub enum LotClose {
    /// This call performed the close.
    Closed { winner: Option<BidEvent> },
    /// The lot was closed before; the previously stored winner event is
    /// returned unchanged.
    AlreadyClosed { winner: Option<BidEvent> },
}

#[async_trait]
pub trait BidStorage: Send + Sync {
    async fn lot(&self, lot: LotId) -> Result<Option<Lot>, StorageError>;

    async fn bidder(&self, bidder: BidderId) -> Result<Option<Bidder>, StorageError>;

    /// The authoritative current leader of a lot, derived from the latest
    /// admitting event. Callers that are about to append must hold the lot's
    /// exclusive section so the answer cannot go stale under them.
    async fn current_leader(&self, lot: LotId) -> Result<Option<Leader>, StorageError>;

    /// Assigns gapless sequence numbers and persists the batch atomically.
    /// Either the whole batch commits or nothing does; a failed append
    /// consumes no sequence numbers.
    async fn append_events(
        &self,
        events: Vec<PendingEvent>,
    ) -> Result<Vec<BidEvent>, StorageError>;

    async fn events(&self, filter: &EventFilter, page: Page) -> Result<EventPage, StorageError>;

    /// Marks an open lot as Closing ahead of finalization.
    async fn mark_closing(&self, lot: LotId) -> Result<(), StorageError>;

    /// Appends the winner event (when one is given) and transitions the lot
    /// to Closed in a single transaction. If the lot was closed concurrently
    /// the given event is discarded and the stored one returned instead.
    async fn finalize_lot(
        &self,
        lot: LotId,
        winner: Option<PendingEvent>,
    ) -> Result<LotClose, StorageError>;

    /// The stored terminal event of an already closed lot.
    async fn winner_event(&self, lot: LotId) -> Result<Option<BidEvent>, StorageError>;
}
