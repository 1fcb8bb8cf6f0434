//! In-memory [`BidStorage`] used by engine tests. Behaves like the postgres
//! implementation: appends are atomic, sequence numbers are gapless and a
//! failed append consumes nothing.

use {
    crate::{
        api::AppState,
        fanout::EventBus,
        finalizer::{LogOnlyPaymentCapture, WinnerFinalizer},
        locks::LotLocks,
        resolution::Resolver,
        storage::{BidStorage, EventPage, LotClose, Page, StorageError},
        validation::BidValidator,
    },
    anyhow::anyhow,
    async_trait::async_trait,
    model::{
        BidderId, LotId,
        auction::{Lot, LotStatus},
        bidder::Bidder,
        events::{BidEvent, BidEventKind, EventFilter, LotSelector, PendingEvent},
        leaderboard::Leader,
    },
    std::{
        collections::HashMap,
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    },
};

/// Fully wired application state over in-memory storage, for handler tests.
pub fn app_state() -> (Arc<InMemoryStorage>, Arc<AppState>) {
    let storage = Arc::new(InMemoryStorage::default());
    let locks = LotLocks::new(Duration::from_secs(1));
    let events = EventBus::new(64);
    let resolver = Arc::new(Resolver::new(
        storage.clone(),
        Arc::new(BidValidator),
        locks.clone(),
        events.clone(),
        100,
    ));
    let finalizer = Arc::new(WinnerFinalizer::new(
        storage.clone(),
        locks,
        events.clone(),
        Arc::new(LogOnlyPaymentCapture),
    ));
    let state = Arc::new(AppState {
        storage: storage.clone(),
        resolver,
        finalizer,
        events,
    });
    (storage, state)
}

#[derive(Default)]
struct Inner {
    lots: HashMap<LotId, Lot>,
    bidders: HashMap<BidderId, Bidder>,
    events: Vec<BidEvent>,
}

#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
    fail_next_append: AtomicBool,
}

impl InMemoryStorage {
    pub fn add_lot(&self, lot: Lot) {
        self.inner.lock().unwrap().lots.insert(lot.id, lot);
    }

    pub fn add_bidder(&self, bidder: Bidder) {
        self.inner.lock().unwrap().bidders.insert(bidder.id, bidder);
    }

    pub fn all_events(&self) -> Vec<BidEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn lot_status(&self, lot: LotId) -> Option<LotStatus> {
        self.inner.lock().unwrap().lots.get(&lot).map(|lot| lot.status)
    }

    /// Makes the next append fail, simulating unavailable storage.
    pub fn fail_next_append(&self) {
        self.fail_next_append.store(true, Ordering::SeqCst);
    }

    fn leader_of(inner: &Inner, lot: LotId) -> Option<Leader> {
        inner
            .events
            .iter()
            .rev()
            .find(|event| event.lot_id == Some(lot) && event.kind.admits_leader())
            .map(|event| {
                let bidder_id = event.kind.bidder_id();
                Leader {
                    bidder_id,
                    amount: event.kind.amount().clone(),
                    // Mirror the postgres query: the ceiling comes from the
                    // bidder's currently active configuration.
                    max_bid: inner
                        .bidders
                        .get(&bidder_id)
                        .and_then(|bidder| bidder.active_ceiling().cloned()),
                }
            })
    }

    fn append_locked(inner: &mut Inner, events: Vec<PendingEvent>) -> Vec<BidEvent> {
        let mut next_seq = inner.events.last().map(|event| event.seq).unwrap_or(0) + 1;
        let mut stored = Vec::with_capacity(events.len());
        for pending in events {
            let event = pending.into_event(next_seq);
            inner.events.push(event.clone());
            stored.push(event);
            next_seq += 1;
        }
        stored
    }
}

#[async_trait]
impl BidStorage for InMemoryStorage {
    async fn lot(&self, lot: LotId) -> Result<Option<Lot>, StorageError> {
        Ok(self.inner.lock().unwrap().lots.get(&lot).cloned())
    }

    async fn bidder(&self, bidder: BidderId) -> Result<Option<Bidder>, StorageError> {
        Ok(self.inner.lock().unwrap().bidders.get(&bidder).cloned())
    }

    async fn current_leader(&self, lot: LotId) -> Result<Option<Leader>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::leader_of(&inner, lot))
    }

    async fn append_events(
        &self,
        events: Vec<PendingEvent>,
    ) -> Result<Vec<BidEvent>, StorageError> {
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Other(anyhow!("storage unavailable")));
        }
        let mut inner = self.inner.lock().unwrap();
        Ok(Self::append_locked(&mut inner, events))
    }

    async fn events(&self, filter: &EventFilter, page: Page) -> Result<EventPage, StorageError> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<BidEvent> = inner
            .events
            .iter()
            .filter(|event| {
                if filter
                    .auction_id
                    .is_some_and(|auction| auction != event.auction_id)
                {
                    return false;
                }
                if filter
                    .event_type
                    .is_some_and(|event_type| event_type != event.kind.event_type())
                {
                    return false;
                }
                match filter.lot {
                    LotSelector::Any => (),
                    LotSelector::AuctionLevel => {
                        if event.lot_id.is_some() {
                            return false;
                        }
                    }
                    LotSelector::Number(number) => {
                        let matches = event.lot_id.is_some_and(|lot_id| {
                            inner
                                .lots
                                .get(&lot_id)
                                .is_some_and(|lot| lot.lot_number == number)
                        });
                        if !matches {
                            return false;
                        }
                    }
                }
                if filter.since.is_some_and(|since| event.timestamp < since) {
                    return false;
                }
                if filter.until.is_some_and(|until| event.timestamp > until) {
                    return false;
                }
                true
            })
            .cloned()
            .collect();
        if !page.ascending {
            matching.reverse();
        }
        let total = i64::try_from(matching.len()).unwrap_or(i64::MAX);
        let events = matching
            .into_iter()
            .skip(usize::try_from(page.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit).unwrap_or(usize::MAX))
            .collect();
        Ok(EventPage { events, total })
    }

    async fn mark_closing(&self, lot: LotId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let lot = inner
            .lots
            .get_mut(&lot)
            .ok_or_else(|| anyhow!("unknown lot"))?;
        if lot.status.can_transition_to(LotStatus::Closing) {
            lot.status = LotStatus::Closing;
        }
        Ok(())
    }

    async fn finalize_lot(
        &self,
        lot_id: LotId,
        winner: Option<PendingEvent>,
    ) -> Result<LotClose, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let status = inner
            .lots
            .get(&lot_id)
            .ok_or_else(|| anyhow!("unknown lot"))?
            .status;
        if status == LotStatus::Closed {
            let winner = inner
                .events
                .iter()
                .rev()
                .find(|event| {
                    event.lot_id == Some(lot_id)
                        && matches!(event.kind, BidEventKind::Winner { .. })
                })
                .cloned();
            return Ok(LotClose::AlreadyClosed { winner });
        }
        let winner = winner
            .map(|pending| Self::append_locked(&mut inner, vec![pending]).remove(0));
        inner
            .lots
            .get_mut(&lot_id)
            .expect("checked above")
            .status = LotStatus::Closed;
        Ok(LotClose::Closed { winner })
    }

    async fn winner_event(&self, lot: LotId) -> Result<Option<BidEvent>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .events
            .iter()
            .rev()
            .find(|event| {
                event.lot_id == Some(lot) && matches!(event.kind, BidEventKind::Winner { .. })
            })
            .cloned())
    }
}
