//! Derived current-leader state.
//!
//! The ledger is authoritative; this read model is rebuilt by folding events
//! in `seq` order and is never mutated independently.

use {
    crate::{
        Amount, BidderId, LotId,
        events::{BidEvent, BidEventKind},
    },
    std::collections::HashMap,
};

/// The bidder currently holding the highest admitted bid on a lot.
#[derive(Clone, Debug, PartialEq)]
pub struct Leader {
    pub bidder_id: BidderId,
    pub amount: Amount,
    /// The leader's active auto-bid ceiling as of the admitting event, if it
    /// was placed by the system.
    pub max_bid: Option<Amount>,
}

/// Per-lot leader state folded from the ledger.
#[derive(Clone, Debug, Default)]
pub struct Leaderboard {
    leaders: HashMap<LotId, Leader>,
    last_seq: i64,
}

impl Leaderboard {
    /// Folds one event into the read model. Events are de-duplicated by
    /// `seq`: fan-out delivery is at-least-once, so replays of already
    /// applied events are ignored.
    pub fn apply(&mut self, event: &BidEvent) {
        if event.seq <= self.last_seq {
            return;
        }
        self.last_seq = event.seq;

        let Some(lot_id) = event.lot_id else {
            return;
        };
        match &event.kind {
            BidEventKind::BidPlaced {
                bidder_id, amount, ..
            } => {
                self.leaders.insert(
                    lot_id,
                    Leader {
                        bidder_id: *bidder_id,
                        amount: amount.clone(),
                        max_bid: None,
                    },
                );
            }
            BidEventKind::AutoBid {
                bidder_id,
                amount,
                max_bid,
                ..
            } => {
                self.leaders.insert(
                    lot_id,
                    Leader {
                        bidder_id: *bidder_id,
                        amount: amount.clone(),
                        max_bid: Some(max_bid.clone()),
                    },
                );
            }
            // Outbid is informational and winner freezes the lot; neither
            // changes who holds the highest admitted bid.
            BidEventKind::Outbid { .. } | BidEventKind::Winner { .. } => (),
        }
    }

    /// Rebuilds the model from scratch. `events` must be sorted by `seq`
    /// ascending, as returned by the ledger query.
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a BidEvent>) -> Self {
        let mut board = Self::default();
        for event in events {
            board.apply(event);
        }
        board
    }

    pub fn leader(&self, lot_id: LotId) -> Option<&Leader> {
        self.leaders.get(&lot_id)
    }

    /// Highest sequence number folded so far; the cursor for backfill
    /// queries after a reconnect.
    pub fn last_seq(&self) -> i64 {
        self.last_seq
    }
}
