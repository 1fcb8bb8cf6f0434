//! The ledger record types. Events are append-only and never mutated or
//! deleted; everything else in the system is derived from them.

use {
    crate::{Amount, AuctionId, BidderId, LotId},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    strum::{AsRefStr, Display, EnumString},
};

/// A fully persisted ledger record with its assigned sequence number.
///
/// `seq` is global, strictly increasing and gapless; it is assigned by the
/// ledger at append time, never by the producer.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidEvent {
    pub seq: i64,
    pub auction_id: AuctionId,
    /// `None` marks an auction-level event, surfaced to the admin filter as
    /// the synthetic `auction-level` lot value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_id: Option<LotId>,
    #[serde(flatten)]
    pub kind: BidEventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<RequesterMetadata>,
}

/// An event produced by the resolution core or the finalizer that has not
/// been appended yet. The ledger assigns the sequence number atomically with
/// the write.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingEvent {
    pub auction_id: AuctionId,
    pub lot_id: Option<LotId>,
    pub kind: BidEventKind,
    pub timestamp: DateTime<Utc>,
    pub requester: Option<RequesterMetadata>,
}

impl PendingEvent {
    pub fn into_event(self, seq: i64) -> BidEvent {
        BidEvent {
            seq,
            auction_id: self.auction_id,
            lot_id: self.lot_id,
            kind: self.kind,
            timestamp: self.timestamp,
            requester: self.requester,
        }
    }
}

/// One variant per event type, each carrying only its relevant fields, so
/// that invalid combinations (a winner with a `maxBid`, an outbid without the
/// surpassed amount) are unrepresentable.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "eventType", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BidEventKind {
    /// A manual bid was admitted and now leads the lot.
    BidPlaced {
        bidder_id: BidderId,
        amount: Amount,
        trigger: Trigger,
    },
    /// The system placed a bid on a bidder's behalf, backed by their
    /// auto-bid ceiling.
    AutoBid {
        bidder_id: BidderId,
        amount: Amount,
        max_bid: Amount,
        trigger: Trigger,
    },
    /// A previously leading bidder was surpassed. `previous_amount` is their
    /// standing bid, `amount` the new leading amount.
    Outbid {
        bidder_id: BidderId,
        amount: Amount,
        previous_amount: Amount,
    },
    /// Terminal event for a lot; emitted exactly once when a closing lot has
    /// a leader.
    Winner { bidder_id: BidderId, amount: Amount },
}

impl BidEventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::BidPlaced { .. } => EventType::BidPlaced,
            Self::AutoBid { .. } => EventType::AutoBid,
            Self::Outbid { .. } => EventType::Outbid,
            Self::Winner { .. } => EventType::Winner,
        }
    }

    pub fn bidder_id(&self) -> BidderId {
        match self {
            Self::BidPlaced { bidder_id, .. }
            | Self::AutoBid { bidder_id, .. }
            | Self::Outbid { bidder_id, .. }
            | Self::Winner { bidder_id, .. } => *bidder_id,
        }
    }

    pub fn amount(&self) -> &Amount {
        match self {
            Self::BidPlaced { amount, .. }
            | Self::AutoBid { amount, .. }
            | Self::Outbid { amount, .. }
            | Self::Winner { amount, .. } => amount,
        }
    }

    /// Whether this event makes its bidder the new leader of the lot.
    pub fn admits_leader(&self) -> bool {
        matches!(self, Self::BidPlaced { .. } | Self::AutoBid { .. })
    }
}

/// What caused a bid to be placed.
#[derive(
    AsRefStr, Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    /// A direct human bid.
    Manual,
    /// The submitter's own stored auto-bid ceiling was used to raise on
    /// their behalf at submission time.
    ReserveBidder,
    /// The system re-raised for the surpassed leader during a cascade.
    ReserveDefense,
}

/// The event-type vocabulary of the admin filter.
#[derive(
    AsRefStr, Clone, Copy, Debug, Display, EnumString, Eq, Hash, PartialEq, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    BidPlaced,
    AutoBid,
    Outbid,
    Winner,
}

/// Informational request metadata recorded with an event. Never part of any
/// bidding decision.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Ledger query filters, mirroring the admin view's filter set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventFilter {
    pub auction_id: Option<AuctionId>,
    pub event_type: Option<EventType>,
    pub lot: LotSelector,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Which lots a query targets. `AuctionLevel` is the synthetic lot value the
/// admin filter uses for auction-wide events.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LotSelector {
    #[default]
    Any,
    AuctionLevel,
    Number(i32),
}
