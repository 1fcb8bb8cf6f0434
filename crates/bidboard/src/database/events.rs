//! Conversions between the ledger's storage rows and the domain event type.
//! A malformed row (an outbid without its surpassed amount, an auto-bid
//! without a ceiling) is a storage corruption error, not a value.

use {
    anyhow::{Context, Result, anyhow},
    database::bid_events::{BidEventRow, BidEventType, BidTrigger, NewBidEvent},
    model::events::{BidEvent, BidEventKind, EventType, PendingEvent, RequesterMetadata, Trigger},
};

pub fn db_event_type(event_type: EventType) -> BidEventType {
    match event_type {
        EventType::BidPlaced => BidEventType::BidPlaced,
        EventType::AutoBid => BidEventType::AutoBid,
        EventType::Outbid => BidEventType::Outbid,
        EventType::Winner => BidEventType::Winner,
    }
}

fn db_trigger(trigger: Trigger) -> BidTrigger {
    match trigger {
        Trigger::Manual => BidTrigger::Manual,
        Trigger::ReserveBidder => BidTrigger::ReserveBidder,
        Trigger::ReserveDefense => BidTrigger::ReserveDefense,
    }
}

fn trigger_from_db(trigger: BidTrigger) -> Trigger {
    match trigger {
        BidTrigger::Manual => Trigger::Manual,
        BidTrigger::ReserveBidder => Trigger::ReserveBidder,
        BidTrigger::ReserveDefense => Trigger::ReserveDefense,
    }
}

pub fn row_from_pending(pending: &PendingEvent) -> NewBidEvent {
    let (event_type, previous_amount, max_bid, trigger_kind) = match &pending.kind {
        BidEventKind::BidPlaced { trigger, .. } => {
            (BidEventType::BidPlaced, None, None, Some(db_trigger(*trigger)))
        }
        BidEventKind::AutoBid {
            max_bid, trigger, ..
        } => (
            BidEventType::AutoBid,
            None,
            Some(max_bid.clone()),
            Some(db_trigger(*trigger)),
        ),
        BidEventKind::Outbid {
            previous_amount, ..
        } => (
            BidEventType::Outbid,
            Some(previous_amount.clone()),
            None,
            None,
        ),
        BidEventKind::Winner { .. } => (BidEventType::Winner, None, None, None),
    };
    NewBidEvent {
        auction_id: pending.auction_id,
        lot_id: pending.lot_id,
        event_type,
        bidder_id: pending.kind.bidder_id(),
        amount: pending.kind.amount().clone(),
        previous_amount,
        max_bid,
        trigger_kind,
        timestamp: pending.timestamp,
        requester_ip: pending
            .requester
            .as_ref()
            .and_then(|requester| requester.ip.clone()),
        requester_device: pending
            .requester
            .as_ref()
            .and_then(|requester| requester.device.clone()),
    }
}

pub fn event_from_row(row: BidEventRow) -> Result<BidEvent> {
    let kind = match row.event_type {
        BidEventType::BidPlaced => BidEventKind::BidPlaced {
            bidder_id: row.bidder_id,
            amount: row.amount,
            trigger: trigger_from_db(
                row.trigger_kind
                    .with_context(|| format!("bid_placed event {} without trigger", row.seq))?,
            ),
        },
        BidEventType::AutoBid => BidEventKind::AutoBid {
            bidder_id: row.bidder_id,
            amount: row.amount,
            max_bid: row
                .max_bid
                .with_context(|| format!("auto_bid event {} without max_bid", row.seq))?,
            trigger: trigger_from_db(
                row.trigger_kind
                    .with_context(|| format!("auto_bid event {} without trigger", row.seq))?,
            ),
        },
        BidEventType::Outbid => BidEventKind::Outbid {
            bidder_id: row.bidder_id,
            amount: row.amount,
            previous_amount: row
                .previous_amount
                .ok_or_else(|| anyhow!("outbid event {} without previous_amount", row.seq))?,
        },
        BidEventType::Winner => BidEventKind::Winner {
            bidder_id: row.bidder_id,
            amount: row.amount,
        },
    };
    let requester = match (row.requester_ip, row.requester_device) {
        (None, None) => None,
        (ip, device) => Some(RequesterMetadata { ip, device }),
    };
    Ok(BidEvent {
        seq: row.seq,
        auction_id: row.auction_id,
        lot_id: row.lot_id,
        kind,
        timestamp: row.timestamp,
        requester,
    })
}
